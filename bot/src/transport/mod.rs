//! Chat transport seam.
//!
//! The transport task pushes [`TransportEvent`]s into an mpsc channel that
//! the dispatch loop drains; outbound lines go through a shared
//! [`ChannelSender`] handle.

use std::borrow::Cow;

use thiserror::Error;

pub mod irc;

/// Flatten `text` onto one line. IRC ends a command at any CR or LF, so
/// each one becomes a space.
pub fn single_line(text: &str) -> Cow<'_, str> {
    if text.contains(['\r', '\n']) {
        Cow::Owned(text.replace(['\r', '\n'], " "))
    } else {
        Cow::Borrowed(text)
    }
}

/// Events raised by the transport task.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportEvent {
    /// Registration with the server completed.
    Connected,
    /// A private or channel message arrived.
    Message(InboundMessage),
    /// The connection was lost.
    Disconnected,
}

/// One inbound `PRIVMSG`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InboundMessage {
    /// Channel name, or our own nick for a private message.
    pub target: String,
    /// Nick of the author.
    pub sender: String,
    /// Message body.
    pub text: String,
}

/// Transport errors.
#[derive(Debug, Error)]
pub enum TransportError {
    /// No live connection to send through.
    #[error("not connected")]
    NotConnected,
    /// The IRC client failed.
    #[error("IRC error: {0}")]
    Irc(#[from] ::irc::error::Error),
    /// The event channel was closed by the dispatch loop.
    #[error("event channel closed")]
    ChannelClosed,
}

/// Outbound side of the transport. Safe to share between tasks.
pub trait ChannelSender: Send + Sync {
    /// Send one line to a channel or nick.
    ///
    /// # Errors
    ///
    /// Fails when disconnected or when the client rejects the message.
    fn send_line(&self, target: &str, line: &str) -> Result<(), TransportError>;

    /// Join a channel.
    ///
    /// # Errors
    ///
    /// Fails when disconnected or when the client rejects the command.
    fn join(&self, channel: &str) -> Result<(), TransportError>;

    /// Whether the server registration is currently live.
    fn is_connected(&self) -> bool;

    /// Our own nick.
    fn nickname(&self) -> &str;
}
