//! IRC transport built on the `irc` crate.
//!
//! [`IrcTransport::run`] owns the connection and reconnects with
//! exponential backoff. [`IrcHandle`] is the cloneable outbound side.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use futures::StreamExt;
use irc::client::prelude::{Client, Command, Config, Response};
use irc::client::Sender;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use super::{single_line, ChannelSender, InboundMessage, TransportError, TransportEvent};

const INITIAL_BACKOFF: Duration = Duration::from_secs(1);
const MAX_BACKOFF: Duration = Duration::from_secs(60);

/// Connection settings for [`IrcTransport`].
#[derive(Debug, Clone)]
pub struct IrcSettings {
    /// Server host name.
    pub server: String,
    /// Server port.
    pub port: u16,
    /// Connect over TLS.
    pub use_tls: bool,
    /// Nick to register.
    pub nickname: String,
    /// IRC user name.
    pub username: String,
    /// Real name shown in WHOIS.
    pub realname: String,
}

impl IrcSettings {
    fn client_config(&self) -> Config {
        Config {
            nickname: Some(self.nickname.clone()),
            username: Some(self.username.clone()),
            realname: Some(self.realname.clone()),
            server: Some(self.server.clone()),
            port: Some(self.port),
            use_tls: Some(self.use_tls),
            ..Config::default()
        }
    }
}

/// Outbound handle to the current IRC connection.
#[derive(Clone)]
pub struct IrcHandle {
    nickname: String,
    sender: Arc<Mutex<Option<Sender>>>,
    connected: Arc<AtomicBool>,
}

impl IrcHandle {
    fn with_sender<F>(&self, send: F) -> Result<(), TransportError>
    where
        F: FnOnce(&Sender) -> Result<(), ::irc::error::Error>,
    {
        if !self.is_connected() {
            return Err(TransportError::NotConnected);
        }
        let guard = self
            .sender
            .lock()
            .map_err(|_| TransportError::NotConnected)?;
        let sender = guard.as_ref().ok_or(TransportError::NotConnected)?;
        send(sender).map_err(TransportError::from)
    }
}

impl std::fmt::Debug for IrcHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IrcHandle")
            .field("nickname", &self.nickname)
            .field("connected", &self.is_connected())
            .finish_non_exhaustive()
    }
}

impl ChannelSender for IrcHandle {
    fn send_line(&self, target: &str, line: &str) -> Result<(), TransportError> {
        let line = single_line(line);
        self.with_sender(|s| s.send_privmsg(target, line.as_ref()))
    }

    fn join(&self, channel: &str) -> Result<(), TransportError> {
        self.with_sender(|s| s.send_join(channel))
    }

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    fn nickname(&self) -> &str {
        &self.nickname
    }
}

/// Long-lived IRC connection task.
pub struct IrcTransport {
    settings: IrcSettings,
    handle: IrcHandle,
}

impl IrcTransport {
    /// Prepare a transport. Nothing is connected until [`IrcTransport::run`].
    pub fn new(settings: IrcSettings) -> (Self, IrcHandle) {
        let handle = IrcHandle {
            nickname: settings.nickname.clone(),
            sender: Arc::new(Mutex::new(None)),
            connected: Arc::new(AtomicBool::new(false)),
        };
        (
            Self {
                settings,
                handle: handle.clone(),
            },
            handle,
        )
    }

    /// Connect, forward events, and reconnect with backoff when the
    /// connection drops. Returns once the event receiver is gone.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError::ChannelClosed`] when the dispatch loop stops.
    pub async fn run(self, events: mpsc::Sender<TransportEvent>) -> Result<(), TransportError> {
        let mut backoff = INITIAL_BACKOFF;
        loop {
            match self.session(&events).await {
                Ok(()) => {
                    info!(server = %self.settings.server, "IRC connection closed");
                    backoff = INITIAL_BACKOFF;
                }
                Err(TransportError::ChannelClosed) => return Err(TransportError::ChannelClosed),
                Err(e) => warn!(error = %e, server = %self.settings.server, "IRC connection failed"),
            }

            self.handle.connected.store(false, Ordering::SeqCst);
            if let Ok(mut slot) = self.handle.sender.lock() {
                *slot = None;
            }
            events
                .send(TransportEvent::Disconnected)
                .await
                .map_err(|_| TransportError::ChannelClosed)?;

            debug!(delay_secs = backoff.as_secs(), "reconnecting to IRC");
            tokio::time::sleep(backoff).await;
            backoff = backoff.saturating_mul(2).min(MAX_BACKOFF);
        }
    }

    async fn session(&self, events: &mpsc::Sender<TransportEvent>) -> Result<(), TransportError> {
        let mut client = Client::from_config(self.settings.client_config()).await?;
        client.identify()?;
        let mut stream = client.stream()?;
        if let Ok(mut slot) = self.handle.sender.lock() {
            *slot = Some(client.sender());
        }
        info!(
            server = %self.settings.server,
            port = self.settings.port,
            nick = %self.settings.nickname,
            "connecting to IRC"
        );

        while let Some(message) = stream.next().await.transpose()? {
            let event = match &message.command {
                Command::Response(Response::RPL_WELCOME, _) => {
                    self.handle.connected.store(true, Ordering::SeqCst);
                    info!(nick = %self.settings.nickname, "registered with IRC server");
                    TransportEvent::Connected
                }
                Command::PRIVMSG(target, text) => {
                    let Some(sender) = message.source_nickname() else {
                        continue;
                    };
                    TransportEvent::Message(InboundMessage {
                        target: target.clone(),
                        sender: sender.to_owned(),
                        text: text.clone(),
                    })
                }
                _ => continue,
            };
            events
                .send(event)
                .await
                .map_err(|_| TransportError::ChannelClosed)?;
        }
        Ok(())
    }
}
