//! Node/Central relay state machine.
//!
//! A node forwards its reports to the central bot over IRC. The central
//! bot decodes node records, drops the ones it has already published, and
//! announces the rest in the channel. The seen-publish-remember sequence
//! runs under one mutex so concurrent sources cannot double-publish.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use regex::Regex;
use serde::Deserialize;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::codec::{self, NodeMessage, ProtocolError};
use crate::dedup::DedupStore;
use crate::snatch::SnatchService;
use crate::transport::{single_line, ChannelSender, InboundMessage};

/// Role of this process, fixed for its lifetime.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// Forwards reports to the central bot.
    #[default]
    Node,
    /// Publishes deduplicated reports to the channel.
    Central,
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Node => f.write_str("node"),
            Self::Central => f.write_str("central"),
        }
    }
}

/// Relay parameters taken from configuration.
#[derive(Debug, Clone)]
pub struct RelaySettings {
    /// Announce channel.
    pub channel: String,
    /// Nick of the central bot.
    pub central_bot: String,
    /// NickServ password sent on connect.
    pub nickserv_password: Option<String>,
    /// Gatekeeper nick (central only).
    pub gatekeeper: Option<String>,
    /// Key handed to the gatekeeper.
    pub key: Option<String>,
    /// Pause between startup steps.
    pub settle_delay: Duration,
    /// Substring every node attachment URL must contain.
    pub trusted_origin: String,
    /// Retention of published keys.
    pub ttl: Duration,
}

/// A finished local analysis, ready to relay.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Report {
    /// The analysis ran.
    Analysis {
        /// Release folder name.
        release: String,
        /// Tracker id, or a placeholder when unknown.
        snatch_id: String,
        /// Tracker permalink, or the same placeholder.
        permalink: String,
        /// Uploaded overview image, empty when unavailable.
        image_url: String,
        /// Uploaded full log, empty when unavailable.
        paste_url: String,
        /// Counts line.
        summary: String,
        /// One entry per failing check.
        details: Vec<String>,
    },
    /// The analysis could not run.
    Failure {
        /// Release folder name.
        release: String,
        /// Reason.
        message: String,
    },
}

impl Report {
    /// Wire record sent by a node.
    pub fn to_node_message(&self) -> NodeMessage {
        match self {
            Self::Analysis {
                release,
                snatch_id,
                image_url,
                paste_url,
                summary,
                ..
            } => NodeMessage::Report {
                subject_path: release.clone(),
                snatch_id: snatch_id.clone(),
                human_summary: image_url.clone(),
                attachment_url: paste_url.clone(),
                counts_summary: summary.clone(),
            },
            Self::Failure { release, message } => NodeMessage::Failure {
                subject_path: release.clone(),
                message: message.clone(),
            },
        }
    }

    /// Channel lines published by the central bot for its own runs.
    pub fn channel_lines(&self) -> Vec<String> {
        match self {
            Self::Analysis {
                release,
                permalink,
                image_url,
                paste_url,
                summary,
                details,
                ..
            } => {
                let mut lines = vec![format!(
                    "\u{3}09{release}\u{f} | {permalink} | {image_url} | {paste_url} | \u{2}\u{3}07{summary}\u{f}"
                )];
                lines.extend(
                    details
                        .iter()
                        .map(|d| format!("\u{3}09{release}\u{f} | \u{2}\u{3}04{d}\u{f}")),
                );
                lines
            }
            Self::Failure { release, message } => {
                vec![format!("\u{3}09{release}\u{f} | \u{2}\u{3}04Error: {message}\u{f}")]
            }
        }
    }

    fn dedup_key(&self) -> Vec<u8> {
        let message = self.to_node_message();
        codec::dedup_key(message.subject_path(), &message.token())
    }
}

/// What happened to an inbound message or a report.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RelayOutcome {
    /// Lines were sent to the channel (central) or to the central bot (node).
    Published,
    /// Already published within the retention window.
    Duplicate,
    /// The record failed to decode.
    Rejected(ProtocolError),
    /// Not for us: wrong sender or not a record.
    Ignored,
    /// A chat command was answered.
    Answered,
    /// The transport refused the line.
    Undelivered,
}

enum RoleState {
    Node,
    Central {
        store: Arc<DedupStore>,
        publish_lock: Mutex<()>,
    },
}

/// Relay for one process.
pub struct Relay {
    settings: RelaySettings,
    transport: Arc<dyn ChannelSender>,
    state: RoleState,
    nick_prefix: Regex,
    snatcher: Option<Arc<dyn SnatchService>>,
}

impl Relay {
    /// Relay in node role.
    ///
    /// # Errors
    ///
    /// Fails if the nick cannot be turned into a prefix pattern.
    pub fn node(settings: RelaySettings, transport: Arc<dyn ChannelSender>) -> Result<Self, regex::Error> {
        Self::build(settings, transport, RoleState::Node)
    }

    /// Relay in central role, publishing through `store`.
    ///
    /// # Errors
    ///
    /// Fails if the nick cannot be turned into a prefix pattern.
    pub fn central(
        settings: RelaySettings,
        transport: Arc<dyn ChannelSender>,
        store: Arc<DedupStore>,
    ) -> Result<Self, regex::Error> {
        Self::build(
            settings,
            transport,
            RoleState::Central {
                store,
                publish_lock: Mutex::new(()),
            },
        )
    }

    fn build(
        settings: RelaySettings,
        transport: Arc<dyn ChannelSender>,
        state: RoleState,
    ) -> Result<Self, regex::Error> {
        let nick_prefix = Regex::new(&format!("{}[,:] *", regex::escape(transport.nickname())))?;
        Ok(Self {
            settings,
            transport,
            state,
            nick_prefix,
            snatcher: None,
        })
    }

    /// Enable `!propolis` through `snatcher`.
    #[must_use]
    pub fn with_snatcher(mut self, snatcher: Arc<dyn SnatchService>) -> Self {
        self.snatcher = Some(snatcher);
        self
    }

    /// Current role.
    pub fn role(&self) -> Role {
        match self.state {
            RoleState::Node => Role::Node,
            RoleState::Central { .. } => Role::Central,
        }
    }

    /// Whether the transport can currently deliver.
    pub fn is_connected(&self) -> bool {
        self.transport.is_connected()
    }

    /// Run the post-registration sequence in the background: identify to
    /// NickServ, then (central only) ask the gatekeeper for entry and join
    /// the channel, pausing between steps.
    pub fn on_connected(self: &Arc<Self>) -> JoinHandle<()> {
        let relay = Arc::clone(self);
        tokio::spawn(async move { relay.startup_sequence().await })
    }

    async fn startup_sequence(&self) {
        if let Some(password) = &self.settings.nickserv_password {
            self.send("NickServ", &format!("IDENTIFY {password}"));
        }
        if self.role() == Role::Node {
            return;
        }

        tokio::time::sleep(self.settings.settle_delay).await;
        if let Some(gatekeeper) = &self.settings.gatekeeper {
            let key = self.settings.key.as_deref().unwrap_or_default();
            self.send(
                gatekeeper,
                &format!(
                    "enter {} {} {key}",
                    self.settings.channel,
                    self.transport.nickname()
                ),
            );
        }

        tokio::time::sleep(self.settings.settle_delay).await;
        match self.transport.join(&self.settings.channel) {
            Ok(()) => info!(channel = %self.settings.channel, "joined announce channel"),
            Err(e) => warn!(error = %e, channel = %self.settings.channel, "failed to join channel"),
        }
    }

    /// Handle one inbound `PRIVMSG`.
    pub async fn handle_message(&self, message: &InboundMessage) -> RelayOutcome {
        let text = self.nick_prefix.replace_all(&message.text, "");

        match &self.state {
            RoleState::Node => {
                if message.sender != self.settings.central_bot {
                    debug!(sender = %message.sender, "ignoring message from non-central sender");
                    return RelayOutcome::Ignored;
                }
                self.dispatch_command(message, &text).await
            }
            RoleState::Central {
                store,
                publish_lock,
            } => {
                if text.starts_with('!') {
                    return self.dispatch_command(message, &text).await;
                }
                match codec::decode(&text, &message.sender, &self.settings.trusted_origin) {
                    Ok(decoded) => {
                        self.publish_once(
                            store,
                            publish_lock,
                            &decoded.dedup_key(),
                            std::slice::from_ref(&decoded.line),
                        )
                        .await
                    }
                    Err(e) => {
                        debug!(error = %e, "dropping node message");
                        RelayOutcome::Rejected(e)
                    }
                }
            }
        }
    }

    /// Relay a report produced by this process.
    ///
    /// A node sends the encoded record to the central bot. The central bot
    /// publishes it directly, through the same dedup section as node records.
    pub async fn publish_report(&self, report: &Report) -> RelayOutcome {
        match &self.state {
            RoleState::Node => {
                let record = codec::encode(&report.to_node_message());
                if self.send(&self.settings.central_bot, &record) {
                    RelayOutcome::Published
                } else {
                    RelayOutcome::Undelivered
                }
            }
            RoleState::Central {
                store,
                publish_lock,
            } => {
                self.publish_once(store, publish_lock, &report.dedup_key(), &report.channel_lines())
                    .await
            }
        }
    }

    async fn publish_once(
        &self,
        store: &DedupStore,
        publish_lock: &Mutex<()>,
        key: &[u8],
        lines: &[String],
    ) -> RelayOutcome {
        let _guard = publish_lock.lock().await;

        let seen = store.seen(key).await.unwrap_or_else(|e| {
            warn!(error = %e, "dedup lookup failed, treating as new");
            false
        });
        if seen {
            debug!(key = %String::from_utf8_lossy(key), "already published");
            return RelayOutcome::Duplicate;
        }

        for line in lines {
            if !self.send(&self.settings.channel, line) {
                return RelayOutcome::Undelivered;
            }
        }

        if let Err(e) = store.remember(key, self.settings.ttl).await {
            warn!(error = %e, "failed to record published report");
        }
        RelayOutcome::Published
    }

    async fn dispatch_command(&self, message: &InboundMessage, text: &str) -> RelayOutcome {
        let Some(command) = text.strip_prefix('!') else {
            return RelayOutcome::Ignored;
        };
        let (name, args) = command.split_once(' ').unwrap_or((command, ""));
        let reply = match name {
            "hello" => format!(
                "Why, hello there {}! You can indeed call me {}!",
                message.sender,
                args.trim()
            ),
            "propolis" => {
                let Some(snatcher) = &self.snatcher else {
                    debug!("!propolis received but varroa is not configured");
                    return RelayOutcome::Ignored;
                };
                match snatcher.snatch(args, &message.sender).await {
                    Ok(reply) => reply,
                    Err(e) => {
                        info!(error = %e, sender = %message.sender, "snatch request refused");
                        format!("Error executing propolis: {e}")
                    }
                }
            }
            _ => {
                debug!(command = %name, "unknown command");
                return RelayOutcome::Ignored;
            }
        };

        let target = if message.target == self.transport.nickname() {
            message.sender.as_str()
        } else {
            message.target.as_str()
        };
        if self.send(target, &reply) {
            RelayOutcome::Answered
        } else {
            RelayOutcome::Undelivered
        }
    }

    fn send(&self, target: &str, line: &str) -> bool {
        match self.transport.send_line(target, &single_line(line)) {
            Ok(()) => true,
            Err(e) => {
                warn!(error = %e, target = %target, "failed to send line");
                false
            }
        }
    }
}

impl fmt::Debug for Relay {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Relay")
            .field("role", &self.role())
            .field("channel", &self.settings.channel)
            .field("snatch", &self.snatcher.is_some())
            .finish_non_exhaustive()
    }
}
