//! Shared fixtures for the relay integration tests.

#![allow(dead_code)]

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use propolis_bot::dedup::{DedupStore, DEFAULT_TTL};
use propolis_bot::relay::RelaySettings;
use propolis_bot::transport::{ChannelSender, InboundMessage, TransportError};

pub const CHANNEL: &str = "#propolis-announce";
pub const CENTRAL: &str = "bbb";
pub const ORIGIN: &str = "https://privatebin.url";

/// In-memory transport recording every outbound command as
/// `"PRIVMSG <target> :<line>"` or `"JOIN <channel>"`.
pub struct RecordingSender {
    nickname: String,
    connected: AtomicBool,
    log: Mutex<Vec<String>>,
}

impl RecordingSender {
    pub fn new(nickname: &str) -> Arc<Self> {
        Arc::new(Self {
            nickname: nickname.to_owned(),
            connected: AtomicBool::new(true),
            log: Mutex::new(Vec::new()),
        })
    }

    pub fn set_connected(&self, connected: bool) {
        self.connected.store(connected, Ordering::SeqCst);
    }

    pub fn log(&self) -> Vec<String> {
        self.log.lock().expect("lock").clone()
    }

    pub fn lines_to(&self, target: &str) -> Vec<String> {
        let prefix = format!("PRIVMSG {target} :");
        self.log()
            .into_iter()
            .filter_map(|l| l.strip_prefix(&prefix).map(str::to_owned))
            .collect()
    }
}

impl ChannelSender for RecordingSender {
    fn send_line(&self, target: &str, line: &str) -> Result<(), TransportError> {
        if !self.is_connected() {
            return Err(TransportError::NotConnected);
        }
        self.log
            .lock()
            .expect("lock")
            .push(format!("PRIVMSG {target} :{line}"));
        Ok(())
    }

    fn join(&self, channel: &str) -> Result<(), TransportError> {
        if !self.is_connected() {
            return Err(TransportError::NotConnected);
        }
        self.log.lock().expect("lock").push(format!("JOIN {channel}"));
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    fn nickname(&self) -> &str {
        &self.nickname
    }
}

pub fn settings() -> RelaySettings {
    RelaySettings {
        channel: CHANNEL.to_owned(),
        central_bot: CENTRAL.to_owned(),
        nickserv_password: Some("hunter2".to_owned()),
        gatekeeper: Some("Bee".to_owned()),
        key: Some("kkeeyy".to_owned()),
        settle_delay: Duration::from_secs(1),
        trusted_origin: ORIGIN.to_owned(),
        ttl: DEFAULT_TTL,
    }
}

pub async fn open_temp_store() -> (Arc<DedupStore>, tempfile::TempDir) {
    let dir = tempfile::tempdir().expect("tempdir");
    let store = DedupStore::open(&dir.path().join("propolis.db"))
        .await
        .expect("open store");
    (Arc::new(store), dir)
}

pub fn privmsg(target: &str, sender: &str, text: &str) -> InboundMessage {
    InboundMessage {
        target: target.to_owned(),
        sender: sender.to_owned(),
        text: text.to_owned(),
    }
}
