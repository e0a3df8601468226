//! Configuration loading for the relay daemon.
//!
//! Loads `propolis-bot.toml`. Every section except `[general]` and the
//! connection fields of `[irc]` has defaults. Secrets may be supplied
//! through the environment (or a `.env` file) instead of the TOML file.

use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;
use thiserror::Error;

use crate::relay::Role;

/// Default configuration file name.
pub const CONFIG_FILE: &str = "propolis-bot.toml";

/// Environment variable overriding `irc.nickserv_password`.
pub const ENV_NICKSERV_PASSWORD: &str = "PROPOLIS_NICKSERV_PASSWORD";
/// Environment variable overriding `irc.key`.
pub const ENV_IRC_KEY: &str = "PROPOLIS_IRC_KEY";
/// Environment variable overriding `general.image_host_key`.
pub const ENV_IMAGE_HOST_KEY: &str = "PROPOLIS_IMAGE_HOST_KEY";
/// Environment variable overriding `varroa.token`.
pub const ENV_VARROA_TOKEN: &str = "PROPOLIS_VARROA_TOKEN";
/// Environment variable overriding `varroa.api_key`.
pub const ENV_TRACKER_API_KEY: &str = "PROPOLIS_TRACKER_API_KEY";

/// Configuration errors. All of them stop the daemon at startup.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The file could not be read.
    #[error("failed to read config at {path}: {source}")]
    Read {
        /// File path.
        path: PathBuf,
        /// Underlying error.
        source: std::io::Error,
    },
    /// The file is not valid TOML for this schema.
    #[error("failed to parse config at {path}: {source}")]
    Parse {
        /// File path.
        path: PathBuf,
        /// Underlying error.
        source: toml::de::Error,
    },
    /// A value is out of bounds.
    #[error("invalid configuration: {0}")]
    Invalid(String),
}

/// Top-level daemon configuration.
#[derive(Clone, Deserialize)]
pub struct BotConfig {
    /// Paste and image services.
    pub general: GeneralConfig,
    /// IRC connection and relay role.
    pub irc: IrcConfig,
    /// HTTP ingestion listener.
    #[serde(default)]
    pub ingest: IngestConfig,
    /// Dedup store.
    #[serde(default)]
    pub store: StoreConfig,
    /// Tracker permalinks.
    #[serde(default)]
    pub tracker: TrackerConfig,
    /// Outbound HTTP client.
    #[serde(default)]
    pub http: HttpConfig,
    /// `!propolis` command. Disabled when absent.
    #[serde(default)]
    pub varroa: Option<VarroaConfig>,
}

/// External services.
#[derive(Clone, Deserialize)]
pub struct GeneralConfig {
    /// Paste service receiving full logs. Also the trusted origin of node reports.
    pub paste_url: String,
    /// Image host API key. Overview uploads are skipped without it.
    #[serde(default)]
    pub image_host_key: Option<String>,
    /// Image host upload endpoint.
    #[serde(default = "default_image_host_url")]
    pub image_host_url: String,
    /// Directory for daemon logs. Defaults to the platform data directory.
    #[serde(default)]
    pub logs_dir: Option<PathBuf>,
}

/// IRC connection and relay role.
#[derive(Clone, Deserialize)]
pub struct IrcConfig {
    /// Server host name.
    pub server: String,
    /// Server port.
    #[serde(default = "default_irc_port")]
    pub port: u16,
    /// Connect over TLS.
    #[serde(default = "default_true")]
    pub tls: bool,
    /// Bot nick.
    pub nickname: String,
    /// IRC user name. Defaults to the nick.
    #[serde(default)]
    pub username: Option<String>,
    /// Real name.
    #[serde(default = "default_realname")]
    pub realname: String,
    /// NickServ password.
    #[serde(default)]
    pub nickserv_password: Option<String>,
    /// IRC key handed to the gatekeeper.
    #[serde(default)]
    pub key: Option<String>,
    /// Nick of the service that invites the bot into the channel.
    #[serde(default)]
    pub gatekeeper: Option<String>,
    /// Announce channel.
    #[serde(default = "default_channel")]
    pub channel: String,
    /// Relay role.
    #[serde(default)]
    pub role: Role,
    /// Nick of the central bot nodes report to.
    #[serde(default = "default_central_bot")]
    pub central_bot: String,
    /// Pause between startup steps, in milliseconds.
    #[serde(default = "default_settle_delay_ms")]
    pub settle_delay_ms: u64,
}

impl IrcConfig {
    /// Pause between startup steps.
    pub fn settle_delay(&self) -> Duration {
        Duration::from_millis(self.settle_delay_ms)
    }

    /// IRC user name, falling back to the nick.
    pub fn username(&self) -> &str {
        self.username.as_deref().unwrap_or(&self.nickname)
    }
}

/// HTTP ingestion listener.
#[derive(Debug, Clone, Deserialize)]
pub struct IngestConfig {
    /// Bind address.
    #[serde(default = "default_bind")]
    pub bind: String,
    /// Listen port.
    #[serde(default = "default_ingest_port")]
    pub port: u16,
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
            port: default_ingest_port(),
        }
    }
}

/// Dedup store.
#[derive(Debug, Clone, Deserialize)]
pub struct StoreConfig {
    /// SQLite file.
    #[serde(default = "default_store_path")]
    pub path: PathBuf,
    /// How long a relayed report stays known, in days.
    #[serde(default = "default_ttl_days")]
    pub ttl_days: u64,
}

impl StoreConfig {
    /// Retention as a [`Duration`].
    pub fn ttl(&self) -> Duration {
        Duration::from_secs(self.ttl_days.saturating_mul(24 * 60 * 60))
    }
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            path: default_store_path(),
            ttl_days: default_ttl_days(),
        }
    }
}

/// Tracker permalinks.
#[derive(Debug, Clone, Deserialize)]
pub struct TrackerConfig {
    /// Prefix the torrent id is appended to.
    #[serde(default = "default_permalink_base")]
    pub permalink_base: String,
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            permalink_base: default_permalink_base(),
        }
    }
}

/// Outbound HTTP client.
#[derive(Debug, Clone, Deserialize)]
pub struct HttpConfig {
    /// Per-request timeout in seconds.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl HttpConfig {
    /// Per-request timeout.
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

/// Tracker API and local varroa instance used by `!propolis`.
#[derive(Clone, Deserialize)]
pub struct VarroaConfig {
    /// Site name as configured in varroa.
    pub site: String,
    /// varroa webserver token.
    pub token: String,
    /// varroa webserver host.
    #[serde(default = "default_varroa_host")]
    pub host: String,
    /// varroa webserver port.
    pub port: u16,
    /// Tracker base URL, without `/ajax.php`.
    pub tracker_url: String,
    /// Tracker API key.
    pub api_key: String,
    /// Uploaders whose torrents are refused.
    #[serde(default)]
    pub blacklisted_uploaders: Vec<String>,
    /// Group tags that get a torrent refused.
    #[serde(default)]
    pub excluded_tags: Vec<String>,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            timeout_secs: default_timeout_secs(),
        }
    }
}

impl BotConfig {
    /// Parse a configuration from TOML text. Does not validate.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Parse`] on invalid TOML.
    pub fn from_toml(contents: &str, origin: &Path) -> Result<Self, ConfigError> {
        toml::from_str(contents).map_err(|source| ConfigError::Parse {
            path: origin.to_path_buf(),
            source,
        })
    }

    /// Replace secrets with values found through `lookup`.
    pub fn apply_env<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(v) = lookup(ENV_NICKSERV_PASSWORD) {
            self.irc.nickserv_password = Some(v);
        }
        if let Some(v) = lookup(ENV_IRC_KEY) {
            self.irc.key = Some(v);
        }
        if let Some(v) = lookup(ENV_IMAGE_HOST_KEY) {
            self.general.image_host_key = Some(v);
        }
        if let Some(varroa) = &mut self.varroa {
            if let Some(v) = lookup(ENV_VARROA_TOKEN) {
                varroa.token = v;
            }
            if let Some(v) = lookup(ENV_TRACKER_API_KEY) {
                varroa.api_key = v;
            }
        }
    }

    /// Validate that configuration values are within sane bounds.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] describing the first problem found.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let invalid = |msg: &str| Err(ConfigError::Invalid(msg.to_owned()));

        if url::Url::parse(&self.general.paste_url).is_err() {
            return invalid("general.paste_url must be an absolute URL");
        }
        if self.irc.server.trim().is_empty() {
            return invalid("irc.server must not be empty");
        }
        if self.irc.nickname.trim().is_empty() {
            return invalid("irc.nickname must not be empty");
        }
        if self.irc.port == 0 {
            return invalid("irc.port must be non-zero");
        }
        if !self.irc.channel.starts_with('#') {
            return invalid("irc.channel must start with '#'");
        }
        if self.irc.role == Role::Node && self.irc.central_bot.trim().is_empty() {
            return invalid("irc.central_bot is required in node role");
        }
        if self.ingest.port == 0 {
            return invalid("ingest.port must be non-zero");
        }
        if self.store.ttl_days == 0 {
            return invalid("store.ttl_days must be at least 1");
        }
        if self.http.timeout_secs == 0 {
            return invalid("http.timeout_secs must be at least 1");
        }
        if let Some(varroa) = &self.varroa {
            if varroa.site.trim().is_empty() || varroa.token.trim().is_empty() {
                return invalid("varroa.site and varroa.token are both required");
            }
            if varroa.port == 0 {
                return invalid("varroa.port must be non-zero");
            }
            if url::Url::parse(&varroa.tracker_url).is_err() {
                return invalid("varroa.tracker_url must be an absolute URL");
            }
            if varroa.api_key.trim().is_empty() {
                return invalid("varroa.api_key is required");
            }
        }
        Ok(())
    }

    /// Human-readable dump with secrets masked.
    pub fn redacted(&self) -> String {
        format!("{self:#?}")
    }
}

fn mask(secret: &Option<String>) -> &'static str {
    secret.as_deref().map_or("(unset)", mask_str)
}

fn mask_str(secret: &str) -> &'static str {
    if secret.is_empty() {
        "(unset)"
    } else {
        "[REDACTED]"
    }
}

impl fmt::Debug for BotConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BotConfig")
            .field("general", &self.general)
            .field("irc", &self.irc)
            .field("ingest", &self.ingest)
            .field("store", &self.store)
            .field("tracker", &self.tracker)
            .field("http", &self.http)
            .field("varroa", &self.varroa)
            .finish()
    }
}

impl fmt::Debug for GeneralConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GeneralConfig")
            .field("paste_url", &self.paste_url)
            .field("image_host_key", &mask(&self.image_host_key))
            .field("image_host_url", &self.image_host_url)
            .field("logs_dir", &self.logs_dir)
            .finish()
    }
}

impl fmt::Debug for IrcConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("IrcConfig")
            .field("server", &self.server)
            .field("port", &self.port)
            .field("tls", &self.tls)
            .field("nickname", &self.nickname)
            .field("username", &self.username())
            .field("realname", &self.realname)
            .field("nickserv_password", &mask(&self.nickserv_password))
            .field("key", &mask(&self.key))
            .field("gatekeeper", &self.gatekeeper)
            .field("channel", &self.channel)
            .field("role", &self.role)
            .field("central_bot", &self.central_bot)
            .field("settle_delay_ms", &self.settle_delay_ms)
            .finish()
    }
}

impl fmt::Debug for VarroaConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("VarroaConfig")
            .field("site", &self.site)
            .field("token", &mask_str(&self.token))
            .field("host", &self.host)
            .field("port", &self.port)
            .field("tracker_url", &self.tracker_url)
            .field("api_key", &mask_str(&self.api_key))
            .field("blacklisted_uploaders", &self.blacklisted_uploaders)
            .field("excluded_tags", &self.excluded_tags)
            .finish()
    }
}

/// Load, apply environment overrides, and validate a configuration file.
///
/// # Errors
///
/// Returns an error if the file cannot be read, parsed, or fails validation.
pub fn load_bot_config(path: &Path) -> Result<BotConfig, ConfigError> {
    let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    let mut config = BotConfig::from_toml(&contents, path)?;
    config.apply_env(|key| std::env::var(key).ok().filter(|v| !v.is_empty()));
    config.validate()?;
    Ok(config)
}

/// Resolve the configuration file: `./propolis-bot.toml` when present,
/// otherwise the platform config directory.
pub fn default_config_path() -> PathBuf {
    let local = PathBuf::from(CONFIG_FILE);
    if local.exists() {
        return local;
    }
    directories::ProjectDirs::from("", "", "propolis")
        .map(|dirs| dirs.config_dir().join(CONFIG_FILE))
        .unwrap_or(local)
}

/// Default daemon log directory.
pub fn default_logs_dir() -> PathBuf {
    directories::ProjectDirs::from("", "", "propolis")
        .map(|dirs| dirs.data_dir().join("logs"))
        .unwrap_or_else(|| PathBuf::from("logs"))
}

// Default value functions for serde.

fn default_image_host_url() -> String {
    "https://ptpimg.me/upload.php".to_owned()
}

fn default_irc_port() -> u16 {
    6697
}

fn default_true() -> bool {
    true
}

fn default_realname() -> String {
    "BUSY BEE BOT".to_owned()
}

fn default_channel() -> String {
    "#propolis-announce".to_owned()
}

fn default_central_bot() -> String {
    "bbb".to_owned()
}

fn default_settle_delay_ms() -> u64 {
    1000
}

fn default_bind() -> String {
    "0.0.0.0".to_owned()
}

fn default_ingest_port() -> u16 {
    8335
}

fn default_store_path() -> PathBuf {
    PathBuf::from("propolis.db")
}

fn default_ttl_days() -> u64 {
    7
}

fn default_permalink_base() -> String {
    "https://redacted.ch/torrents.php?torrentid=".to_owned()
}

fn default_timeout_secs() -> u64 {
    10
}

fn default_varroa_host() -> String {
    "localhost".to_owned()
}
