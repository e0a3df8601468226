//! `!propolis <torrent>` support.
//!
//! Looks the torrent up on the Gazelle tracker API, refuses anything that
//! is not FLAC or that the configuration blacklists, then asks a local
//! varroa instance to snatch it. The downloaded release later comes back
//! through `POST /downloads` like any other.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::AUTHORIZATION;
use reqwest::StatusCode;
use serde::Deserialize;
use thiserror::Error;
use tracing::info;

use crate::config::VarroaConfig;

const FLAC_FORMAT: &str = "FLAC";
const VARROA_TIMEOUT: Duration = Duration::from_secs(10);

/// Reasons a snatch request is refused or fails.
#[derive(Debug, Error)]
pub enum SnatchError {
    /// The argument is neither an id nor a link carrying `torrentid`.
    #[error("invalid torrent ID")]
    InvalidTorrentId,
    /// The tracker could not be reached or answered garbage.
    #[error("tracker request failed: {0}")]
    Http(#[from] reqwest::Error),
    /// The tracker answered with a failure.
    #[error("tracker refused the request: {0}")]
    Tracker(String),
    /// Only FLAC torrents are checked.
    #[error("this torrent is not FLAC")]
    NotFlac,
    /// Uploader listed in `blacklisted_uploaders`.
    #[error("torrent uploader is blacklisted")]
    BlacklistedUploader,
    /// A tag listed in `excluded_tags`.
    #[error("torrent content is blacklisted")]
    ExcludedContent,
    /// varroa did not accept the order.
    #[error("varroa answered {0}")]
    Varroa(StatusCode),
}

/// Handles `!propolis` requests.
#[async_trait]
pub trait SnatchService: Send + Sync {
    /// Vet and snatch the torrent named by `request` on behalf of `nick`.
    /// Returns the channel reply.
    async fn snatch(&self, request: &str, nick: &str) -> Result<String, SnatchError>;
}

/// Torrent id from a bare number or a tracker link with `torrentid=`.
pub fn parse_torrent_id(raw: &str) -> Option<u64> {
    let raw = raw.trim();
    if let Ok(id) = raw.parse() {
        return Some(id);
    }
    let link = url::Url::parse(raw).ok()?;
    let id = link
        .query_pairs()
        .find(|(key, _)| key == "torrentid")
        .map(|(_, value)| value.into_owned())?;
    id.parse().ok()
}

/// Artist credit as shown in channel: one name, two joined with `&`,
/// otherwise "Various Artists".
pub fn smart_artist_list(artists: &[String]) -> String {
    match artists {
        [] => "Unknown Artist".to_owned(),
        [one] => one.clone(),
        [first, second] => format!("{first} & {second}"),
        _ => "Various Artists".to_owned(),
    }
}

#[derive(Debug, Deserialize)]
struct ApiEnvelope {
    status: String,
    #[serde(default)]
    error: Option<String>,
    #[serde(default)]
    response: Option<TorrentInfo>,
}

/// Subset of the tracker's `action=torrent` answer.
#[derive(Debug, Clone, Deserialize)]
pub struct TorrentInfo {
    /// Release group.
    pub group: TorrentGroup,
    /// The torrent itself.
    pub torrent: TorrentDetails,
}

/// Release group fields.
#[derive(Debug, Clone, Deserialize)]
pub struct TorrentGroup {
    /// Album title.
    pub name: String,
    /// Group tags.
    #[serde(default)]
    pub tags: Vec<String>,
    /// Credits.
    #[serde(rename = "musicInfo", default)]
    pub music_info: Option<MusicInfo>,
}

/// Credits of a release group.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct MusicInfo {
    /// Main artists.
    #[serde(default)]
    pub artists: Vec<Artist>,
}

/// One credited artist.
#[derive(Debug, Clone, Deserialize)]
pub struct Artist {
    /// Display name.
    pub name: String,
}

/// Torrent fields.
#[derive(Debug, Clone, Deserialize)]
pub struct TorrentDetails {
    /// Audio format, e.g. `FLAC`.
    pub format: String,
    /// Source media, e.g. `CD` or `WEB`.
    #[serde(default)]
    pub media: String,
    /// Edition year.
    #[serde(rename = "remasterYear", default)]
    pub remaster_year: i32,
    /// Uploader.
    #[serde(default)]
    pub username: String,
}

impl TorrentInfo {
    fn artists(&self) -> Vec<String> {
        self.group
            .music_info
            .as_ref()
            .map(|m| m.artists.iter().map(|a| a.name.clone()).collect())
            .unwrap_or_default()
    }
}

/// Refuse torrents propolis should not fetch.
///
/// # Errors
///
/// [`SnatchError::NotFlac`], [`SnatchError::BlacklistedUploader`] or
/// [`SnatchError::ExcludedContent`].
pub fn vet(info: &TorrentInfo, settings: &VarroaConfig) -> Result<(), SnatchError> {
    if info.torrent.format != FLAC_FORMAT {
        return Err(SnatchError::NotFlac);
    }
    if settings
        .blacklisted_uploaders
        .iter()
        .any(|u| *u == info.torrent.username)
    {
        return Err(SnatchError::BlacklistedUploader);
    }
    if info
        .group
        .tags
        .iter()
        .any(|tag| settings.excluded_tags.contains(tag))
    {
        return Err(SnatchError::ExcludedContent);
    }
    Ok(())
}

/// Tracker lookup plus varroa order over HTTP.
#[derive(Debug, Clone)]
pub struct VarroaSnatcher {
    client: reqwest::Client,
    settings: VarroaConfig,
}

impl VarroaSnatcher {
    /// Use `client` for both the tracker and varroa.
    pub fn new(client: reqwest::Client, settings: VarroaConfig) -> Self {
        Self { client, settings }
    }

    /// Fetch torrent details from the tracker API.
    ///
    /// # Errors
    ///
    /// Fails on transport errors or a non-success API answer.
    pub async fn torrent(&self, torrent_id: u64) -> Result<TorrentInfo, SnatchError> {
        let url = format!("{}/ajax.php", self.settings.tracker_url.trim_end_matches('/'));
        let id = torrent_id.to_string();
        let envelope: ApiEnvelope = self
            .client
            .get(&url)
            .header(AUTHORIZATION, &self.settings.api_key)
            .query(&[("action", "torrent"), ("id", id.as_str())])
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        if envelope.status == "success" {
            if let Some(info) = envelope.response {
                return Ok(info);
            }
        }
        Err(SnatchError::Tracker(envelope.error.unwrap_or(envelope.status)))
    }

    async fn order(&self, torrent_id: u64) -> Result<(), SnatchError> {
        let url = format!(
            "http://{}:{}/get/{torrent_id}",
            self.settings.host, self.settings.port
        );
        let id = torrent_id.to_string();
        let response = self
            .client
            .get(&url)
            .timeout(VARROA_TIMEOUT)
            .query(&[
                ("site", self.settings.site.as_str()),
                ("token", self.settings.token.as_str()),
                ("id", id.as_str()),
            ])
            .send()
            .await?;
        if response.status() != StatusCode::OK {
            return Err(SnatchError::Varroa(response.status()));
        }
        Ok(())
    }
}

#[async_trait]
impl SnatchService for VarroaSnatcher {
    async fn snatch(&self, request: &str, nick: &str) -> Result<String, SnatchError> {
        let torrent_id = parse_torrent_id(request).ok_or(SnatchError::InvalidTorrentId)?;
        let info = self.torrent(torrent_id).await?;
        vet(&info, &self.settings)?;
        self.order(torrent_id).await?;
        info!(torrent_id, nick = %nick, "torrent handed to varroa");

        Ok(format!(
            "-> {nick}! Snatching and analyzing torrent \u{2}\u{3}07{} ({}) {} [{}]\u{f} for you!",
            smart_artist_list(&info.artists()),
            info.torrent.remaster_year,
            info.group.name,
            info.torrent.media,
        ))
    }
}
