//! Tracker permalink lookup from the metadata sidecar a download client
//! leaves in `TrackerMetadata/`.

use std::path::{Path, PathBuf};

use serde::Deserialize;
use thiserror::Error;
use tracing::warn;

/// Shown instead of a permalink when the sidecar is missing or unreadable.
pub const PLACEHOLDER: &str = "JSON metadata not found";

/// Folder holding tracker sidecars inside a release.
pub const METADATA_DIR: &str = "TrackerMetadata";

/// Sidecar names, in lookup order.
pub const SIDECAR_FILES: &[&str] = &["red_release.json", "red - Release.json"];

/// Sidecar lookup failures.
#[derive(Debug, Error)]
pub enum PermalinkError {
    /// No sidecar in the release.
    #[error("no tracker metadata in {0}")]
    NotFound(PathBuf),
    /// The sidecar could not be read.
    #[error("failed to read {path}: {source}")]
    Read {
        /// Sidecar path.
        path: PathBuf,
        /// Underlying error.
        source: std::io::Error,
    },
    /// The sidecar is not a torrent description.
    #[error("failed to parse {path}: {source}")]
    Parse {
        /// Sidecar path.
        path: PathBuf,
        /// Underlying error.
        source: serde_json::Error,
    },
}

#[derive(Debug, Deserialize)]
struct TorrentSidecar {
    #[serde(alias = "Torrent")]
    torrent: TorrentInfo,
}

#[derive(Debug, Deserialize)]
struct TorrentInfo {
    #[serde(alias = "ID", alias = "Id")]
    id: u64,
}

/// Resolved permalink for a release.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Permalink {
    /// Tracker torrent id, when known.
    pub torrent_id: Option<u64>,
    /// Link, or [`PLACEHOLDER`].
    pub url: String,
}

impl Permalink {
    /// Permalink for an unknown release.
    pub fn placeholder() -> Self {
        Self {
            torrent_id: None,
            url: PLACEHOLDER.to_owned(),
        }
    }

    /// Token identifying the release on the wire: the torrent id, or the
    /// placeholder text.
    pub fn token(&self) -> String {
        self.torrent_id
            .map_or_else(|| PLACEHOLDER.to_owned(), |id| id.to_string())
    }
}

/// Read the torrent id from the first sidecar found in `release`.
///
/// # Errors
///
/// Returns [`PermalinkError`] when no sidecar exists or it cannot be parsed.
pub async fn read_torrent_id(release: &Path) -> Result<u64, PermalinkError> {
    let dir = release.join(METADATA_DIR);
    let mut sidecar = None;
    for name in SIDECAR_FILES {
        let candidate = dir.join(name);
        if tokio::fs::metadata(&candidate).await.is_ok_and(|m| m.is_file()) {
            sidecar = Some(candidate);
            break;
        }
    }
    let path = sidecar.ok_or_else(|| PermalinkError::NotFound(release.to_path_buf()))?;

    let data = tokio::fs::read(&path)
        .await
        .map_err(|source| PermalinkError::Read {
            path: path.clone(),
            source,
        })?;
    let parsed: TorrentSidecar =
        serde_json::from_slice(&data).map_err(|source| PermalinkError::Parse { path, source })?;
    Ok(parsed.torrent.id)
}

/// Best-effort permalink: degrades to [`Permalink::placeholder`] on any error.
pub async fn resolve(release: &Path, base: &str) -> Permalink {
    match read_torrent_id(release).await {
        Ok(id) => Permalink {
            torrent_id: Some(id),
            url: format!("{base}{id}"),
        },
        Err(PermalinkError::NotFound(_)) => Permalink::placeholder(),
        Err(e) => {
            warn!(error = %e, "unusable tracker metadata");
            Permalink::placeholder()
        }
    }
}
