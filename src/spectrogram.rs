//! Spectrogram generation through the external `sox` binary.

use std::path::{Path, PathBuf};
use std::process::Stdio;

use tokio::process::Command;
use tracing::debug;

use crate::release::ReleaseDir;

/// External binaries the checker shells out to.
pub const REQUIRED_BINARIES: &[&str] = &["sox"];

/// File name of the combined spectrogram inside the metadata folder.
pub const OVERVIEW_FILE: &str = "spectrograms overview.png";

/// Errors from spectrogram generation.
#[derive(Debug, thiserror::Error)]
pub enum SpectrogramError {
    /// A required binary is not on `PATH`.
    #[error("{0} is not available on this system")]
    MissingBinary(String),
    /// No FLAC track to draw.
    #[error("release has no FLAC tracks")]
    NoTracks,
    /// The metadata folder could not be created.
    #[error("could not create {path}: {source}")]
    MetadataDir {
        /// Folder that failed.
        path: PathBuf,
        /// Underlying error.
        source: std::io::Error,
    },
    /// `sox` could not be started.
    #[error("failed to spawn sox: {0}")]
    Spawn(#[source] std::io::Error),
    /// `sox` exited with a failure status.
    #[error("sox failed on {target}: {stderr}")]
    Sox {
        /// Image being generated.
        target: String,
        /// Trimmed standard error.
        stderr: String,
    },
}

/// Check that every binary in `binaries` can be found on `PATH`.
///
/// # Errors
///
/// Returns [`SpectrogramError::MissingBinary`] for the first one missing.
pub fn check_external_binaries(binaries: &[&str]) -> Result<(), SpectrogramError> {
    let path_var = std::env::var_os("PATH").unwrap_or_default();
    for binary in binaries {
        let found = std::env::split_paths(&path_var).any(|dir| dir.join(binary).is_file());
        if !found {
            return Err(SpectrogramError::MissingBinary((*binary).to_owned()));
        }
    }
    Ok(())
}

/// Draws spectrograms of a release into its metadata folder.
#[derive(Debug, Clone)]
pub struct SpectrogramGenerator {
    metadata_dir: PathBuf,
    binary: String,
}

impl SpectrogramGenerator {
    /// Write images into `metadata_dir`, calling `sox` from `PATH`.
    pub fn new(metadata_dir: impl Into<PathBuf>) -> Self {
        Self {
            metadata_dir: metadata_dir.into(),
            binary: "sox".to_owned(),
        }
    }

    /// Use a different `sox` executable.
    #[must_use]
    pub fn with_binary(mut self, binary: impl Into<String>) -> Self {
        self.binary = binary.into();
        self
    }

    /// Folder the images are written to.
    pub fn metadata_dir(&self) -> &Path {
        &self.metadata_dir
    }

    /// One spectrogram of all tracks played back to back, used as the
    /// release overview. Returns the image path.
    ///
    /// # Errors
    ///
    /// Fails when the release has no tracks or `sox` fails.
    pub async fn overview(&self, release: &ReleaseDir) -> Result<PathBuf, SpectrogramError> {
        let tracks: Vec<PathBuf> = release
            .flacs()
            .iter()
            .map(|f| release.root().join(&f.relative))
            .collect();
        if tracks.is_empty() {
            return Err(SpectrogramError::NoTracks);
        }
        self.ensure_dir().await?;

        let output = self.metadata_dir.join(OVERVIEW_FILE);
        let mut args: Vec<String> = tracks
            .iter()
            .map(|t| t.to_string_lossy().into_owned())
            .collect();
        args.extend(spectrogram_args(&release.folder_name(), &output, 2000));
        self.run_sox(&args, &output).await?;
        Ok(output)
    }

    /// One full spectrogram per track. Returns the image paths in track order.
    ///
    /// # Errors
    ///
    /// Stops at the first `sox` failure.
    pub async fn per_track(&self, release: &ReleaseDir) -> Result<Vec<PathBuf>, SpectrogramError> {
        self.ensure_dir().await?;
        let mut images = Vec::new();
        for track in release.flacs() {
            let output = self
                .metadata_dir
                .join(format!("{}.spectrogram.png", track.file_name()));
            let mut args = vec![release
                .root()
                .join(&track.relative)
                .to_string_lossy()
                .into_owned()];
            args.extend(spectrogram_args(&track.file_name(), &output, 3000));
            self.run_sox(&args, &output).await?;
            images.push(output);
        }
        Ok(images)
    }

    async fn ensure_dir(&self) -> Result<(), SpectrogramError> {
        tokio::fs::create_dir_all(&self.metadata_dir)
            .await
            .map_err(|source| SpectrogramError::MetadataDir {
                path: self.metadata_dir.clone(),
                source,
            })
    }

    async fn run_sox(&self, args: &[String], output: &Path) -> Result<(), SpectrogramError> {
        debug!(binary = %self.binary, output = %output.display(), "running sox");
        let result = Command::new(&self.binary)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .output()
            .await
            .map_err(SpectrogramError::Spawn)?;
        if result.status.success() {
            return Ok(());
        }
        Err(SpectrogramError::Sox {
            target: output.display().to_string(),
            stderr: String::from_utf8_lossy(&result.stderr).trim().to_owned(),
        })
    }
}

fn spectrogram_args(title: &str, output: &Path, width: u32) -> Vec<String> {
    vec![
        "-n".to_owned(),
        "remix".to_owned(),
        "1".to_owned(),
        "spectrogram".to_owned(),
        "-x".to_owned(),
        width.to_string(),
        "-y".to_owned(),
        "513".to_owned(),
        "-z".to_owned(),
        "120".to_owned(),
        "-w".to_owned(),
        "Kaiser".to_owned(),
        "-t".to_owned(),
        title.to_owned(),
        "-o".to_owned(),
        output.to_string_lossy().into_owned(),
    ]
}
