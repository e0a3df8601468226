//! Running a full check of one release folder.
//!
//! [`Analyzer`] is the seam the relay daemon depends on; [`ReleaseAnalyzer`]
//! is the implementation backed by [`crate::rules`] and `sox`.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tracing::{info, warn};

use crate::analysis::Analysis;
use crate::check::CheckEngine;
use crate::release::{ReleaseDir, ScanError};
use crate::rules;
use crate::spectrogram::SpectrogramGenerator;

/// Folders that belong to the download tooling, not to the release.
pub const IGNORED_DIRS: &[&str] = &["TrackerMetadata", "Metadata"];

/// Per-run switches.
#[derive(Debug, Clone, Default)]
pub struct AnalyzeOptions {
    /// Skip spectrogram generation.
    pub disable_specs: bool,
    /// Skip the combined overview, keep per-track spectrograms.
    pub disable_overview: bool,
    /// The release was downloaded by a client that keeps metadata inside it.
    pub snatched: bool,
    /// Only log warnings and KO checks while evaluating.
    pub problems_only: bool,
    /// Do not log checks while evaluating. For callers that print the
    /// rendered report themselves.
    pub quiet: bool,
    /// Parent folder for metadata output instead of a sibling folder.
    pub metadata_root: Option<PathBuf>,
}

impl AnalyzeOptions {
    /// Where spectrograms and logs for `release` are written.
    ///
    /// Defaults to `"<release> (Metadata)"` next to the release, or
    /// `<release>/Metadata` for snatched releases.
    pub fn metadata_dir(&self, release: &Path) -> PathBuf {
        if let Some(root) = &self.metadata_root {
            let name = release
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default();
            return root.join(format!("{name} (Metadata)"));
        }
        if self.snatched {
            return release.join("Metadata");
        }
        PathBuf::from(format!("{} (Metadata)", release.display()))
    }
}

/// Result of a completed run.
#[derive(Debug, Clone)]
pub struct AnalysisRun {
    /// Every evaluated check.
    pub analysis: Analysis,
    /// Overview spectrogram, when one was generated.
    pub overview: Option<PathBuf>,
    /// Full spectrogram of each track, in track order.
    pub spectrograms: Vec<PathBuf>,
    /// Full human-readable report.
    pub log: String,
}

/// Failures that prevent a release from being checked at all.
#[derive(Debug, thiserror::Error)]
pub enum AnalyzerError {
    /// The folder could not be scanned.
    #[error(transparent)]
    Scan(#[from] ScanError),
    /// The blocking scan task panicked or was cancelled.
    #[error("analysis task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}

/// Checks a release folder.
#[async_trait]
pub trait Analyzer: Send + Sync {
    /// Run every check on `path`.
    async fn analyze(
        &self,
        path: &Path,
        options: &AnalyzeOptions,
    ) -> Result<AnalysisRun, AnalyzerError>;
}

/// Default analyzer: filesystem rules plus an optional overview spectrogram.
#[derive(Debug, Clone, Default)]
pub struct ReleaseAnalyzer {
    sox_binary: Option<String>,
}

impl ReleaseAnalyzer {
    /// Analyzer calling `sox` from `PATH`.
    pub fn new() -> Self {
        Self::default()
    }

    /// Analyzer calling a specific `sox` executable.
    #[must_use]
    pub fn with_sox(mut self, binary: impl Into<String>) -> Self {
        self.sox_binary = Some(binary.into());
        self
    }
}

#[async_trait]
impl Analyzer for ReleaseAnalyzer {
    async fn analyze(
        &self,
        path: &Path,
        options: &AnalyzeOptions,
    ) -> Result<AnalysisRun, AnalyzerError> {
        let root = path.to_path_buf();
        let engine = if options.quiet {
            CheckEngine::silent()
        } else {
            CheckEngine::with_tracing(options.problems_only)
        };

        let (release, analysis) = tokio::task::spawn_blocking(move || {
            let release = ReleaseDir::scan(&root, IGNORED_DIRS)?;
            let mut analysis = Analysis::new(root.to_string_lossy());
            rules::check_release(&engine, &release, &mut analysis);
            Ok::<_, ScanError>((release, analysis))
        })
        .await??;

        let mut overview = None;
        let mut spectrograms = Vec::new();
        if !options.disable_specs && !release.flacs().is_empty() {
            let mut generator = SpectrogramGenerator::new(options.metadata_dir(path));
            if let Some(binary) = &self.sox_binary {
                generator = generator.with_binary(binary.clone());
            }
            let combined = async {
                if options.disable_overview {
                    return None;
                }
                Some(generator.overview(&release).await)
            };
            let (combined, tracks) = tokio::join!(combined, generator.per_track(&release));

            match combined {
                Some(Ok(image)) => overview = Some(image),
                Some(Err(e)) => warn!(error = %e, "overview spectrogram failed"),
                None => {}
            }
            match tracks {
                Ok(images) => spectrograms = images,
                Err(e) => warn!(error = %e, "track spectrograms failed"),
            }
            if overview.is_some() || !spectrograms.is_empty() {
                info!(
                    dir = %generator.metadata_dir().display(),
                    "spectrograms generated, check for transcodes (see wiki#408)"
                );
            }
        }

        let log = format!("{}\n{}", analysis.render(false), analysis.summary());
        Ok(AnalysisRun {
            analysis,
            overview,
            spectrograms,
            log,
        })
    }
}
