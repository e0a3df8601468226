//! Propolis CLI entry point.
//!
//! Checks one release folder, prints the report, and exits non-zero when a
//! rule is broken.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::time::Duration;

use anyhow::{ensure, Context};
use clap::Parser;
use tracing::{info, warn};

use propolis::analyzer::{AnalyzeOptions, Analyzer, ReleaseAnalyzer};
use propolis::spectrogram::{check_external_binaries, REQUIRED_BINARIES};

/// Make sure files are in good shape before uploading.
#[derive(Parser)]
#[command(name = "propolis", version, about)]
struct Cli {
    /// Release folder to check.
    path: PathBuf,
    /// Only show problems (warnings and errors).
    #[arg(long)]
    only_problems: bool,
    /// Print the report as JSON. Implies showing every check.
    #[arg(long)]
    json: bool,
    /// Disable spectrogram generation.
    #[arg(long)]
    no_specs: bool,
    /// Disable the combined overview spectrogram.
    #[arg(long)]
    no_overview: bool,
    /// Snatched mode: tracker metadata is allowed, spectrograms go inside the release.
    #[arg(long)]
    snatched: bool,
    /// Save propolis metadata inside this folder. It must already exist.
    #[arg(long, value_name = "DIR", conflicts_with = "snatched")]
    metadata_root: Option<PathBuf>,
    /// Ask a running propolis-bot to relay this release (e.g. http://localhost:8335).
    #[arg(long, value_name = "URL")]
    notify: Option<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<ExitCode> {
    let cli = Cli::parse();
    propolis::logging::init_cli();

    let path = resolve_path(&cli.path)?;
    if let Some(root) = &cli.metadata_root {
        ensure!(
            root.is_dir(),
            "target metadata root path {} not found",
            root.display()
        );
    }
    if !cli.no_specs {
        check_external_binaries(REQUIRED_BINARIES)?;
    }

    let options = AnalyzeOptions {
        disable_specs: cli.no_specs,
        disable_overview: cli.no_overview,
        snatched: cli.snatched,
        problems_only: cli.only_problems && !cli.json,
        // The report is printed once, below.
        quiet: true,
        metadata_root: cli.metadata_root.clone(),
    };

    let run = ReleaseAnalyzer::new()
        .analyze(&path, &options)
        .await
        .with_context(|| format!("failed to check {}", path.display()))?;

    if cli.json {
        println!("{}", run.analysis.to_json());
    } else {
        print!("{}", run.analysis.render(options.problems_only));
        println!("{}", run.analysis.summary());
    }

    save_log(&options.metadata_dir(&path), &run.log).await;

    if let Some(url) = &cli.notify {
        if let Err(e) = notify_bot(url, &path).await {
            warn!(error = %e, url = %url, "failed to notify propolis-bot");
        }
    }

    if run.analysis.has_failures() {
        return Ok(ExitCode::FAILURE);
    }
    Ok(ExitCode::SUCCESS)
}

/// Canonicalise the target, so `.` still yields the release folder name.
fn resolve_path(path: &Path) -> anyhow::Result<PathBuf> {
    ensure!(path.is_dir(), "target path {} not found", path.display());
    path.canonicalize()
        .with_context(|| format!("failed to resolve {}", path.display()))
}

/// Write the full report next to the spectrograms. Failures only warn.
async fn save_log(metadata_dir: &Path, log: &str) {
    let file = metadata_dir.join(format!("propolis_{}.log", env!("CARGO_PKG_VERSION")));
    let result = async {
        tokio::fs::create_dir_all(metadata_dir).await?;
        tokio::fs::write(&file, log).await
    }
    .await;
    match result {
        Ok(()) => info!(file = %file.display(), "log saved"),
        Err(e) => warn!(error = %e, file = %file.display(), "failed to save log"),
    }
}

/// POST the release path to a propolis-bot ingestion endpoint.
async fn notify_bot(base_url: &str, path: &Path) -> anyhow::Result<()> {
    let client = reqwest::Client::builder()
        .connect_timeout(Duration::from_secs(5))
        .timeout(Duration::from_secs(10))
        .build()
        .context("failed to build HTTP client")?;
    let url = format!("{}/downloads", base_url.trim_end_matches('/'));
    let response = client
        .post(&url)
        .json(&serde_json::json!({ "Path": path.to_string_lossy() }))
        .send()
        .await
        .with_context(|| format!("request to {url} failed"))?;
    ensure!(
        response.status().is_success(),
        "propolis-bot answered {}",
        response.status()
    );
    info!(url = %url, "release handed to propolis-bot");
    Ok(())
}
