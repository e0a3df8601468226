//! `POST /downloads` ingestion endpoint.
//!
//! A download client posts `{"Path": "<release folder>"}` once a release is
//! complete. The request is answered right away; the analysis, uploads and
//! relay run in a background task.

use std::future::Future;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::post;
use axum::{Json, Router};
use serde::Deserialize;
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

use propolis::analyzer::{AnalyzeOptions, Analyzer};

use crate::permalink;
use crate::relay::{Relay, RelayOutcome, Report};
use crate::uploads::{ImageHost, PasteService};

/// Body of `POST /downloads`.
#[derive(Debug, Clone, Deserialize)]
pub struct DownloadRequest {
    /// Absolute path of the downloaded release.
    #[serde(rename = "Path")]
    pub path: String,
}

/// Dependencies of the ingestion handler.
pub struct IngestState {
    relay: Arc<Relay>,
    analyzer: Arc<dyn Analyzer>,
    paste: Arc<dyn PasteService>,
    image_host: Option<Arc<dyn ImageHost>>,
    permalink_base: String,
    options: AnalyzeOptions,
}

impl IngestState {
    /// Wire the handler to its collaborators.
    pub fn new(
        relay: Arc<Relay>,
        analyzer: Arc<dyn Analyzer>,
        paste: Arc<dyn PasteService>,
        permalink_base: impl Into<String>,
    ) -> Self {
        Self {
            relay,
            analyzer,
            paste,
            image_host: None,
            permalink_base: permalink_base.into(),
            options: AnalyzeOptions {
                snatched: true,
                ..AnalyzeOptions::default()
            },
        }
    }

    /// Upload overview spectrograms to `host`.
    #[must_use]
    pub fn with_image_host(mut self, host: Arc<dyn ImageHost>) -> Self {
        self.image_host = Some(host);
        self
    }

    /// Override the analysis switches.
    #[must_use]
    pub fn with_options(mut self, options: AnalyzeOptions) -> Self {
        self.options = options;
        self
    }

    /// Analyze `path` and relay the outcome. Every collaborator failure
    /// degrades the report instead of aborting it.
    pub async fn process(&self, path: &Path) -> RelayOutcome {
        let release = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.display().to_string());

        let report = match self.analyzer.analyze(path, &self.options).await {
            Err(e) => {
                warn!(error = %e, path = %path.display(), "analysis failed");
                Report::Failure {
                    release,
                    message: e.to_string(),
                }
            }
            Ok(run) => {
                let image_url = match (&self.image_host, &run.overview) {
                    (Some(host), Some(overview)) => host.upload(overview).await.unwrap_or_else(|e| {
                        warn!(error = %e, "overview upload failed");
                        String::new()
                    }),
                    _ => String::new(),
                };

                let link = permalink::resolve(path, &self.permalink_base).await;

                let paste_url = self.paste.paste(&run.log).await.unwrap_or_else(|e| {
                    warn!(error = %e, "log paste failed");
                    String::new()
                });

                if run.analysis.has_failures() {
                    info!(path = %path.display(), "problems found");
                }

                Report::Analysis {
                    release,
                    snatch_id: link.token(),
                    permalink: link.url,
                    image_url,
                    paste_url,
                    summary: run.analysis.summary().to_string(),
                    details: run
                        .analysis
                        .failing_checks()
                        .map(|c| format!("{}: {}", c.rule(), c.comment()))
                        .collect(),
                }
            }
        };

        self.relay.publish_report(&report).await
    }
}

/// Routes of the ingestion server.
pub fn build_router(state: Arc<IngestState>) -> Router {
    Router::new()
        .route("/downloads", post(submit))
        .with_state(state)
        .layer(TraceLayer::new_for_http())
}

/// Serve the ingestion routes on `listener` until `shutdown` resolves.
///
/// # Errors
///
/// Returns an error if the server fails while accepting connections.
pub async fn serve<F>(listener: TcpListener, state: Arc<IngestState>, shutdown: F) -> std::io::Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    if let Ok(addr) = listener.local_addr() {
        info!(%addr, "ingestion server listening");
    }
    axum::serve(listener, build_router(state))
        .with_graceful_shutdown(shutdown)
        .await
}

async fn submit(
    State(state): State<Arc<IngestState>>,
    Json(request): Json<DownloadRequest>,
) -> StatusCode {
    let path = PathBuf::from(&request.path);
    if !path.is_dir() {
        info!(path = %request.path, "path not found");
        return StatusCode::NOT_FOUND;
    }
    if !state.relay.is_connected() {
        info!(path = %request.path, "not connected to IRC, not running propolis");
        return StatusCode::NOT_FOUND;
    }

    tokio::spawn(async move {
        let outcome = state.process(&path).await;
        info!(path = %path.display(), outcome = ?outcome, "release relayed");
    });
    StatusCode::OK
}
