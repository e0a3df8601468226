//! `POST /downloads` tests with stubbed analysis and uploads.

mod common;

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use axum::body::Body;
use axum::http::{Request, StatusCode};
use tower::ServiceExt;

use common::{open_temp_store, settings, RecordingSender, CENTRAL, CHANNEL, ORIGIN};
use propolis::analysis::Analysis;
use propolis::analyzer::{AnalysisRun, AnalyzeOptions, Analyzer, AnalyzerError, ReleaseAnalyzer};
use propolis::check::{CheckEngine, Level};
use propolis::release::ScanError;
use propolis_bot::ingest::{build_router, IngestState};
use propolis_bot::relay::{Relay, RelayOutcome};
use propolis_bot::uploads::{PasteService, UploadError};

/// Produces one critical failure for any folder.
struct OneKoAnalyzer;

#[async_trait]
impl Analyzer for OneKoAnalyzer {
    async fn analyze(&self, path: &Path, _options: &AnalyzeOptions) -> Result<AnalysisRun, AnalyzerError> {
        let engine = CheckEngine::silent();
        let mut analysis = Analysis::new(path.to_string_lossy());
        analysis.append(engine.evaluate("2.3.1", Level::Critical, true, "FLAC files present", "No FLAC"));
        analysis.append(engine.evaluate("2.3.3", Level::Critical, false, "Flat", "Track folders detected"));
        let log = analysis.render(false);
        Ok(AnalysisRun {
            analysis,
            overview: None,
            spectrograms: Vec::new(),
            log,
        })
    }
}

struct FailingAnalyzer;

#[async_trait]
impl Analyzer for FailingAnalyzer {
    async fn analyze(&self, path: &Path, _options: &AnalyzeOptions) -> Result<AnalysisRun, AnalyzerError> {
        Err(ScanError::NotADirectory(path.to_path_buf()).into())
    }
}

struct StubPaste;

#[async_trait]
impl PasteService for StubPaste {
    async fn paste(&self, _text: &str) -> Result<String, UploadError> {
        Ok(format!("{ORIGIN}/?abc#def"))
    }
}

struct Harness {
    sender: Arc<RecordingSender>,
    state: Arc<IngestState>,
    _store_dir: tempfile::TempDir,
}

async fn central_harness(analyzer: Arc<dyn Analyzer>) -> Harness {
    let sender = RecordingSender::new(CENTRAL);
    let (store, store_dir) = open_temp_store().await;
    let relay = Arc::new(Relay::central(settings(), sender.clone(), store).expect("relay"));
    let state = IngestState::new(relay, analyzer, Arc::new(StubPaste), "https://tracker/t?id=");
    Harness {
        sender,
        state: Arc::new(state),
        _store_dir: store_dir,
    }
}

fn post(body: impl Into<Body>) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri("/downloads")
        .header("content-type", "application/json")
        .body(body.into())
        .expect("request")
}

fn path_body(path: &Path) -> String {
    serde_json::json!({ "Path": path.to_string_lossy() }).to_string()
}

async fn wait_for_lines(sender: &RecordingSender, count: usize) -> Vec<String> {
    tokio::time::timeout(Duration::from_secs(5), async {
        loop {
            let lines = sender.lines_to(CHANNEL);
            if lines.len() >= count {
                return lines;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
    })
    .await
    .expect("channel lines in time")
}

#[tokio::test]
async fn missing_path_is_not_found() {
    let h = central_harness(Arc::new(OneKoAnalyzer)).await;
    let response = build_router(h.state)
        .oneshot(post(r#"{"Path": "/definitely/not/here"}"#))
        .await
        .expect("response");
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn disconnected_transport_is_not_found() {
    let h = central_harness(Arc::new(OneKoAnalyzer)).await;
    let release = tempfile::tempdir().expect("tempdir");
    h.sender.set_connected(false);

    let response = build_router(h.state)
        .oneshot(post(path_body(release.path())))
        .await
        .expect("response");
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn invalid_json_is_bad_request() {
    let h = central_harness(Arc::new(OneKoAnalyzer)).await;
    let response = build_router(h.state)
        .oneshot(post("{not json"))
        .await
        .expect("response");
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn accepted_release_is_published_once() {
    let h = central_harness(Arc::new(OneKoAnalyzer)).await;
    let root = tempfile::tempdir().expect("tempdir");
    let release = root.path().join("Artist - Album (2020) [FLAC]");
    std::fs::create_dir(&release).expect("mkdir");

    let response = build_router(Arc::clone(&h.state))
        .oneshot(post(path_body(&release)))
        .await
        .expect("response");
    assert_eq!(response.status(), StatusCode::OK);

    let lines = wait_for_lines(&h.sender, 2).await;
    assert_eq!(lines.len(), 2);
    assert!(lines[0].contains("Artist - Album (2020) [FLAC]"));
    assert!(lines[0].contains("1 checks KO"));
    assert!(lines[0].contains(ORIGIN));
    assert!(lines[1].contains("2.3.3: Track folders detected"));
    assert!(lines.iter().all(|l| !l.contains("Error:")));

    assert_eq!(h.state.process(&release).await, RelayOutcome::Duplicate);
    assert_eq!(h.sender.lines_to(CHANNEL).len(), 2);
}

#[tokio::test]
async fn analyzer_failure_is_published_as_error() {
    let h = central_harness(Arc::new(FailingAnalyzer)).await;
    let release = tempfile::tempdir().expect("tempdir");

    assert_eq!(h.state.process(release.path()).await, RelayOutcome::Published);
    let lines = h.sender.lines_to(CHANNEL);
    assert_eq!(lines.len(), 1);
    assert!(lines[0].contains("Error: target path"));
}

#[tokio::test]
async fn node_forwards_record_to_central() {
    let sender = RecordingSender::new("node7");
    let relay = Arc::new(Relay::node(settings(), sender.clone()).expect("relay"));
    let state = IngestState::new(relay, Arc::new(OneKoAnalyzer), Arc::new(StubPaste), "https://tracker/t?id=");
    let release = tempfile::tempdir().expect("tempdir");

    assert_eq!(state.process(release.path()).await, RelayOutcome::Published);
    let records = sender.lines_to(CENTRAL);
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].split('|').count(), 5);
    assert!(records[0].ends_with("1 checks OK, 1 checks KO, and 0 warnings."));
}

#[tokio::test]
async fn file_names_with_line_breaks_cannot_inject_commands() {
    let sender = RecordingSender::new(CENTRAL);
    let (store, _store_dir) = open_temp_store().await;
    let relay = Arc::new(Relay::central(settings(), sender.clone(), store).expect("relay"));
    let state = IngestState::new(relay, Arc::new(ReleaseAnalyzer::new()), Arc::new(StubPaste), "https://tracker/t?id=")
        .with_options(AnalyzeOptions {
            disable_specs: true,
            snatched: true,
            quiet: true,
            ..AnalyzeOptions::default()
        });

    let root = tempfile::tempdir().expect("tempdir");
    let release = root.path().join("Artist - Album (2020) [FLAC]");
    std::fs::create_dir(&release).expect("mkdir");
    std::fs::write(release.join("01 - Intro.flac"), b"fLaC").expect("write flac");
    std::fs::write(release.join("a\nQUIT :owned.exe"), b"x").expect("write payload");

    assert_eq!(state.process(&release).await, RelayOutcome::Published);
    let log = sender.log();
    assert!(log.iter().any(|l| l.contains("QUIT :owned.exe")), "{log:?}");
    assert!(log.iter().all(|l| !l.contains(['\r', '\n'])), "{log:?}");
}
