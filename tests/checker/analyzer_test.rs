//! ReleaseAnalyzer tests on real folders.

use std::fs;
use std::path::Path;

use propolis::analyzer::{AnalyzeOptions, Analyzer, AnalyzerError, ReleaseAnalyzer};
use propolis::check::Outcome;

fn touch(root: &Path, rel: &str, bytes: usize) {
    let path = root.join(rel);
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).expect("mkdir");
    }
    fs::write(path, vec![0u8; bytes]).expect("write");
}

fn no_specs() -> AnalyzeOptions {
    AnalyzeOptions {
        disable_specs: true,
        ..AnalyzeOptions::default()
    }
}

#[tokio::test]
async fn tracker_metadata_is_not_part_of_the_release() {
    let dir = tempfile::tempdir().expect("tempdir");
    let root = dir.path().join("Artist - Album (2020) [WEB FLAC]");
    touch(&root, "01.flac", 1000);
    touch(&root, "cover.jpg", 10);
    touch(&root, "TrackerMetadata/red_release.json", 10);
    touch(&root, "Metadata/spectrogram.png", 10);

    let run = ReleaseAnalyzer::new()
        .analyze(&root, &no_specs())
        .await
        .expect("analysis should succeed");

    assert!(!run.analysis.has_failures(), "{}", run.log);
    assert!(run.overview.is_none());
    assert!(run.log.ends_with("checks OK, 0 checks KO, and 0 warnings."));
}

#[tokio::test]
async fn missing_folder_is_an_error() {
    let dir = tempfile::tempdir().expect("tempdir");
    let err = ReleaseAnalyzer::new()
        .analyze(&dir.path().join("gone"), &no_specs())
        .await
        .expect_err("missing folder");
    assert!(matches!(err, AnalyzerError::Scan(_)));
}

#[tokio::test]
async fn spectrogram_failure_does_not_fail_the_run() {
    let dir = tempfile::tempdir().expect("tempdir");
    let root = dir.path().join("Album [WEB FLAC]");
    touch(&root, "01.flac", 1000);

    let run = ReleaseAnalyzer::new()
        .with_sox("false")
        .analyze(&root, &AnalyzeOptions::default())
        .await
        .expect("analysis should succeed");

    assert!(run.overview.is_none());
    assert!(dir.path().join("Album [WEB FLAC] (Metadata)").is_dir());
}

#[tokio::test]
async fn first_check_is_flac_presence() {
    let dir = tempfile::tempdir().expect("tempdir");
    touch(dir.path(), "readme.txt", 10);

    let run = ReleaseAnalyzer::new()
        .analyze(dir.path(), &no_specs())
        .await
        .expect("analysis should succeed");

    let first = &run.analysis.checks()[0];
    assert_eq!(first.rule(), "2.3.1");
    assert_eq!(first.outcome(), Outcome::Ko);
    assert_eq!(run.analysis.summary().ko, 1);
}

#[tokio::test]
async fn overview_and_track_spectrograms_are_generated() {
    let dir = tempfile::tempdir().expect("tempdir");
    let root = dir.path().join("Album [WEB FLAC]");
    touch(&root, "01.flac", 1000);
    touch(&root, "02.flac", 1000);

    let run = ReleaseAnalyzer::new()
        .with_sox("true")
        .analyze(&root, &AnalyzeOptions::default())
        .await
        .expect("analysis should succeed");

    let meta = dir.path().join("Album [WEB FLAC] (Metadata)");
    assert_eq!(run.overview, Some(meta.join("spectrograms overview.png")));
    assert_eq!(
        run.spectrograms,
        vec![
            meta.join("01.flac.spectrogram.png"),
            meta.join("02.flac.spectrogram.png"),
        ]
    );
}

#[tokio::test]
async fn overview_can_be_skipped() {
    let dir = tempfile::tempdir().expect("tempdir");
    let root = dir.path().join("Album [WEB FLAC]");
    touch(&root, "01.flac", 1000);

    let options = AnalyzeOptions {
        disable_overview: true,
        ..AnalyzeOptions::default()
    };
    let run = ReleaseAnalyzer::new()
        .with_sox("true")
        .analyze(&root, &options)
        .await
        .expect("analysis should succeed");

    assert!(run.overview.is_none());
    assert_eq!(run.spectrograms.len(), 1);
}
