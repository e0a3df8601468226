//! CLI contract tests for the `propolis` binary.

use std::fs;
use std::path::Path;

use assert_cmd::Command;

fn touch(root: &Path, rel: &str, bytes: usize) {
    let path = root.join(rel);
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).expect("mkdir");
    }
    fs::write(path, vec![0u8; bytes]).expect("write");
}

fn propolis() -> Command {
    Command::cargo_bin("propolis").expect("binary should build")
}

#[test]
fn clean_release_exits_zero() {
    let dir = tempfile::tempdir().expect("tempdir");
    let root = dir.path().join("Artist - Album (2020) [WEB FLAC]");
    touch(&root, "01.flac", 1000);
    touch(&root, "cover.jpg", 10);

    let output = propolis()
        .arg("--no-specs")
        .arg(&root)
        .output()
        .expect("run propolis");

    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("0 checks KO"), "{stdout}");
    let log = dir
        .path()
        .join("Artist - Album (2020) [WEB FLAC] (Metadata)")
        .join(format!("propolis_{}.log", env!("CARGO_PKG_VERSION")));
    assert!(log.is_file());
}

#[test]
fn broken_rule_exits_one() {
    let dir = tempfile::tempdir().expect("tempdir");
    let root = dir.path().join("Album [WEB FLAC]");
    touch(&root, "01.flac", 1000);
    touch(&root, "virus.exe", 10);

    propolis()
        .args(["--no-specs", "--only-problems"])
        .arg(&root)
        .assert()
        .code(1);
}

#[test]
fn json_output_lists_every_check() {
    let dir = tempfile::tempdir().expect("tempdir");
    let root = dir.path().join("Album [WEB FLAC]");
    touch(&root, "01.flac", 1000);
    touch(&root, "cover.jpg", 10);

    let output = propolis()
        .args(["--no-specs", "--json", "--only-problems"])
        .arg(&root)
        .output()
        .expect("run propolis");

    let report: serde_json::Value =
        serde_json::from_slice(&output.stdout).expect("stdout should be JSON");
    let checks = report["checks"].as_array().expect("checks array");
    assert!(checks.iter().any(|c| c["result"] == "ok"));
    assert_eq!(report["errors"], 0);
}

#[test]
fn missing_path_fails() {
    let dir = tempfile::tempdir().expect("tempdir");
    propolis()
        .arg("--no-specs")
        .arg(dir.path().join("missing"))
        .assert()
        .failure();
}

#[test]
fn checks_are_printed_once() {
    let dir = tempfile::tempdir().expect("tempdir");
    let root = dir.path().join("Album [WEB FLAC]");
    touch(&root, "01.flac", 1000);
    touch(&root, "cover.jpg", 10);

    let output = propolis()
        .arg("--no-specs")
        .arg(&root)
        .output()
        .expect("run propolis");

    let stdout = String::from_utf8_lossy(&output.stdout);
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert_eq!(stdout.matches("| 2.3.1 ").count(), 1, "{stdout}");
    assert!(!stderr.contains("| 2.3.1 "), "{stderr}");
}

#[test]
fn snatched_conflicts_with_metadata_root() {
    let dir = tempfile::tempdir().expect("tempdir");
    let root = dir.path().join("Album [WEB FLAC]");
    touch(&root, "01.flac", 1000);

    propolis()
        .args(["--no-specs", "--snatched", "--metadata-root"])
        .arg(dir.path())
        .arg(&root)
        .assert()
        .failure();
}

#[test]
fn metadata_root_must_exist() {
    let dir = tempfile::tempdir().expect("tempdir");
    let root = dir.path().join("Album [WEB FLAC]");
    touch(&root, "01.flac", 1000);

    let output = propolis()
        .args(["--no-specs", "--metadata-root"])
        .arg(dir.path().join("nowhere"))
        .arg(&root)
        .output()
        .expect("run propolis");

    assert!(!output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("metadata root"), "{stderr}");
}
