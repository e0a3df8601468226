//! Tests for `src/logging.rs`.

use propolis::logging::LoggingGuard;

#[test]
fn logging_guard_is_send() {
    fn assert_send<T: Send>() {}
    assert_send::<LoggingGuard>();
}

#[test]
fn init_production_creates_nested_logs_dir() {
    let tmp = tempfile::tempdir().expect("should create temp dir");
    let logs_dir = tmp.path().join("state").join("logs");
    assert!(!logs_dir.exists());

    // Only test in this binary that installs the global subscriber.
    let _guard = propolis::logging::init_production(&logs_dir, "propolis-bot.log")
        .expect("logging should initialise");
    assert!(logs_dir.is_dir());
}
