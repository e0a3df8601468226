//! Tests for the dedup store.

use std::time::Duration;

use chrono::{TimeZone, Utc};
use propolis_bot::dedup::{DedupStore, DEFAULT_TTL};

async fn open_temp_store() -> (DedupStore, tempfile::TempDir) {
    let dir = tempfile::tempdir().expect("tempdir");
    let store = DedupStore::open(&dir.path().join("propolis.db"))
        .await
        .expect("open store");
    (store, dir)
}

#[tokio::test]
async fn unknown_key_is_not_seen() {
    let (store, _dir) = open_temp_store().await;
    assert!(!store.seen(b"Album2940820").await.expect("seen"));
}

#[tokio::test]
async fn remembered_key_is_seen_until_expiry() {
    let (store, _dir) = open_temp_store().await;
    let t0 = Utc.with_ymd_and_hms(2026, 3, 1, 12, 0, 0).single().expect("time");

    assert!(store.remember_at(b"k", DEFAULT_TTL, t0).await.expect("remember"));
    assert!(store.seen_at(b"k", t0).await.expect("seen"));

    let almost = t0 + chrono::Duration::days(7) - chrono::Duration::seconds(1);
    assert!(store.seen_at(b"k", almost).await.expect("seen"));

    let expired = t0 + chrono::Duration::days(7);
    assert!(!store.seen_at(b"k", expired).await.expect("seen"));
}

#[tokio::test]
async fn live_entry_keeps_first_expiry() {
    let (store, _dir) = open_temp_store().await;
    let t0 = Utc.with_ymd_and_hms(2026, 3, 1, 0, 0, 0).single().expect("time");
    let ttl = Duration::from_secs(60);

    assert!(store.remember_at(b"k", ttl, t0).await.expect("first"));
    let later = t0 + chrono::Duration::seconds(30);
    assert!(!store.remember_at(b"k", ttl, later).await.expect("second"));

    // Still expires 60s after the first write.
    let t_exp = t0 + chrono::Duration::seconds(60);
    assert!(!store.seen_at(b"k", t_exp).await.expect("seen"));
}

#[tokio::test]
async fn expired_entry_is_replaced() {
    let (store, _dir) = open_temp_store().await;
    let t0 = Utc.with_ymd_and_hms(2026, 3, 1, 0, 0, 0).single().expect("time");
    let ttl = Duration::from_secs(60);

    store.remember_at(b"k", ttl, t0).await.expect("first");
    let t1 = t0 + chrono::Duration::seconds(120);
    assert!(store.remember_at(b"k", ttl, t1).await.expect("replace"));
    assert!(store.seen_at(b"k", t1 + chrono::Duration::seconds(59)).await.expect("seen"));
}

#[tokio::test]
async fn purge_removes_only_expired_rows() {
    let (store, _dir) = open_temp_store().await;
    let t0 = Utc.with_ymd_and_hms(2026, 3, 1, 0, 0, 0).single().expect("time");

    store.remember_at(b"short", Duration::from_secs(10), t0).await.expect("short");
    store.remember_at(b"long", DEFAULT_TTL, t0).await.expect("long");

    let removed = store
        .purge_expired_at(t0 + chrono::Duration::minutes(1))
        .await
        .expect("purge");
    assert_eq!(removed, 1);
    assert!(store.seen_at(b"long", t0).await.expect("seen"));
}

#[tokio::test]
async fn entries_survive_reopen() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("nested").join("propolis.db");
    {
        let store = DedupStore::open(&path).await.expect("open");
        store.remember(b"k", DEFAULT_TTL).await.expect("remember");
        store.close().await;
    }
    let store = DedupStore::open(&path).await.expect("reopen");
    assert!(store.seen(b"k").await.expect("seen"));
}
