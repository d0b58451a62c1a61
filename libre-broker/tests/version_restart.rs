//! Version guard over a file-backed store, across simulated restarts.

use std::sync::Arc;

use libre_broker::{FileStateStore, VersionCheck, VersionGuard};
use libre_core::{StateStore, VERSION_KEY};
use libre_test_utils::StaticVersionSource;
use tempfile::TempDir;

fn boot(path: &std::path::Path, source: &StaticVersionSource) -> (VersionGuard, Arc<FileStateStore>) {
    let store = Arc::new(FileStateStore::new(path));
    let guard = VersionGuard::new(Arc::new(source.clone()), store.clone(), VERSION_KEY);
    (guard, store)
}

#[tokio::test]
async fn test_state_survives_until_upstream_changes() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("libre-ultra-state.json");
    let source = StaticVersionSource::new("c0ffee");

    let (guard, store) = boot(&path, &source);
    assert!(matches!(guard.check().await, VersionCheck::FirstSeen { .. }));
    store.set("player_volume", "0.8").unwrap();

    // Restart with the same upstream.
    let (guard, store) = boot(&path, &source);
    assert!(matches!(guard.check().await, VersionCheck::Unchanged { .. }));
    assert_eq!(store.get("player_volume").unwrap().as_deref(), Some("0.8"));

    // Restart after an upstream push.
    source.set_version("decaf0");
    let (guard, store) = boot(&path, &source);
    assert_eq!(
        guard.check().await,
        VersionCheck::Updated {
            previous: "c0ffee".to_string(),
            version: "decaf0".to_string(),
        }
    );
    assert_eq!(store.get("player_volume").unwrap(), None);
    assert_eq!(store.get(VERSION_KEY).unwrap().as_deref(), Some("decaf0"));
}

#[tokio::test]
async fn test_offline_boot_keeps_state() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("state.json");
    let source = StaticVersionSource::new("c0ffee");

    let (guard, store) = boot(&path, &source);
    guard.check().await;
    store.set("player_volume", "0.8").unwrap();

    source.set_error("network unreachable");
    let (guard, store) = boot(&path, &source);
    assert_eq!(guard.check().await, VersionCheck::Unavailable);
    assert_eq!(store.get("player_volume").unwrap().as_deref(), Some("0.8"));
    assert_eq!(source.call_count(), 2);
}
