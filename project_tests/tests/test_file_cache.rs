//! # File Cache Integration Tests
//!
//! The directory backend under a real engine: entries survive a restart,
//! a schema bump makes them unreachable and a byte budget evicts the oldest.

mod common;

use std::sync::Arc;

use lib_gwsync::cache::{cache_key, CacheBackend, CacheEntry, CacheStore, FileBackend, KEY_PREFIX};
use lib_gwsync::core::SyncEngine;
use lib_gwsync::model::PeriodOrigin;

use common::{period_result, ScriptedSource};

fn upstream() -> Arc<ScriptedSource> {
    let source = ScriptedSource::new();
    source.set_manifest(&[(1, "a1"), (2, "b2"), (3, "c3")]);
    source.set_period(3, &[("Ann", 10.0), ("Bob", 8.0)]);
    source.set_history(1, &[("Ann", 50.0), ("Bob", 40.0)]);
    source.set_history(2, &[("Bob", 60.0), ("Ann", 30.0)]);
    source
}

#[tokio::test]
async fn entries_survive_a_restart() {
    let dir = tempfile::tempdir().unwrap();
    let source = upstream();

    let backend = Arc::new(FileBackend::open(dir.path(), 0).await.unwrap());
    let engine = SyncEngine::new(source.clone(), CacheStore::new(backend, 1));
    engine.run_cycle().await.unwrap().finish().await;
    assert_eq!(source.calls.history(), 1);
    drop(engine);

    let backend = Arc::new(FileBackend::open(dir.path(), 0).await.unwrap());
    let mut keys = backend.keys(KEY_PREFIX).await.unwrap();
    keys.sort();
    assert_eq!(keys, vec![cache_key(1, 1), cache_key(1, 2)]);

    let engine = SyncEngine::new(source.clone(), CacheStore::new(backend, 1));
    engine.run_cycle().await.unwrap().finish().await;
    assert_eq!(source.calls.history(), 1, "restart is served from disk");

    let snap = engine.snapshot();
    assert_eq!(snap.period(1).unwrap().origin, PeriodOrigin::Cache);
    assert_eq!(snap.period(2).unwrap().participants[0].manager_name, "Bob");
    assert_eq!(snap.standings[0].manager_name, "Bob");
    assert_eq!(snap.standings[0].total_points, 108.0);
}

#[tokio::test]
async fn schema_bump_invalidates_everything() {
    let dir = tempfile::tempdir().unwrap();
    let source = upstream();

    let backend = Arc::new(FileBackend::open(dir.path(), 0).await.unwrap());
    let engine = SyncEngine::new(source.clone(), CacheStore::new(backend.clone(), 1));
    engine.run_cycle().await.unwrap().finish().await;

    let engine = SyncEngine::new(source.clone(), CacheStore::new(backend.clone(), 2));
    engine.run_cycle().await.unwrap().finish().await;
    assert_eq!(source.calls.history(), 2);
    assert_eq!(
        source.history_requests.lock().unwrap().last().cloned(),
        Some(vec![1, 2])
    );
    assert!(backend.get(&cache_key(2, 1)).await.unwrap().is_some());
}

#[tokio::test]
async fn corrupt_file_is_a_miss_and_gets_replaced() {
    let dir = tempfile::tempdir().unwrap();
    let source = upstream();
    let backend = Arc::new(FileBackend::open(dir.path(), 0).await.unwrap());
    backend.put(&cache_key(1, 1), b"{not json").await.unwrap();

    let store = CacheStore::new(backend.clone(), 1);
    let engine = SyncEngine::new(source.clone(), store.clone());
    engine.run_cycle().await.unwrap().finish().await;

    assert_eq!(*source.history_requests.lock().unwrap(), vec![vec![1, 2]]);
    let entry = store.get(1, "a1").await.unwrap();
    assert_eq!(entry.participants.len(), 2);
}

#[tokio::test]
async fn full_directory_evicts_oldest_entry() {
    let dir = tempfile::tempdir().unwrap();
    let one = CacheEntry::new(&period_result(1, &[("Ann", 1.0)]), "h1", 1);
    let size = serde_json::to_vec(&one).unwrap().len() as u64;

    // room for two entries of this size, not three
    let backend = Arc::new(FileBackend::open(dir.path(), size * 2 + size / 2).await.unwrap());
    let store = CacheStore::new(backend.clone(), 1);

    assert!(store.set(&one).await);
    tokio::time::sleep(std::time::Duration::from_millis(5)).await;
    let two = CacheEntry::new(&period_result(2, &[("Ann", 1.0)]), "h2", 1);
    assert!(store.set(&two).await);
    tokio::time::sleep(std::time::Duration::from_millis(5)).await;
    let three = CacheEntry::new(&period_result(3, &[("Ann", 1.0)]), "h3", 1);
    assert!(store.set(&three).await);

    assert!(store.get(1, "h1").await.is_none());
    assert!(store.get(2, "h2").await.is_some());
    assert!(store.get(3, "h3").await.is_some());
}
