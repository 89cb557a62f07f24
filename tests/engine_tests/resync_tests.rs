//! Tests for resync between writer instances
//!
//! These tests verify:
//! - Two instances over one raw store converge after a resync
//! - Callbacks fire once per change and not for unchanged data
//! - Removals and compactions by another instance are picked up
//! - The background watcher polls on its own

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use chunkstore::{Config, InMemoryRawStore, StorageRoot, TransactionStore};

// =============================================================================
// Helper Functions
// =============================================================================

fn manual_config() -> Config {
    Config::builder()
        .name("resync")
        .write_delay_ms(60_000)
        .resync_interval_ms(0)
        .build()
}

/// Open an instance with its own root, as a separate process would
async fn open_instance(raw: &Arc<InMemoryRawStore>, config: Config) -> TransactionStore {
    StorageRoot::new()
        .open_store(raw.clone(), config)
        .await
        .unwrap()
}

fn counting_callback(store: &TransactionStore) -> Arc<AtomicUsize> {
    let count = Arc::new(AtomicUsize::new(0));
    let seen = Arc::clone(&count);
    store.watch_resync(move || {
        seen.fetch_add(1, Ordering::SeqCst);
    });
    count
}

// =============================================================================
// Convergence Tests
// =============================================================================

#[tokio::test]
async fn test_two_instances_see_each_others_writes() {
    let raw = Arc::new(InMemoryRawStore::new());
    let a = open_instance(&raw, manual_config()).await;
    let b = open_instance(&raw, manual_config()).await;
    let a_fired = counting_callback(&a);
    let b_fired = counting_callback(&b);

    a.set("from_a", "1");
    b.set("from_b", "2");
    a.flush().await.unwrap();
    b.flush().await.unwrap();

    assert!(a.resync().await.unwrap());
    assert!(b.resync().await.unwrap());

    for store in [&a, &b] {
        assert_eq!(store.get("from_a"), Some(Bytes::from_static(b"1")));
        assert_eq!(store.get("from_b"), Some(Bytes::from_static(b"2")));
    }
    assert_eq!(a_fired.load(Ordering::SeqCst), 1);
    assert_eq!(b_fired.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_resync_without_changes_is_quiet() {
    let raw = Arc::new(InMemoryRawStore::new());
    let store = open_instance(&raw, manual_config()).await;
    let fired = counting_callback(&store);

    store.set("k", "v");
    store.flush().await.unwrap();

    assert!(!store.resync().await.unwrap());
    assert!(!store.resync().await.unwrap());
    assert_eq!(fired.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_identical_rewrite_does_not_fire() {
    let raw = Arc::new(InMemoryRawStore::new());
    let a = open_instance(&raw, manual_config()).await;
    let b = open_instance(&raw, manual_config()).await;
    let fired = counting_callback(&a);

    a.set("k", "same");
    a.flush().await.unwrap();
    assert!(b.resync().await.unwrap());

    // Files change, visible bytes do not
    b.set("k", "same");
    b.flush().await.unwrap();

    assert!(!a.resync().await.unwrap());
    assert_eq!(fired.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_removal_by_other_instance() {
    let raw = Arc::new(InMemoryRawStore::new());
    let a = open_instance(&raw, manual_config()).await;
    a.set("k", "v");
    a.flush().await.unwrap();

    let b = open_instance(&raw, manual_config()).await;
    assert_eq!(b.get("k"), Some(Bytes::from_static(b"v")));
    b.remove("k");
    b.flush().await.unwrap();

    assert!(a.resync().await.unwrap());
    assert_eq!(a.get("k"), None);
}

#[tokio::test]
async fn test_compaction_by_other_instance() {
    let raw = Arc::new(InMemoryRawStore::new());
    let a = open_instance(&raw, manual_config()).await;
    a.set("k1", "v1");
    a.flush().await.unwrap();

    let b = open_instance(&raw, manual_config()).await;
    b.set("k2", "v2");
    b.flush().await.unwrap();
    assert!(b.compact().await.unwrap());

    // a's own chunk vanished and a new one appeared
    assert!(a.resync().await.unwrap());
    assert_eq!(a.keys(), vec!["k1", "k2"]);
    assert_eq!(a.chunk_files().await.unwrap().len(), 1);

    a.set("k3", "v3");
    a.flush().await.unwrap();
    assert!(b.resync().await.unwrap());
    assert_eq!(b.keys(), vec!["k1", "k2", "k3"]);
}

#[tokio::test]
async fn test_write_after_foreign_compaction_without_resync() {
    let raw = Arc::new(InMemoryRawStore::new());
    let a = open_instance(&raw, manual_config()).await;
    a.set("k1", "v1");
    a.flush().await.unwrap();

    let b = open_instance(&raw, manual_config()).await;
    b.set("k2", "v2");
    b.flush().await.unwrap();
    assert!(b.compact().await.unwrap());

    // a still believes its first chunk is open
    a.set("k3", "v3");
    a.flush().await.unwrap();

    let reader = open_instance(&raw, manual_config()).await;
    assert_eq!(reader.keys(), vec!["k1", "k2", "k3"]);
    assert_eq!(reader.get("k3"), Some(Bytes::from_static(b"v3")));
}

#[tokio::test]
async fn test_sibling_store_compaction_on_shared_root() {
    let raw = Arc::new(InMemoryRawStore::new());
    let root = StorageRoot::new();
    let a = root.open_store(raw.clone(), manual_config()).await.unwrap();
    let b = root.open_store(raw.clone(), manual_config()).await.unwrap();

    a.set("k1", "v1");
    a.flush().await.unwrap();
    assert!(b.compact().await.unwrap());

    a.set("k2", "v2");
    a.flush().await.unwrap();

    let reader = open_instance(&raw, manual_config()).await;
    assert_eq!(reader.keys(), vec!["k1", "k2"]);
    assert_eq!(reader.get("k2"), Some(Bytes::from_static(b"v2")));
}

// =============================================================================
// Watcher Tests
// =============================================================================

#[tokio::test]
async fn test_watcher_polls_in_background() {
    let raw = Arc::new(InMemoryRawStore::new());
    let watching = Config::builder()
        .name("watching")
        .write_delay_ms(60_000)
        .resync_interval_ms(20)
        .build();
    let a = open_instance(&raw, watching).await;
    let fired = counting_callback(&a);

    let b = open_instance(&raw, manual_config()).await;
    b.set("k", "v");
    b.flush().await.unwrap();

    for _ in 0..100 {
        if fired.load(Ordering::SeqCst) > 0 {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    assert_eq!(fired.load(Ordering::SeqCst), 1);
    assert_eq!(a.get("k"), Some(Bytes::from_static(b"v")));
}
