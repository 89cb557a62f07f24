//! Tests for TransactionStore
//!
//! These tests verify:
//! - Reads see writes immediately, before any flush
//! - Batching: one flush per window, deduplicated by key
//! - Durability across reopen (memory and directory backed)
//! - Tombstones, reset, per-value compression
//! - Pending writes survive a reload from disk
//! - Store lifecycle (open/close)

use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use chunkstore::txlog::read_chunk;
use chunkstore::{
    Config, EntryInfo, FileRawStore, InMemoryRawStore, KeyValueStore, RawStore, StorageRoot,
    TransactionStore,
};
use tempfile::TempDir;

// =============================================================================
// Helper Functions
// =============================================================================

/// Config with no background activity: flushes happen only when asked
fn manual_config() -> Config {
    Config::builder()
        .name("test")
        .write_delay_ms(60_000)
        .resync_interval_ms(0)
        .build()
}

async fn open_store(raw: &Arc<InMemoryRawStore>) -> TransactionStore {
    TransactionStore::open(raw.clone(), manual_config())
        .await
        .unwrap()
}

/// Every entry found in the raw store's chunk files
async fn durable_entries(raw: &dyn RawStore) -> Vec<(String, Option<Vec<u8>>)> {
    let mut out = Vec::new();
    for file in raw.get_keys().await.unwrap() {
        let bytes = raw.get(&file).await.unwrap().unwrap();
        for entry in read_chunk(&file, &bytes).unwrap().entries {
            out.push((entry.key, entry.value.as_bytes().map(|v| v.to_vec())));
        }
    }
    out
}

// =============================================================================
// Basic Operations Tests
// =============================================================================

#[tokio::test]
async fn test_open_empty_store() {
    let raw = Arc::new(InMemoryRawStore::new());
    let store = open_store(&raw).await;

    assert!(store.keys().is_empty());
    assert_eq!(store.entry_count(), 0);
    assert_eq!(store.pending_count(), 0);
    assert!(raw.is_empty());
}

#[tokio::test]
async fn test_set_is_visible_before_flush() {
    let raw = Arc::new(InMemoryRawStore::new());
    let store = open_store(&raw).await;

    store.set("key", "value");

    assert_eq!(store.get("key"), Some(Bytes::from_static(b"value")));
    assert_eq!(store.pending_count(), 1);
    assert!(raw.is_empty());
}

#[tokio::test]
async fn test_remove_is_visible_before_flush() {
    let raw = Arc::new(InMemoryRawStore::new());
    let store = open_store(&raw).await;

    store.set("key", "value");
    store.remove("key");

    assert_eq!(store.get("key"), None);
    assert!(!store.contains_key("key"));
}

#[tokio::test]
async fn test_keys_entries_values_info() {
    let raw = Arc::new(InMemoryRawStore::new());
    let store = open_store(&raw).await;

    store.set("b", "22");
    store.set("a", "1");
    store.set("c", "333");

    assert_eq!(store.keys(), vec!["a", "b", "c"]);
    assert_eq!(
        store.values(),
        vec![
            Bytes::from_static(b"1"),
            Bytes::from_static(b"22"),
            Bytes::from_static(b"333")
        ]
    );
    assert_eq!(store.entries()[1].0, "b");
    assert_eq!(store.info("c").map(|info| info.size), Some(3));
    assert_eq!(store.key_count(), 3);
}

// =============================================================================
// Batching Tests
// =============================================================================

#[tokio::test]
async fn test_batch_keeps_last_write_per_key() {
    let raw = Arc::new(InMemoryRawStore::new());
    let store = open_store(&raw).await;

    store.set("a", "1");
    store.set("a", "2");
    store.flush().await.unwrap();

    assert_eq!(
        durable_entries(raw.as_ref()).await,
        vec![("a".to_string(), Some(b"2".to_vec()))]
    );
    assert_eq!(store.pending_count(), 0);
}

#[tokio::test]
async fn test_flush_appends_to_open_chunk() {
    let raw = Arc::new(InMemoryRawStore::new());
    let store = open_store(&raw).await;

    store.set("a", "1");
    store.flush().await.unwrap();
    store.set("b", "2");
    store.flush().await.unwrap();

    assert_eq!(store.chunk_files().await.unwrap().len(), 1);
    assert_eq!(durable_entries(raw.as_ref()).await.len(), 2);
}

#[tokio::test]
async fn test_info_reports_flush_time() {
    let raw = Arc::new(InMemoryRawStore::new());
    let store = open_store(&raw).await;

    store.set("a", "1");
    store.flush().await.unwrap();

    let mut times = Vec::new();
    for file in raw.get_keys().await.unwrap() {
        let bytes = raw.get(&file).await.unwrap().unwrap();
        times.extend(read_chunk(&file, &bytes).unwrap().entries.into_iter().map(|e| e.time));
    }
    assert_eq!(times.len(), 1);
    assert_eq!(store.info("a").unwrap().last_modified, times[0]);
}

#[tokio::test]
async fn test_flush_of_empty_batch_writes_nothing() {
    let raw = Arc::new(InMemoryRawStore::new());
    let store = open_store(&raw).await;

    store.flush().await.unwrap();
    assert!(raw.is_empty());
}

#[tokio::test]
async fn test_background_flush_after_write_delay() {
    let raw = Arc::new(InMemoryRawStore::new());
    let config = Config::builder()
        .write_delay_ms(10)
        .resync_interval_ms(0)
        .build();
    let store = TransactionStore::open(raw.clone(), config).await.unwrap();

    store.set("key", "value");
    assert_eq!(store.pending_count(), 1);

    for _ in 0..100 {
        if store.pending_count() == 0 {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    assert_eq!(store.pending_count(), 0);
    assert_eq!(durable_entries(raw.as_ref()).await.len(), 1);
}

#[tokio::test]
async fn test_small_chunk_size_splits_files() {
    let raw = Arc::new(InMemoryRawStore::new());
    let config = Config::builder()
        .write_delay_ms(60_000)
        .resync_interval_ms(0)
        .chunk_size(256)
        .build();
    let store = TransactionStore::open(raw.clone(), config.clone())
        .await
        .unwrap();

    for i in 0..5 {
        store.set(format!("key{i}"), vec![b'x'; 100]);
    }
    store.flush().await.unwrap();
    assert_eq!(store.chunk_files().await.unwrap().len(), 5);
    drop(store);

    let reopened = TransactionStore::open(raw.clone(), config).await.unwrap();
    assert_eq!(reopened.key_count(), 5);
}

// =============================================================================
// Durability Tests
// =============================================================================

#[tokio::test]
async fn test_reopen_recovers_values_and_tombstones() {
    let raw = Arc::new(InMemoryRawStore::new());
    {
        let store = open_store(&raw).await;
        store.set("kept", "yes");
        store.set("removed", "soon");
        store.flush().await.unwrap();
        store.remove("removed");
        store.close().await.unwrap();
    }

    let store = open_store(&raw).await;
    assert_eq!(store.get("kept"), Some(Bytes::from_static(b"yes")));
    assert_eq!(store.get("removed"), None);
    assert_eq!(store.entry_count(), 3);
}

#[tokio::test]
async fn test_reopen_directory_store() {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("collections").join("users");
    {
        let store = TransactionStore::open(Arc::new(FileRawStore::new(&path)), manual_config())
            .await
            .unwrap();
        for i in 0..100 {
            store.set(format!("user{i:03}"), format!("name {i}"));
        }
        store.close().await.unwrap();
    }

    let store = TransactionStore::open(Arc::new(FileRawStore::new(&path)), manual_config())
        .await
        .unwrap();
    assert_eq!(store.key_count(), 100);
    assert_eq!(store.get("user042"), Some(Bytes::from("name 42")));
}

#[tokio::test]
async fn test_later_writer_wins_on_reopen() {
    let raw = Arc::new(InMemoryRawStore::new());
    let first = open_store(&raw).await;
    let second = open_store(&raw).await;

    first.set("k", "first");
    first.flush().await.unwrap();
    second.set("k", "second");
    second.flush().await.unwrap();

    let third = open_store(&raw).await;
    assert_eq!(third.get("k"), Some(Bytes::from_static(b"second")));
}

#[tokio::test]
async fn test_corrupted_frame_loses_only_that_entry() {
    let raw = Arc::new(InMemoryRawStore::new());
    {
        let store = open_store(&raw).await;
        store.set("a", "1");
        store.set("b", "2");
        store.set("c", "3");
        store.flush().await.unwrap();
    }

    // Entries are flushed in key order; break the END_MAGIC of "b"
    let file = raw.get_keys().await.unwrap().remove(0);
    let bytes = raw.get(&file).await.unwrap().unwrap();
    let header_len = 4 + u32::from_le_bytes(bytes[..4].try_into().unwrap()) as usize;
    let frame_len = (bytes.len() - header_len) / 3;
    assert!(raw.corrupt(&file, header_len + 2 * frame_len - 1, &[0]));

    let store = open_store(&raw).await;
    assert_eq!(store.keys(), vec!["a", "c"]);
}

// =============================================================================
// Reset Tests
// =============================================================================

#[tokio::test]
async fn test_reset_clears_disk_and_pending() {
    let raw = Arc::new(InMemoryRawStore::new());
    let store = open_store(&raw).await;

    store.set("durable", "1");
    store.flush().await.unwrap();
    store.set("pending", "2");

    store.reset().await.unwrap();
    assert!(store.keys().is_empty());
    assert_eq!(store.pending_count(), 0);
    assert_eq!(store.entry_count(), 0);
    assert!(raw.is_empty());

    store.flush().await.unwrap();
    assert!(raw.is_empty());

    store.set("after", "3");
    store.flush().await.unwrap();
    let reopened = open_store(&raw).await;
    assert_eq!(reopened.keys(), vec!["after"]);
}

// =============================================================================
// Compression Tests
// =============================================================================

#[tokio::test]
async fn test_large_values_are_compressed() {
    let raw = Arc::new(InMemoryRawStore::new());
    let config = Config::builder()
        .write_delay_ms(60_000)
        .resync_interval_ms(0)
        .value_zip_threshold(1024)
        .build();
    let big = vec![b'a'; 64 * 1024];
    {
        let store = TransactionStore::open(raw.clone(), config.clone())
            .await
            .unwrap();
        store.set("big", big.clone());
        store.set("small", "tiny");
        store.flush().await.unwrap();
        assert_eq!(store.info("big").unwrap().size, big.len());
    }

    let file = raw.get_keys().await.unwrap().remove(0);
    assert!(raw.get_info(&file).await.unwrap().unwrap().size < 4096);

    let store = TransactionStore::open(raw.clone(), config).await.unwrap();
    assert_eq!(store.get("big"), Some(Bytes::from(big)));
    assert_eq!(store.get("small"), Some(Bytes::from_static(b"tiny")));
}

// =============================================================================
// Reload Tests
// =============================================================================

#[tokio::test]
async fn test_pending_write_wins_over_reloaded_disk_state() {
    let raw = Arc::new(InMemoryRawStore::new());
    let local = open_store(&raw).await;
    let remote = StorageRoot::new()
        .open_store(raw.clone(), manual_config())
        .await
        .unwrap();

    local.set("k", "local");
    remote.set("k", "remote");
    remote.flush().await.unwrap();

    // The reload sees "remote" on disk but the unflushed local write wins
    assert!(!local.resync().await.unwrap());
    assert_eq!(local.get("k"), Some(Bytes::from_static(b"local")));
    assert_eq!(local.pending_count(), 1);

    local.flush().await.unwrap();
    let reader = open_store(&raw).await;
    assert_eq!(reader.get("k"), Some(Bytes::from_static(b"local")));
}

// =============================================================================
// Trait Tests
// =============================================================================

async fn roundtrip_through_trait<S>(store: &S, value: S::Value) -> Option<S::Value>
where
    S: KeyValueStore,
{
    store.set("via_trait", value).await.unwrap();
    store.get("via_trait").await.unwrap()
}

#[tokio::test]
async fn test_key_value_store_trait() {
    let raw = Arc::new(InMemoryRawStore::new());
    let store = open_store(&raw).await;

    let value = roundtrip_through_trait(&store, Bytes::from_static(b"bytes")).await;
    assert_eq!(value, Some(Bytes::from_static(b"bytes")));

    let info = KeyValueStore::get_info(&store, "via_trait").await.unwrap();
    assert!(matches!(info, Some(EntryInfo { size: 5, .. })));

    KeyValueStore::remove(&store, "via_trait").await.unwrap();
    assert!(KeyValueStore::get_keys(&store).await.unwrap().is_empty());

    KeyValueStore::reset(&store).await.unwrap();
}

// =============================================================================
// Config Tests
// =============================================================================

#[tokio::test]
async fn test_open_rejects_invalid_config() {
    let raw = Arc::new(InMemoryRawStore::new());
    let config = Config::builder().chunk_size(0).build();

    assert!(TransactionStore::open(raw, config).await.is_err());
}
