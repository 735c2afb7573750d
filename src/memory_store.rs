//! In-process key store implementing the collaborator contracts.
//!
//! Enumeration follows the cursor rules of a real store: `count_hint` bounds
//! how many keys are examined per call, not how many match, so a batch can
//! come back short or empty before the scan is finished.

use async_trait::async_trait;
use parking_lot::RwLock;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};

use crate::api::{ConnectionId, MetadataApi, MutationApi, ScanApi};
use crate::error::{BrowserError, Result};
use crate::model::{Cursor, KeyDetail, KeyType, ScanPage, Ttl};
use crate::pattern::KeyPattern;

#[derive(Debug, Clone)]
struct StoredKey {
    key_type: KeyType,
    ttl: Ttl,
    length: u64,
}

#[derive(Debug, Default)]
pub struct MemoryStore {
    keys: RwLock<BTreeMap<String, StoredKey>>,
    scan_overlap: AtomicUsize,
    fail_scans: AtomicBool,
    fail_metadata: AtomicBool,
    scan_calls: AtomicU64,
    metadata_calls: AtomicU64,
    detail_calls: AtomicU64,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store pre-filled with `count` keys spread over a few namespaces.
    pub fn with_synthetic_keys(count: usize) -> Self {
        let store = Self::new();
        store.set("config", KeyType::String);
        store.set("config:flags", KeyType::Hash);
        for i in 0..count {
            let (key, key_type) = match i % 6 {
                0 => (format!("user:{}:profile", i / 6), KeyType::Hash),
                1 => (format!("user:{}:sessions", i / 6), KeyType::Set),
                2 => (format!("cache:page:{}", i / 6), KeyType::String),
                3 => (format!("queue:jobs:{}", i / 6 % 97), KeyType::List),
                4 => (format!("leaderboard:{}", i / 6 % 13), KeyType::Zset),
                _ => (format!("events:{}:{}", i / 6 % 7, i / 6), KeyType::Stream),
            };
            store.set(&key, key_type);
        }
        store
    }

    pub fn set(&self, key: &str, key_type: KeyType) {
        self.set_with_ttl(key, key_type, Ttl::Persistent);
    }

    pub fn set_with_ttl(&self, key: &str, key_type: KeyType, ttl: Ttl) {
        let length = key.len() as u64;
        self.keys.write().insert(
            key.to_string(),
            StoredKey {
                key_type,
                ttl,
                length,
            },
        );
    }

    /// Delete behind the browser's back.
    pub fn remove(&self, key: &str) -> bool {
        self.keys.write().remove(key).is_some()
    }

    pub fn len(&self) -> usize {
        self.keys.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.read().is_empty()
    }

    /// Make each continuation cursor step back by `overlap` keys, so batches
    /// revisit keys already returned.
    pub fn set_scan_overlap(&self, overlap: usize) {
        self.scan_overlap.store(overlap, Ordering::Relaxed);
    }

    pub fn fail_scans(&self, fail: bool) {
        self.fail_scans.store(fail, Ordering::Relaxed);
    }

    pub fn fail_metadata(&self, fail: bool) {
        self.fail_metadata.store(fail, Ordering::Relaxed);
    }

    pub fn scan_calls(&self) -> u64 {
        self.scan_calls.load(Ordering::Relaxed)
    }

    pub fn metadata_calls(&self) -> u64 {
        self.metadata_calls.load(Ordering::Relaxed)
    }

    pub fn detail_calls(&self) -> u64 {
        self.detail_calls.load(Ordering::Relaxed)
    }

    fn scan_now(&self, cursor: &Cursor, pattern: &str, count_hint: u32) -> Result<ScanPage> {
        let position: usize = cursor
            .as_str()
            .parse()
            .map_err(|_| BrowserError::InvalidInput(format!("invalid cursor {cursor}")))?;
        let matcher = KeyPattern::compile(pattern)?;

        let keys = self.keys.read();
        let total = keys.len();
        let start = position.min(total);
        let end = start.saturating_add(count_hint.max(1) as usize).min(total);

        let batch: Vec<String> = keys
            .keys()
            .skip(start)
            .take(end - start)
            .filter(|k| matcher.matches(k))
            .cloned()
            .collect();

        let finished = end >= total;
        let next = if finished {
            Cursor::start()
        } else {
            let overlap = self.scan_overlap.load(Ordering::Relaxed);
            let next = end.saturating_sub(overlap).max(start + 1);
            Cursor::new(next.to_string())
        };

        Ok(ScanPage {
            keys: batch,
            cursor: next,
            finished,
            total_estimate: total as u64,
        })
    }
}

#[async_trait]
impl ScanApi for MemoryStore {
    async fn scan(
        &self,
        _conn: &ConnectionId,
        cursor: &Cursor,
        pattern: &str,
        count_hint: u32,
    ) -> Result<ScanPage> {
        tokio::task::yield_now().await;
        self.scan_calls.fetch_add(1, Ordering::Relaxed);
        if self.fail_scans.load(Ordering::Relaxed) {
            return Err(BrowserError::Transport("SCAN failed: connection refused".into()));
        }
        self.scan_now(cursor, pattern, count_hint)
    }

    async fn key_count(&self, _conn: &ConnectionId) -> Result<u64> {
        tokio::task::yield_now().await;
        if self.fail_scans.load(Ordering::Relaxed) {
            return Err(BrowserError::Transport("DBSIZE failed: connection refused".into()));
        }
        Ok(self.len() as u64)
    }
}

#[async_trait]
impl MetadataApi for MemoryStore {
    async fn get_keys_info(&self, _conn: &ConnectionId, keys: &[String]) -> Result<Vec<KeyDetail>> {
        tokio::task::yield_now().await;
        self.metadata_calls.fetch_add(1, Ordering::Relaxed);
        if self.fail_metadata.load(Ordering::Relaxed) {
            return Err(BrowserError::Transport("pipeline failed: connection refused".into()));
        }

        let stored = self.keys.read();
        // Reverse order: callers must correlate by key, not position.
        Ok(keys
            .iter()
            .rev()
            .map(|key| match stored.get(key) {
                Some(entry) => KeyDetail {
                    key: key.clone(),
                    key_type: entry.key_type.clone(),
                    ttl: entry.ttl.clone(),
                    size_bytes: None,
                    encoding: None,
                    length: None,
                },
                None => KeyDetail::missing(key.as_str()),
            })
            .collect())
    }

    async fn get_key_info(&self, _conn: &ConnectionId, key: &str) -> Result<KeyDetail> {
        tokio::task::yield_now().await;
        self.detail_calls.fetch_add(1, Ordering::Relaxed);
        if self.fail_metadata.load(Ordering::Relaxed) {
            return Err(BrowserError::Transport("pipeline failed: connection refused".into()));
        }

        let stored = self.keys.read();
        let entry = stored
            .get(key)
            .ok_or_else(|| BrowserError::NotFound(key.to_string()))?;
        let encoding = match entry.key_type {
            KeyType::String => "embstr",
            KeyType::Hash | KeyType::Zset | KeyType::List => "listpack",
            KeyType::Set => "hashtable",
            KeyType::Stream => "stream",
            KeyType::Unknown(_) => "raw",
        };
        Ok(KeyDetail {
            key: key.to_string(),
            key_type: entry.key_type.clone(),
            ttl: entry.ttl.clone(),
            size_bytes: Some(entry.length + 48),
            encoding: Some(encoding.to_string()),
            length: Some(entry.length),
        })
    }
}

#[async_trait]
impl MutationApi for MemoryStore {
    async fn delete_keys(&self, _conn: &ConnectionId, keys: &[String]) -> Result<u64> {
        tokio::task::yield_now().await;
        let mut stored = self.keys.write();
        Ok(keys.iter().filter(|k| stored.remove(k.as_str()).is_some()).count() as u64)
    }

    async fn rename_key(&self, _conn: &ConnectionId, old_name: &str, new_name: &str) -> Result<()> {
        tokio::task::yield_now().await;
        let mut stored = self.keys.write();
        if stored.contains_key(new_name) {
            return Err(BrowserError::InvalidInput(format!(
                "Key '{new_name}' already exists"
            )));
        }
        let entry = stored
            .remove(old_name)
            .ok_or_else(|| BrowserError::NotFound(old_name.to_string()))?;
        stored.insert(new_name.to_string(), entry);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn conn() -> ConnectionId {
        ConnectionId::new("memory")
    }

    fn store(keys: &[&str]) -> MemoryStore {
        let store = MemoryStore::new();
        for key in keys {
            store.set(key, KeyType::String);
        }
        store
    }

    #[tokio::test]
    async fn test_scan_walks_in_batches() {
        let store = store(&["a", "b", "c", "d", "e"]);

        let first = store.scan(&conn(), &Cursor::start(), "*", 2).await.expect("scan");
        assert_eq!(first.keys, vec!["a", "b"]);
        assert!(!first.finished);
        assert_eq!(first.total_estimate, 5);

        let second = store.scan(&conn(), &first.cursor, "*", 2).await.expect("scan");
        assert_eq!(second.keys, vec!["c", "d"]);

        let third = store.scan(&conn(), &second.cursor, "*", 2).await.expect("scan");
        assert_eq!(third.keys, vec!["e"]);
        assert!(third.finished);
        assert!(third.cursor.is_start());
        assert_eq!(store.scan_calls(), 3);
    }

    #[tokio::test]
    async fn test_scan_count_bounds_examined_keys() {
        let store = store(&["a:1", "b:1", "b:2", "c:1"]);

        let page = store.scan(&conn(), &Cursor::start(), "c:*", 2).await.expect("scan");
        assert!(page.keys.is_empty());
        assert!(!page.finished);
    }

    #[tokio::test]
    async fn test_scan_overlap_revisits() {
        let store = store(&["a", "b", "c", "d"]);
        store.set_scan_overlap(1);

        let first = store.scan(&conn(), &Cursor::start(), "*", 2).await.expect("scan");
        let second = store.scan(&conn(), &first.cursor, "*", 2).await.expect("scan");
        assert_eq!(second.keys, vec!["b", "c"]);
    }

    #[tokio::test]
    async fn test_bad_cursor_rejected() {
        let store = store(&["a"]);
        let err = store
            .scan(&conn(), &Cursor::new("not-a-number"), "*", 2)
            .await
            .expect_err("invalid cursor");
        assert!(matches!(err, BrowserError::InvalidInput(_)));
    }

    #[tokio::test]
    async fn test_batch_info_marks_missing_keys() {
        let store = store(&["a"]);
        let infos = store
            .get_keys_info(&conn(), &["a".to_string(), "gone".to_string()])
            .await
            .expect("info");

        assert_eq!(infos.len(), 2);
        let gone = infos.iter().find(|d| d.key == "gone").expect("gone present");
        assert!(!gone.exists());
    }

    #[tokio::test]
    async fn test_key_info_not_found() {
        let store = store(&["a"]);
        let detail = store.get_key_info(&conn(), "a").await.expect("detail");
        assert_eq!(detail.encoding.as_deref(), Some("embstr"));

        let err = store.get_key_info(&conn(), "gone").await.expect_err("missing");
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn test_rename_refuses_existing_target() {
        let store = store(&["a", "b"]);
        let err = store.rename_key(&conn(), "a", "b").await.expect_err("exists");
        assert!(matches!(err, BrowserError::InvalidInput(_)));

        store.rename_key(&conn(), "a", "c").await.expect("rename");
        assert_eq!(store.delete_keys(&conn(), &["c".to_string(), "a".to_string()]).await, Ok(1));
    }

    #[test]
    fn test_synthetic_keys_share_leaf_and_namespace() {
        let store = MemoryStore::with_synthetic_keys(60);
        let keys = store.keys.read();
        assert!(keys.contains_key("config"));
        assert!(keys.contains_key("config:flags"));
        assert!(keys.contains_key("user:0:profile"));
    }
}
