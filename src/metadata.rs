use dashmap::DashMap;
use parking_lot::RwLock;
use std::collections::HashSet;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{debug, warn};

use crate::api::{ConnectionId, MetadataApi};
use crate::error::Result;
use crate::model::KeyDetail;

/// Last-known details for keys that have been scrolled into view.
///
/// Cheap to clone; clones share the same map so fetches running on other
/// tasks write into it directly. Writes are keyed upserts, so batches may
/// land in any order.
///
/// Every purge or clear bumps a generation. A fetch that was started under an
/// older generation is discarded when it resolves, so a key removed while its
/// lookup was in flight is never written back.
#[derive(Clone, Default)]
pub struct MetadataCache {
    entries: Arc<DashMap<String, KeyDetail>>,
    generation: Arc<RwLock<u64>>,
    fetched_batches: Arc<AtomicU64>,
}

impl MetadataCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Keys from `keys` with no cached entry, in input order, without repeats.
    ///
    /// Only resolved entries are filtered; a key whose fetch is still pending
    /// is returned again.
    pub fn uncached(&self, keys: &[String]) -> Vec<String> {
        let mut seen = HashSet::with_capacity(keys.len());
        keys.iter()
            .filter(|k| !self.entries.contains_key(k.as_str()))
            .filter(|k| seen.insert(k.as_str()))
            .cloned()
            .collect()
    }

    /// Upsert each record under its own key.
    pub fn insert_batch(&self, details: Vec<KeyDetail>) -> usize {
        let count = details.len();
        for detail in details {
            self.entries.insert(detail.key.clone(), detail);
        }
        count
    }

    pub fn get(&self, key: &str) -> Option<KeyDetail> {
        self.entries.get(key).map(|entry| entry.value().clone())
    }

    pub fn contains(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }

    pub fn purge(&self, key: &str) -> bool {
        let mut generation = self.generation.write();
        *generation += 1;
        self.entries.remove(key).is_some()
    }

    pub fn purge_many(&self, keys: &[String]) -> usize {
        let mut generation = self.generation.write();
        *generation += 1;
        keys.iter()
            .filter(|k| self.entries.remove(k.as_str()).is_some())
            .count()
    }

    pub fn clear(&self) {
        let mut generation = self.generation.write();
        *generation += 1;
        self.entries.clear();
    }

    pub fn generation(&self) -> u64 {
        *self.generation.read()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Number of batched lookups actually sent to the store.
    pub fn fetched_batches(&self) -> u64 {
        self.fetched_batches.load(Ordering::Relaxed)
    }

    /// Fetch details for the uncached subset of `keys` in one batched call.
    ///
    /// Returns the number of records stored. On failure nothing is cached, so
    /// the same keys are retried on the next viewport pass.
    pub async fn request_metadata(
        &self,
        api: &dyn MetadataApi,
        conn: &ConnectionId,
        keys: &[String],
    ) -> Result<usize> {
        let missing = self.uncached(keys);
        if missing.is_empty() {
            return Ok(0);
        }

        let started = self.generation();
        self.fetched_batches.fetch_add(1, Ordering::Relaxed);
        match api.get_keys_info(conn, &missing).await {
            Ok(details) => {
                // Held across the insert so no purge can interleave.
                let generation = self.generation.read();
                if *generation != started {
                    debug!(
                        requested = missing.len(),
                        started,
                        current = *generation,
                        "dropping metadata batch fetched before a purge"
                    );
                    return Ok(0);
                }
                let stored = self.insert_batch(details);
                drop(generation);
                debug!(requested = missing.len(), stored, "metadata batch cached");
                Ok(stored)
            }
            Err(err) => {
                warn!(requested = missing.len(), error = %err, "metadata batch failed");
                Err(err)
            }
        }
    }
}

impl std::fmt::Debug for MetadataCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MetadataCache")
            .field("entries.len()", &self.entries.len())
            .field("generation", &self.generation())
            .field("fetched_batches", &self.fetched_batches())
            .finish()
    }
}
