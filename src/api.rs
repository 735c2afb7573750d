//! Collaborator contracts consumed by the browser.
//!
//! The store behind these traits owns its wire protocol, connection pooling
//! and timeouts. Every call may fail; none of them are assumed to be
//! rate-limited on the store side.

use async_trait::async_trait;
use std::fmt;
use std::sync::Arc;

use crate::error::Result;
use crate::model::{Cursor, KeyDetail, ScanPage};

/// Identifies the store connection the calls run against.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ConnectionId(String);

impl ConnectionId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Cursor enumeration.
#[async_trait]
pub trait ScanApi: Send + Sync {
    /// Run one enumeration step. `count_hint` bounds the work done per call,
    /// not the number of keys returned.
    async fn scan(
        &self,
        conn: &ConnectionId,
        cursor: &Cursor,
        pattern: &str,
        count_hint: u32,
    ) -> Result<ScanPage>;

    /// Size estimate of the whole key space, independent of any scan.
    async fn key_count(&self, conn: &ConnectionId) -> Result<u64>;
}

/// Key detail lookup.
#[async_trait]
pub trait MetadataApi: Send + Sync {
    /// Batched lookup. Result order is unspecified; each record carries its key.
    async fn get_keys_info(&self, conn: &ConnectionId, keys: &[String]) -> Result<Vec<KeyDetail>>;

    /// Single key lookup with full detail. A vanished key is `NotFound`.
    async fn get_key_info(&self, conn: &ConnectionId, key: &str) -> Result<KeyDetail>;
}

/// Destructive operations the browser forwards but does not own.
#[async_trait]
pub trait MutationApi: Send + Sync {
    async fn delete_keys(&self, conn: &ConnectionId, keys: &[String]) -> Result<u64>;

    async fn rename_key(&self, conn: &ConnectionId, old_name: &str, new_name: &str) -> Result<()>;
}

/// The three collaborator handles a browser needs.
#[derive(Clone)]
pub struct StoreHandles {
    pub scan: Arc<dyn ScanApi>,
    pub metadata: Arc<dyn MetadataApi>,
    pub mutation: Arc<dyn MutationApi>,
}

impl StoreHandles {
    /// Use one store object for all three contracts.
    pub fn from_store<S>(store: Arc<S>) -> Self
    where
        S: ScanApi + MetadataApi + MutationApi + 'static,
    {
        Self {
            scan: store.clone(),
            metadata: store.clone(),
            mutation: store,
        }
    }
}

impl fmt::Debug for StoreHandles {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StoreHandles").finish_non_exhaustive()
    }
}
