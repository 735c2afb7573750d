//! Incremental key-space browser for a remote key-value store.
//!
//! Keys arrive in cursor batches, are grouped into a delimiter-separated
//! namespace tree that is materialized one level at a time, and are projected
//! into a flat row sequence for a scrolling viewport. Per-key details are
//! fetched lazily for the rows on screen.

pub mod api;
pub mod config;
pub mod debounce;
pub mod edit_buffer;
pub mod engine;
pub mod error;
pub mod expand_state;
pub mod flatten;
pub mod memory_store;
pub mod metadata;
pub mod model;
pub mod pattern;
pub mod scanner;
pub mod selection;
pub mod tree;

pub use api::{ConnectionId, MetadataApi, MutationApi, ScanApi, StoreHandles};
pub use config::BrowserConfig;
pub use engine::{BrowserSnapshot, KeyBrowser, ObserverId};
pub use error::{BrowserError, Result};
pub use flatten::{FlatRow, RowId, Viewport};
pub use model::{Cursor, KeyDetail, KeyType, ScanPage, Ttl};
pub use tree::TreeNode;
