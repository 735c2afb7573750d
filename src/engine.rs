//! The key browser: scan controller, namespace tree, expansion cache,
//! flattened rows, metadata cache and selection behind one owned state object.
//!
//! Every state change goes through a transition method that recomputes the
//! derived rows from settled inputs and then notifies observers with an
//! immutable snapshot. I/O happens either in the async driver methods or, for
//! callers that run their own tasks, between a `begin_*` call and the
//! matching `apply_*` call.

use serde::Serialize;
use std::collections::HashSet;
use std::ops::Range;
use std::sync::Arc;
use tracing::{debug, info};

use crate::api::{ConnectionId, StoreHandles};
use crate::config::BrowserConfig;
use crate::error::{BrowserError, Result};
use crate::expand_state::ExpansionState;
use crate::flatten::{flatten, leaf_keys_in, FlatRow};
use crate::metadata::MetadataCache;
use crate::model::{KeyDetail, ScanPage};
use crate::pattern::KeyPattern;
use crate::scanner::{ScanController, ScanOutcome, ScanRequest, ScanSummary};
use crate::selection::{Selection, SelectionOutcome, SelectionRequest, SelectionState};
use crate::tree::{build_roots, count_leaves, TreeNode};

pub type ObserverId = u64;

type Observer = Box<dyn Fn(&BrowserSnapshot) + Send + Sync>;

/// What the rendering layer reads after each transition.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BrowserSnapshot {
    pub rows: Arc<Vec<FlatRow>>,
    pub scan: ScanSummary,
    pub selection: SelectionState,
}

pub struct KeyBrowser {
    config: BrowserConfig,
    conn: ConnectionId,
    store: StoreHandles,
    scan: ScanController,
    matcher: Option<KeyPattern>,
    roots: Vec<TreeNode>,
    expansion: ExpansionState,
    rows: Arc<Vec<FlatRow>>,
    metadata: MetadataCache,
    selection: Selection,
    observers: Vec<(ObserverId, Observer)>,
    next_observer: ObserverId,
}

impl KeyBrowser {
    pub fn new(config: BrowserConfig, conn: ConnectionId, store: StoreHandles) -> Result<Self> {
        let config = config.validate()?;
        Ok(Self {
            scan: ScanController::new(config.count_hint),
            config,
            conn,
            store,
            matcher: None,
            roots: Vec::new(),
            expansion: ExpansionState::default(),
            rows: Arc::new(Vec::new()),
            metadata: MetadataCache::new(),
            selection: Selection::new(),
            observers: Vec::new(),
            next_observer: 1,
        })
    }

    // ----- transitions -----

    /// Start a new scan epoch for `pattern`. Keys, tree and expansion state of
    /// the previous epoch are discarded; a response still in flight for it
    /// will be dropped when it arrives.
    pub fn begin_scan(&mut self, pattern: &str) -> Result<ScanRequest> {
        let pattern = self.config.normalize_pattern(pattern).to_string();
        let matcher = KeyPattern::compile(&pattern)?;
        info!(pattern = %pattern, "key filter changed");

        self.matcher = Some(matcher);
        self.expansion.reset();
        let request = self.scan.begin(&pattern);
        self.rebuild_tree();
        self.notify();
        Ok(request)
    }

    /// Start a new epoch with the current pattern and forget cached details.
    pub fn begin_refresh(&mut self) -> Result<ScanRequest> {
        if self.scan.epoch() == 0 {
            let pattern = self.config.default_pattern.clone();
            return self.begin_scan(&pattern);
        }
        self.metadata.clear();
        self.expansion.reset();
        let request = self.scan.restart();
        self.rebuild_tree();
        self.notify();
        Ok(request)
    }

    /// Continuation request, if the epoch is incomplete and idle.
    pub fn next_scan_request(&mut self) -> Option<ScanRequest> {
        let request = self.scan.next_request();
        if request.is_some() {
            self.notify();
        }
        request
    }

    pub fn apply_scan(&mut self, request: &ScanRequest, result: Result<ScanPage>) -> ScanOutcome {
        let outcome = self.scan.apply(request, result);
        match &outcome {
            ScanOutcome::Applied { added, .. } => {
                if *added > 0 {
                    self.expansion
                        .invalidate_ancestors(self.scan.last_added(), &self.config.delimiter);
                    self.rebuild_tree();
                }
                self.notify();
            }
            ScanOutcome::Failed(_) => self.notify(),
            ScanOutcome::Stale => {}
        }
        outcome
    }

    pub fn apply_estimate(&mut self, epoch: u64, result: Result<u64>) {
        if self.scan.apply_estimate(epoch, result) {
            self.notify();
        }
    }

    /// Expand a namespace. Returns the number of children it shows.
    pub fn expand(&mut self, path: &str) -> usize {
        let keys = self.scan.keys();
        let (delimiter, threshold) = (&self.config.delimiter, self.config.parallel_threshold);
        let count = self.expansion.expand(path, keys, delimiter, threshold).len();
        // open descendants hidden while this was collapsed may be stale
        self.expansion
            .refresh_visible(&self.roots, keys, delimiter, threshold);
        self.recompute_rows();
        self.notify();
        count
    }

    pub fn collapse(&mut self, path: &str) -> bool {
        let collapsed = self.expansion.collapse(path);
        if collapsed {
            self.recompute_rows();
            self.notify();
        }
        collapsed
    }

    pub fn collapse_all(&mut self) {
        self.expansion.collapse_all();
        self.recompute_rows();
        self.notify();
    }

    /// Change the selection. The returned request must be answered with a
    /// fresh single-key fetch.
    pub fn begin_select(&mut self, key: Option<&str>) -> Option<SelectionRequest> {
        let request = self.selection.select(key);
        self.notify();
        request
    }

    /// Re-fetch the selected key, if any.
    pub fn refresh_selection(&mut self) -> Option<SelectionRequest> {
        let request = self.selection.refresh();
        if request.is_some() {
            self.notify();
        }
        request
    }

    pub fn apply_selection(&mut self, request: &SelectionRequest, result: Result<KeyDetail>) -> SelectionOutcome {
        let outcome = self.selection.apply(request, result);
        if outcome != SelectionOutcome::Stale {
            self.notify();
        }
        outcome
    }

    /// React to keys deleted by anyone, including this browser.
    pub fn on_keys_deleted(&mut self, keys: &[String]) {
        let removed = self.scan.remove_keys(keys);
        let purged = self.metadata.purge_many(keys);
        let deselected = self.selection.on_deleted(keys);
        let invalidated = self.expansion.invalidate_ancestors(keys, &self.config.delimiter);
        debug!(removed, purged, deselected, invalidated, "applied key deletion");

        self.rebuild_tree();
        self.notify();
    }

    /// React to a rename. The new name joins the key set only if the current
    /// filter would have matched it. A selection on the old name follows the
    /// rename and needs a fresh detail fetch.
    pub fn on_key_renamed(&mut self, old_name: &str, new_name: &str) -> Option<SelectionRequest> {
        let old = [old_name.to_string()];
        self.scan.remove_keys(&old);
        self.metadata.purge(old_name);
        self.metadata.purge(new_name);
        if self.matcher.as_ref().is_some_and(|m| m.matches(new_name)) {
            self.scan.insert_key(new_name);
        }
        let request = self.selection.on_renamed(old_name, new_name);
        self.expansion
            .invalidate_ancestors(&[old_name.to_string(), new_name.to_string()], &self.config.delimiter);

        self.rebuild_tree();
        self.notify();
        request
    }

    pub fn subscribe(&mut self, observer: impl Fn(&BrowserSnapshot) + Send + Sync + 'static) -> ObserverId {
        let id = self.next_observer;
        self.next_observer += 1;
        self.observers.push((id, Box::new(observer)));
        id
    }

    pub fn unsubscribe(&mut self, id: ObserverId) -> bool {
        let before = self.observers.len();
        self.observers.retain(|(observer_id, _)| *observer_id != id);
        self.observers.len() != before
    }

    fn rebuild_tree(&mut self) {
        let keys = self.scan.keys();
        self.roots = build_roots(keys.iter().map(String::as_str), &self.config.delimiter);
        self.expansion.refresh_visible(
            &self.roots,
            keys,
            &self.config.delimiter,
            self.config.parallel_threshold,
        );
        self.recompute_rows();
    }

    fn recompute_rows(&mut self) {
        self.rows = Arc::new(flatten(&self.roots, &self.expansion));
    }

    fn notify(&self) {
        if self.observers.is_empty() {
            return;
        }
        let snapshot = self.snapshot();
        for (_, observer) in &self.observers {
            observer(&snapshot);
        }
    }

    // ----- reads -----

    pub fn snapshot(&self) -> BrowserSnapshot {
        BrowserSnapshot {
            rows: self.rows.clone(),
            scan: self.scan.summary(),
            selection: self.selection.state().clone(),
        }
    }

    pub fn rows(&self) -> &[FlatRow] {
        &self.rows
    }

    pub fn roots(&self) -> &[TreeNode] {
        &self.roots
    }

    pub fn scan_summary(&self) -> ScanSummary {
        self.scan.summary()
    }

    pub fn keys(&self) -> &HashSet<String> {
        self.scan.keys()
    }

    pub fn selection(&self) -> &SelectionState {
        self.selection.state()
    }

    pub fn selected_key(&self) -> Option<&str> {
        self.selection.key()
    }

    pub fn selected_detail(&self) -> Option<&KeyDetail> {
        self.selection.detail()
    }

    /// Cached detail for row decoration. Never fetches.
    pub fn cached_detail(&self, key: &str) -> Option<KeyDetail> {
        self.metadata.get(key)
    }

    pub fn is_expanded(&self, path: &str) -> bool {
        self.expansion.is_expanded(path)
    }

    pub fn expansion(&self) -> &ExpansionState {
        &self.expansion
    }

    /// Leaf keys among the rows in `range`.
    pub fn viewport_keys(&self, range: Range<usize>) -> Vec<String> {
        leaf_keys_in(&self.rows, range)
    }

    /// Keys anywhere below the namespace at `path`.
    pub fn leaf_count(&self, path: &str) -> u64 {
        count_leaves(
            self.scan.keys().iter().map(String::as_str),
            path,
            &self.config.delimiter,
        )
    }

    /// Shared handle for fetches running outside the browser.
    pub fn metadata_cache(&self) -> MetadataCache {
        self.metadata.clone()
    }

    pub fn config(&self) -> &BrowserConfig {
        &self.config
    }

    pub fn connection(&self) -> &ConnectionId {
        &self.conn
    }

    pub fn store(&self) -> &StoreHandles {
        &self.store
    }

    // ----- async drivers -----

    /// Start a new epoch for `pattern` and load its first batch.
    pub async fn set_pattern(&mut self, pattern: &str) -> Result<()> {
        let request = self.begin_scan(pattern)?;
        self.run_scan(request).await
    }

    /// Load the next batch. Returns `false` when there was nothing to load.
    pub async fn load_more(&mut self) -> Result<bool> {
        match self.next_scan_request() {
            Some(request) => {
                self.run_scan(request).await?;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    /// Start over with the current pattern and re-fetch the selection.
    pub async fn refresh(&mut self) -> Result<()> {
        let request = self.begin_refresh()?;
        self.run_scan(request).await?;
        if let Some(request) = self.refresh_selection() {
            self.run_selection(request).await;
        }
        Ok(())
    }

    async fn run_scan(&mut self, request: ScanRequest) -> Result<()> {
        let api = self.store.scan.clone();
        let conn = self.conn.clone();
        let scan = api.scan(&conn, &request.cursor, &request.pattern, request.count_hint);

        let page = if request.is_first() {
            let (estimate, page) = tokio::join!(api.key_count(&conn), scan);
            self.apply_estimate(request.epoch, estimate);
            page
        } else {
            scan.await
        };

        match self.apply_scan(&request, page) {
            ScanOutcome::Failed(err) => Err(err),
            ScanOutcome::Applied { .. } | ScanOutcome::Stale => Ok(()),
        }
    }

    /// Select a key (or clear with `None`) and fetch its detail from the
    /// store. Failures end up in the selection state.
    pub async fn select(&mut self, key: Option<&str>) -> Result<()> {
        if key.is_some_and(str::is_empty) {
            return Err(BrowserError::InvalidInput("Key must not be empty".into()));
        }
        if let Some(request) = self.begin_select(key) {
            self.run_selection(request).await;
        }
        Ok(())
    }

    async fn run_selection(&mut self, request: SelectionRequest) -> SelectionOutcome {
        let api = self.store.metadata.clone();
        let result = api.get_key_info(&self.conn, &request.key).await;
        self.apply_selection(&request, result)
    }

    /// Fetch details for the leaf rows in `range` that are not cached yet.
    pub async fn load_viewport(&self, range: Range<usize>) -> Result<usize> {
        let keys = self.viewport_keys(range);
        let stored = self
            .metadata
            .request_metadata(self.store.metadata.as_ref(), &self.conn, &keys)
            .await?;
        if stored > 0 {
            self.notify();
        }
        Ok(stored)
    }

    pub async fn delete_keys(&mut self, keys: &[String]) -> Result<u64> {
        if keys.is_empty() {
            return Err(BrowserError::InvalidInput(
                "At least one key must be provided".into(),
            ));
        }
        let deleted = self.store.mutation.delete_keys(&self.conn, keys).await?;
        info!(requested = keys.len(), deleted, "keys deleted");
        self.on_keys_deleted(keys);
        Ok(deleted)
    }

    pub async fn rename_key(&mut self, old_name: &str, new_name: &str) -> Result<()> {
        if old_name.is_empty() || new_name.is_empty() {
            return Err(BrowserError::InvalidInput("Key names must not be empty".into()));
        }
        self.store
            .mutation
            .rename_key(&self.conn, old_name, new_name)
            .await?;
        info!(old_name = %old_name, new_name = %new_name, "key renamed");
        if let Some(request) = self.on_key_renamed(old_name, new_name) {
            self.run_selection(request).await;
        }
        Ok(())
    }
}

impl std::fmt::Debug for KeyBrowser {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KeyBrowser")
            .field("connection", &self.conn)
            .field("pattern", &self.scan.pattern())
            .field("keys.len()", &self.scan.keys().len())
            .field("rows.len()", &self.rows.len())
            .field("expanded", &self.expansion.expanded_count())
            .field("metadata", &self.metadata)
            .field("selection", &self.selection.key())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory_store::MemoryStore;
    use crate::model::{Cursor, KeyType};
    use std::sync::Mutex;

    fn browser_with(keys: &[&str], count_hint: u32) -> (Arc<MemoryStore>, KeyBrowser) {
        let store = Arc::new(MemoryStore::new());
        for key in keys {
            store.set(key, KeyType::String);
        }
        let config = BrowserConfig {
            count_hint,
            ..BrowserConfig::default()
        };
        let browser = KeyBrowser::new(
            config,
            ConnectionId::new("test"),
            StoreHandles::from_store(store.clone()),
        )
        .expect("browser");
        (store, browser)
    }

    async fn load_everything(browser: &mut KeyBrowser) {
        while browser.load_more().await.expect("scan") {}
    }

    fn row_ids(browser: &KeyBrowser) -> Vec<String> {
        browser.rows().iter().map(|r| r.id.to_string()).collect()
    }

    #[tokio::test]
    async fn test_set_pattern_loads_first_batch_and_estimate() {
        let (store, mut browser) = browser_with(&["a:1", "a:2", "b:1"], 500);
        browser.set_pattern("a:*").await.expect("scan");

        let summary = browser.scan_summary();
        assert_eq!(summary.loaded, 2);
        assert!(summary.complete);
        assert_eq!(summary.total_estimate, 3);
        assert_eq!(row_ids(&browser), vec!["ns:a"]);
        assert_eq!(store.scan_calls(), 1);
    }

    #[tokio::test]
    async fn test_load_more_stops_when_complete() {
        let (store, mut browser) = browser_with(&["a", "b", "c"], 2);
        browser.set_pattern("*").await.expect("scan");
        assert!(browser.load_more().await.expect("scan"));
        assert!(!browser.load_more().await.expect("scan"));
        assert_eq!(store.scan_calls(), 2);
    }

    #[tokio::test]
    async fn test_empty_pattern_means_everything() {
        let (_store, mut browser) = browser_with(&["a", "b"], 10);
        browser.set_pattern("").await.expect("scan");
        assert_eq!(browser.scan_summary().pattern, "*");
        assert_eq!(browser.keys().len(), 2);
    }

    #[tokio::test]
    async fn test_scan_failure_keeps_partial_keys() {
        let (store, mut browser) = browser_with(&["a", "b", "c", "d"], 2);
        browser.set_pattern("*").await.expect("scan");

        store.fail_scans(true);
        let err = browser.load_more().await.expect_err("transport");
        assert!(matches!(err, BrowserError::Transport(_)));
        let summary = browser.scan_summary();
        assert_eq!(summary.loaded, 2);
        assert!(!summary.complete);
        assert!(summary.error.is_some());
        assert_eq!(browser.rows().len(), 2);

        store.fail_scans(false);
        load_everything(&mut browser).await;
        assert_eq!(browser.keys().len(), 4);
        assert!(browser.scan_summary().error.is_none());
    }

    #[tokio::test]
    async fn test_expanded_namespace_picks_up_new_batches() {
        let (_store, mut browser) = browser_with(&["a:1", "a:2", "a:3", "b"], 1);
        browser.set_pattern("*").await.expect("scan");
        assert_eq!(browser.expand("a"), 1);

        load_everything(&mut browser).await;
        assert_eq!(
            row_ids(&browser),
            vec!["ns:a", "key:a:1", "key:a:2", "key:a:3", "key:b"]
        );
    }

    #[tokio::test]
    async fn test_collapse_keeps_cache() {
        let (_store, mut browser) = browser_with(&["a:1", "a:2"], 10);
        browser.set_pattern("*").await.expect("scan");

        browser.expand("a");
        assert!(browser.collapse("a"));
        assert!(!browser.collapse("a"));
        assert_eq!(row_ids(&browser), vec!["ns:a"]);

        browser.expand("a");
        assert_eq!(browser.expansion().materializations(), 1);
        assert_eq!(browser.rows().len(), 3);

        browser.collapse_all();
        assert_eq!(browser.rows().len(), 1);
    }

    #[tokio::test]
    async fn test_collapsed_cache_survives_unrelated_batch() {
        let (_store, mut browser) = browser_with(&["a:1", "a:2", "b", "c"], 2);
        browser.set_pattern("*").await.expect("scan");

        browser.expand("a");
        browser.collapse("a");
        assert!(browser.load_more().await.expect("scan"));
        assert_eq!(browser.keys().len(), 4);
        assert!(browser.expansion().cached_children("a").is_some());
        assert!(!browser.expansion().is_stale("a"));

        assert_eq!(browser.expand("a"), 2);
        assert_eq!(browser.expansion().materializations(), 1);
    }

    #[tokio::test]
    async fn test_collapsed_namespace_shows_keys_added_while_hidden() {
        let (_store, mut browser) = browser_with(&["a:1", "a:2", "a:3", "b"], 2);
        browser.set_pattern("*").await.expect("scan");

        browser.expand("a");
        browser.collapse("a");
        browser.load_more().await.expect("scan");
        assert!(browser.expansion().is_stale("a"));
        assert_eq!(browser.expansion().materializations(), 1);

        assert_eq!(browser.expand("a"), 3);
        assert_eq!(browser.expansion().materializations(), 2);
    }

    #[tokio::test]
    async fn test_hidden_open_namespace_refreshed_when_shown() {
        let (_store, mut browser) = browser_with(&["a:b:1", "a:b:2", "a:b:3"], 2);
        browser.set_pattern("*").await.expect("scan");

        browser.expand("a");
        browser.expand("a:b");
        browser.collapse("a");
        browser.load_more().await.expect("scan");
        // both levels are out of view, nothing recomputed
        assert_eq!(browser.expansion().materializations(), 2);

        browser.expand("a");
        assert_eq!(
            row_ids(&browser),
            vec!["ns:a", "ns:a:b", "key:a:b:1", "key:a:b:2", "key:a:b:3"]
        );
    }

    #[test]
    fn test_batch_without_new_keys_keeps_rows() {
        let (_store, mut browser) = browser_with(&[], 10);
        let request = browser.begin_scan("*").expect("scan");
        let page = |keys: &[&str], finished: bool| ScanPage {
            keys: keys.iter().map(|s| s.to_string()).collect(),
            cursor: if finished { Cursor::start() } else { Cursor::new("5") },
            finished,
            total_estimate: 0,
        };
        browser.apply_scan(&request, Ok(page(&["a:1"], false)));
        browser.expand("a");
        let before = browser.snapshot().rows;

        let request = browser.next_scan_request().expect("continuation");
        assert_eq!(
            browser.apply_scan(&request, Ok(page(&["a:1"], true))),
            ScanOutcome::Applied { added: 0, finished: true }
        );
        assert!(Arc::ptr_eq(&before, &browser.snapshot().rows));
        assert_eq!(browser.expansion().materializations(), 1);
    }

    #[tokio::test]
    async fn test_new_pattern_clears_expansion() {
        let (_store, mut browser) = browser_with(&["a:1", "b:1"], 10);
        browser.set_pattern("*").await.expect("scan");
        browser.expand("a");

        browser.set_pattern("a:*").await.expect("scan");
        assert!(!browser.is_expanded("a"));
        assert_eq!(row_ids(&browser), vec!["ns:a"]);
    }

    #[tokio::test]
    async fn test_viewport_metadata_and_row_decoration() {
        let (store, mut browser) = browser_with(&["a", "b", "c", "d"], 10);
        browser.set_pattern("*").await.expect("scan");

        assert_eq!(browser.load_viewport(0..2).await, Ok(2));
        assert!(browser.cached_detail("a").is_some());
        assert!(browser.cached_detail("c").is_none());

        assert_eq!(browser.load_viewport(0..2).await, Ok(0));
        assert_eq!(store.metadata_calls(), 1);

        assert_eq!(browser.load_viewport(1..4).await, Ok(2));
        assert_eq!(store.metadata_calls(), 2);
    }

    #[tokio::test]
    async fn test_viewport_failure_is_retried_next_pass() {
        let (store, mut browser) = browser_with(&["a", "b"], 10);
        browser.set_pattern("*").await.expect("scan");

        store.fail_metadata(true);
        assert!(browser.load_viewport(0..2).await.is_err());
        assert!(browser.cached_detail("a").is_none());

        store.fail_metadata(false);
        assert_eq!(browser.load_viewport(0..2).await, Ok(2));
    }

    #[tokio::test]
    async fn test_select_bypasses_cache() {
        let (store, mut browser) = browser_with(&["a"], 10);
        browser.set_pattern("*").await.expect("scan");
        browser.load_viewport(0..1).await.expect("metadata");

        browser.select(Some("a")).await.expect("select");
        assert_eq!(store.detail_calls(), 1);
        let detail = browser.selected_detail().expect("resolved");
        assert_eq!(detail.encoding.as_deref(), Some("embstr"));

        browser.select(None).await.expect("clear");
        assert_eq!(browser.selection(), &SelectionState::None);
        assert!(browser.select(Some("")).await.is_err());
    }

    #[tokio::test]
    async fn test_select_key_deleted_elsewhere_is_missing() {
        let (store, mut browser) = browser_with(&["a", "b"], 10);
        browser.set_pattern("*").await.expect("scan");
        store.remove("a");

        browser.select(Some("a")).await.expect("select");
        assert_eq!(
            browser.selection(),
            &SelectionState::Missing { key: "a".into() }
        );
    }

    #[tokio::test]
    async fn test_rename_follows_selection_and_filter() {
        let (_store, mut browser) = browser_with(&["user:1", "user:2"], 10);
        browser.set_pattern("user:*").await.expect("scan");
        browser.select(Some("user:1")).await.expect("select");

        browser.rename_key("user:1", "user:9").await.expect("rename");
        assert!(browser.keys().contains("user:9"));
        assert!(!browser.keys().contains("user:1"));
        assert_eq!(browser.selected_detail().map(|d| d.key.as_str()), Some("user:9"));

        browser.rename_key("user:2", "admin:2").await.expect("rename");
        assert!(!browser.keys().contains("admin:2"));
        assert_eq!(browser.keys().len(), 1);
    }

    #[tokio::test]
    async fn test_mutation_input_validation() {
        let (_store, mut browser) = browser_with(&["a"], 10);
        assert!(matches!(
            browser.delete_keys(&[]).await,
            Err(BrowserError::InvalidInput(_))
        ));
        assert!(matches!(
            browser.rename_key("", "b").await,
            Err(BrowserError::InvalidInput(_))
        ));
    }

    #[tokio::test]
    async fn test_refresh_clears_metadata_and_refetches_selection() {
        let (store, mut browser) = browser_with(&["a", "b"], 10);
        browser.set_pattern("*").await.expect("scan");
        browser.load_viewport(0..2).await.expect("metadata");
        browser.select(Some("a")).await.expect("select");
        store.set("c", KeyType::Set);

        browser.refresh().await.expect("refresh");
        assert_eq!(browser.keys().len(), 3);
        assert!(browser.cached_detail("a").is_none());
        assert_eq!(store.detail_calls(), 2);
        assert!(browser.selected_detail().is_some());
    }

    #[tokio::test]
    async fn test_observers_receive_snapshots() {
        let (_store, mut browser) = browser_with(&["a:1", "b"], 10);
        let seen: Arc<Mutex<Vec<usize>>> = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        let id = browser.subscribe(move |snapshot| {
            sink.lock().unwrap().push(snapshot.rows.len());
        });

        browser.set_pattern("*").await.expect("scan");
        browser.expand("a");
        assert_eq!(seen.lock().unwrap().last(), Some(&3));

        assert!(browser.unsubscribe(id));
        let before = seen.lock().unwrap().len();
        browser.collapse("a");
        assert_eq!(seen.lock().unwrap().len(), before);
    }

    #[test]
    fn test_stale_scan_response_is_not_applied() {
        let (_store, mut browser) = browser_with(&[], 10);
        let first = browser.begin_scan("p1:*").expect("scan");
        let second = browser.begin_scan("p2:*").expect("scan");

        let page = |keys: &[&str]| ScanPage {
            keys: keys.iter().map(|s| s.to_string()).collect(),
            cursor: Cursor::start(),
            finished: true,
            total_estimate: 0,
        };
        assert_eq!(browser.apply_scan(&first, Ok(page(&["p1:x"]))), ScanOutcome::Stale);
        assert!(browser.rows().is_empty());
        assert!(matches!(
            browser.apply_scan(&second, Ok(page(&["p2:y"]))),
            ScanOutcome::Applied { .. }
        ));
        assert_eq!(browser.scan_summary().pattern, "p2:*");
        assert_eq!(row_ids(&browser), vec!["ns:p2"]);
    }

    #[test]
    fn test_invalid_config_rejected() {
        let store = Arc::new(MemoryStore::new());
        let config = BrowserConfig {
            count_hint: 0,
            ..BrowserConfig::default()
        };
        assert!(KeyBrowser::new(config, ConnectionId::new("x"), StoreHandles::from_store(store)).is_err());
    }

    #[tokio::test]
    async fn test_leaf_count() {
        let (_store, mut browser) = browser_with(&["a:1", "a:b:2", "a", "c"], 10);
        browser.set_pattern("*").await.expect("scan");
        assert_eq!(browser.leaf_count("a"), 2);
    }
}
