use serde::Serialize;
use std::collections::HashSet;
use tracing::{debug, warn};

use crate::error::{BrowserError, Result};
use crate::model::{Cursor, ScanPage};

/// One enumeration call the controller wants issued.
///
/// The epoch is checked again when the response is applied; a response from
/// an older epoch is dropped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScanRequest {
    pub epoch: u64,
    pub pattern: String,
    pub cursor: Cursor,
    pub count_hint: u32,
}

impl ScanRequest {
    /// First call of its epoch; the size estimate is fetched alongside it.
    pub fn is_first(&self) -> bool {
        self.cursor.is_start()
    }
}

/// What applying a scan response did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScanOutcome {
    Applied { added: usize, finished: bool },
    /// Response belonged to a superseded epoch and was ignored.
    Stale,
    /// Transport failure. Keys loaded so far stay valid.
    Failed(BrowserError),
}

/// Read-only view of the scan for the rendering layer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ScanSummary {
    pub pattern: String,
    pub loaded: usize,
    pub total_estimate: u64,
    pub complete: bool,
    pub in_flight: bool,
    pub batches: u64,
    pub error: Option<BrowserError>,
}

impl ScanSummary {
    /// Loaded fraction against the estimate, if one is known.
    pub fn fraction(&self) -> Option<f32> {
        if self.complete {
            return Some(1.0);
        }
        if self.total_estimate == 0 {
            return None;
        }
        Some((self.loaded as f32 / self.total_estimate as f32).clamp(0.0, 1.0))
    }
}

/// Owns the accumulated key set of the current scan epoch.
///
/// Continuation is sequential: a new request is only handed out once the
/// previous one of the same epoch has been applied.
#[derive(Debug)]
pub struct ScanController {
    epoch: u64,
    pattern: String,
    cursor: Cursor,
    keys: HashSet<String>,
    last_added: Vec<String>,
    complete: bool,
    total_estimate: u64,
    estimate_known: bool,
    in_flight: bool,
    batches: u64,
    error: Option<BrowserError>,
    count_hint: u32,
}

impl ScanController {
    pub fn new(count_hint: u32) -> Self {
        Self {
            epoch: 0,
            pattern: String::new(),
            cursor: Cursor::start(),
            keys: HashSet::new(),
            last_added: Vec::new(),
            complete: false,
            total_estimate: 0,
            estimate_known: false,
            in_flight: false,
            batches: 0,
            error: None,
            count_hint: count_hint.max(1),
        }
    }

    /// Start a fresh epoch for `pattern`, discarding everything loaded so far.
    pub fn begin(&mut self, pattern: &str) -> ScanRequest {
        self.epoch += 1;
        self.pattern = pattern.to_string();
        self.cursor = Cursor::start();
        self.keys.clear();
        self.last_added.clear();
        self.complete = false;
        self.total_estimate = 0;
        self.estimate_known = false;
        self.batches = 0;
        self.error = None;
        self.in_flight = true;

        debug!(epoch = self.epoch, pattern = %self.pattern, "scan epoch started");
        self.request()
    }

    /// Start a fresh epoch with the current pattern.
    pub fn restart(&mut self) -> ScanRequest {
        let pattern = self.pattern.clone();
        self.begin(&pattern)
    }

    /// Next continuation request, or `None` when the epoch is complete, a
    /// request is already outstanding, or no epoch was started.
    pub fn next_request(&mut self) -> Option<ScanRequest> {
        if self.epoch == 0 || self.complete || self.in_flight {
            return None;
        }
        self.in_flight = true;
        self.error = None;
        Some(self.request())
    }

    fn request(&self) -> ScanRequest {
        ScanRequest {
            epoch: self.epoch,
            pattern: self.pattern.clone(),
            cursor: self.cursor.clone(),
            count_hint: self.count_hint,
        }
    }

    /// Merge a scan response into the key set.
    pub fn apply(&mut self, request: &ScanRequest, result: Result<ScanPage>) -> ScanOutcome {
        if request.epoch != self.epoch {
            debug!(
                request_epoch = request.epoch,
                current_epoch = self.epoch,
                "dropping stale scan response"
            );
            return ScanOutcome::Stale;
        }
        self.in_flight = false;

        let page = match result {
            Ok(page) => page,
            Err(err) => {
                warn!(epoch = self.epoch, error = %err, "scan batch failed");
                self.error = Some(err.clone());
                return ScanOutcome::Failed(err);
            }
        };

        let returned = page.keys.len();
        self.last_added.clear();
        for key in page.keys {
            if !self.keys.contains(&key) {
                self.keys.insert(key.clone());
                self.last_added.push(key);
            }
        }
        let added = self.last_added.len();

        // A start cursor coming back means the enumeration wrapped around.
        let finished = page.finished || page.cursor.is_start();
        self.cursor = page.cursor;
        self.complete = finished;
        self.batches += 1;
        if !self.estimate_known {
            self.total_estimate = page.total_estimate;
        }

        debug!(
            epoch = self.epoch,
            returned,
            added,
            loaded = self.keys.len(),
            finished,
            "scan batch applied"
        );
        ScanOutcome::Applied { added, finished }
    }

    /// Record the side-channel size estimate for `epoch`.
    pub fn apply_estimate(&mut self, epoch: u64, result: Result<u64>) -> bool {
        if epoch != self.epoch {
            return false;
        }
        match result {
            Ok(estimate) => {
                self.total_estimate = estimate;
                self.estimate_known = true;
                true
            }
            Err(err) => {
                warn!(epoch, error = %err, "key count estimate failed");
                false
            }
        }
    }

    /// Drop keys deleted elsewhere. Returns how many were present.
    pub fn remove_keys(&mut self, keys: &[String]) -> usize {
        keys.iter().filter(|k| self.keys.remove(k.as_str())).count()
    }

    pub fn insert_key(&mut self, key: &str) -> bool {
        self.keys.insert(key.to_string())
    }

    pub fn keys(&self) -> &HashSet<String> {
        &self.keys
    }

    /// Keys that were new in the most recently applied batch.
    pub fn last_added(&self) -> &[String] {
        &self.last_added
    }

    pub fn epoch(&self) -> u64 {
        self.epoch
    }

    pub fn pattern(&self) -> &str {
        &self.pattern
    }

    pub fn is_complete(&self) -> bool {
        self.complete
    }

    pub fn in_flight(&self) -> bool {
        self.in_flight
    }

    pub fn error(&self) -> Option<&BrowserError> {
        self.error.as_ref()
    }

    pub fn summary(&self) -> ScanSummary {
        ScanSummary {
            pattern: self.pattern.clone(),
            loaded: self.keys.len(),
            total_estimate: self.total_estimate,
            complete: self.complete,
            in_flight: self.in_flight,
            batches: self.batches,
            error: self.error.clone(),
        }
    }
}
