use serde::Serialize;
use tracing::debug;

use crate::error::{BrowserError, Result};
use crate::model::KeyDetail;

/// Detail pane state for the selected key.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum SelectionState {
    #[default]
    None,
    Pending { key: String },
    Resolved { key: String, detail: KeyDetail },
    /// The key was deleted elsewhere.
    Missing { key: String },
    Failed { key: String, error: BrowserError },
}

/// A detail fetch the binding wants issued. Always goes to the store, never
/// to the metadata cache.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SelectionRequest {
    pub key: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SelectionOutcome {
    Resolved,
    Missing,
    Failed(BrowserError),
    /// The selection moved on before the response arrived.
    Stale,
}

#[derive(Debug, Default)]
pub struct Selection {
    state: SelectionState,
}

impl Selection {
    pub fn new() -> Self {
        Self::default()
    }

    /// Select `key` (or clear with `None`). The newest selection always wins.
    pub fn select(&mut self, key: Option<&str>) -> Option<SelectionRequest> {
        match key {
            None => {
                self.state = SelectionState::None;
                None
            }
            Some(key) => {
                self.state = SelectionState::Pending {
                    key: key.to_string(),
                };
                Some(SelectionRequest {
                    key: key.to_string(),
                })
            }
        }
    }

    /// Fetch the current key again.
    pub fn refresh(&mut self) -> Option<SelectionRequest> {
        let key = self.key()?.to_string();
        self.select(Some(&key))
    }

    pub fn apply(&mut self, request: &SelectionRequest, result: Result<KeyDetail>) -> SelectionOutcome {
        if self.key() != Some(request.key.as_str()) {
            debug!(key = %request.key, "dropping stale selection detail");
            return SelectionOutcome::Stale;
        }
        let key = request.key.clone();

        match result {
            Ok(detail) if detail.exists() => {
                debug!(key = %key, key_type = %detail.key_type, "selection resolved");
                self.state = SelectionState::Resolved { key, detail };
                SelectionOutcome::Resolved
            }
            Ok(_) | Err(BrowserError::NotFound(_)) => {
                debug!(key = %key, "selected key missing");
                self.state = SelectionState::Missing { key };
                SelectionOutcome::Missing
            }
            Err(error) => {
                self.state = SelectionState::Failed {
                    key,
                    error: error.clone(),
                };
                SelectionOutcome::Failed(error)
            }
        }
    }

    /// Clear the selection if it points at one of `keys`.
    pub fn on_deleted(&mut self, keys: &[String]) -> bool {
        let hit = self.key().is_some_and(|k| keys.iter().any(|d| d == k));
        if hit {
            self.state = SelectionState::None;
        }
        hit
    }

    /// Follow a renamed selection to its new name.
    pub fn on_renamed(&mut self, old_name: &str, new_name: &str) -> Option<SelectionRequest> {
        if self.key() == Some(old_name) {
            self.select(Some(new_name))
        } else {
            None
        }
    }

    pub fn key(&self) -> Option<&str> {
        match &self.state {
            SelectionState::None => None,
            SelectionState::Pending { key }
            | SelectionState::Resolved { key, .. }
            | SelectionState::Missing { key }
            | SelectionState::Failed { key, .. } => Some(key),
        }
    }

    pub fn detail(&self) -> Option<&KeyDetail> {
        match &self.state {
            SelectionState::Resolved { detail, .. } => Some(detail),
            _ => None,
        }
    }

    pub fn state(&self) -> &SelectionState {
        &self.state
    }
}
