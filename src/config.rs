use serde::{Deserialize, Serialize};

use crate::error::{BrowserError, Result};

pub const DEFAULT_DELIMITER: &str = ":";
pub const DEFAULT_COUNT_HINT: u32 = 500;
pub const DEFAULT_PATTERN: &str = "*";
/// Key sets at least this large are filtered on the rayon pool when expanding.
pub const DEFAULT_PARALLEL_THRESHOLD: usize = 16_384;

/// Browser tuning.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct BrowserConfig {
    pub delimiter: String,
    /// Per-call enumeration work bound. Every batch triggers a full tree
    /// rebuild, so keep this in the hundreds.
    pub count_hint: u32,
    pub default_pattern: String,
    pub parallel_threshold: usize,
}

impl Default for BrowserConfig {
    fn default() -> Self {
        Self {
            delimiter: DEFAULT_DELIMITER.to_string(),
            count_hint: DEFAULT_COUNT_HINT,
            default_pattern: DEFAULT_PATTERN.to_string(),
            parallel_threshold: DEFAULT_PARALLEL_THRESHOLD,
        }
    }
}

impl BrowserConfig {
    /// Fill blanks with defaults and reject unusable values.
    pub fn validate(mut self) -> Result<Self> {
        if self.count_hint == 0 {
            return Err(BrowserError::InvalidInput("count hint must be positive".into()));
        }
        if self.delimiter.is_empty() {
            self.delimiter = DEFAULT_DELIMITER.to_string();
        }
        if self.default_pattern.is_empty() {
            self.default_pattern = DEFAULT_PATTERN.to_string();
        }
        Ok(self)
    }

    /// An empty filter means "everything".
    pub fn normalize_pattern<'a>(&'a self, pattern: &'a str) -> &'a str {
        if pattern.trim().is_empty() {
            &self.default_pattern
        } else {
            pattern
        }
    }
}
