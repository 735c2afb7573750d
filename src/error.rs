use serde::Serialize;

/// Result type alias for browser operations
pub type Result<T> = std::result::Result<T, BrowserError>;

/// Errors surfaced by the key browser.
///
/// Responses dropped because a newer scan epoch or selection superseded them
/// are not errors; they come back as `Stale` outcomes and never reach the user.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error, Serialize)]
#[serde(tag = "kind", content = "message")]
pub enum BrowserError {
    /// The store could not be reached or rejected the call.
    #[error("Transport error: {0}")]
    Transport(String),

    /// The key vanished between enumeration and lookup.
    #[error("Key not found: {0}")]
    NotFound(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),
}

impl BrowserError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_))
    }
}

impl From<regex::Error> for BrowserError {
    fn from(e: regex::Error) -> Self {
        Self::InvalidInput(format!("bad pattern: {e}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = BrowserError::Transport("connection reset".into());
        assert_eq!(err.to_string(), "Transport error: connection reset");

        let err = BrowserError::NotFound("user:1".into());
        assert!(err.is_not_found());
        assert!(err.to_string().contains("user:1"));
    }

    #[test]
    fn test_error_serialization_is_tagged() {
        let err = BrowserError::InvalidInput("empty key".into());
        let json = serde_json::to_string(&err).expect("serialize");
        assert_eq!(json, r#"{"kind":"InvalidInput","message":"empty key"}"#);
    }
}
