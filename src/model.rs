use serde::{Deserialize, Serialize};
use std::fmt;

/// Store value type classification.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum KeyType {
    String,
    List,
    Set,
    Zset,
    Hash,
    Stream,
    #[serde(untagged)]
    Unknown(std::string::String),
}

impl KeyType {
    /// Parse a TYPE reply.
    pub fn from_type_str(s: &str) -> Self {
        match s {
            "string" => Self::String,
            "list" => Self::List,
            "set" => Self::Set,
            "zset" => Self::Zset,
            "hash" => Self::Hash,
            "stream" => Self::Stream,
            other => Self::Unknown(other.to_string()),
        }
    }

    pub fn as_type_str(&self) -> &str {
        match self {
            Self::String => "string",
            Self::List => "list",
            Self::Set => "set",
            Self::Zset => "zset",
            Self::Hash => "hash",
            Self::Stream => "stream",
            Self::Unknown(s) => s,
        }
    }
}

impl fmt::Display for KeyType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_type_str())
    }
}

/// Expiry classification of a key.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Ttl {
    /// No expiry.
    Persistent,
    /// Expires in the given number of seconds.
    Seconds { value: i64 },
    /// The key does not exist any more.
    Missing,
}

impl Ttl {
    /// Parse a TTL reply (`-1` persistent, `-2` missing).
    pub fn from_ttl_response(ttl: i64) -> Self {
        match ttl {
            -1 => Self::Persistent,
            -2 => Self::Missing,
            n => Self::Seconds { value: n },
        }
    }
}

/// Per-key metadata. Replaced wholesale on refetch.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct KeyDetail {
    pub key: std::string::String,
    pub key_type: KeyType,
    pub ttl: Ttl,
    pub size_bytes: Option<u64>,
    pub encoding: Option<std::string::String>,
    pub length: Option<u64>,
}

impl KeyDetail {
    /// Detail record for a key the store no longer has.
    pub fn missing(key: impl Into<std::string::String>) -> Self {
        Self {
            key: key.into(),
            key_type: KeyType::Unknown("none".into()),
            ttl: Ttl::Missing,
            size_bytes: None,
            encoding: None,
            length: None,
        }
    }

    pub fn exists(&self) -> bool {
        self.ttl != Ttl::Missing
    }
}

/// Opaque enumeration continuation token.
///
/// `"0"` both starts an enumeration and marks its end; a terminal cursor must
/// never be sent back to the store.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct Cursor(std::string::String);

impl Cursor {
    pub fn start() -> Self {
        Self("0".to_string())
    }

    pub fn new(token: impl Into<std::string::String>) -> Self {
        Self(token.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_start(&self) -> bool {
        self.0 == "0"
    }
}

impl Default for Cursor {
    fn default() -> Self {
        Self::start()
    }
}

impl fmt::Display for Cursor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// One enumeration batch as returned by the store.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ScanPage {
    pub keys: Vec<std::string::String>,
    pub cursor: Cursor,
    pub finished: bool,
    pub total_estimate: u64,
}
