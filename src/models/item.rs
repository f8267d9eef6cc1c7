//! Cache Item Module
//!
//! Defines the stored entry type shared between client, wire protocol and
//! cache engine, plus the key filter used by key enumeration.

use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};

// == Cache Item ==
/// Represents a single cache entry with value, TTL and persistence flag.
///
/// The value is an opaque byte payload; `value_type` tags how the client
/// reconstitutes it. The engine never interprets payload contents.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheItem {
    /// Environment that owns this item, stamped by the server
    #[serde(default)]
    pub environment_id: String,
    /// Key, unique within an environment
    pub key: String,
    /// Serialized value payload
    pub value: Vec<u8>,
    /// Tag identifying how to reconstitute the value
    pub value_type: String,
    /// Expiry in milliseconds after creation, 0 = never expires
    pub expiry_millis: u64,
    /// Whether to mirror this item to the persistence collaborator
    pub persist: bool,
    /// Creation timestamp (Unix milliseconds), set by the server at insertion
    #[serde(default)]
    pub created_at: u64,
}

impl CacheItem {
    // == Constructor ==
    /// Creates a new cache item ready to be sent to the server.
    ///
    /// `created_at` and `environment_id` are left empty; the server stamps
    /// both at insertion time.
    pub fn new(
        key: impl Into<String>,
        value: Vec<u8>,
        value_type: impl Into<String>,
        expiry_millis: u64,
        persist: bool,
    ) -> Self {
        Self {
            environment_id: String::new(),
            key: key.into(),
            value,
            value_type: value_type.into(),
            expiry_millis,
            persist,
            created_at: 0,
        }
    }

    // == Size ==
    /// Byte length of the value, used for capacity accounting.
    pub fn size(&self) -> u64 {
        self.value.len() as u64
    }

    // == Is Expired ==
    /// Checks whether the item has expired at `now` (Unix milliseconds).
    ///
    /// An item with `expiry_millis == 0` never expires. Otherwise the item
    /// is expired once `created_at + expiry_millis <= now`, so the boundary
    /// instant itself already counts as expired. The deadline saturates, so
    /// a TTL near `u64::MAX` behaves as a deadline at the end of time.
    pub fn is_expired(&self, now: u64) -> bool {
        self.expiry_millis > 0 && self.created_at.saturating_add(self.expiry_millis) <= now
    }
}

// == Key Filter ==
/// Filter over item keys for key enumeration.
///
/// All conditions are optional and AND-combined.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyFilter {
    /// Key must start with this prefix
    #[serde(default)]
    pub starts_with: Option<String>,
    /// Key must end with this suffix
    #[serde(default)]
    pub ends_with: Option<String>,
    /// Key must contain this substring
    #[serde(default)]
    pub contains: Option<String>,
}

impl KeyFilter {
    /// Matches everything.
    pub fn all() -> Self {
        Self::default()
    }

    /// Returns true when `key` satisfies every configured condition.
    pub fn matches(&self, key: &str) -> bool {
        if let Some(prefix) = &self.starts_with {
            if !prefix.is_empty() && !key.starts_with(prefix.as_str()) {
                return false;
            }
        }
        if let Some(suffix) = &self.ends_with {
            if !suffix.is_empty() && !key.ends_with(suffix.as_str()) {
                return false;
            }
        }
        if let Some(needle) = &self.contains {
            if !needle.is_empty() && !key.contains(needle.as_str()) {
                return false;
            }
        }
        true
    }
}

// == Utility Functions ==
/// Returns current Unix timestamp in milliseconds.
pub fn current_timestamp_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .expect("Time went backwards")
        .as_millis() as u64
}
