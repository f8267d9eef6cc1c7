//! Cache Environment Module
//!
//! Defines the tenant boundary: each environment has its own security key,
//! capacity limits and isolated key space.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

// == Environment ==
/// A tenant boundary for the cache server.
///
/// Created administratively (or as the default environment on first boot);
/// never mutated by cache operations.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Environment {
    /// Unique identifier, immutable once created
    pub id: String,
    /// Display name
    pub name: String,
    /// Shared secret authorizing requests against this environment
    pub security_key: String,
    /// Hard capacity cap in bytes, 0 = unlimited
    pub max_size_bytes: u64,
    /// Maximum key length, 0 = unlimited
    pub max_key_length: usize,
    /// Used-capacity percentage that triggers a warning, 0 = disabled
    pub percent_used_for_warning: u8,
}

impl Environment {
    // == Constructor ==
    /// Creates a new environment with a fresh unique id.
    pub fn new(
        name: impl Into<String>,
        security_key: impl Into<String>,
        max_size_bytes: u64,
        max_key_length: usize,
        percent_used_for_warning: u8,
    ) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            name: name.into(),
            security_key: security_key.into(),
            max_size_bytes,
            max_key_length,
            percent_used_for_warning,
        }
    }
}
