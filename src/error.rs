//! Error types for the cache server
//!
//! Provides unified error handling using thiserror, plus the wire-level
//! error codes embedded in response envelopes.

use serde::{Deserialize, Serialize};
use thiserror::Error;

// == Response Error Codes ==
/// Error codes carried inside a response envelope.
///
/// Authorization and validation failures are reported through these codes
/// as normal responses; they are never transported as protocol failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ErrorCode {
    /// Security key did not match any environment
    PermissionDenied,
    /// Environment matched but its cache engine could not be obtained
    CacheEnvironmentNotFound,
    /// Missing or oversized key
    InvalidParameters,
    /// Environment capacity would be exceeded
    CacheFull,
    /// Uncaught processing error
    Unknown,
}

impl ErrorCode {
    /// Human-readable description used as the default error message.
    pub fn description(&self) -> &'static str {
        match self {
            ErrorCode::PermissionDenied => "Permission denied",
            ErrorCode::CacheEnvironmentNotFound => "Cache environment not found",
            ErrorCode::InvalidParameters => "Invalid parameters",
            ErrorCode::CacheFull => "Cache full",
            ErrorCode::Unknown => "Unknown",
        }
    }
}

// == Cache Error Enum ==
/// Unified error type for the cache server and client.
#[derive(Error, Debug)]
pub enum CacheError {
    /// Security key does not match any environment
    #[error("Permission denied: {0}")]
    PermissionDenied(String),

    /// Security key matched no live environment engine
    #[error("Cache environment not found: {0}")]
    EnvironmentNotFound(String),

    /// Missing or oversized request parameters
    #[error("Invalid parameters: {0}")]
    InvalidParameters(String),

    /// Environment capacity exceeded
    #[error("Cache full: {0}")]
    CacheFull(String),

    /// No terminal response arrived before the deadline
    #[error("Timeout: {0}")]
    Timeout(String),

    /// Transport send failed
    #[error("Transport error: {0}")]
    Transport(String),

    /// Internal server error
    #[error("Internal error: {0}")]
    Internal(String),
}

impl CacheError {
    /// Builds the client-facing error for an error-coded response envelope.
    pub fn from_wire(code: ErrorCode, message: String) -> Self {
        match code {
            ErrorCode::PermissionDenied => CacheError::PermissionDenied(message),
            ErrorCode::CacheEnvironmentNotFound => CacheError::EnvironmentNotFound(message),
            ErrorCode::InvalidParameters => CacheError::InvalidParameters(message),
            ErrorCode::CacheFull => CacheError::CacheFull(message),
            ErrorCode::Unknown => CacheError::Internal(message),
        }
    }
}

// == Result Type Alias ==
/// Convenience Result type for the cache server.
pub type Result<T> = std::result::Result<T, CacheError>;
