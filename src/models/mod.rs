//! Data model for the cache server
//!
//! Shared types used by the wire protocol, cache engine and registry.

mod environment;
mod item;

pub use environment::Environment;
pub use item::{current_timestamp_ms, CacheItem, KeyFilter};
