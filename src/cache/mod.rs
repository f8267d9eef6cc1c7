//! Cache Module
//!
//! Per-environment in-memory cache engine with TTL expiry, key filtering
//! and size accounting.

mod store;


pub use store::CacheStore;
