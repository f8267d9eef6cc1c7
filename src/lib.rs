//! envcache - A multi-tenant in-memory cache server
//!
//! Environments are isolated caches addressed by a security key. Items carry
//! an optional expiry and an optional persist flag; a worker scheduler
//! processes requests with bounded concurrency and runs periodic maintenance
//! through the same queue.

pub mod cache;
pub mod client;
pub mod config;
pub mod error;
pub mod models;
pub mod persist;
pub mod protocol;
pub mod registry;
pub mod server;
pub mod transport;

pub use client::CacheClient;
pub use config::Config;
pub use error::{CacheError, ErrorCode, Result};
pub use models::{CacheItem, Environment, KeyFilter};
pub use registry::EnvironmentRegistry;
pub use server::{ServerContext, Worker, WorkerSettings};
