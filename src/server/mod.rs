//! Server Module
//!
//! Request handlers plus the worker scheduler that feeds them.

mod handlers;
mod worker;

pub use handlers::ServerContext;
pub use worker::{MaintenanceJob, Worker, WorkerSettings};
