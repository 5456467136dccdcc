//! Job-record datastore.
//!
//! The job record is the only mutable state shared between the API layer
//! and workers. This crate provides:
//! - The `JobStore` capability used by the worker
//! - `RedisJobStore`, one Redis hash per job
//! - `MemoryJobStore` for the inline demo path and tests

pub mod config;
pub mod error;
pub mod memory;
pub mod redis_store;
pub mod store;

pub use config::StoreConfig;
pub use error::{StoreError, StoreResult};
pub use memory::MemoryJobStore;
pub use redis_store::RedisJobStore;
pub use store::JobStore;
