//! Local cache store for offline-first operation.
//!
//! This module provides:
//! - Durable snapshots of items, categories and profiles (upsert by id)
//! - Soft-delete aware reads
//! - Routed reads that write through on success and fall back to the cache
//! - The persisted tables behind the pending action queue and id remapping

mod layer;
mod storage;
mod traits;

pub use layer::CacheLayer;
pub use storage::{ActionRow, CacheStorage, SqliteStorage};
pub use traits::{CacheSource, Cacheable, Loaded};
