//! Core traits and types for the caching system.

use serde::{de::DeserializeOwned, Serialize};

/// Trait for entities that can be cached.
///
/// Each implementor lives in its own table, keyed by `cache_key`.
pub trait Cacheable: Clone + Send + Sync + Serialize + DeserializeOwned {
  /// Unique identifier for this entity (the remote id, or a local placeholder)
  fn cache_key(&self) -> &str;

  /// Last modification timestamp (ISO 8601), if the entity tracks one.
  fn updated_at(&self) -> Option<&str> {
    None
  }

  /// Secondary lookup column (item category, category name, profile email).
  fn label(&self) -> Option<&str> {
    None
  }

  /// Soft-delete marker. Deleted rows are kept but hidden from active reads.
  fn is_deleted(&self) -> bool {
    false
  }

  /// Table holding this entity type
  fn table() -> &'static str;
}

/// Result of a routed read, tagged with where the data came from.
#[derive(Debug, Clone, PartialEq)]
pub struct Loaded<T> {
  /// The actual data
  pub data: T,
  /// Where the data came from
  pub source: CacheSource,
}

impl<T> Loaded<T> {
  /// Fresh data from the remote store.
  pub fn from_network(data: T) -> Self {
    Self {
      data,
      source: CacheSource::Network,
    }
  }

  /// Last cached snapshot.
  pub fn from_cache(data: T, source: CacheSource) -> Self {
    Self { data, source }
  }

  /// Whether the data is a cached snapshot; drives the offline banner.
  pub fn is_cached(&self) -> bool {
    self.source != CacheSource::Network
  }
}

/// Indicates where routed data came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheSource {
  /// Fresh data from network
  Network,
  /// Online, but the remote fetch failed so the cache was served
  Fallback,
  /// Offline mode - network not attempted, serving cached data
  Offline,
}
