//! Cache layer that routes reads between the network and local storage.

use color_eyre::Result;
use std::future::Future;
use std::sync::Arc;
use tracing::warn;

use super::storage::CacheStorage;
use super::traits::{CacheSource, Cacheable, Loaded};

/// Cache layer that manages write-through caching and offline fallback.
///
/// This layer sits between the application and the remote store. It never
/// decides connectivity itself; callers pass what their detector reports.
pub struct CacheLayer<S: CacheStorage> {
  storage: Arc<S>,
}

impl<S: CacheStorage> CacheLayer<S> {
  /// Create a new cache layer over a shared storage backend.
  pub fn new(storage: Arc<S>) -> Self {
    Self { storage }
  }

  #[allow(dead_code)]
  pub fn storage(&self) -> &Arc<S> {
    &self.storage
  }

  /// Fetch a list, falling back to the cached snapshot.
  ///
  /// 1. Online: fetch from network, write through to the cache, return fresh data
  /// 2. Online but the fetch fails: return the cached snapshot
  /// 3. Offline: skip the network entirely and return the cached snapshot
  ///
  /// Soft-deleted rows are never returned, whichever branch is taken.
  pub async fn fetch_list<T, F, Fut>(&self, is_online: bool, fetcher: F) -> Result<Loaded<Vec<T>>>
  where
    T: Cacheable,
    F: FnOnce() -> Fut,
    Fut: Future<Output = Result<Vec<T>>>,
  {
    if !is_online {
      let cached = self.storage.get_active::<T>()?;
      return Ok(Loaded::from_cache(cached, CacheSource::Offline));
    }

    match fetcher().await {
      Ok(mut data) => {
        self.storage.put_all(&data)?;
        data.retain(|entity| !entity.is_deleted());
        Ok(Loaded::from_network(data))
      }
      Err(e) => {
        warn!(table = T::table(), error = %e, "Remote fetch failed, serving cached data");
        let cached = self.storage.get_active::<T>()?;
        Ok(Loaded::from_cache(cached, CacheSource::Fallback))
      }
    }
  }

  /// Fetch from network and write through, without any fallback.
  pub async fn refresh<T, F, Fut>(&self, fetcher: F) -> Result<Vec<T>>
  where
    T: Cacheable,
    F: FnOnce() -> Fut,
    Fut: Future<Output = Result<Vec<T>>>,
  {
    let data = fetcher().await?;
    self.storage.put_all(&data)?;
    Ok(data)
  }
}

impl<S: CacheStorage> Clone for CacheLayer<S> {
  fn clone(&self) -> Self {
    Self {
      storage: Arc::clone(&self.storage),
    }
  }
}
