//! Read router: single entry point for items, categories and profiles.

use color_eyre::Result;
use std::sync::Arc;

use crate::cache::{CacheLayer, Loaded, SqliteStorage};
use crate::remote::{Category, Item, Profile, RemoteStore};

/// Remote store reads with transparent cache fallback.
///
/// Every successful remote read refreshes the local cache. Callers get a
/// `Loaded` whose source tells them whether they are looking at stale data.
pub struct ReadRouter<R: RemoteStore> {
  remote: Arc<R>,
  cache: CacheLayer<SqliteStorage>,
}

impl<R: RemoteStore> ReadRouter<R> {
  pub fn new(remote: Arc<R>, storage: Arc<SqliteStorage>) -> Self {
    Self {
      remote,
      cache: CacheLayer::new(storage),
    }
  }

  /// Active items. Deleted rows are filtered remotely and in the cache.
  pub async fn load_items(&self, is_online: bool) -> Result<Loaded<Vec<Item>>> {
    self
      .cache
      .fetch_list(is_online, || self.remote.list_items())
      .await
  }

  pub async fn load_categories(&self, is_online: bool) -> Result<Loaded<Vec<Category>>> {
    self
      .cache
      .fetch_list(is_online, || self.remote.list_categories())
      .await
  }

  pub async fn load_profiles(&self, is_online: bool) -> Result<Loaded<Vec<Profile>>> {
    self
      .cache
      .fetch_list(is_online, || self.remote.list_profiles())
      .await
  }

  /// Pull the active item set from the remote and cache it. Errors propagate.
  pub async fn fetch_and_cache_items(&self) -> Result<Vec<Item>> {
    self.cache.refresh(|| self.remote.list_items()).await
  }
}

impl<R: RemoteStore> Clone for ReadRouter<R> {
  fn clone(&self) -> Self {
    Self {
      remote: Arc::clone(&self.remote),
      cache: self.cache.clone(),
    }
  }
}
