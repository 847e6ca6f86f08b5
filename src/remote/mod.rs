//! Remote store collaborator: the authoritative backend.
//!
//! The sync core only needs CRUD on items and categories plus listing of
//! profiles. Every call fails with an error when the network is unreachable,
//! which is what the read router relies on to fall back to the cache.

pub mod cache;
pub mod client;
#[cfg(test)]
pub mod fake;
pub mod types;

use color_eyre::Result;
use std::future::Future;

pub use client::RestClient;
pub use types::{Category, Item, ItemPatch, NewCategory, NewItem, Profile};

/// Operations the sync core consumes from the remote store.
pub trait RemoteStore: Send + Sync {
  /// Active (not soft-deleted) items, newest first.
  fn list_items(&self) -> impl Future<Output = Result<Vec<Item>>> + Send;

  /// All categories ordered by name.
  fn list_categories(&self) -> impl Future<Output = Result<Vec<Category>>> + Send;

  fn list_profiles(&self) -> impl Future<Output = Result<Vec<Profile>>> + Send;

  /// Insert an item and return the stored record with its remote id.
  fn insert_item(&self, item: &NewItem) -> impl Future<Output = Result<Item>> + Send;

  fn update_item(&self, id: &str, patch: &ItemPatch) -> impl Future<Output = Result<()>> + Send;

  /// Mark an item deleted without removing the row.
  fn soft_delete_item(
    &self,
    id: &str,
    deleted_at: &str,
  ) -> impl Future<Output = Result<()>> + Send;

  fn insert_category(
    &self,
    category: &NewCategory,
  ) -> impl Future<Output = Result<Category>> + Send;
}
