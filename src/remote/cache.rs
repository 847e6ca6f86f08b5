//! Caching implementations for remote records.

use crate::cache::Cacheable;

use super::types::{Category, Item, Profile};

impl Cacheable for Item {
  fn cache_key(&self) -> &str {
    &self.id
  }

  fn updated_at(&self) -> Option<&str> {
    Some(&self.updated_at)
  }

  fn label(&self) -> Option<&str> {
    Some(&self.category)
  }

  fn is_deleted(&self) -> bool {
    self.is_deleted
  }

  fn table() -> &'static str {
    "items"
  }
}

impl Cacheable for Category {
  fn cache_key(&self) -> &str {
    &self.id
  }

  fn label(&self) -> Option<&str> {
    Some(&self.name)
  }

  fn table() -> &'static str {
    "categories"
  }
}

impl Cacheable for Profile {
  fn cache_key(&self) -> &str {
    &self.id
  }

  fn label(&self) -> Option<&str> {
    Some(&self.email)
  }

  fn table() -> &'static str {
    "profiles"
  }
}
