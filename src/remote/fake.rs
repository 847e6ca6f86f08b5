//! In-memory remote store for tests.

use color_eyre::{eyre::eyre, Result};
use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Mutex;

use super::types::{Category, Item, ItemPatch, NewCategory, NewItem, Profile};
use super::RemoteStore;

#[derive(Default)]
pub struct Calls {
  pub list_items: AtomicU32,
  pub list_categories: AtomicU32,
  pub list_profiles: AtomicU32,
  pub insert_item: AtomicU32,
  pub update_item: AtomicU32,
  pub soft_delete_item: AtomicU32,
  pub insert_category: AtomicU32,
}

impl Calls {
  pub fn get(counter: &AtomicU32) -> u32 {
    counter.load(Ordering::SeqCst)
  }
}

/// Remote store backed by vectors, with failure injection.
#[derive(Default)]
pub struct FakeRemote {
  pub items: Mutex<Vec<Item>>,
  pub categories: Mutex<Vec<Category>>,
  pub profiles: Mutex<Vec<Profile>>,
  /// Every call fails while set
  pub unreachable: AtomicBool,
  /// Names of items whose insert or update is rejected
  pub reject_items: Mutex<HashSet<String>>,
  /// Recorded update patches, in call order
  pub patches: Mutex<Vec<(String, ItemPatch)>>,
  pub inserted_items: Mutex<Vec<NewItem>>,
  pub calls: Calls,
  next_id: AtomicU32,
}

impl FakeRemote {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn set_unreachable(&self, unreachable: bool) {
    self.unreachable.store(unreachable, Ordering::SeqCst);
  }

  pub fn reject_item(&self, name: &str) {
    self.reject_items.lock().unwrap().insert(name.to_string());
  }

  pub fn seed_item(&self, item: Item) {
    self.items.lock().unwrap().push(item);
  }

  fn check_reachable(&self) -> Result<()> {
    if self.unreachable.load(Ordering::SeqCst) {
      return Err(eyre!("error sending request: connection refused"));
    }
    Ok(())
  }

  fn next_id(&self, prefix: &str) -> String {
    format!("{}-{}", prefix, self.next_id.fetch_add(1, Ordering::SeqCst) + 1)
  }
}

impl RemoteStore for FakeRemote {
  async fn list_items(&self) -> Result<Vec<Item>> {
    self.calls.list_items.fetch_add(1, Ordering::SeqCst);
    self.check_reachable()?;

    let items = self.items.lock().unwrap();
    Ok(items.iter().filter(|i| !i.is_deleted).cloned().collect())
  }

  async fn list_categories(&self) -> Result<Vec<Category>> {
    self.calls.list_categories.fetch_add(1, Ordering::SeqCst);
    self.check_reachable()?;
    Ok(self.categories.lock().unwrap().clone())
  }

  async fn list_profiles(&self) -> Result<Vec<Profile>> {
    self.calls.list_profiles.fetch_add(1, Ordering::SeqCst);
    self.check_reachable()?;
    Ok(self.profiles.lock().unwrap().clone())
  }

  async fn insert_item(&self, item: &NewItem) -> Result<Item> {
    self.calls.insert_item.fetch_add(1, Ordering::SeqCst);
    self.check_reachable()?;
    if self.reject_items.lock().unwrap().contains(&item.name) {
      return Err(eyre!("new row violates row-level security policy"));
    }

    let record = item.to_local_item(&self.next_id("item"), "2024-06-01T00:00:00Z");
    self.inserted_items.lock().unwrap().push(item.clone());
    self.items.lock().unwrap().push(record.clone());
    Ok(record)
  }

  async fn update_item(&self, id: &str, patch: &ItemPatch) -> Result<()> {
    self.calls.update_item.fetch_add(1, Ordering::SeqCst);
    self.check_reachable()?;

    let mut items = self.items.lock().unwrap();
    let item = items
      .iter_mut()
      .find(|i| i.id == id)
      .ok_or_else(|| eyre!("item {} not found", id))?;
    if self.reject_items.lock().unwrap().contains(&item.name) {
      return Err(eyre!("permission denied for item {}", id));
    }

    patch.apply_to(item);
    self.patches.lock().unwrap().push((id.to_string(), patch.clone()));
    Ok(())
  }

  async fn soft_delete_item(&self, id: &str, _deleted_at: &str) -> Result<()> {
    self.calls.soft_delete_item.fetch_add(1, Ordering::SeqCst);
    self.check_reachable()?;

    let mut items = self.items.lock().unwrap();
    let item = items
      .iter_mut()
      .find(|i| i.id == id)
      .ok_or_else(|| eyre!("item {} not found", id))?;
    item.is_deleted = true;
    Ok(())
  }

  async fn insert_category(&self, category: &NewCategory) -> Result<Category> {
    self.calls.insert_category.fetch_add(1, Ordering::SeqCst);
    self.check_reachable()?;

    let record = category.to_local_category(&self.next_id("cat"), "2024-06-01T00:00:00Z");
    self.categories.lock().unwrap().push(record.clone());
    Ok(record)
  }
}
