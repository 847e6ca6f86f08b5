//! Offline-aware inventory facade.
//!
//! Reads go through the read router. Writes go straight to the remote when
//! the caller says it is online; otherwise (or if the direct write fails)
//! they are queued and reflected in the local cache right away so the next
//! read shows them.

use chrono::Utc;
use color_eyre::{eyre::eyre, Result};
use std::sync::Arc;
use tracing::{info, warn};

use crate::cache::{CacheStorage, SqliteStorage};
use crate::queue::{is_placeholder, new_placeholder_id, ActionPayload, ActionQueue};
use crate::remote::{Item, ItemPatch, NewCategory, NewItem, RemoteStore};
use crate::router::ReadRouter;
use crate::sync::{SyncEngine, SyncResult};

/// How a write was carried out
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WriteOutcome {
  /// Accepted by the remote store
  Applied { entity_id: String },
  /// Stored in the action queue for the next sync
  Queued { entity_id: String, action_id: i64 },
}

impl WriteOutcome {
  pub fn entity_id(&self) -> &str {
    match self {
      Self::Applied { entity_id } | Self::Queued { entity_id, .. } => entity_id,
    }
  }
}

pub struct Inventory<R: RemoteStore> {
  remote: Arc<R>,
  storage: Arc<SqliteStorage>,
  queue: ActionQueue,
  router: ReadRouter<R>,
  engine: Arc<SyncEngine<R>>,
  /// Stamped as `created_by` on new rows
  user_id: Option<String>,
}

impl<R: RemoteStore> Inventory<R> {
  pub fn new(remote: Arc<R>, storage: Arc<SqliteStorage>, user_id: Option<String>) -> Self {
    Self {
      queue: ActionQueue::new(Arc::clone(&storage)),
      router: ReadRouter::new(Arc::clone(&remote), Arc::clone(&storage)),
      engine: Arc::new(SyncEngine::new(Arc::clone(&remote), Arc::clone(&storage))),
      remote,
      storage,
      user_id,
    }
  }

  pub fn reads(&self) -> &ReadRouter<R> {
    &self.router
  }

  pub fn queue(&self) -> &ActionQueue {
    &self.queue
  }

  pub fn engine(&self) -> Arc<SyncEngine<R>> {
    Arc::clone(&self.engine)
  }

  pub async fn sync(&self) -> SyncResult {
    self.engine.sync_pending_actions().await
  }

  pub fn pending_count(&self) -> Result<usize> {
    self.queue.pending_count()
  }

  pub async fn add_item(&self, is_online: bool, mut item: NewItem) -> Result<WriteOutcome> {
    if item.created_by.is_none() {
      item.created_by = self.user_id.clone();
    }

    if is_online {
      match self.remote.insert_item(&item).await {
        Ok(record) => {
          let entity_id = record.id.clone();
          self.storage.put_all(&[record])?;
          return Ok(WriteOutcome::Applied { entity_id });
        }
        Err(e) => warn!(error = %e, "Direct insert failed, queueing item"),
      }
    }

    let entity_id = new_placeholder_id();
    self
      .storage
      .put_all(&[item.to_local_item(&entity_id, &now())])?;
    let action_id = self.queue.enqueue(&entity_id, ActionPayload::AddItem(item))?;

    Ok(WriteOutcome::Queued {
      entity_id,
      action_id,
    })
  }

  pub async fn update_item(&self, is_online: bool, id: &str, patch: ItemPatch) -> Result<WriteOutcome> {
    if patch.is_empty() {
      return Err(eyre!("Nothing to update for item {}", id));
    }
    let id = self.resolve(id)?;
    let id = id.as_str();

    if self.should_write_direct(is_online, id) {
      match self.remote.update_item(id, &patch).await {
        Ok(()) => {
          self.patch_cached(id, |item| patch.apply_to(item))?;
          return Ok(applied(id));
        }
        Err(e) => warn!(id, error = %e, "Direct update failed, queueing"),
      }
    }

    self.patch_cached(id, |item| patch.apply_to(item))?;
    let action_id = self.queue.enqueue(id, ActionPayload::UpdateItem(patch))?;
    Ok(queued(id, action_id))
  }

  pub async fn set_quantity(&self, is_online: bool, id: &str, quantity: u32) -> Result<WriteOutcome> {
    let id = self.resolve(id)?;
    let id = id.as_str();
    if self.should_write_direct(is_online, id) {
      match self.remote.update_item(id, &ItemPatch::quantity(quantity)).await {
        Ok(()) => {
          self.patch_cached(id, |item| item.quantity = quantity)?;
          return Ok(applied(id));
        }
        Err(e) => warn!(id, error = %e, "Direct quantity update failed, queueing"),
      }
    }

    self.patch_cached(id, |item| item.quantity = quantity)?;
    let action_id = self
      .queue
      .enqueue(id, ActionPayload::UpdateQuantity { quantity })?;
    Ok(queued(id, action_id))
  }

  /// Add or remove stock relative to the cached quantity, never going below zero.
  pub async fn adjust_quantity(&self, is_online: bool, id: &str, change: i64) -> Result<WriteOutcome> {
    let id = self.resolve(id)?;
    let id = id.as_str();
    let item = self
      .storage
      .get_entity::<Item>(id)?
      .ok_or_else(|| eyre!("Item {} is not in the local cache", id))?;

    let quantity = (i64::from(item.quantity) + change).clamp(0, i64::from(u32::MAX)) as u32;
    self.set_quantity(is_online, id, quantity).await
  }

  pub async fn delete_item(&self, is_online: bool, id: &str) -> Result<WriteOutcome> {
    let id = self.resolve(id)?;
    let id = id.as_str();
    if self.should_write_direct(is_online, id) {
      match self.remote.soft_delete_item(id, &now()).await {
        Ok(()) => {
          self.patch_cached(id, |item| item.is_deleted = true)?;
          return Ok(applied(id));
        }
        Err(e) => warn!(id, error = %e, "Direct delete failed, queueing"),
      }
    }

    self.patch_cached(id, |item| item.is_deleted = true)?;
    let action_id = self.queue.enqueue(id, ActionPayload::DeleteItem)?;
    Ok(queued(id, action_id))
  }

  pub async fn add_category(&self, is_online: bool, name: &str) -> Result<WriteOutcome> {
    let category = NewCategory::new(name, self.user_id.clone());
    if category.name.is_empty() {
      return Err(eyre!("Category name cannot be empty"));
    }

    if is_online {
      match self.remote.insert_category(&category).await {
        Ok(record) => {
          let entity_id = record.id.clone();
          self.storage.put_all(&[record])?;
          return Ok(WriteOutcome::Applied { entity_id });
        }
        Err(e) => warn!(error = %e, "Direct category insert failed, queueing"),
      }
    }

    let entity_id = new_placeholder_id();
    self
      .storage
      .put_all(&[category.to_local_category(&entity_id, &now())])?;
    let action_id = self
      .queue
      .enqueue(&entity_id, ActionPayload::AddCategory(category))?;

    Ok(WriteOutcome::Queued {
      entity_id,
      action_id,
    })
  }

  /// Drop every cached row and queued action.
  pub fn logout(&self) -> Result<()> {
    self.storage.clear_all()?;
    info!("Cleared offline data");
    Ok(())
  }

  /// Swap a placeholder whose insert already landed for its remote id.
  fn resolve(&self, id: &str) -> Result<String> {
    if !is_placeholder(id) {
      return Ok(id.to_string());
    }
    Ok(self.storage.resolve_id(id)?.unwrap_or_else(|| id.to_string()))
  }

  /// Rows the remote has never seen can only be changed through the queue,
  /// so the change replays after their insert.
  fn should_write_direct(&self, is_online: bool, id: &str) -> bool {
    is_online && !is_placeholder(id)
  }

  /// Apply a change to the cached snapshot, if the row is cached.
  fn patch_cached<F: FnOnce(&mut Item)>(&self, id: &str, change: F) -> Result<()> {
    if let Some(mut item) = self.storage.get_entity::<Item>(id)? {
      change(&mut item);
      item.updated_at = now();
      self.storage.put_all(&[item])?;
    }
    Ok(())
  }
}

fn now() -> String {
  Utc::now().to_rfc3339()
}

fn applied(id: &str) -> WriteOutcome {
  WriteOutcome::Applied {
    entity_id: id.to_string(),
  }
}

fn queued(id: &str, action_id: i64) -> WriteOutcome {
  WriteOutcome::Queued {
    entity_id: id.to_string(),
    action_id,
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::cache::Loaded;
  use crate::remote::fake::{Calls, FakeRemote};
  use crate::remote::Category;

  fn setup() -> (Arc<FakeRemote>, Inventory<FakeRemote>) {
    let remote = Arc::new(FakeRemote::new());
    let storage = Arc::new(SqliteStorage::open_in_memory().unwrap());
    let inventory = Inventory::new(Arc::clone(&remote), storage, Some("user-1".to_string()));
    (remote, inventory)
  }

  fn names(loaded: &Loaded<Vec<Item>>) -> Vec<&str> {
    let mut names: Vec<&str> = loaded.data.iter().map(|i| i.name.as_str()).collect();
    names.sort();
    names
  }

  #[tokio::test]
  async fn test_offline_writes_are_queued_and_visible() {
    let (remote, inventory) = setup();

    let outcome = inventory
      .add_item(false, NewItem::new("Mouse", "PERIPHERALS", 5))
      .await
      .unwrap();
    assert!(matches!(outcome, WriteOutcome::Queued { .. }));
    assert!(is_placeholder(outcome.entity_id()));

    inventory
      .set_quantity(false, outcome.entity_id(), 8)
      .await
      .unwrap();

    let loaded = inventory.reads().load_items(false).await.unwrap();
    assert!(loaded.is_cached());
    assert_eq!(loaded.data.len(), 1);
    assert_eq!(loaded.data[0].quantity, 8);
    assert_eq!(loaded.data[0].created_by.as_deref(), Some("user-1"));
    assert_eq!(inventory.pending_count().unwrap(), 2);
    assert_eq!(Calls::get(&remote.calls.insert_item), 0);

    let result = inventory.sync().await;
    assert!(result.success, "{:?}", result.errors);
    assert_eq!(result.actions_synced, 2);

    let loaded = inventory.reads().load_items(false).await.unwrap();
    assert_eq!(loaded.data.len(), 1);
    assert_eq!(loaded.data[0].id, "item-1");
    assert_eq!(loaded.data[0].quantity, 8);
    assert_eq!(inventory.pending_count().unwrap(), 0);
  }

  #[tokio::test]
  async fn test_online_writes_go_direct() {
    let (remote, inventory) = setup();

    let outcome = inventory
      .add_item(true, NewItem::new("Mouse", "PERIPHERALS", 5))
      .await
      .unwrap();
    assert_eq!(outcome, applied("item-1"));

    inventory.adjust_quantity(true, "item-1", 3).await.unwrap();

    assert_eq!(inventory.pending_count().unwrap(), 0);
    assert_eq!(remote.items.lock().unwrap()[0].quantity, 8);
    let loaded = inventory.reads().load_items(false).await.unwrap();
    assert_eq!(loaded.data[0].quantity, 8);
  }

  #[tokio::test]
  async fn test_failed_direct_write_falls_back_to_queue() {
    let (remote, inventory) = setup();
    remote.set_unreachable(true);

    let outcome = inventory
      .add_category(true, "cables")
      .await
      .unwrap();

    assert!(matches!(outcome, WriteOutcome::Queued { .. }));
    assert_eq!(Calls::get(&remote.calls.insert_category), 1);
    let categories = inventory.reads().load_categories(true).await.unwrap();
    assert!(categories.is_cached());
    assert_eq!(categories.data[0].name, "CABLES");
    assert_eq!(categories.data[0].created_by.as_deref(), Some("user-1"));
  }

  #[tokio::test]
  async fn test_adjust_quantity_clamps_at_zero() {
    let (_remote, inventory) = setup();
    let outcome = inventory
      .add_item(false, NewItem::new("Saw", "TOOLS", 2))
      .await
      .unwrap();

    inventory
      .adjust_quantity(false, outcome.entity_id(), -5)
      .await
      .unwrap();

    let pending = inventory.queue().list_unsynced().unwrap();
    assert_eq!(pending[1].payload, ActionPayload::UpdateQuantity { quantity: 0 });
    let loaded = inventory.reads().load_items(false).await.unwrap();
    assert_eq!(loaded.data[0].quantity, 0);
  }

  #[tokio::test]
  async fn test_adjust_unknown_item_fails() {
    let (_remote, inventory) = setup();
    assert!(inventory.adjust_quantity(false, "missing", 1).await.is_err());
  }

  #[tokio::test]
  async fn test_offline_delete_hides_item() {
    let (remote, inventory) = setup();
    inventory
      .add_item(true, NewItem::new("Hammer", "TOOLS", 1))
      .await
      .unwrap();
    inventory
      .add_item(true, NewItem::new("Saw", "TOOLS", 1))
      .await
      .unwrap();

    inventory.delete_item(false, "item-1").await.unwrap();

    let loaded = inventory.reads().load_items(false).await.unwrap();
    assert_eq!(names(&loaded), vec!["Saw"]);
    assert_eq!(Calls::get(&remote.calls.soft_delete_item), 0);

    let result = inventory.sync().await;
    assert!(result.success, "{:?}", result.errors);
    assert!(remote.items.lock().unwrap()[0].is_deleted);
    let loaded = inventory.reads().load_items(true).await.unwrap();
    assert_eq!(names(&loaded), vec!["Saw"]);
  }

  #[tokio::test]
  async fn test_placeholder_rows_always_queue() {
    let (remote, inventory) = setup();
    let outcome = inventory
      .add_item(false, NewItem::new("Mouse", "PERIPHERALS", 5))
      .await
      .unwrap();

    let update = inventory
      .update_item(
        true,
        outcome.entity_id(),
        ItemPatch {
          name: Some("Trackball".to_string()),
          ..Default::default()
        },
      )
      .await
      .unwrap();

    assert!(matches!(update, WriteOutcome::Queued { .. }));
    assert_eq!(Calls::get(&remote.calls.update_item), 0);
  }

  #[tokio::test]
  async fn test_stale_placeholder_id_targets_remote_row() {
    let (remote, inventory) = setup();
    let outcome = inventory
      .add_item(false, NewItem::new("Mouse", "PERIPHERALS", 5))
      .await
      .unwrap();
    let placeholder = outcome.entity_id().to_string();
    assert!(inventory.sync().await.success);

    // The caller still holds the placeholder after the insert landed
    let update = inventory.set_quantity(true, &placeholder, 9).await.unwrap();
    assert_eq!(update, applied("item-1"));
    assert_eq!(remote.items.lock().unwrap()[0].quantity, 9);

    let queued = inventory.adjust_quantity(false, &placeholder, -4).await.unwrap();
    assert_eq!(queued.entity_id(), "item-1");
    let loaded = inventory.reads().load_items(false).await.unwrap();
    assert_eq!(loaded.data[0].quantity, 5);

    let result = inventory.sync().await;
    assert!(result.success, "{:?}", result.errors);
    assert_eq!(remote.items.lock().unwrap()[0].quantity, 5);
  }

  #[tokio::test]
  async fn test_empty_patch_rejected() {
    let (_remote, inventory) = setup();
    assert!(inventory
      .update_item(false, "item-1", ItemPatch::default())
      .await
      .is_err());
  }

  #[tokio::test]
  async fn test_logout_clears_everything() {
    let (_remote, inventory) = setup();
    inventory
      .add_item(false, NewItem::new("Mouse", "PERIPHERALS", 5))
      .await
      .unwrap();
    inventory.add_category(false, "mice").await.unwrap();

    inventory.logout().unwrap();

    assert_eq!(inventory.pending_count().unwrap(), 0);
    assert!(inventory.reads().load_items(false).await.unwrap().data.is_empty());
    let categories: Loaded<Vec<Category>> = inventory.reads().load_categories(false).await.unwrap();
    assert!(categories.data.is_empty());
  }
}
