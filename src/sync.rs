//! Sync engine: replays the offline action queue against the remote store.
//!
//! A run lists unsynced actions, applies them strictly in queue order, purges
//! the confirmed ones and re-pulls the item set. One rejected action never
//! blocks the others; it stays queued for the next run.
//!
//! Inserts made offline carry a `local-` placeholder id. When the remote
//! assigns the real id, the mapping is persisted and later actions on the
//! same placeholder are dispatched against the remote id. Reconciliation of
//! concurrent server-side edits is "last fetch wins": whatever the refresh
//! returns overwrites the cached rows.

use chrono::Utc;
use color_eyre::{eyre::eyre, Result};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, error, info, warn};

use crate::cache::{CacheStorage, Cacheable, SqliteStorage};
use crate::queue::{is_placeholder, ActionPayload, ActionQueue, PendingAction};
use crate::remote::{Item, ItemPatch, RemoteStore};
use crate::router::ReadRouter;

/// Summary of one sync run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncResult {
  /// True iff no error was recorded
  pub success: bool,
  /// Actions confirmed by the remote during this run
  pub actions_synced: usize,
  /// Active items in the cache after the closing refresh
  pub items_synced: usize,
  /// One message per failed action, plus any infrastructure failure
  pub errors: Vec<String>,
}

impl Default for SyncResult {
  fn default() -> Self {
    Self {
      success: true,
      actions_synced: 0,
      items_synced: 0,
      errors: Vec::new(),
    }
  }
}

pub struct SyncEngine<R: RemoteStore> {
  remote: Arc<R>,
  storage: Arc<SqliteStorage>,
  queue: ActionQueue,
  router: ReadRouter<R>,
  /// Serialises runs; replay must stay sequential
  running: Mutex<()>,
}

impl<R: RemoteStore> SyncEngine<R> {
  pub fn new(remote: Arc<R>, storage: Arc<SqliteStorage>) -> Self {
    Self {
      queue: ActionQueue::new(Arc::clone(&storage)),
      router: ReadRouter::new(Arc::clone(&remote), Arc::clone(&storage)),
      remote,
      storage,
      running: Mutex::new(()),
    }
  }

  /// Drain the queue. Never returns an error: failures land in the result.
  pub async fn sync_pending_actions(&self) -> SyncResult {
    let _running = self.running.lock().await;
    let mut result = SyncResult::default();

    if let Err(e) = self.drain(&mut result).await {
      error!(error = %e, "Sync run aborted");
      result.errors.push(e.to_string());
    }

    result.success = result.errors.is_empty();
    result
  }

  async fn drain(&self, result: &mut SyncResult) -> Result<()> {
    let pending = self.queue.list_unsynced()?;
    if pending.is_empty() {
      return Ok(());
    }

    info!(count = pending.len(), "Syncing pending actions");

    for action in &pending {
      match self.apply(action).await {
        Ok(()) => result.actions_synced += 1,
        Err(e) => {
          warn!(id = action.id, action_type = %action.action_type(), error = %e, "Failed to sync action");
          result
            .errors
            .push(format!("Failed to sync {}: {}", action.action_type(), e));
        }
      }
    }

    let purged = self.queue.purge_synced()?;
    self.router.fetch_and_cache_items().await?;
    result.items_synced = self.storage.get_active::<Item>()?.len();

    info!(
      synced = result.actions_synced,
      failed = result.errors.len(),
      purged,
      items = result.items_synced,
      "Sync run finished"
    );

    Ok(())
  }

  /// Dispatch one action and record its success locally.
  async fn apply(&self, action: &PendingAction) -> Result<()> {
    match &action.payload {
      ActionPayload::AddItem(new_item) => {
        let mut new_item = new_item.clone();
        if let Some(category_id) = new_item.category_id.as_mut() {
          *category_id = self.remote_id(category_id)?;
        }

        let record = self.remote.insert_item(&new_item).await?;
        self.complete_insert(action, &record)
      }
      ActionPayload::UpdateItem(patch) => {
        let id = self.remote_id(&action.entity_id)?;
        let mut patch = patch.clone();
        if let Some(Some(category_id)) = patch.category_id.as_mut() {
          *category_id = self.remote_id(category_id)?;
        }

        self.remote.update_item(&id, &patch).await?;
        self.queue.mark_synced(action.id)
      }
      ActionPayload::UpdateQuantity { quantity } => {
        let id = self.remote_id(&action.entity_id)?;

        self
          .remote
          .update_item(&id, &ItemPatch::quantity(*quantity))
          .await?;
        self.queue.mark_synced(action.id)
      }
      ActionPayload::DeleteItem => {
        let id = self.remote_id(&action.entity_id)?;
        let deleted_at = Utc::now().to_rfc3339();

        self.remote.soft_delete_item(&id, &deleted_at).await?;

        // The refresh only pulls active rows, so hide the cached one here
        if let Some(mut item) = self.storage.get_entity::<Item>(&id)? {
          item.is_deleted = true;
          self.storage.put_all(&[item])?;
        }
        self.queue.mark_synced(action.id)
      }
      ActionPayload::AddCategory(new_category) => {
        let record = self.remote.insert_category(new_category).await?;
        self.complete_insert(action, &record)
      }
    }
  }

  fn complete_insert<T: Cacheable>(&self, action: &PendingAction, record: &T) -> Result<()> {
    if !is_placeholder(&action.entity_id) {
      self.storage.put_all(std::slice::from_ref(record))?;
      return self.queue.mark_synced(action.id);
    }

    debug!(
      placeholder = %action.entity_id,
      remote_id = record.cache_key(),
      "Remapped placeholder id"
    );
    self
      .storage
      .complete_insert(action.id, &action.entity_id, record)
  }

  /// Map a placeholder to its remote id. Real ids pass through.
  fn remote_id(&self, entity_id: &str) -> Result<String> {
    if !is_placeholder(entity_id) {
      return Ok(entity_id.to_string());
    }

    self
      .storage
      .resolve_id(entity_id)?
      .ok_or_else(|| eyre!("{} has not been created remotely yet", entity_id))
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::remote::fake::{Calls, FakeRemote};
  use crate::remote::types::{NewCategory, NewItem};

  struct Harness {
    remote: Arc<FakeRemote>,
    storage: Arc<SqliteStorage>,
    queue: ActionQueue,
    engine: SyncEngine<FakeRemote>,
  }

  fn harness() -> Harness {
    let remote = Arc::new(FakeRemote::new());
    let storage = Arc::new(SqliteStorage::open_in_memory().unwrap());
    Harness {
      queue: ActionQueue::new(Arc::clone(&storage)),
      engine: SyncEngine::new(Arc::clone(&remote), Arc::clone(&storage)),
      remote,
      storage,
    }
  }

  fn remote_item(id: &str, name: &str, quantity: u32) -> Item {
    NewItem::new(name, "TOOLS", quantity).to_local_item(id, "2024-01-01T00:00:00Z")
  }

  #[tokio::test]
  async fn test_empty_queue_is_a_noop() {
    let h = harness();

    let result = h.engine.sync_pending_actions().await;

    assert_eq!(result, SyncResult::default());
    assert!(result.success);
    assert_eq!(Calls::get(&h.remote.calls.list_items), 0);
  }

  #[tokio::test]
  async fn test_partial_failure_keeps_only_failed_action() {
    let h = harness();
    h.remote.seed_item(remote_item("a", "Hammer", 1));
    h.remote.seed_item(remote_item("b", "Saw", 1));
    h.remote.seed_item(remote_item("c", "Drill", 1));
    h.remote.reject_item("Saw");

    h.queue
      .enqueue("a", ActionPayload::UpdateQuantity { quantity: 4 })
      .unwrap();
    let failing = h
      .queue
      .enqueue("b", ActionPayload::UpdateItem(ItemPatch::quantity(2)))
      .unwrap();
    h.queue.enqueue("c", ActionPayload::DeleteItem).unwrap();

    let result = h.engine.sync_pending_actions().await;

    assert_eq!(result.actions_synced, 2);
    assert_eq!(result.errors.len(), 1);
    assert!(result.errors[0].contains("update_item"));
    assert!(!result.success);

    let remaining = h.queue.list_all().unwrap();
    assert_eq!(remaining.len(), 1);
    assert_eq!(remaining[0].id, failing);
    assert!(!remaining[0].synced);
  }

  #[tokio::test]
  async fn test_offline_add_then_update_replays_in_order() {
    let h = harness();
    let add = NewItem::new("Mouse", "PERIPHERALS", 5);
    h.queue
      .enqueue("local-1", ActionPayload::AddItem(add.clone()))
      .unwrap();
    h.queue
      .enqueue("local-1", ActionPayload::UpdateQuantity { quantity: 8 })
      .unwrap();

    let result = h.engine.sync_pending_actions().await;

    assert!(result.success, "{:?}", result.errors);
    assert_eq!(result.actions_synced, 2);
    assert_eq!(result.items_synced, 1);

    assert_eq!(Calls::get(&h.remote.calls.insert_item), 1);
    assert_eq!(*h.remote.inserted_items.lock().unwrap(), vec![add]);
    assert_eq!(Calls::get(&h.remote.calls.update_item), 1);
    let patches = h.remote.patches.lock().unwrap().clone();
    assert_eq!(patches, vec![("item-1".to_string(), ItemPatch::quantity(8))]);

    assert!(h.queue.list_all().unwrap().is_empty());

    let items = h.storage.get_active::<Item>().unwrap();
    assert_eq!(items.len(), 1);
    assert_eq!(items[0].name, "Mouse");
    assert_eq!(items[0].quantity, 8);
    assert_eq!(items[0].id, "item-1");
  }

  #[tokio::test]
  async fn test_update_waits_for_failed_insert() {
    let h = harness();
    h.remote.reject_item("Mouse");
    h.queue
      .enqueue(
        "local-1",
        ActionPayload::AddItem(NewItem::new("Mouse", "PERIPHERALS", 5)),
      )
      .unwrap();
    h.queue
      .enqueue("local-1", ActionPayload::UpdateQuantity { quantity: 8 })
      .unwrap();

    let result = h.engine.sync_pending_actions().await;

    assert_eq!(result.actions_synced, 0);
    assert_eq!(result.errors.len(), 2);
    assert!(result.errors[1].contains("update_quantity"));
    assert_eq!(Calls::get(&h.remote.calls.update_item), 0);
    assert_eq!(h.queue.pending_count().unwrap(), 2);

    // Once the remote accepts the insert, both replay in order
    h.remote.reject_items.lock().unwrap().clear();
    let result = h.engine.sync_pending_actions().await;

    assert!(result.success, "{:?}", result.errors);
    assert_eq!(result.actions_synced, 2);
    assert_eq!(h.queue.pending_count().unwrap(), 0);
  }

  #[tokio::test]
  async fn test_infrastructure_failure_leaves_queue_intact() {
    let h = harness();
    h.queue.enqueue("a", ActionPayload::DeleteItem).unwrap();
    h.remote.set_unreachable(true);

    let result = h.engine.sync_pending_actions().await;

    assert!(!result.success);
    assert_eq!(result.actions_synced, 0);
    // One per-action error plus the failed refresh
    assert_eq!(result.errors.len(), 2);
    assert!(result.errors[0].starts_with("Failed to sync delete_item"));
    assert_eq!(h.queue.pending_count().unwrap(), 1);
  }

  #[tokio::test]
  async fn test_delete_hides_cached_row() {
    let h = harness();
    h.remote.seed_item(remote_item("a", "Hammer", 1));
    h.storage.put_all(&[remote_item("a", "Hammer", 1)]).unwrap();
    h.queue.enqueue("a", ActionPayload::DeleteItem).unwrap();

    let result = h.engine.sync_pending_actions().await;

    assert!(result.success, "{:?}", result.errors);
    assert_eq!(result.items_synced, 0);
    assert!(h.storage.get_active::<Item>().unwrap().is_empty());
    assert!(h.storage.get_entity::<Item>("a").unwrap().unwrap().is_deleted);
  }

  #[tokio::test]
  async fn test_item_in_offline_category_gets_remote_category_id() {
    let h = harness();
    h.queue
      .enqueue(
        "local-cat",
        ActionPayload::AddCategory(NewCategory::new("cables", None)),
      )
      .unwrap();
    let mut cable = NewItem::new("USB-C cable", "CABLES", 12);
    cable.category_id = Some("local-cat".to_string());
    h.queue
      .enqueue("local-item", ActionPayload::AddItem(cable))
      .unwrap();

    let result = h.engine.sync_pending_actions().await;

    assert!(result.success, "{:?}", result.errors);
    let inserted = h.remote.inserted_items.lock().unwrap().clone();
    assert_eq!(inserted[0].category_id.as_deref(), Some("cat-1"));
    assert_eq!(h.remote.categories.lock().unwrap()[0].name, "CABLES");
  }

  #[tokio::test]
  async fn test_failed_item_keeps_offline_category_mapping() {
    let h = harness();
    h.remote.reject_item("USB-C cable");
    h.queue
      .enqueue(
        "local-cat",
        ActionPayload::AddCategory(NewCategory::new("cables", None)),
      )
      .unwrap();
    let mut cable = NewItem::new("USB-C cable", "CABLES", 12);
    cable.category_id = Some("local-cat".to_string());
    h.queue
      .enqueue("local-item", ActionPayload::AddItem(cable))
      .unwrap();

    let result = h.engine.sync_pending_actions().await;
    assert_eq!(result.actions_synced, 1);
    assert_eq!(result.errors.len(), 1);
    assert!(result.errors[0].starts_with("Failed to sync add_item"));

    // The category action is purged, but the item still needs its remote id
    h.remote.reject_items.lock().unwrap().clear();
    let result = h.engine.sync_pending_actions().await;

    assert!(result.success, "{:?}", result.errors);
    assert_eq!(result.actions_synced, 1);
    assert_eq!(h.queue.pending_count().unwrap(), 0);
    let inserted = h.remote.inserted_items.lock().unwrap().clone();
    assert_eq!(inserted.len(), 1);
    assert_eq!(inserted[0].category_id.as_deref(), Some("cat-1"));
  }
}
