//! Durable FIFO log of writes made while offline.
//!
//! Every action is persisted before `enqueue` returns and is only ever
//! modified to flip its `synced` flag. Replay order is ascending id.

use chrono::{DateTime, Utc};
use color_eyre::{eyre::eyre, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use tracing::debug;

use crate::cache::{ActionRow, SqliteStorage};
use crate::remote::types::{ItemPatch, NewCategory, NewItem};

/// Prefix of ids generated locally for rows the remote has not created yet
pub const PLACEHOLDER_PREFIX: &str = "local-";

pub fn new_placeholder_id() -> String {
  format!("{}{}", PLACEHOLDER_PREFIX, uuid::Uuid::new_v4())
}

pub fn is_placeholder(id: &str) -> bool {
  id.starts_with(PLACEHOLDER_PREFIX)
}

/// Kind of queued mutation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionType {
  AddItem,
  UpdateItem,
  DeleteItem,
  UpdateQuantity,
  AddCategory,
}

impl ActionType {
  pub fn as_str(&self) -> &'static str {
    match self {
      Self::AddItem => "add_item",
      Self::UpdateItem => "update_item",
      Self::DeleteItem => "delete_item",
      Self::UpdateQuantity => "update_quantity",
      Self::AddCategory => "add_category",
    }
  }
}

impl fmt::Display for ActionType {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.as_str())
  }
}

/// Typed payload of a queued mutation, tagged by action type.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum ActionPayload {
  AddItem(NewItem),
  UpdateItem(ItemPatch),
  DeleteItem,
  UpdateQuantity { quantity: u32 },
  AddCategory(NewCategory),
}

impl ActionPayload {
  pub fn action_type(&self) -> ActionType {
    match self {
      Self::AddItem(_) => ActionType::AddItem,
      Self::UpdateItem(_) => ActionType::UpdateItem,
      Self::DeleteItem => ActionType::DeleteItem,
      Self::UpdateQuantity { .. } => ActionType::UpdateQuantity,
      Self::AddCategory(_) => ActionType::AddCategory,
    }
  }
}

/// A queued mutation awaiting replay
#[derive(Debug, Clone, PartialEq)]
pub struct PendingAction {
  /// Ordering key, assigned locally
  pub id: i64,
  /// Affected entity; a `local-` placeholder for inserts made offline
  pub entity_id: String,
  pub payload: ActionPayload,
  /// Creation time, milliseconds since the epoch
  pub timestamp: i64,
  pub synced: bool,
}

impl PendingAction {
  pub fn action_type(&self) -> ActionType {
    self.payload.action_type()
  }

  pub fn created_at(&self) -> Option<DateTime<Utc>> {
    DateTime::from_timestamp_millis(self.timestamp)
  }

  fn from_row(row: ActionRow) -> Result<Self> {
    let payload: ActionPayload = serde_json::from_slice(&row.data)
      .map_err(|e| eyre!("Corrupt payload for queued action {}: {}", row.id, e))?;

    Ok(Self {
      id: row.id,
      entity_id: row.entity_id,
      payload,
      timestamp: row.timestamp,
      synced: row.synced,
    })
  }
}

/// Logical queue over the local store
#[derive(Clone)]
pub struct ActionQueue {
  storage: Arc<SqliteStorage>,
}

impl ActionQueue {
  pub fn new(storage: Arc<SqliteStorage>) -> Self {
    Self { storage }
  }

  /// Append an unsynced action. Purely local, never touches the network.
  pub fn enqueue(&self, entity_id: &str, payload: ActionPayload) -> Result<i64> {
    let action_type = payload.action_type();
    let data =
      serde_json::to_vec(&payload).map_err(|e| eyre!("Failed to serialize action: {}", e))?;
    let timestamp = Utc::now().timestamp_millis();

    let id = self
      .storage
      .insert_action(action_type.as_str(), entity_id, &data, timestamp)?;
    debug!(id, %action_type, entity_id, "queued offline action");

    Ok(id)
  }

  /// Unsynced actions in replay order.
  pub fn list_unsynced(&self) -> Result<Vec<PendingAction>> {
    self
      .storage
      .list_actions(true)?
      .into_iter()
      .map(PendingAction::from_row)
      .collect()
  }

  /// Every stored action, synced or not, in id order.
  pub fn list_all(&self) -> Result<Vec<PendingAction>> {
    self
      .storage
      .list_actions(false)?
      .into_iter()
      .map(PendingAction::from_row)
      .collect()
  }

  /// Idempotent.
  pub fn mark_synced(&self, id: i64) -> Result<()> {
    self.storage.mark_action_synced(id)
  }

  /// Remove synced actions. Never touches unsynced ones.
  pub fn purge_synced(&self) -> Result<usize> {
    self.storage.purge_synced_actions()
  }

  pub fn pending_count(&self) -> Result<usize> {
    self.storage.count_unsynced()
  }
}
