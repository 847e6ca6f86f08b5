//! Cache storage trait and SQLite implementation.

use color_eyre::{eyre::eyre, Result};
use rusqlite::{params, Connection, OptionalExtension, Transaction};
use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};

use super::traits::Cacheable;

/// Trait for snapshot storage backends.
///
/// Rows are always written as complete snapshots, so concurrent writers are
/// last-write-wins per row.
pub trait CacheStorage: Send + Sync {
  /// Upsert entities by key. Rows not present in the input are left alone.
  fn put_all<T: Cacheable>(&self, entities: &[T]) -> Result<()>;

  /// Every cached entity of a type, including soft-deleted ones.
  #[allow(dead_code)]
  fn get_all<T: Cacheable>(&self) -> Result<Vec<T>>;

  /// Cached entities that are not soft-deleted. Order is unspecified.
  fn get_active<T: Cacheable>(&self) -> Result<Vec<T>>;

  /// Get a single entity by key.
  fn get_entity<T: Cacheable>(&self, key: &str) -> Result<Option<T>>;

  /// Wipe every table in one step. Readers see either the old or the empty state.
  fn clear_all(&self) -> Result<()>;
}

/// A pending action row as persisted, before payload decoding.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActionRow {
  pub id: i64,
  pub action_type: String,
  pub entity_id: String,
  pub data: Vec<u8>,
  /// Creation time, milliseconds since the epoch
  pub timestamp: i64,
  pub synced: bool,
}

/// SQLite-based cache storage implementation.
pub struct SqliteStorage {
  conn: Mutex<Connection>,
}

impl SqliteStorage {
  /// Open (or create) the cache database at the given path.
  pub fn open(path: &Path) -> Result<Self> {
    // Ensure parent directory exists
    if let Some(parent) = path.parent() {
      std::fs::create_dir_all(parent)
        .map_err(|e| eyre!("Failed to create cache directory: {}", e))?;
    }

    let conn = Connection::open(path)
      .map_err(|e| eyre!("Failed to open cache database at {}: {}", path.display(), e))?;

    Self::with_connection(conn)
  }

  /// Open a throwaway database, used by tests.
  #[allow(dead_code)]
  pub fn open_in_memory() -> Result<Self> {
    let conn = Connection::open_in_memory()
      .map_err(|e| eyre!("Failed to open in-memory cache database: {}", e))?;

    Self::with_connection(conn)
  }

  fn with_connection(conn: Connection) -> Result<Self> {
    let storage = Self {
      conn: Mutex::new(conn),
    };
    storage.run_migrations()?;

    Ok(storage)
  }

  /// Default database path for a remote backend.
  ///
  /// Each backend URL gets its own file so switching projects never mixes
  /// cached rows or queued actions.
  pub fn default_path(remote_url: &str) -> Result<PathBuf> {
    let data_dir = dirs::data_dir()
      .or_else(|| dirs::home_dir().map(|p| p.join(".local/share")))
      .ok_or_else(|| eyre!("Could not determine data directory"))?;

    let mut hasher = Sha256::new();
    hasher.update(remote_url.trim_end_matches('/').as_bytes());
    let digest = hex::encode(hasher.finalize());

    Ok(data_dir.join("ndomog").join(format!("{}.db", &digest[..16])))
  }

  /// Run database migrations for cache tables.
  fn run_migrations(&self) -> Result<()> {
    let conn = self.lock()?;

    conn
      .execute_batch(CACHE_SCHEMA)
      .map_err(|e| eyre!("Failed to run cache migrations: {}", e))?;

    Ok(())
  }

  fn lock(&self) -> Result<MutexGuard<'_, Connection>> {
    self
      .conn
      .lock()
      .map_err(|e| eyre!("Lock poisoned: {}", e))
  }
}

/// Schema for cache tables.
const CACHE_SCHEMA: &str = r#"
-- Entity snapshots (serialized JSON plus indexed columns)
CREATE TABLE IF NOT EXISTS items (
    id TEXT PRIMARY KEY,
    data BLOB NOT NULL,
    label TEXT,
    is_deleted INTEGER NOT NULL DEFAULT 0,
    updated_at TEXT,
    cached_at TEXT NOT NULL DEFAULT (datetime('now'))
);

CREATE INDEX IF NOT EXISTS idx_items_label ON items(label);
CREATE INDEX IF NOT EXISTS idx_items_deleted ON items(is_deleted);
CREATE INDEX IF NOT EXISTS idx_items_updated ON items(updated_at);

CREATE TABLE IF NOT EXISTS categories (
    id TEXT PRIMARY KEY,
    data BLOB NOT NULL,
    label TEXT,
    is_deleted INTEGER NOT NULL DEFAULT 0,
    updated_at TEXT,
    cached_at TEXT NOT NULL DEFAULT (datetime('now'))
);

CREATE INDEX IF NOT EXISTS idx_categories_label ON categories(label);

CREATE TABLE IF NOT EXISTS profiles (
    id TEXT PRIMARY KEY,
    data BLOB NOT NULL,
    label TEXT,
    is_deleted INTEGER NOT NULL DEFAULT 0,
    updated_at TEXT,
    cached_at TEXT NOT NULL DEFAULT (datetime('now'))
);

CREATE INDEX IF NOT EXISTS idx_profiles_label ON profiles(label);

-- Offline mutation log; AUTOINCREMENT keeps ids monotonic across purges
CREATE TABLE IF NOT EXISTS pending_actions (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    action_type TEXT NOT NULL,
    entity_id TEXT NOT NULL,
    data BLOB NOT NULL,
    timestamp INTEGER NOT NULL,
    synced INTEGER NOT NULL DEFAULT 0
);

CREATE INDEX IF NOT EXISTS idx_pending_actions_type ON pending_actions(action_type);
CREATE INDEX IF NOT EXISTS idx_pending_actions_entity ON pending_actions(entity_id);
CREATE INDEX IF NOT EXISTS idx_pending_actions_timestamp ON pending_actions(timestamp);
CREATE INDEX IF NOT EXISTS idx_pending_actions_synced ON pending_actions(synced);

-- Local placeholder id -> remote id, filled when a queued insert lands
CREATE TABLE IF NOT EXISTS id_remap (
    placeholder TEXT PRIMARY KEY,
    remote_id TEXT NOT NULL,
    mapped_at TEXT NOT NULL DEFAULT (datetime('now'))
);
"#;

const ENTITY_TABLES: &[&str] = &["items", "categories", "profiles"];

fn upsert_entity<T: Cacheable>(conn: &Connection, entity: &T) -> Result<()> {
  let data = serde_json::to_vec(entity).map_err(|e| eyre!("Failed to serialize entity: {}", e))?;

  conn
    .execute(
      &format!(
        "INSERT OR REPLACE INTO {} (id, data, label, is_deleted, updated_at, cached_at)
         VALUES (?, ?, ?, ?, ?, datetime('now'))",
        T::table()
      ),
      params![
        entity.cache_key(),
        data,
        entity.label(),
        entity.is_deleted(),
        entity.updated_at()
      ],
    )
    .map_err(|e| eyre!("Failed to store {} row: {}", T::table(), e))?;

  Ok(())
}

fn select_entities<T: Cacheable>(conn: &Connection, active_only: bool) -> Result<Vec<T>> {
  let filter = if active_only { " WHERE is_deleted = 0" } else { "" };
  let mut stmt = conn
    .prepare(&format!("SELECT data FROM {}{}", T::table(), filter))
    .map_err(|e| eyre!("Failed to prepare {} query: {}", T::table(), e))?;

  let rows = stmt
    .query_map([], |row| row.get::<_, Vec<u8>>(0))
    .map_err(|e| eyre!("Failed to query {}: {}", T::table(), e))?;

  let mut entities = Vec::new();
  for row in rows {
    let data = row.map_err(|e| eyre!("Failed to read {} row: {}", T::table(), e))?;
    let entity = serde_json::from_slice(&data)
      .map_err(|e| eyre!("Corrupt {} row in cache: {}", T::table(), e))?;
    entities.push(entity);
  }

  Ok(entities)
}

fn begin(conn: &mut Connection) -> Result<Transaction<'_>> {
  conn
    .transaction()
    .map_err(|e| eyre!("Failed to begin transaction: {}", e))
}

fn commit(tx: Transaction<'_>) -> Result<()> {
  tx.commit()
    .map_err(|e| eyre!("Failed to commit transaction: {}", e))
}

impl CacheStorage for SqliteStorage {
  fn put_all<T: Cacheable>(&self, entities: &[T]) -> Result<()> {
    let mut conn = self.lock()?;
    let tx = begin(&mut conn)?;

    for entity in entities {
      upsert_entity(&tx, entity)?;
    }

    commit(tx)
  }

  fn get_all<T: Cacheable>(&self) -> Result<Vec<T>> {
    let conn = self.lock()?;
    select_entities(&conn, false)
  }

  fn get_active<T: Cacheable>(&self) -> Result<Vec<T>> {
    let conn = self.lock()?;
    select_entities(&conn, true)
  }

  fn get_entity<T: Cacheable>(&self, key: &str) -> Result<Option<T>> {
    let conn = self.lock()?;

    let data: Option<Vec<u8>> = conn
      .query_row(
        &format!("SELECT data FROM {} WHERE id = ?", T::table()),
        params![key],
        |row| row.get(0),
      )
      .optional()
      .map_err(|e| eyre!("Failed to query {} {}: {}", T::table(), key, e))?;

    data
      .map(|data| {
        serde_json::from_slice(&data)
          .map_err(|e| eyre!("Corrupt {} row in cache: {}", T::table(), e))
      })
      .transpose()
  }

  fn clear_all(&self) -> Result<()> {
    let mut conn = self.lock()?;
    let tx = begin(&mut conn)?;

    for table in ENTITY_TABLES
      .iter()
      .chain(&["pending_actions", "id_remap"])
    {
      tx.execute(&format!("DELETE FROM {}", table), [])
        .map_err(|e| eyre!("Failed to clear {}: {}", table, e))?;
    }

    commit(tx)
  }
}

// ============================================================================
// Pending actions and id remapping
// ============================================================================

impl SqliteStorage {
  /// Append an action row and return its ordering id.
  pub fn insert_action(
    &self,
    action_type: &str,
    entity_id: &str,
    data: &[u8],
    timestamp: i64,
  ) -> Result<i64> {
    let conn = self.lock()?;

    conn
      .execute(
        "INSERT INTO pending_actions (action_type, entity_id, data, timestamp, synced)
         VALUES (?, ?, ?, ?, 0)",
        params![action_type, entity_id, data, timestamp],
      )
      .map_err(|e| eyre!("Failed to queue {} action: {}", action_type, e))?;

    Ok(conn.last_insert_rowid())
  }

  /// Action rows in ascending id order.
  pub fn list_actions(&self, unsynced_only: bool) -> Result<Vec<ActionRow>> {
    let conn = self.lock()?;
    let filter = if unsynced_only { " WHERE synced = 0" } else { "" };

    let mut stmt = conn
      .prepare(&format!(
        "SELECT id, action_type, entity_id, data, timestamp, synced
         FROM pending_actions{} ORDER BY id ASC",
        filter
      ))
      .map_err(|e| eyre!("Failed to prepare action query: {}", e))?;

    let rows = stmt
      .query_map([], |row| {
        Ok(ActionRow {
          id: row.get(0)?,
          action_type: row.get(1)?,
          entity_id: row.get(2)?,
          data: row.get(3)?,
          timestamp: row.get(4)?,
          synced: row.get(5)?,
        })
      })
      .map_err(|e| eyre!("Failed to query actions: {}", e))?;

    rows
      .collect::<rusqlite::Result<Vec<_>>>()
      .map_err(|e| eyre!("Failed to read action row: {}", e))
  }

  pub fn count_unsynced(&self) -> Result<usize> {
    let conn = self.lock()?;

    let count: i64 = conn
      .query_row(
        "SELECT COUNT(*) FROM pending_actions WHERE synced = 0",
        [],
        |row| row.get(0),
      )
      .map_err(|e| eyre!("Failed to count pending actions: {}", e))?;

    Ok(count as usize)
  }

  pub fn mark_action_synced(&self, id: i64) -> Result<()> {
    let conn = self.lock()?;

    conn
      .execute(
        "UPDATE pending_actions SET synced = 1 WHERE id = ?",
        params![id],
      )
      .map_err(|e| eyre!("Failed to mark action {} synced: {}", id, e))?;

    Ok(())
  }

  /// Delete synced actions and return how many were removed.
  ///
  /// Remap rows are kept: a placeholder can still be referenced from a
  /// payload or by the caller long after its insert landed. Only
  /// `clear_all` drops them.
  pub fn purge_synced_actions(&self) -> Result<usize> {
    let conn = self.lock()?;

    conn
      .execute("DELETE FROM pending_actions WHERE synced = 1", [])
      .map_err(|e| eyre!("Failed to purge synced actions: {}", e))
  }

  /// Remote id recorded for a placeholder, if its insert has landed.
  pub fn resolve_id(&self, placeholder: &str) -> Result<Option<String>> {
    let conn = self.lock()?;

    conn
      .query_row(
        "SELECT remote_id FROM id_remap WHERE placeholder = ?",
        params![placeholder],
        |row| row.get(0),
      )
      .optional()
      .map_err(|e| eyre!("Failed to resolve id {}: {}", placeholder, e))
  }

  /// Record a landed insert in one transaction: remember the remap, swap the
  /// placeholder cache row for the remote record, and mark the action synced.
  pub fn complete_insert<T: Cacheable>(
    &self,
    action_id: i64,
    placeholder: &str,
    record: &T,
  ) -> Result<()> {
    let mut conn = self.lock()?;
    let tx = begin(&mut conn)?;

    tx.execute(
      "INSERT OR REPLACE INTO id_remap (placeholder, remote_id) VALUES (?, ?)",
      params![placeholder, record.cache_key()],
    )
    .map_err(|e| eyre!("Failed to record id remap: {}", e))?;

    tx.execute(
      &format!("DELETE FROM {} WHERE id = ?", T::table()),
      params![placeholder],
    )
    .map_err(|e| eyre!("Failed to drop placeholder row: {}", e))?;

    upsert_entity(&tx, record)?;

    tx.execute(
      "UPDATE pending_actions SET synced = 1 WHERE id = ?",
      params![action_id],
    )
    .map_err(|e| eyre!("Failed to mark action {} synced: {}", action_id, e))?;

    commit(tx)
  }
}
