//! Connectivity signal injected by the host, and sync on reconnect.

use std::sync::Arc;
use tokio::sync::watch;
use tracing::{debug, info};

use crate::remote::RemoteStore;
use crate::sync::{SyncEngine, SyncResult};

/// Shared "is currently online" flag.
///
/// The core never probes the network itself; whatever owns this handle
/// decides what online means.
#[derive(Clone)]
pub struct Connectivity {
  tx: Arc<watch::Sender<bool>>,
}

impl Connectivity {
  pub fn new(online: bool) -> Self {
    let (tx, _rx) = watch::channel(online);
    Self { tx: Arc::new(tx) }
  }

  pub fn is_online(&self) -> bool {
    *self.tx.borrow()
  }

  /// Update the flag. Subscribers only wake on actual changes.
  pub fn set_online(&self, online: bool) {
    self.tx.send_if_modified(|current| {
      if *current == online {
        return false;
      }
      *current = online;
      true
    });
  }

  pub fn subscribe(&self) -> watch::Receiver<bool> {
    self.tx.subscribe()
  }
}

/// Run a sync every time connectivity goes from offline to online.
///
/// Returns once every `Connectivity` handle has been dropped.
pub async fn auto_sync<R, F>(engine: Arc<SyncEngine<R>>, mut rx: watch::Receiver<bool>, mut on_result: F)
where
  R: RemoteStore,
  F: FnMut(SyncResult),
{
  let mut was_online = *rx.borrow_and_update();

  while rx.changed().await.is_ok() {
    let online = *rx.borrow_and_update();
    debug!(online, "Connectivity changed");

    if online && !was_online {
      info!("Back online, syncing queued actions");
      on_result(engine.sync_pending_actions().await);
    }
    was_online = online;
  }
}
