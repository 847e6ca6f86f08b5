use crate::cache::{Loaded, SqliteStorage};
use crate::config::Config;
use crate::connectivity::{auto_sync, Connectivity};
use crate::inventory::{Inventory, WriteOutcome};
use crate::remote::{ItemPatch, NewItem, RestClient};
use crate::sync::SyncResult;
use clap::Subcommand;
use color_eyre::{eyre::eyre, Result};
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

/// CLI commands
#[derive(Debug, Subcommand)]
pub enum Command {
  /// List active items
  Items,
  /// List categories
  Categories,
  /// List user profiles
  Profiles,
  /// Add a new item
  AddItem {
    name: String,
    #[arg(short = 'k', long)]
    category: String,
    #[arg(short, long, default_value_t = 0)]
    quantity: u32,
    #[arg(long)]
    category_id: Option<String>,
    #[arg(long)]
    details: Option<String>,
    #[arg(long, default_value_t = 0.0)]
    buying_price: f64,
    #[arg(long, default_value_t = 0.0)]
    selling_price: f64,
    #[arg(long)]
    low_stock_threshold: Option<u32>,
  },
  /// Edit item details
  UpdateItem {
    id: String,
    #[arg(long)]
    name: Option<String>,
    #[arg(short = 'k', long)]
    category: Option<String>,
    #[arg(long)]
    details: Option<String>,
    #[arg(long)]
    buying_price: Option<f64>,
    #[arg(long)]
    selling_price: Option<f64>,
    #[arg(long)]
    low_stock_threshold: Option<u32>,
  },
  /// Set an item's quantity
  SetQuantity { id: String, quantity: u32 },
  /// Add (positive) or remove (negative) stock
  AdjustQuantity {
    id: String,
    #[arg(allow_negative_numbers = true)]
    change: i64,
  },
  /// Soft-delete an item
  DeleteItem { id: String },
  /// Add a category (stored upper-cased)
  AddCategory { name: String },
  /// Show actions waiting to be synced
  Pending {
    /// Include synced actions not purged yet
    #[arg(long)]
    all: bool,
  },
  /// Replay queued actions against the remote now
  Sync,
  /// Probe connectivity and sync whenever the remote becomes reachable
  Watch,
  /// Clear all cached data and queued actions
  Logout,
}

/// Command dispatcher
pub struct App {
  config: Config,
  inventory: Inventory<RestClient>,
  /// What the user declared; `--offline` means no remote calls at all
  online: bool,
}

impl App {
  pub fn new(config: Config, online: bool) -> Result<Self> {
    let remote = Arc::new(RestClient::new(&config)?);
    let storage = Arc::new(SqliteStorage::open(&config.cache_path()?)?);
    let inventory = Inventory::new(remote, storage, config.user_id.clone());

    Ok(Self {
      config,
      inventory,
      online,
    })
  }

  pub async fn run(&self, command: Command) -> Result<()> {
    match command {
      Command::Items => self.list_items().await,
      Command::Categories => {
        let loaded = self.inventory.reads().load_categories(self.online).await?;
        self.print_source(&loaded)?;
        for category in &loaded.data {
          println!("{}\t{}", category.id, category.name);
        }
        Ok(())
      }
      Command::Profiles => {
        let loaded = self.inventory.reads().load_profiles(self.online).await?;
        self.print_source(&loaded)?;
        for profile in &loaded.data {
          println!("{}\t{}\t{}", profile.id, profile.display_name(), profile.email);
        }
        Ok(())
      }
      Command::AddItem {
        name,
        category,
        quantity,
        category_id,
        details,
        buying_price,
        selling_price,
        low_stock_threshold,
      } => {
        let mut item = NewItem::new(name, category, quantity);
        item.category_id = category_id;
        item.details = details;
        item.buying_price = buying_price;
        item.selling_price = selling_price;
        if let Some(threshold) = low_stock_threshold {
          item.low_stock_threshold = threshold;
        }

        let outcome = self.inventory.add_item(self.online, item).await?;
        self.print_outcome("Added item", &outcome)
      }
      Command::UpdateItem {
        id,
        name,
        category,
        details,
        buying_price,
        selling_price,
        low_stock_threshold,
      } => {
        let patch = ItemPatch {
          name,
          category,
          details: details.map(Some),
          buying_price,
          selling_price,
          low_stock_threshold,
          ..Default::default()
        };

        let outcome = self.inventory.update_item(self.online, &id, patch).await?;
        self.print_outcome("Updated item", &outcome)
      }
      Command::SetQuantity { id, quantity } => {
        let outcome = self.inventory.set_quantity(self.online, &id, quantity).await?;
        self.print_outcome("Set quantity of", &outcome)
      }
      Command::AdjustQuantity { id, change } => {
        let outcome = self
          .inventory
          .adjust_quantity(self.online, &id, change)
          .await?;
        self.print_outcome("Adjusted quantity of", &outcome)
      }
      Command::DeleteItem { id } => {
        let outcome = self.inventory.delete_item(self.online, &id).await?;
        self.print_outcome("Deleted item", &outcome)
      }
      Command::AddCategory { name } => {
        let outcome = self.inventory.add_category(self.online, &name).await?;
        self.print_outcome("Added category", &outcome)
      }
      Command::Pending { all } => {
        let queue = self.inventory.queue();
        let actions = if all {
          queue.list_all()?
        } else {
          queue.list_unsynced()?
        };

        for action in actions {
          let state = if action.synced { "synced" } else { "pending" };
          let created = action
            .created_at()
            .map(|t| t.to_rfc3339())
            .unwrap_or_default();
          println!(
            "#{}\t{}\t{}\t{}\t{}",
            action.id,
            action.action_type(),
            action.entity_id,
            state,
            created
          );
        }
        println!("{} action(s) pending", self.inventory.pending_count()?);
        Ok(())
      }
      Command::Sync => {
        if !self.online {
          return Err(eyre!("Cannot sync while offline"));
        }
        let result = self.inventory.sync().await;
        print_sync_result(&result);
        if result.success {
          Ok(())
        } else {
          Err(eyre!("Sync finished with {} error(s)", result.errors.len()))
        }
      }
      Command::Watch => self.watch().await,
      Command::Logout => {
        self.inventory.logout()?;
        println!("Cleared all offline data");
        Ok(())
      }
    }
  }

  async fn list_items(&self) -> Result<()> {
    let mut loaded = self.inventory.reads().load_items(self.online).await?;
    self.print_source(&loaded)?;

    // Newest first
    loaded
      .data
      .sort_by(|a, b| b.created_at.cmp(&a.created_at));

    for item in &loaded.data {
      let low = if item.is_low_stock() { "  LOW" } else { "" };
      println!(
        "{}\t{}\t[{}]\tqty {}{}",
        item.id, item.name, item.category, item.quantity, low
      );
    }
    Ok(())
  }

  /// Poll the remote and let the connectivity signal drive syncing.
  async fn watch(&self) -> Result<()> {
    if !self.online {
      return Err(eyre!("Cannot watch while declared offline"));
    }

    let connectivity = Connectivity::new(false);
    let task = tokio::spawn(auto_sync(
      self.inventory.engine(),
      connectivity.subscribe(),
      |result| print_sync_result(&result),
    ));

    let mut interval =
      tokio::time::interval(Duration::from_secs(self.config.sync.probe_interval_secs.max(1)));
    info!(
      interval_secs = self.config.sync.probe_interval_secs,
      "Watching connectivity"
    );

    loop {
      tokio::select! {
        _ = tokio::signal::ctrl_c() => break,
        _ = interval.tick() => {
          // A read that had to fall back to the cache means the remote is unreachable
          let probe = self.inventory.reads().load_categories(true).await?;
          connectivity.set_online(!probe.is_cached());
        }
      }
    }

    drop(connectivity);
    task
      .await
      .map_err(|e| eyre!("Sync watcher failed: {}", e))?;
    Ok(())
  }

  fn print_source<T>(&self, loaded: &Loaded<T>) -> Result<()> {
    if loaded.is_cached() {
      println!("(showing offline data)");
    }
    let pending = self.inventory.pending_count()?;
    if pending > 0 {
      println!("{} action(s) will sync when online", pending);
    }
    Ok(())
  }

  fn print_outcome(&self, what: &str, outcome: &WriteOutcome) -> Result<()> {
    match outcome {
      WriteOutcome::Applied { entity_id } => println!("{} {}", what, entity_id),
      WriteOutcome::Queued {
        entity_id,
        action_id,
      } => println!("{} {} (queued as #{})", what, entity_id, action_id),
    }
    Ok(())
  }
}

fn print_sync_result(result: &SyncResult) {
  println!(
    "Synced {} action(s), {} item(s) cached",
    result.actions_synced, result.items_synced
  );
  for error in &result.errors {
    println!("  {}", error);
  }
}
