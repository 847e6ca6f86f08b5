//! Records exchanged with the remote store and mirrored in the local cache.

use serde::{Deserialize, Deserializer, Serialize};

/// Default low stock threshold for new items
pub const DEFAULT_LOW_STOCK_THRESHOLD: u32 = 5;

/// Inventory item as stored remotely
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Item {
  pub id: String,
  pub name: String,
  /// Category name, denormalized
  pub category: String,
  #[serde(default)]
  pub category_id: Option<String>,
  #[serde(default)]
  pub details: Option<String>,
  #[serde(default)]
  pub photo_url: Option<String>,
  #[serde(default)]
  pub buying_price: f64,
  #[serde(default)]
  pub selling_price: f64,
  pub quantity: u32,
  #[serde(default = "default_low_stock_threshold")]
  pub low_stock_threshold: u32,
  /// Soft-delete marker; the remote may send null
  #[serde(default, deserialize_with = "null_as_default")]
  pub is_deleted: bool,
  #[serde(default)]
  pub created_by: Option<String>,
  pub created_at: String,
  pub updated_at: String,
}

impl Item {
  /// Whether stock has reached the item's threshold
  pub fn is_low_stock(&self) -> bool {
    self.quantity <= self.low_stock_threshold
  }
}

/// Item category
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Category {
  pub id: String,
  /// Upper-cased by writers
  pub name: String,
  pub created_at: String,
  #[serde(default)]
  pub created_by: Option<String>,
}

/// User profile, used to resolve display names offline
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Profile {
  pub id: String,
  pub email: String,
  #[serde(default)]
  pub username: Option<String>,
  #[serde(default)]
  pub avatar_url: Option<String>,
}

impl Profile {
  pub fn display_name(&self) -> &str {
    self.username.as_deref().unwrap_or(&self.email)
  }
}

/// Insert payload for a new item
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewItem {
  pub name: String,
  pub category: String,
  #[serde(default)]
  pub category_id: Option<String>,
  #[serde(default)]
  pub details: Option<String>,
  #[serde(default)]
  pub photo_url: Option<String>,
  #[serde(default)]
  pub buying_price: f64,
  #[serde(default)]
  pub selling_price: f64,
  pub quantity: u32,
  #[serde(default = "default_low_stock_threshold")]
  pub low_stock_threshold: u32,
  #[serde(default)]
  pub created_by: Option<String>,
}

impl NewItem {
  pub fn new(name: impl Into<String>, category: impl Into<String>, quantity: u32) -> Self {
    Self {
      name: name.into(),
      category: category.into(),
      category_id: None,
      details: None,
      photo_url: None,
      buying_price: 0.0,
      selling_price: 0.0,
      quantity,
      low_stock_threshold: DEFAULT_LOW_STOCK_THRESHOLD,
      created_by: None,
    }
  }

  /// Build the optimistic cache row shown before the remote confirms the insert.
  pub fn to_local_item(&self, id: &str, now: &str) -> Item {
    Item {
      id: id.to_string(),
      name: self.name.clone(),
      category: self.category.clone(),
      category_id: self.category_id.clone(),
      details: self.details.clone(),
      photo_url: self.photo_url.clone(),
      buying_price: self.buying_price,
      selling_price: self.selling_price,
      quantity: self.quantity,
      low_stock_threshold: self.low_stock_threshold,
      is_deleted: false,
      created_by: self.created_by.clone(),
      created_at: now.to_string(),
      updated_at: now.to_string(),
    }
  }
}

/// Partial update for an item. Absent fields are left untouched.
///
/// Nullable columns use a double option: `Some(None)` clears the column.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ItemPatch {
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub name: Option<String>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub category: Option<String>,
  #[serde(
    default,
    skip_serializing_if = "Option::is_none",
    deserialize_with = "present_field"
  )]
  pub category_id: Option<Option<String>>,
  #[serde(
    default,
    skip_serializing_if = "Option::is_none",
    deserialize_with = "present_field"
  )]
  pub details: Option<Option<String>>,
  #[serde(
    default,
    skip_serializing_if = "Option::is_none",
    deserialize_with = "present_field"
  )]
  pub photo_url: Option<Option<String>>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub buying_price: Option<f64>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub selling_price: Option<f64>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub quantity: Option<u32>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub low_stock_threshold: Option<u32>,
}

impl ItemPatch {
  pub fn quantity(quantity: u32) -> Self {
    Self {
      quantity: Some(quantity),
      ..Default::default()
    }
  }

  pub fn is_empty(&self) -> bool {
    *self == Self::default()
  }

  /// Apply the patch to a cached snapshot.
  pub fn apply_to(&self, item: &mut Item) {
    if let Some(name) = &self.name {
      item.name = name.clone();
    }
    if let Some(category) = &self.category {
      item.category = category.clone();
    }
    if let Some(category_id) = &self.category_id {
      item.category_id = category_id.clone();
    }
    if let Some(details) = &self.details {
      item.details = details.clone();
    }
    if let Some(photo_url) = &self.photo_url {
      item.photo_url = photo_url.clone();
    }
    if let Some(price) = self.buying_price {
      item.buying_price = price;
    }
    if let Some(price) = self.selling_price {
      item.selling_price = price;
    }
    if let Some(quantity) = self.quantity {
      item.quantity = quantity;
    }
    if let Some(threshold) = self.low_stock_threshold {
      item.low_stock_threshold = threshold;
    }
  }
}

/// Insert payload for a new category
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewCategory {
  pub name: String,
  #[serde(default)]
  pub created_by: Option<String>,
}

impl NewCategory {
  /// Category names are unique case-insensitively, so writers upper-case them.
  pub fn new(name: &str, created_by: Option<String>) -> Self {
    Self {
      name: name.trim().to_uppercase(),
      created_by,
    }
  }

  pub fn to_local_category(&self, id: &str, now: &str) -> Category {
    Category {
      id: id.to_string(),
      name: self.name.clone(),
      created_at: now.to_string(),
      created_by: self.created_by.clone(),
    }
  }
}

fn default_low_stock_threshold() -> u32 {
  DEFAULT_LOW_STOCK_THRESHOLD
}

fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
  D: Deserializer<'de>,
  T: Default + Deserialize<'de>,
{
  Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

/// Distinguish an explicit `null` from a missing field.
fn present_field<'de, D, T>(deserializer: D) -> Result<Option<Option<T>>, D::Error>
where
  D: Deserializer<'de>,
  T: Deserialize<'de>,
{
  Option::<T>::deserialize(deserializer).map(Some)
}
