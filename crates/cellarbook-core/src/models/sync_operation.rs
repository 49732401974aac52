//! Pending sync operations and their wire payloads

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::db::SCHEMA_VERSION;
use crate::error::{Error, Result};
use crate::models::{Item, ItemKey, Tin};
use crate::util::now_millis;

/// Kind of local mutation being replicated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum OperationType {
    Insert,
    Update,
    Delete,
}

impl OperationType {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Insert => "INSERT",
            Self::Update => "UPDATE",
            Self::Delete => "DELETE",
        }
    }
}

impl fmt::Display for OperationType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for OperationType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "INSERT" => Ok(Self::Insert),
            "UPDATE" => Ok(Self::Update),
            "DELETE" => Ok(Self::Delete),
            other => Err(Error::InvalidInput(format!(
                "unknown operation type '{other}'"
            ))),
        }
    }
}

/// Table an operation applies to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EntityType {
    #[serde(rename = "Items")]
    Item,
    #[serde(rename = "Tins")]
    Tin,
    #[serde(rename = "Components")]
    Component,
    #[serde(rename = "Flavoring")]
    Flavoring,
}

impl EntityType {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Item => "Items",
            Self::Tin => "Tins",
            Self::Component => "Components",
            Self::Flavoring => "Flavoring",
        }
    }
}

impl fmt::Display for EntityType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EntityType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "Items" => Ok(Self::Item),
            "Tins" => Ok(Self::Tin),
            "Components" => Ok(Self::Component),
            "Flavoring" => Ok(Self::Flavoring),
            other => Err(Error::InvalidInput(format!("unknown entity type '{other}'"))),
        }
    }
}

/// One replicated mutation, exactly as it appears in an uploaded batch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncOperation {
    pub operation_type: OperationType,
    pub entity_type: EntityType,
    /// Local id of the entity on the writing device
    pub entity_id: String,
    /// JSON-encoded entity payload
    pub payload: String,
    /// Time the operation was recorded (Unix ms)
    pub timestamp: i64,
    /// Schema version of the writing device
    pub db_version: i32,
}

impl SyncOperation {
    /// Record an operation stamped with the current time and schema version.
    pub fn new(
        operation_type: OperationType,
        entity_type: EntityType,
        entity_id: impl Into<String>,
        payload: &impl Serialize,
    ) -> Result<Self> {
        Ok(Self {
            operation_type,
            entity_type,
            entity_id: entity_id.into(),
            payload: serde_json::to_string(payload)?,
            timestamp: now_millis(),
            db_version: SCHEMA_VERSION,
        })
    }

    /// Decode the payload into the type matching `entity_type`.
    pub fn decode_payload<T: DeserializeOwned>(&self) -> Result<T> {
        Ok(serde_json::from_str(&self.payload)?)
    }
}

/// A queued operation row in `pending_sync_operations`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PendingSyncOperation {
    pub id: i64,
    #[serde(flatten)]
    pub operation: SyncOperation,
}

/// Item payload, self-describing through its brand + blend key.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ItemPayload {
    pub brand: String,
    pub blend: String,
    #[serde(rename = "type", default)]
    pub item_type: String,
    #[serde(default)]
    pub sub_genre: String,
    #[serde(default)]
    pub cut: String,
    #[serde(default)]
    pub quantity: i64,
    #[serde(default)]
    pub favorite: bool,
    #[serde(default)]
    pub disliked: bool,
    #[serde(default = "default_true")]
    pub in_production: bool,
    #[serde(default)]
    pub rating: Option<f64>,
    #[serde(default)]
    pub notes: String,
    pub last_modified: i64,
    #[serde(default)]
    pub components: Vec<String>,
    #[serde(default)]
    pub flavoring: Vec<String>,
    /// Key before a rename, so peers can find the row they know
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub previous_key: Option<ItemKey>,
}

const fn default_true() -> bool {
    true
}

impl ItemPayload {
    #[must_use]
    pub fn new(item: &Item, components: &[String], flavoring: &[String]) -> Self {
        Self {
            brand: item.brand.clone(),
            blend: item.blend.clone(),
            item_type: item.item_type.clone(),
            sub_genre: item.sub_genre.clone(),
            cut: item.cut.clone(),
            quantity: item.quantity,
            favorite: item.favorite,
            disliked: item.disliked,
            in_production: item.in_production,
            rating: item.rating,
            notes: item.notes.clone(),
            last_modified: item.last_modified,
            components: components.to_vec(),
            flavoring: flavoring.to_vec(),
            previous_key: None,
        }
    }

    #[must_use]
    pub fn key(&self) -> ItemKey {
        ItemKey::new(self.brand.clone(), self.blend.clone())
    }
}

/// Tin payload; the parent item is referenced by its natural key.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TinPayload {
    pub item_brand: String,
    pub item_blend: String,
    pub label: String,
    #[serde(default)]
    pub container: String,
    #[serde(default)]
    pub quantity: f64,
    #[serde(default)]
    pub unit: String,
    #[serde(default)]
    pub manufacture_date: Option<i64>,
    #[serde(default)]
    pub cellar_date: Option<i64>,
    #[serde(default)]
    pub open_date: Option<i64>,
    #[serde(default)]
    pub finished: bool,
    pub last_modified: i64,
    /// Label before a rename
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub previous_label: Option<String>,
}

impl TinPayload {
    #[must_use]
    pub fn new(item: &Item, tin: &Tin) -> Self {
        Self {
            item_brand: item.brand.clone(),
            item_blend: item.blend.clone(),
            label: tin.label.clone(),
            container: tin.container.clone(),
            quantity: tin.quantity,
            unit: tin.unit.clone(),
            manufacture_date: tin.manufacture_date,
            cellar_date: tin.cellar_date,
            open_date: tin.open_date,
            finished: tin.finished,
            last_modified: tin.last_modified,
            previous_label: None,
        }
    }

    #[must_use]
    pub fn item_key(&self) -> ItemKey {
        ItemKey::new(self.item_brand.clone(), self.item_blend.clone())
    }
}

/// Component or flavoring payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NamePayload {
    pub name: String,
}
