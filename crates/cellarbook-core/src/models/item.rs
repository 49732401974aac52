//! Item model: one cataloged blend

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::{Error, Result};
use crate::models::Tin;
use crate::util::{collapse_whitespace, normalize_names};

/// Highest rating an item can carry.
pub const MAX_RATING: f64 = 5.0;

/// Local row identifier of an item.
///
/// Only meaningful on the device that assigned it; sync resolves items by
/// their [`ItemKey`] instead.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ItemId(i64);

impl ItemId {
    #[must_use]
    pub const fn new(id: i64) -> Self {
        Self(id)
    }

    #[must_use]
    pub const fn get(self) -> i64 {
        self.0
    }
}

impl fmt::Display for ItemId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for ItemId {
    type Err = std::num::ParseIntError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        Ok(Self(s.trim().parse()?))
    }
}

/// Natural key of an item, unique across the catalog.
///
/// Lookups compare brand and blend case-insensitively, like component and
/// flavoring names, so "Peterson / Irish Flake" and "peterson / irish flake"
/// are the same item. Equality on this struct stays exact so a change of
/// case alone still counts as a rename.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ItemKey {
    pub brand: String,
    pub blend: String,
}

impl ItemKey {
    pub fn new(brand: impl Into<String>, blend: impl Into<String>) -> Self {
        Self {
            brand: brand.into(),
            blend: blend.into(),
        }
    }

    /// Lowercased copy for grouping keys the way lookups compare them
    #[must_use]
    pub fn folded(&self) -> Self {
        Self::new(self.brand.to_lowercase(), self.blend.to_lowercase())
    }
}

impl fmt::Display for ItemKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} / {}", self.brand, self.blend)
    }
}

/// A blend in the catalog
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Item {
    /// Local identifier
    pub id: ItemId,
    pub brand: String,
    pub blend: String,
    /// Blend type, e.g. "Virginia/Perique"
    pub item_type: String,
    pub sub_genre: String,
    pub cut: String,
    /// Number of tins on hand, as entered by the user
    pub quantity: i64,
    pub favorite: bool,
    pub disliked: bool,
    /// Whether the blend is still produced
    pub in_production: bool,
    /// Rating in `0.0..=MAX_RATING`
    pub rating: Option<f64>,
    pub notes: String,
    /// Whether writes to this item are queued for sync
    pub sync_enabled: bool,
    /// Last local or replayed write (Unix ms)
    pub last_modified: i64,
}

impl Item {
    #[must_use]
    pub fn key(&self) -> ItemKey {
        ItemKey::new(self.brand.clone(), self.blend.clone())
    }
}

/// An item together with its names and tins, as shown in collection views.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ItemDetails {
    pub item: Item,
    pub components: Vec<String>,
    pub flavoring: Vec<String>,
    pub tins: Vec<Tin>,
}

/// User-editable item fields used by create, update and import.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ItemDraft {
    pub brand: String,
    pub blend: String,
    pub item_type: String,
    pub sub_genre: String,
    pub cut: String,
    pub quantity: i64,
    pub favorite: bool,
    pub disliked: bool,
    pub in_production: bool,
    pub rating: Option<f64>,
    pub notes: String,
    pub sync_enabled: bool,
    pub components: Vec<String>,
    pub flavoring: Vec<String>,
}

impl ItemDraft {
    /// Start a draft with the defaults used by the entry form.
    pub fn new(brand: impl Into<String>, blend: impl Into<String>) -> Self {
        Self {
            brand: brand.into(),
            blend: blend.into(),
            item_type: String::new(),
            sub_genre: String::new(),
            cut: String::new(),
            quantity: 1,
            favorite: false,
            disliked: false,
            in_production: true,
            rating: None,
            notes: String::new(),
            sync_enabled: true,
            components: Vec::new(),
            flavoring: Vec::new(),
        }
    }

    /// Build a draft that reproduces an existing item.
    #[must_use]
    pub fn from_details(details: &ItemDetails) -> Self {
        let item = &details.item;
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
            sync_enabled: item.sync_enabled,
            components: details.components.clone(),
            flavoring: details.flavoring.clone(),
        }
    }

    #[must_use]
    pub fn key(&self) -> ItemKey {
        ItemKey::new(self.brand.clone(), self.blend.clone())
    }

    /// Trim text fields, dedupe names and check value ranges.
    pub fn normalized(&self) -> Result<Self> {
        let brand = collapse_whitespace(&self.brand);
        let blend = collapse_whitespace(&self.blend);
        if brand.is_empty() {
            return Err(Error::InvalidInput("brand cannot be empty".into()));
        }
        if blend.is_empty() {
            return Err(Error::InvalidInput("blend cannot be empty".into()));
        }
        if self.quantity < 0 {
            return Err(Error::InvalidInput(format!(
                "quantity cannot be negative ({})",
                self.quantity
            )));
        }
        if let Some(rating) = self.rating {
            if !(0.0..=MAX_RATING).contains(&rating) {
                return Err(Error::InvalidInput(format!(
                    "rating must be between 0 and {MAX_RATING} ({rating})"
                )));
            }
        }

        Ok(Self {
            brand,
            blend,
            item_type: self.item_type.trim().to_string(),
            sub_genre: self.sub_genre.trim().to_string(),
            cut: self.cut.trim().to_string(),
            notes: self.notes.trim().to_string(),
            components: normalize_names(&self.components),
            flavoring: normalize_names(&self.flavoring),
            ..self.clone()
        })
    }
}
