//! Tin model: one physical container of an item

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::{Error, Result};
use crate::models::ItemId;
use crate::util::collapse_whitespace;

/// Local row identifier of a tin.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TinId(i64);

impl TinId {
    #[must_use]
    pub const fn new(id: i64) -> Self {
        Self(id)
    }

    #[must_use]
    pub const fn get(self) -> i64 {
        self.0
    }
}

impl fmt::Display for TinId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for TinId {
    type Err = std::num::ParseIntError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        Ok(Self(s.trim().parse()?))
    }
}

/// A physical tin, jar or pouch belonging to one item
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Tin {
    pub id: TinId,
    /// Owning item
    pub item_id: ItemId,
    /// Label, unique within the owning item
    pub label: String,
    /// Container type, e.g. "Tin", "Jar", "Bulk"
    pub container: String,
    pub quantity: f64,
    /// Quantity unit, e.g. "oz", "g"
    pub unit: String,
    /// Manufacture date (Unix ms)
    pub manufacture_date: Option<i64>,
    /// Date the tin went into the cellar (Unix ms)
    pub cellar_date: Option<i64>,
    /// Date the tin was opened (Unix ms)
    pub open_date: Option<i64>,
    pub finished: bool,
    /// Last local or replayed write (Unix ms)
    pub last_modified: i64,
}

impl Tin {
    #[must_use]
    pub const fn is_opened(&self) -> bool {
        self.open_date.is_some()
    }

    /// Sealed and still waiting in the cellar.
    #[must_use]
    pub const fn is_cellared(&self) -> bool {
        self.cellar_date.is_some() && self.open_date.is_none() && !self.finished
    }
}

/// User-editable tin fields.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TinDraft {
    pub label: String,
    pub container: String,
    pub quantity: f64,
    pub unit: String,
    pub manufacture_date: Option<i64>,
    pub cellar_date: Option<i64>,
    pub open_date: Option<i64>,
    pub finished: bool,
}

impl TinDraft {
    pub fn new(label: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            container: String::new(),
            quantity: 0.0,
            unit: String::new(),
            manufacture_date: None,
            cellar_date: None,
            open_date: None,
            finished: false,
        }
    }

    #[must_use]
    pub fn from_tin(tin: &Tin) -> Self {
        Self {
            label: tin.label.clone(),
            container: tin.container.clone(),
            quantity: tin.quantity,
            unit: tin.unit.clone(),
            manufacture_date: tin.manufacture_date,
            cellar_date: tin.cellar_date,
            open_date: tin.open_date,
            finished: tin.finished,
        }
    }

    pub fn normalized(&self) -> Result<Self> {
        let label = collapse_whitespace(&self.label);
        if label.is_empty() {
            return Err(Error::InvalidInput("tin label cannot be empty".into()));
        }
        if !self.quantity.is_finite() || self.quantity < 0.0 {
            return Err(Error::InvalidInput(format!(
                "tin quantity must be a non-negative number ({})",
                self.quantity
            )));
        }

        Ok(Self {
            label,
            container: self.container.trim().to_string(),
            unit: self.unit.trim().to_string(),
            ..self.clone()
        })
    }
}
