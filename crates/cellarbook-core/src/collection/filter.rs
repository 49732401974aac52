//! Collection filters and sort orders

use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::Error;
use crate::models::ItemDetails;

/// Production status filter
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProductionFilter {
    #[default]
    Any,
    InProduction,
    Discontinued,
}

/// Rating filter
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RatingFilter {
    #[default]
    Any,
    Rated,
    Unrated,
}

/// Tin state filter; an item matches when at least one tin has the state
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TinFilter {
    #[default]
    Any,
    HasTins,
    Opened,
    Finished,
    Cellared,
}

/// Filter over the collection.
///
/// Empty lists match everything. Non-empty lists match case-insensitively
/// against any of their entries.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(default)]
pub struct CollectionFilter {
    pub brands: Vec<String>,
    pub types: Vec<String>,
    pub sub_genres: Vec<String>,
    pub cuts: Vec<String>,
    pub components: Vec<String>,
    pub flavoring: Vec<String>,
    pub favorites_only: bool,
    pub exclude_disliked: bool,
    pub production: ProductionFilter,
    pub rating: RatingFilter,
    pub tins: TinFilter,
    /// Free text matched against brand, blend and notes
    pub search: Option<String>,
}

fn contains_ci(options: &[String], value: &str) -> bool {
    options.is_empty() || options.iter().any(|o| o.eq_ignore_ascii_case(value))
}

fn intersects_ci(options: &[String], values: &[String]) -> bool {
    options.is_empty() || values.iter().any(|value| contains_ci(options, value))
}

impl CollectionFilter {
    #[must_use]
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }

    #[must_use]
    pub fn matches(&self, details: &ItemDetails) -> bool {
        let item = &details.item;

        if self.favorites_only && !item.favorite {
            return false;
        }
        if self.exclude_disliked && item.disliked {
            return false;
        }
        let production_ok = match self.production {
            ProductionFilter::Any => true,
            ProductionFilter::InProduction => item.in_production,
            ProductionFilter::Discontinued => !item.in_production,
        };
        let rating_ok = match self.rating {
            RatingFilter::Any => true,
            RatingFilter::Rated => item.rating.is_some(),
            RatingFilter::Unrated => item.rating.is_none(),
        };
        let tins_ok = match self.tins {
            TinFilter::Any => true,
            TinFilter::HasTins => !details.tins.is_empty(),
            TinFilter::Opened => details.tins.iter().any(crate::models::Tin::is_opened),
            TinFilter::Finished => details.tins.iter().any(|tin| tin.finished),
            TinFilter::Cellared => details.tins.iter().any(crate::models::Tin::is_cellared),
        };
        if !(production_ok && rating_ok && tins_ok) {
            return false;
        }

        if !contains_ci(&self.brands, &item.brand)
            || !contains_ci(&self.types, &item.item_type)
            || !contains_ci(&self.sub_genres, &item.sub_genre)
            || !contains_ci(&self.cuts, &item.cut)
            || !intersects_ci(&self.components, &details.components)
            || !intersects_ci(&self.flavoring, &details.flavoring)
        {
            return false;
        }

        match self.search.as_deref().map(str::trim) {
            Some(query) if !query.is_empty() => {
                let query = query.to_lowercase();
                [&item.brand, &item.blend, &item.notes]
                    .iter()
                    .any(|field| field.to_lowercase().contains(&query))
            }
            _ => true,
        }
    }
}

/// Field the collection is sorted by
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SortField {
    #[default]
    Brand,
    Blend,
    Type,
    Quantity,
    Rating,
    LastModified,
}

impl FromStr for SortField {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().replace('-', "_").as_str() {
            "brand" => Ok(Self::Brand),
            "blend" => Ok(Self::Blend),
            "type" => Ok(Self::Type),
            "quantity" => Ok(Self::Quantity),
            "rating" => Ok(Self::Rating),
            "last_modified" | "modified" => Ok(Self::LastModified),
            other => Err(Error::InvalidInput(format!("unknown sort field '{other}'"))),
        }
    }
}

impl fmt::Display for SortField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Brand => "brand",
            Self::Blend => "blend",
            Self::Type => "type",
            Self::Quantity => "quantity",
            Self::Rating => "rating",
            Self::LastModified => "last_modified",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SortDirection {
    #[default]
    Ascending,
    Descending,
}

/// Sort order; ties break on brand then blend, ascending
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(default)]
pub struct SortOrder {
    pub field: SortField,
    pub direction: SortDirection,
}

fn cmp_ci(a: &str, b: &str) -> Ordering {
    a.to_lowercase().cmp(&b.to_lowercase())
}

impl SortOrder {
    #[must_use]
    pub const fn new(field: SortField, direction: SortDirection) -> Self {
        Self { field, direction }
    }

    #[must_use]
    pub fn compare(&self, a: &ItemDetails, b: &ItemDetails) -> Ordering {
        let (a, b) = (&a.item, &b.item);
        let primary = match self.field {
            SortField::Brand => cmp_ci(&a.brand, &b.brand),
            SortField::Blend => cmp_ci(&a.blend, &b.blend),
            SortField::Type => cmp_ci(&a.item_type, &b.item_type),
            SortField::Quantity => a.quantity.cmp(&b.quantity),
            SortField::Rating => match (a.rating, b.rating) {
                (Some(x), Some(y)) => x.total_cmp(&y),
                (Some(_), None) => Ordering::Greater,
                (None, Some(_)) => Ordering::Less,
                (None, None) => Ordering::Equal,
            },
            SortField::LastModified => a.last_modified.cmp(&b.last_modified),
        };
        let primary = match self.direction {
            SortDirection::Ascending => primary,
            SortDirection::Descending => primary.reverse(),
        };
        primary
            .then_with(|| cmp_ci(&a.brand, &b.brand))
            .then_with(|| cmp_ci(&a.blend, &b.blend))
    }
}

/// Query shape of a collection live query
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CollectionView {
    pub filter: CollectionFilter,
    pub sort: SortOrder,
}

impl CollectionView {
    #[must_use]
    pub fn apply(&self, items: Vec<ItemDetails>) -> Vec<ItemDetails> {
        let mut items: Vec<_> = items
            .into_iter()
            .filter(|details| self.filter.matches(details))
            .collect();
        items.sort_by(|a, b| self.sort.compare(a, b));
        items
    }
}
