//! Aggregate collection statistics

use std::collections::BTreeMap;

use serde::Serialize;

use crate::dates::{average_age, TinAge};
use crate::models::ItemDetails;

const UNSPECIFIED: &str = "Unspecified";

/// Summary numbers for the stats screen and `cellarbook stats`
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct CollectionStats {
    pub item_count: usize,
    pub tin_count: usize,
    pub favorite_count: usize,
    pub disliked_count: usize,
    pub in_production_count: usize,
    pub discontinued_count: usize,
    pub rated_count: usize,
    pub average_rating: Option<f64>,
    /// Sum of the per-item "No. of Tins" counts
    pub total_item_quantity: i64,
    pub items_by_type: BTreeMap<String, usize>,
    pub items_by_brand: BTreeMap<String, usize>,
    pub opened_tins: usize,
    pub finished_tins: usize,
    pub cellared_tins: usize,
    /// Quantity of unfinished tins, keyed by unit
    pub quantity_by_unit: BTreeMap<String, f64>,
    /// Average age of unfinished tins with a manufacture date
    pub average_tin_age: Option<TinAge>,
}

impl CollectionStats {
    #[must_use]
    pub fn compute(items: &[ItemDetails], now_ms: i64) -> Self {
        let mut stats = Self {
            item_count: items.len(),
            ..Self::default()
        };
        let mut rating_sum = 0.0;
        let mut manufacture_dates = Vec::new();

        for details in items {
            let item = &details.item;
            stats.favorite_count += usize::from(item.favorite);
            stats.disliked_count += usize::from(item.disliked);
            if item.in_production {
                stats.in_production_count += 1;
            } else {
                stats.discontinued_count += 1;
            }
            if let Some(rating) = item.rating {
                stats.rated_count += 1;
                rating_sum += rating;
            }
            stats.total_item_quantity += item.quantity;
            *stats
                .items_by_type
                .entry(label_or_unspecified(&item.item_type))
                .or_default() += 1;
            *stats
                .items_by_brand
                .entry(label_or_unspecified(&item.brand))
                .or_default() += 1;

            for tin in &details.tins {
                stats.tin_count += 1;
                stats.opened_tins += usize::from(tin.is_opened());
                stats.finished_tins += usize::from(tin.finished);
                stats.cellared_tins += usize::from(tin.is_cellared());
                if tin.finished {
                    continue;
                }
                *stats
                    .quantity_by_unit
                    .entry(label_or_unspecified(&tin.unit))
                    .or_default() += tin.quantity;
                if let Some(date) = tin.manufacture_date {
                    manufacture_dates.push(date);
                }
            }
        }

        if stats.rated_count > 0 {
            #[allow(clippy::cast_precision_loss)]
            let count = stats.rated_count as f64;
            stats.average_rating = Some(rating_sum / count);
        }
        stats.average_tin_age = average_age(&manufacture_dates, now_ms);
        stats
    }

    /// Brands ordered by item count, largest first
    #[must_use]
    pub fn top_brands(&self, limit: usize) -> Vec<(&str, usize)> {
        let mut brands: Vec<_> = self
            .items_by_brand
            .iter()
            .map(|(brand, count)| (brand.as_str(), *count))
            .collect();
        brands.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(b.0)));
        brands.truncate(limit);
        brands
    }
}

fn label_or_unspecified(value: &str) -> String {
    let value = value.trim();
    if value.is_empty() {
        UNSPECIFIED.to_string()
    } else {
        value.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dates::parse_date;
    use crate::models::{Item, ItemId, Tin, TinId};
    use pretty_assertions::assert_eq;

    fn item(id: i64, brand: &str, item_type: &str) -> Item {
        Item {
            id: ItemId::new(id),
            brand: brand.into(),
            blend: format!("Blend {id}"),
            item_type: item_type.into(),
            sub_genre: String::new(),
            cut: String::new(),
            quantity: 2,
            favorite: id == 1,
            disliked: false,
            in_production: id != 3,
            rating: None,
            notes: String::new(),
            sync_enabled: true,
            last_modified: 0,
        }
    }

    fn tin(id: i64, unit: &str, quantity: f64, made: &str, finished: bool) -> Tin {
        Tin {
            id: TinId::new(id),
            item_id: ItemId::new(1),
            label: format!("Lot {id}"),
            container: "Tin".into(),
            quantity,
            unit: unit.into(),
            manufacture_date: parse_date(made),
            cellar_date: parse_date(made),
            open_date: None,
            finished,
            last_modified: 0,
        }
    }

    #[test]
    fn test_compute() {
        let mut first = item(1, "Peterson", "Virginia");
        first.rating = Some(4.0);
        let mut second = item(2, "Peterson", "");
        second.rating = Some(3.0);
        let third = item(3, "Dunhill", "English");

        let items = vec![
            ItemDetails {
                item: first,
                components: vec![],
                flavoring: vec![],
                tins: vec![
                    tin(1, "g", 50.0, "2018-01-01", false),
                    tin(2, "g", 100.0, "2020-01-01", false),
                    tin(3, "oz", 2.0, "2010-01-01", true),
                ],
            },
            ItemDetails {
                item: second,
                components: vec![],
                flavoring: vec![],
                tins: vec![tin(4, "oz", 1.75, "", false)],
            },
            ItemDetails {
                item: third,
                components: vec![],
                flavoring: vec![],
                tins: vec![],
            },
        ];

        let now = parse_date("2022-01-01").unwrap();
        let stats = CollectionStats::compute(&items, now);

        assert_eq!(stats.item_count, 3);
        assert_eq!(stats.tin_count, 4);
        assert_eq!(stats.favorite_count, 1);
        assert_eq!(stats.discontinued_count, 1);
        assert_eq!(stats.rated_count, 2);
        assert_eq!(stats.average_rating, Some(3.5));
        assert_eq!(stats.total_item_quantity, 6);
        assert_eq!(stats.items_by_type.get("Unspecified"), Some(&1));
        assert_eq!(stats.finished_tins, 1);
        assert_eq!(stats.cellared_tins, 2);
        assert_eq!(stats.quantity_by_unit.get("g"), Some(&150.0));
        assert_eq!(stats.quantity_by_unit.get("oz"), Some(&1.75));
        assert_eq!(stats.average_tin_age.map(|age| age.years), Some(3));
        assert_eq!(stats.top_brands(1), vec![("Peterson", 2)]);
    }

    #[test]
    fn empty_collection() {
        let stats = CollectionStats::compute(&[], 0);
        assert_eq!(stats, CollectionStats::default());
    }
}
