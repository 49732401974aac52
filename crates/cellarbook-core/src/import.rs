//! CSV import: parsing, column detection, row mapping and merge into the catalog

use std::collections::HashMap;
use std::sync::OnceLock;

use csv::{ReaderBuilder, Trim};
use regex::Regex;
use serde::Serialize;

use crate::dates::parse_date;
use crate::db::CatalogRepository;
use crate::error::{Error, Result};
use crate::models::{ItemDetails, ItemDraft, ItemKey, TinDraft};
use crate::util::normalize_names;

/// Outcome of reading a CSV file
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CsvParseResult {
    Success {
        header: Vec<String>,
        records: Vec<Vec<String>>,
    },
    /// No header, or only blank lines
    Empty,
    Error(String),
}

/// Parse CSV text; the first non-blank row is the header.
#[must_use]
pub fn parse_csv(input: &str) -> CsvParseResult {
    let input = input.strip_prefix('\u{feff}').unwrap_or(input);
    let mut reader = ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .trim(Trim::All)
        .from_reader(input.as_bytes());

    let mut rows = Vec::new();
    for record in reader.records() {
        match record {
            Ok(record) => {
                let row: Vec<String> = record.iter().map(ToString::to_string).collect();
                if row.iter().any(|cell| !cell.is_empty()) {
                    rows.push(row);
                }
            }
            Err(error) => return CsvParseResult::Error(error.to_string()),
        }
    }

    let mut rows = rows.into_iter();
    match rows.next() {
        Some(header) => CsvParseResult::Success {
            header,
            records: rows.collect(),
        },
        None => CsvParseResult::Empty,
    }
}

/// Column index of each known field, detected from the header row
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ColumnMapping {
    pub brand: usize,
    pub blend: usize,
    pub item_type: Option<usize>,
    pub sub_genre: Option<usize>,
    pub cut: Option<usize>,
    pub quantity: Option<usize>,
    pub favorite: Option<usize>,
    pub disliked: Option<usize>,
    pub production: Option<usize>,
    pub rating: Option<usize>,
    pub notes: Option<usize>,
    pub components: Option<usize>,
    pub flavoring: Option<usize>,
    pub tin_label: Option<usize>,
    pub container: Option<usize>,
    pub tin_quantity: Option<usize>,
    pub manufacture_date: Option<usize>,
    pub cellar_date: Option<usize>,
    pub open_date: Option<usize>,
    pub finished: Option<usize>,
}

fn header_key(value: &str) -> String {
    value
        .chars()
        .filter(char::is_ascii_alphanumeric)
        .map(|c| c.to_ascii_lowercase())
        .collect()
}

impl ColumnMapping {
    /// Detect columns by name, ignoring case, spaces and punctuation.
    pub fn from_header(header: &[String]) -> Result<Self> {
        let index: HashMap<String, usize> = header
            .iter()
            .enumerate()
            .rev()
            .map(|(i, name)| (header_key(name), i))
            .collect();
        let find = |aliases: &[&str]| aliases.iter().find_map(|alias| index.get(*alias).copied());

        let brand = find(&["brand", "manufacturer"]);
        let blend = find(&["blend", "blendname", "name"]);
        let (Some(brand), Some(blend)) = (brand, blend) else {
            return Err(Error::InvalidInput(
                "CSV header must include Brand and Blend columns".into(),
            ));
        };

        Ok(Self {
            brand,
            blend,
            item_type: find(&["type", "blendtype"]),
            sub_genre: find(&["subgenre", "genre"]),
            cut: find(&["cut"]),
            quantity: find(&["nooftins", "numberoftins", "tins", "tincount"]),
            favorite: find(&["favorite", "favourite"]),
            disliked: find(&["disliked", "dislike"]),
            production: find(&["productionstatus", "production", "inproduction"]),
            rating: find(&["rating"]),
            notes: find(&["notes", "note"]),
            components: find(&["components", "component"]),
            flavoring: find(&["flavoring", "flavorings", "flavouring"]),
            tin_label: find(&["label", "tinlabel"]),
            container: find(&["container"]),
            tin_quantity: find(&["quantity", "tinquantity", "amount"]),
            manufacture_date: find(&["manufacturedate", "manufactured"]),
            cellar_date: find(&["cellardate", "cellared"]),
            open_date: find(&["opendate", "opened"]),
            finished: find(&["finished"]),
        })
    }

    const fn tin_columns(&self) -> [Option<usize>; 7] {
        [
            self.tin_label,
            self.container,
            self.tin_quantity,
            self.manufacture_date,
            self.cellar_date,
            self.open_date,
            self.finished,
        ]
    }
}

/// One item assembled from one or more CSV rows.
///
/// `None` fields were absent or blank in the file and leave existing values
/// alone when merging.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ImportedItem {
    pub brand: String,
    pub blend: String,
    pub item_type: Option<String>,
    pub sub_genre: Option<String>,
    pub cut: Option<String>,
    pub quantity: Option<i64>,
    pub favorite: Option<bool>,
    pub disliked: Option<bool>,
    pub in_production: Option<bool>,
    pub rating: Option<f64>,
    pub notes: Option<String>,
    pub components: Vec<String>,
    pub flavoring: Vec<String>,
    /// Tins in file order; a blank label is assigned on import
    pub tins: Vec<TinDraft>,
}

impl ImportedItem {
    #[must_use]
    pub fn key(&self) -> ItemKey {
        ItemKey::new(self.brand.clone(), self.blend.clone())
    }

    /// Draft for a brand new item
    #[must_use]
    pub fn to_draft(&self) -> ItemDraft {
        let mut draft = ItemDraft::new(self.brand.clone(), self.blend.clone());
        self.apply(&mut draft);
        draft.components.clone_from(&self.components);
        draft.flavoring.clone_from(&self.flavoring);
        draft
    }

    /// Overwrite present fields of `existing` and union its names
    #[must_use]
    pub fn merge_into(&self, existing: &ItemDetails) -> ItemDraft {
        let mut draft = ItemDraft::from_details(existing);
        self.apply(&mut draft);
        draft.components = normalize_names(existing.components.iter().chain(&self.components));
        draft.flavoring = normalize_names(existing.flavoring.iter().chain(&self.flavoring));
        draft
    }

    fn apply(&self, draft: &mut ItemDraft) {
        if let Some(value) = &self.item_type {
            draft.item_type.clone_from(value);
        }
        if let Some(value) = &self.sub_genre {
            draft.sub_genre.clone_from(value);
        }
        if let Some(value) = &self.cut {
            draft.cut.clone_from(value);
        }
        if let Some(value) = &self.notes {
            draft.notes.clone_from(value);
        }
        if let Some(value) = self.quantity {
            draft.quantity = value;
        }
        if let Some(value) = self.favorite {
            draft.favorite = value;
        }
        if let Some(value) = self.disliked {
            draft.disliked = value;
        }
        if let Some(value) = self.in_production {
            draft.in_production = value;
        }
        if self.rating.is_some() {
            draft.rating = self.rating;
        }
    }
}

/// Rows grouped into items, plus the count of rows that could not be read
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MappedRecords {
    pub items: Vec<ImportedItem>,
    pub malformed: usize,
}

fn tin_quantity_pattern() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"^(\d+(?:[.,]\d+)?)\s*([A-Za-z]*)\.?$").expect("Invalid regex")
    })
}

fn tin_count_pattern() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^(\d+)(?:\s*tins?)?$").expect("Invalid regex"))
}

/// Parse `"1.75 oz"`, `"50g"` or `"2"` into amount + unit.
#[must_use]
pub fn parse_tin_quantity(value: &str) -> Option<(f64, String)> {
    let caps = tin_quantity_pattern().captures(value.trim())?;
    let amount = caps.get(1)?.as_str().replace(',', ".").parse().ok()?;
    let unit = caps.get(2).map_or("", |m| m.as_str()).to_string();
    Some((amount, unit))
}

fn parse_flag(value: &str) -> Option<bool> {
    match value.trim().to_lowercase().as_str() {
        "true" | "yes" | "y" | "1" | "x" | "✓" => Some(true),
        "false" | "no" | "n" | "0" => Some(false),
        _ => None,
    }
}

fn parse_production(value: &str) -> Option<bool> {
    match header_key(value).as_str() {
        "inproduction" | "production" | "current" => Some(true),
        "discontinued" | "outofproduction" | "retired" => Some(false),
        _ => parse_flag(value),
    }
}

fn split_names(value: &str) -> Vec<String> {
    normalize_names(value.split([',', ';']))
}

struct RowReader<'a> {
    row: &'a [String],
}

impl RowReader<'_> {
    fn text(&self, column: Option<usize>) -> Option<&str> {
        let value = self.row.get(column?)?.trim();
        (!value.is_empty()).then_some(value)
    }

    fn parsed<T>(
        &self,
        column: Option<usize>,
        parse: impl Fn(&str) -> Option<T>,
    ) -> Result<Option<T>> {
        match self.text(column) {
            Some(value) => parse(value)
                .map(Some)
                .ok_or_else(|| Error::InvalidInput(format!("unreadable value '{value}'"))),
            None => Ok(None),
        }
    }
}

fn map_row(mapping: &ColumnMapping, row: &[String]) -> Result<(ImportedItem, Option<TinDraft>)> {
    let reader = RowReader { row };
    let brand = reader
        .text(Some(mapping.brand))
        .ok_or_else(|| Error::InvalidInput("missing brand".into()))?;
    let blend = reader
        .text(Some(mapping.blend))
        .ok_or_else(|| Error::InvalidInput("missing blend".into()))?;

    let item = ImportedItem {
        brand: brand.to_string(),
        blend: blend.to_string(),
        item_type: reader.text(mapping.item_type).map(ToString::to_string),
        sub_genre: reader.text(mapping.sub_genre).map(ToString::to_string),
        cut: reader.text(mapping.cut).map(ToString::to_string),
        quantity: reader.parsed(mapping.quantity, |v| {
            tin_count_pattern()
                .captures(&v.to_lowercase())
                .and_then(|caps| caps.get(1)?.as_str().parse().ok())
        })?,
        favorite: reader.parsed(mapping.favorite, parse_flag)?,
        disliked: reader.parsed(mapping.disliked, parse_flag)?,
        in_production: reader.parsed(mapping.production, parse_production)?,
        rating: reader.parsed(mapping.rating, |v| v.parse::<f64>().ok())?,
        notes: reader.text(mapping.notes).map(ToString::to_string),
        components: reader.text(mapping.components).map(split_names).unwrap_or_default(),
        flavoring: reader.text(mapping.flavoring).map(split_names).unwrap_or_default(),
        tins: Vec::new(),
    };

    let has_tin = mapping
        .tin_columns()
        .iter()
        .any(|column| reader.text(*column).is_some());
    let tin = if has_tin {
        let (quantity, unit) = reader
            .parsed(mapping.tin_quantity, parse_tin_quantity)?
            .unwrap_or((0.0, String::new()));
        let mut tin = TinDraft::new(reader.text(mapping.tin_label).unwrap_or_default());
        tin.container = reader.text(mapping.container).unwrap_or_default().to_string();
        tin.quantity = quantity;
        tin.unit = unit;
        tin.manufacture_date = reader.parsed(mapping.manufacture_date, parse_date)?;
        tin.cellar_date = reader.parsed(mapping.cellar_date, parse_date)?;
        tin.open_date = reader.parsed(mapping.open_date, parse_date)?;
        tin.finished = reader.parsed(mapping.finished, parse_flag)?.unwrap_or(false);
        Some(tin)
    } else {
        None
    };

    Ok((item, tin))
}

/// Validate rows and group them by (brand, blend), keeping file order.
///
/// The first row of an item supplies its fields; every row may add a tin.
#[must_use]
pub fn map_records(mapping: &ColumnMapping, records: &[Vec<String>]) -> MappedRecords {
    let mut mapped = MappedRecords::default();
    let mut positions: HashMap<ItemKey, usize> = HashMap::new();

    for (line, row) in records.iter().enumerate() {
        match map_row(mapping, row) {
            Ok((item, tin)) => {
                let position = *positions.entry(item.key().folded()).or_insert_with(|| {
                    mapped.items.push(item);
                    mapped.items.len() - 1
                });
                if let Some(tin) = tin {
                    mapped.items[position].tins.push(tin);
                }
            }
            Err(error) => {
                tracing::warn!("Skipping CSV row {}: {error}", line + 2);
                mapped.malformed += 1;
            }
        }
    }
    mapped
}

/// What to do when an imported item already exists
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DuplicateStrategy {
    #[default]
    Skip,
    Merge,
}

/// Counts reported after an import
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ImportSummary {
    pub inserted: usize,
    pub updated: usize,
    pub skipped: usize,
    pub malformed: usize,
    pub tins_added: usize,
}

fn same_tin(existing: &crate::models::Tin, draft: &TinDraft) -> bool {
    existing.container == draft.container
        && (existing.quantity - draft.quantity).abs() < f64::EPSILON
        && existing.unit == draft.unit
        && existing.manufacture_date == draft.manufacture_date
        && existing.cellar_date == draft.cellar_date
        && existing.open_date == draft.open_date
}

fn next_free_label(taken: &[String]) -> String {
    (1..)
        .map(|n| format!("Lot {n}"))
        .find(|label| !taken.iter().any(|t| t.eq_ignore_ascii_case(label)))
        .unwrap_or_default()
}

async fn add_tins<R: CatalogRepository>(
    repo: &R,
    details: &ItemDetails,
    tins: &[TinDraft],
) -> Result<usize> {
    let mut labels: Vec<String> = details.tins.iter().map(|t| t.label.clone()).collect();
    let mut added = 0;
    for tin in tins {
        let mut tin = tin.clone();
        if tin.label.trim().is_empty() {
            if details.tins.iter().any(|existing| same_tin(existing, &tin)) {
                continue;
            }
            tin.label = next_free_label(&labels);
        } else if labels.iter().any(|l| l.eq_ignore_ascii_case(tin.label.trim())) {
            continue;
        }
        match repo.insert_tin(details.item.id, &tin).await {
            Ok(created) => {
                labels.push(created.label);
                added += 1;
            }
            Err(Error::InvalidInput(reason) | Error::Duplicate(reason)) => {
                tracing::warn!("Skipping tin of {}: {reason}", details.item.key());
            }
            Err(error) => return Err(error),
        }
    }
    Ok(added)
}

/// Write mapped items through the repository.
///
/// Existing items (by brand + blend) are skipped or merged per `strategy`.
/// Rows the repository rejects as invalid count as malformed.
pub async fn import_items<R: CatalogRepository>(
    repo: &R,
    mapped: &MappedRecords,
    strategy: DuplicateStrategy,
) -> Result<ImportSummary> {
    let mut summary = ImportSummary {
        malformed: mapped.malformed,
        ..ImportSummary::default()
    };

    for imported in &mapped.items {
        let existing = repo.find_item(&imported.brand, &imported.blend).await?;
        let result = match (existing, strategy) {
            (None, _) => match repo.insert_item(&imported.to_draft()).await {
                Ok(details) => {
                    summary.inserted += 1;
                    Ok(Some(details))
                }
                Err(error) => Err(error),
            },
            (Some(_), DuplicateStrategy::Skip) => {
                summary.skipped += 1;
                Ok(None)
            }
            (Some(item), DuplicateStrategy::Merge) => {
                let details = repo
                    .get_item(item.id)
                    .await?
                    .ok_or_else(|| Error::NotFound(format!("item {}", item.id)))?;
                match repo.update_item(item.id, &imported.merge_into(&details)).await {
                    Ok(details) => {
                        summary.updated += 1;
                        Ok(Some(details))
                    }
                    Err(error) => Err(error),
                }
            }
        };

        match result {
            Ok(Some(details)) => {
                summary.tins_added += add_tins(repo, &details, &imported.tins).await?;
            }
            Ok(None) => {}
            Err(Error::InvalidInput(reason) | Error::Duplicate(reason)) => {
                tracing::warn!("Skipping {}: {reason}", imported.key());
                summary.malformed += 1;
            }
            Err(error) => return Err(error),
        }
    }

    tracing::info!(
        "CSV import: {} inserted, {} updated, {} skipped, {} malformed, {} tins",
        summary.inserted,
        summary.updated,
        summary.skipped,
        summary.malformed,
        summary.tins_added
    );
    Ok(summary)
}
