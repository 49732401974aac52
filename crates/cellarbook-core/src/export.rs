//! Collection export (CSV and JSON) shared by every front end.

use csv::{QuoteStyle, WriterBuilder};
use serde::{Deserialize, Serialize};

use crate::dates::format_date;
use crate::error::{Error, Result};
use crate::models::{ItemDetails, Tin};

/// Item-level CSV columns, in export order
pub const ITEM_HEADERS: [&str; 11] = [
    "Brand",
    "Blend",
    "Type",
    "Sub-Genre",
    "Cut",
    "No. of Tins",
    "Favorite",
    "Disliked",
    "Production Status",
    "Notes",
    "Components",
];

/// Extra columns appended by the tin-level export
pub const TIN_HEADERS: [&str; 5] = [
    "Container",
    "Quantity",
    "Manufacture Date",
    "Cellar Date",
    "Open Date",
];

pub const IN_PRODUCTION: &str = "In Production";
pub const DISCONTINUED: &str = "Discontinued";

/// Export output format
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExportFormat {
    Csv,
    Json,
}

impl ExportFormat {
    #[must_use]
    pub const fn extension(self) -> &'static str {
        match self {
            Self::Csv => "csv",
            Self::Json => "json",
        }
    }
}

/// One row per item, or one row per tin
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExportScope {
    Items,
    Tins,
}

fn item_columns(details: &ItemDetails) -> Vec<String> {
    let item = &details.item;
    vec![
        item.brand.clone(),
        item.blend.clone(),
        item.item_type.clone(),
        item.sub_genre.clone(),
        item.cut.clone(),
        item.quantity.to_string(),
        item.favorite.to_string(),
        item.disliked.to_string(),
        if item.in_production {
            IN_PRODUCTION
        } else {
            DISCONTINUED
        }
        .to_string(),
        item.notes.clone(),
        details.components.join(", "),
    ]
}

/// Format a tin amount as `"<quantity> <unit>"`, e.g. `"1.75 oz"`
#[must_use]
pub fn format_tin_quantity(tin: &Tin) -> String {
    if tin.unit.is_empty() {
        tin.quantity.to_string()
    } else {
        format!("{} {}", tin.quantity, tin.unit)
    }
}

fn tin_columns(tin: Option<&Tin>) -> Vec<String> {
    let Some(tin) = tin else {
        return vec![String::new(); TIN_HEADERS.len()];
    };
    let date = |value: Option<i64>| value.map(format_date).unwrap_or_default();
    vec![
        tin.container.clone(),
        format_tin_quantity(tin),
        date(tin.manufacture_date),
        date(tin.cellar_date),
        date(tin.open_date),
    ]
}

fn finish_writer(writer: csv::Writer<Vec<u8>>) -> Result<String> {
    let bytes = writer
        .into_inner()
        .map_err(|error| Error::Io(error.into_error()))?;
    String::from_utf8(bytes).map_err(|error| Error::InvalidInput(error.to_string()))
}

/// Render items as RFC 4180 CSV with every field quoted.
pub fn render_items_csv(items: &[ItemDetails]) -> Result<String> {
    let mut writer = WriterBuilder::new()
        .quote_style(QuoteStyle::Always)
        .from_writer(Vec::new());
    writer.write_record(ITEM_HEADERS)?;
    for details in items {
        writer.write_record(item_columns(details))?;
    }
    finish_writer(writer)
}

/// Render one row per tin; items without tins get a single row with blank tin columns.
pub fn render_tins_csv(items: &[ItemDetails]) -> Result<String> {
    let mut writer = WriterBuilder::new()
        .quote_style(QuoteStyle::Always)
        .from_writer(Vec::new());
    writer.write_record(ITEM_HEADERS.iter().chain(TIN_HEADERS.iter()))?;
    for details in items {
        let item = item_columns(details);
        if details.tins.is_empty() {
            writer.write_record(item.iter().chain(tin_columns(None).iter()))?;
        }
        for tin in &details.tins {
            writer.write_record(item.iter().chain(tin_columns(Some(tin)).iter()))?;
        }
    }
    finish_writer(writer)
}

/// Render item details as pretty-printed JSON.
pub fn render_json_export(items: &[ItemDetails]) -> Result<String> {
    Ok(serde_json::to_string_pretty(items)?)
}

pub fn render_export(
    items: &[ItemDetails],
    format: ExportFormat,
    scope: ExportScope,
) -> Result<String> {
    match (format, scope) {
        (ExportFormat::Json, _) => render_json_export(items),
        (ExportFormat::Csv, ExportScope::Items) => render_items_csv(items),
        (ExportFormat::Csv, ExportScope::Tins) => render_tins_csv(items),
    }
}

/// Build a deterministic default file name for export flows.
#[must_use]
pub fn suggested_export_file_name(
    format: ExportFormat,
    scope: ExportScope,
    timestamp_ms: i64,
) -> String {
    let scope = match scope {
        ExportScope::Items => "items",
        ExportScope::Tins => "tins",
    };
    format!("cellarbook-{scope}-{timestamp_ms}.{}", format.extension())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dates::parse_date;
    use crate::models::{Item, ItemId, TinId};
    use pretty_assertions::assert_eq;

    fn sample() -> ItemDetails {
        ItemDetails {
            item: Item {
                id: ItemId::new(1),
                brand: "Cornell & Diehl".into(),
                blend: "Pirate Kake".into(),
                item_type: "Virginia/Perique".into(),
                sub_genre: String::new(),
                cut: "Cake".into(),
                quantity: 2,
                favorite: true,
                disliked: false,
                in_production: false,
                rating: Some(4.5),
                notes: "Says \"arr\"".into(),
                sync_enabled: true,
                last_modified: 0,
            },
            components: vec!["Perique".into(), "Virginia".into()],
            flavoring: vec![],
            tins: vec![Tin {
                id: TinId::new(1),
                item_id: ItemId::new(1),
                label: "Lot 1".into(),
                container: "Tin".into(),
                quantity: 1.75,
                unit: "oz".into(),
                manufacture_date: parse_date("2019-01-01"),
                cellar_date: None,
                open_date: None,
                finished: false,
                last_modified: 0,
            }],
        }
    }

    #[test]
    fn items_csv_uses_fixed_header_and_full_quoting() {
        let csv = render_items_csv(&[sample()]).unwrap();
        let mut lines = csv.lines();
        assert_eq!(
            lines.next().unwrap(),
            r#""Brand","Blend","Type","Sub-Genre","Cut","No. of Tins","Favorite","Disliked","Production Status","Notes","Components""#
        );
        assert_eq!(
            lines.next().unwrap(),
            r#""Cornell & Diehl","Pirate Kake","Virginia/Perique","","Cake","2","true","false","Discontinued","Says ""arr""","Perique, Virginia""#
        );
        assert!(lines.next().is_none());
    }

    #[test]
    fn tins_csv_appends_tin_columns() {
        let mut bare = sample();
        bare.item.blend = "Bare".into();
        bare.tins.clear();

        let csv = render_tins_csv(&[sample(), bare]).unwrap();
        let lines: Vec<_> = csv.lines().collect();
        assert_eq!(lines.len(), 3);
        assert!(lines[0].ends_with(r#""Components","Container","Quantity","Manufacture Date","Cellar Date","Open Date""#));
        assert!(lines[1].ends_with(r#""Tin","1.75 oz","2019-01-01","","""#));
        assert!(lines[2].ends_with(r#""","","","","""#));
    }

    #[test]
    fn json_export_contains_tins() {
        let json = render_export(&[sample()], ExportFormat::Json, ExportScope::Items).unwrap();
        let value: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert_eq!(value[0]["tins"][0]["label"], "Lot 1");
    }

    #[test]
    fn suggested_export_file_name_uses_format_extension() {
        assert_eq!(
            suggested_export_file_name(ExportFormat::Csv, ExportScope::Tins, 123),
            "cellarbook-tins-123.csv"
        );
        assert_eq!(
            suggested_export_file_name(ExportFormat::Json, ExportScope::Items, 456),
            "cellarbook-items-456.json"
        );
    }
}
