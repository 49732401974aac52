use std::path::{Path, PathBuf};

use cellarbook_core::collection::{
    CollectionFilter, CollectionView, ProductionFilter, RatingFilter, SortDirection, SortField,
    SortOrder, TinFilter,
};
use cellarbook_core::config::AppConfig;
use cellarbook_core::dates::{format_date, parse_date, TinAge};
use cellarbook_core::export::format_tin_quantity;
use cellarbook_core::import::parse_tin_quantity;
use cellarbook_core::models::{ItemDetails, ItemDraft, ItemId, Tin, TinDraft};
use cellarbook_core::services::{AppContext, CatalogService};
use cellarbook_core::sync::{RemoteBackend, WorkOutcome};

use crate::cli::{FilterArgs, ItemFields, ProductionArg, RatingArg, SortArg, TinFields, TinStateArg};
use crate::error::CliError;

const APP_DIR: &str = "cellarbook";
const CONFIG_FILE_NAME: &str = "config.json";
const CLEAR_DATE: &str = "none";

/// Default data directory: `<platform data dir>/cellarbook`
pub fn default_data_dir() -> Option<PathBuf> {
    dirs::data_dir().map(|dir| dir.join(APP_DIR))
}

/// Default config file: `<platform config dir>/cellarbook/config.json`
pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join(APP_DIR).join(CONFIG_FILE_NAME))
}

/// Load the config file and environment, then apply `--db-path`.
pub fn load_config(
    config_path: Option<&Path>,
    db_path: Option<PathBuf>,
) -> Result<AppConfig, CliError> {
    let config_path = config_path.map(Path::to_path_buf).or_else(default_config_path);
    let mut config = AppConfig::load(config_path.as_deref())?;
    if let Some(db_path) = db_path {
        config.database_path = Some(db_path);
    }
    Ok(config)
}

pub async fn open_app(config: AppConfig) -> Result<AppContext, CliError> {
    // An explicit database path keeps the preferences file next to it
    let data_dir = match config.database_path.as_deref().and_then(Path::parent) {
        Some(parent) => parent.to_path_buf(),
        None => default_data_dir().ok_or(CliError::NoDataDir)?,
    };
    Ok(AppContext::open(config, &data_dir).await?)
}

pub fn ensure_remote(app: &AppContext) -> Result<(), CliError> {
    if matches!(app.remote(), RemoteBackend::Disconnected) {
        return Err(CliError::SyncNotConfigured);
    }
    Ok(())
}

/// Resolve an item by numeric id or by text matching exactly one brand + blend.
pub async fn resolve_item(query: &str, catalog: &CatalogService) -> Result<ItemDetails, CliError> {
    let query = query.trim();
    if let Ok(id) = query.parse::<ItemId>() {
        if let Some(details) = catalog.get_item(id).await? {
            return Ok(details);
        }
    }

    let needle = query.to_lowercase();
    if needle.is_empty() {
        return Err(CliError::ItemNotFound(query.to_string()));
    }
    let items = catalog.list_collection(&CollectionView::default()).await?;
    let exact: Vec<&ItemDetails> = items
        .iter()
        .filter(|details| item_title(details).to_lowercase() == needle)
        .collect();
    if let [only] = exact.as_slice() {
        return Ok((*only).clone());
    }

    let matching: Vec<&ItemDetails> = items
        .iter()
        .filter(|details| item_title(details).to_lowercase().contains(&needle))
        .collect();
    match matching.as_slice() {
        [] => Err(CliError::ItemNotFound(query.to_string())),
        [only] => Ok((*only).clone()),
        several => {
            let options = several
                .iter()
                .take(3)
                .map(|details| format!("#{} {}", details.item.id, item_title(details)))
                .collect::<Vec<_>>()
                .join(", ");
            Err(CliError::AmbiguousItem(format!(
                "'{query}' matches {} items: {options}",
                several.len()
            )))
        }
    }
}

pub fn item_title(details: &ItemDetails) -> String {
    format!("{} - {}", details.item.brand, details.item.blend)
}

/// Overlay the flags the user passed onto `draft`.
pub fn apply_item_fields(draft: &mut ItemDraft, fields: &ItemFields) {
    let text = |value: &Option<String>, target: &mut String| {
        if let Some(value) = value {
            target.clone_from(value);
        }
    };
    text(&fields.item_type, &mut draft.item_type);
    text(&fields.sub_genre, &mut draft.sub_genre);
    text(&fields.cut, &mut draft.cut);
    text(&fields.notes, &mut draft.notes);

    if let Some(quantity) = fields.quantity {
        draft.quantity = quantity;
    }
    if let Some(rating) = fields.rating {
        draft.rating = Some(rating);
    }
    if let Some(components) = &fields.components {
        draft.components.clone_from(components);
    }
    if let Some(flavoring) = &fields.flavoring {
        draft.flavoring.clone_from(flavoring);
    }
    if let Some(favorite) = fields.favorite {
        draft.favorite = favorite;
    }
    if let Some(disliked) = fields.disliked {
        draft.disliked = disliked;
    }
    if let Some(in_production) = fields.in_production {
        draft.in_production = in_production;
    }
    if let Some(sync) = fields.sync {
        draft.sync_enabled = sync;
    }
}

/// `None` when the flag was omitted, `Some(None)` to clear the date.
pub fn parse_date_arg(value: Option<&str>) -> Result<Option<Option<i64>>, CliError> {
    let Some(value) = value.map(str::trim) else {
        return Ok(None);
    };
    if value.eq_ignore_ascii_case(CLEAR_DATE) || value.is_empty() {
        return Ok(Some(None));
    }
    parse_date(value)
        .map(|ms| Some(Some(ms)))
        .ok_or_else(|| CliError::InvalidDate(value.to_string()))
}

/// Overlay the tin flags onto `draft`.
pub fn apply_tin_fields(draft: &mut TinDraft, fields: &TinFields) -> Result<(), CliError> {
    if let Some(container) = &fields.container {
        draft.container.clone_from(container);
    }
    if let Some(quantity) = &fields.quantity {
        let (amount, unit) = parse_tin_quantity(quantity)
            .ok_or_else(|| CliError::InvalidQuantity(quantity.clone()))?;
        draft.quantity = amount;
        draft.unit = unit;
    }
    if let Some(date) = parse_date_arg(fields.manufactured.as_deref())? {
        draft.manufacture_date = date;
    }
    if let Some(date) = parse_date_arg(fields.cellared.as_deref())? {
        draft.cellar_date = date;
    }
    if let Some(date) = parse_date_arg(fields.opened.as_deref())? {
        draft.open_date = date;
    }
    if let Some(finished) = fields.finished {
        draft.finished = finished;
    }
    Ok(())
}

pub const fn sort_field(arg: SortArg) -> SortField {
    match arg {
        SortArg::Brand => SortField::Brand,
        SortArg::Blend => SortField::Blend,
        SortArg::Type => SortField::Type,
        SortArg::Quantity => SortField::Quantity,
        SortArg::Rating => SortField::Rating,
        SortArg::Modified => SortField::LastModified,
    }
}

pub const fn sort_direction(desc: bool) -> SortDirection {
    if desc {
        SortDirection::Descending
    } else {
        SortDirection::Ascending
    }
}

/// Build the collection view; without `--sort` the saved sort applies.
pub fn collection_view(args: &FilterArgs, saved_sort: SortOrder) -> CollectionView {
    let filter = CollectionFilter {
        brands: args.brand.clone(),
        types: args.types.clone(),
        sub_genres: args.sub_genre.clone(),
        cuts: args.cut.clone(),
        components: args.component.clone(),
        flavoring: args.flavoring.clone(),
        favorites_only: args.favorites,
        exclude_disliked: args.hide_disliked,
        production: match args.production {
            None => ProductionFilter::Any,
            Some(ProductionArg::InProduction) => ProductionFilter::InProduction,
            Some(ProductionArg::Discontinued) => ProductionFilter::Discontinued,
        },
        rating: match args.rated {
            None => RatingFilter::Any,
            Some(RatingArg::Rated) => RatingFilter::Rated,
            Some(RatingArg::Unrated) => RatingFilter::Unrated,
        },
        tins: match args.tin_state {
            None => TinFilter::Any,
            Some(TinStateArg::HasTins) => TinFilter::HasTins,
            Some(TinStateArg::Opened) => TinFilter::Opened,
            Some(TinStateArg::Finished) => TinFilter::Finished,
            Some(TinStateArg::Cellared) => TinFilter::Cellared,
        },
        search: args.search.clone().filter(|value| !value.trim().is_empty()),
    };
    let sort = match args.sort {
        Some(field) => SortOrder::new(sort_field(field), sort_direction(args.desc)),
        None if args.desc => SortOrder::new(saved_sort.field, SortDirection::Descending),
        None => saved_sort,
    };
    CollectionView { filter, sort }
}

pub fn format_rating(rating: Option<f64>) -> String {
    rating.map_or_else(|| "-".to_string(), |value| format!("{value:.1}"))
}

pub fn format_item_lines(items: &[ItemDetails]) -> Vec<String> {
    items
        .iter()
        .map(|details| {
            let item = &details.item;
            let mut line = format!("#{:<5} {}", item.id.get(), item_title(details));
            if !item.item_type.is_empty() {
                line.push_str(&format!(" [{}]", item.item_type));
            }
            line.push_str(&format!("  x{}", item.quantity));
            if let Some(rating) = item.rating {
                line.push_str(&format!("  {rating:.1}/5"));
            }
            if !details.tins.is_empty() {
                let unit = if details.tins.len() == 1 { "tin" } else { "tins" };
                line.push_str(&format!("  {} {unit}", details.tins.len()));
            }
            if item.favorite {
                line.push_str("  *");
            }
            line
        })
        .collect()
}

fn field_line(label: &str, value: &str) -> Option<String> {
    (!value.is_empty()).then(|| format!("{label:<14}{value}"))
}

pub fn format_item_details(details: &ItemDetails, now_ms: i64) -> Vec<String> {
    let item = &details.item;
    let yes_no = |value: bool| if value { "yes" } else { "no" };
    let mut lines = vec![format!("#{} {}", item.id, item_title(details))];
    lines.extend(
        [
            field_line("Type", &item.item_type),
            field_line("Sub-genre", &item.sub_genre),
            field_line("Cut", &item.cut),
            field_line("Components", &details.components.join(", ")),
            field_line("Flavoring", &details.flavoring.join(", ")),
            field_line("Quantity", &item.quantity.to_string()),
            field_line("Rating", &format_rating(item.rating)),
            field_line("Favorite", yes_no(item.favorite)),
            field_line("Disliked", yes_no(item.disliked)),
            field_line(
                "Production",
                if item.in_production { "in production" } else { "discontinued" },
            ),
            field_line("Sync", yes_no(item.sync_enabled)),
            field_line("Notes", &item.notes),
        ]
        .into_iter()
        .flatten(),
    );
    if !details.tins.is_empty() {
        lines.push("Tins:".to_string());
        lines.extend(
            format_tin_lines(&details.tins, now_ms)
                .into_iter()
                .map(|line| format!("  {line}")),
        );
    }
    lines
}

pub fn tin_status(tin: &Tin) -> &'static str {
    if tin.finished {
        "finished"
    } else if tin.is_opened() {
        "open"
    } else if tin.is_cellared() {
        "cellared"
    } else {
        "unopened"
    }
}

pub fn format_tin_lines(tins: &[Tin], now_ms: i64) -> Vec<String> {
    tins.iter()
        .map(|tin| {
            let mut line = format!("#{:<5} {}", tin.id.get(), tin.label);
            if !tin.container.is_empty() {
                line.push_str(&format!(" ({})", tin.container));
            }
            line.push_str(&format!("  {}  {}", format_tin_quantity(tin), tin_status(tin)));
            if let Some(made) = tin.manufacture_date {
                line.push_str(&format!("  made {}", format_date(made)));
                if let Some(age) = TinAge::between(made, now_ms) {
                    line.push_str(&format!(" ({age})"));
                }
            }
            if let Some(opened) = tin.open_date {
                line.push_str(&format!("  opened {}", format_date(opened)));
            }
            line
        })
        .collect()
}

pub fn describe_outcome(outcome: &WorkOutcome) -> String {
    match outcome {
        WorkOutcome::Success => "done".to_string(),
        WorkOutcome::Retry => "failed, will retry".to_string(),
        WorkOutcome::Skipped(reason) => format!("skipped ({reason})"),
    }
}

/// Map a manual run's outcome to the process result.
pub fn outcome_result(step: &'static str, outcome: &WorkOutcome) -> Result<(), CliError> {
    if outcome.is_retry() {
        Err(CliError::SyncIncomplete(step))
    } else {
        Ok(())
    }
}
