use cellarbook_core::collection::CollectionStats;
use cellarbook_core::services::AppContext;

use crate::cli::FilterArgs;
use crate::commands::common::collection_view;
use crate::error::CliError;

const TOP_BRANDS: usize = 5;

pub fn format_stats_lines(stats: &CollectionStats) -> Vec<String> {
    let mut lines = vec![
        format!("Items:          {}", stats.item_count),
        format!("Tins:           {}", stats.tin_count),
        format!("Favorites:      {}", stats.favorite_count),
        format!("Disliked:       {}", stats.disliked_count),
        format!(
            "Production:     {} in production, {} discontinued",
            stats.in_production_count, stats.discontinued_count
        ),
        format!(
            "Rated:          {}{}",
            stats.rated_count,
            stats
                .average_rating
                .map(|average| format!(" (average {average:.2})"))
                .unwrap_or_default()
        ),
        format!(
            "Tin states:     {} opened, {} finished, {} cellared",
            stats.opened_tins, stats.finished_tins, stats.cellared_tins
        ),
    ];

    if let Some(age) = stats.average_tin_age {
        lines.push(format!("Average age:    {age}"));
    }
    if !stats.quantity_by_unit.is_empty() {
        let amounts = stats
            .quantity_by_unit
            .iter()
            .map(|(unit, amount)| {
                if unit.is_empty() {
                    format!("{amount}")
                } else {
                    format!("{amount} {unit}")
                }
            })
            .collect::<Vec<_>>()
            .join(", ");
        lines.push(format!("On hand:        {amounts}"));
    }
    if !stats.items_by_type.is_empty() {
        lines.push("By type:".to_string());
        lines.extend(
            stats
                .items_by_type
                .iter()
                .map(|(kind, count)| format!("  {kind}: {count}")),
        );
    }
    let brands = stats.top_brands(TOP_BRANDS);
    if !brands.is_empty() {
        lines.push("Top brands:".to_string());
        lines.extend(brands.iter().map(|(brand, count)| format!("  {brand}: {count}")));
    }
    lines
}

pub async fn run_stats(
    app: &AppContext,
    filter: &FilterArgs,
    as_json: bool,
) -> Result<(), CliError> {
    let view = collection_view(filter, app.preferences().get()?.sort);
    let stats = app.catalog().stats(&view).await?;

    if as_json {
        println!("{}", serde_json::to_string_pretty(&stats)?);
    } else {
        for line in format_stats_lines(&stats) {
            println!("{line}");
        }
    }
    Ok(())
}
