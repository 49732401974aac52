use cellarbook_core::models::NameUsage;
use cellarbook_core::services::AppContext;
use serde::Serialize;

use crate::error::CliError;

#[derive(Debug, Serialize)]
pub struct NameListing {
    pub components: Vec<NameUsage>,
    pub flavoring: Vec<NameUsage>,
}

pub fn format_name_lines(title: &str, names: &[NameUsage]) -> Vec<String> {
    let mut lines = vec![format!("{title}:")];
    if names.is_empty() {
        lines.push("  (none)".to_string());
    }
    lines.extend(
        names
            .iter()
            .map(|usage| format!("  {} ({})", usage.name, usage.item_count)),
    );
    lines
}

pub async fn run_names_list(app: &AppContext, as_json: bool) -> Result<(), CliError> {
    let listing = NameListing {
        components: app.catalog().list_components().await?,
        flavoring: app.catalog().list_flavoring().await?,
    };

    if as_json {
        println!("{}", serde_json::to_string_pretty(&listing)?);
        return Ok(());
    }

    for line in format_name_lines("Components", &listing.components)
        .into_iter()
        .chain(format_name_lines("Flavoring", &listing.flavoring))
    {
        println!("{line}");
    }
    Ok(())
}

pub async fn run_names_prune(app: &AppContext) -> Result<(), CliError> {
    let removed = app.catalog().delete_unused_names().await?;
    println!("Removed {removed} unused names");
    Ok(())
}
