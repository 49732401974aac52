use cellarbook_core::collection::SortOrder;
use cellarbook_core::models::Preferences;
use cellarbook_core::services::AppContext;

use crate::cli::{SortArg, Toggle};
use crate::commands::common::{item_title, resolve_item, sort_direction, sort_field};
use crate::error::CliError;

pub fn format_prefs_lines(prefs: &Preferences) -> Vec<String> {
    let on_off = |value: bool| if value { "on" } else { "off" };
    vec![
        format!("view_mode            {:?}", prefs.view_mode).to_lowercase(),
        format!("theme                {:?}", prefs.theme).to_lowercase(),
        format!(
            "sort                 {} {:?}",
            prefs.sort.field, prefs.sort.direction
        )
        .to_lowercase(),
        format!("sync                 {}", on_off(prefs.sync_enabled)),
        format!("unmetered_only       {}", on_off(prefs.sync_unmetered_only)),
        format!("processed_batches    {}", prefs.processed_remote_ids.len()),
    ]
}

pub fn run_prefs_show(app: &AppContext, as_json: bool) -> Result<(), CliError> {
    let prefs = app.preferences().get()?;
    if as_json {
        println!("{}", serde_json::to_string_pretty(&prefs)?);
    } else {
        for line in format_prefs_lines(&prefs) {
            println!("{line}");
        }
    }
    Ok(())
}

pub fn run_prefs_sync(app: &AppContext, state: Toggle) -> Result<(), CliError> {
    app.preferences()
        .update(|prefs| prefs.sync_enabled = state.enabled())?;
    println!("Sync {}", if state.enabled() { "enabled" } else { "disabled" });
    Ok(())
}

pub fn run_prefs_unmetered_only(app: &AppContext, state: Toggle) -> Result<(), CliError> {
    app.preferences()
        .update(|prefs| prefs.sync_unmetered_only = state.enabled())?;
    println!(
        "Unmetered-only sync {}",
        if state.enabled() { "enabled" } else { "disabled" }
    );
    Ok(())
}

pub async fn run_prefs_item_sync(
    app: &AppContext,
    item: &str,
    state: Toggle,
) -> Result<(), CliError> {
    let details = resolve_item(item, app.catalog()).await?;
    app.catalog()
        .set_item_sync_enabled(details.item.id, state.enabled())
        .await?;
    println!(
        "Sync {} for #{} {}",
        if state.enabled() { "enabled" } else { "disabled" },
        details.item.id,
        item_title(&details)
    );
    Ok(())
}

pub fn run_prefs_sort(app: &AppContext, field: SortArg, desc: bool) -> Result<(), CliError> {
    let sort = SortOrder::new(sort_field(field), sort_direction(desc));
    app.preferences().update(|prefs| prefs.sort = sort)?;
    println!("Default sort: {} {:?}", sort.field, sort.direction);
    Ok(())
}
