use cellarbook_core::services::AppContext;

use crate::cli::FilterArgs;
use crate::commands::common::{collection_view, format_item_lines};
use crate::error::CliError;

pub async fn run_list(
    app: &AppContext,
    filter: &FilterArgs,
    as_json: bool,
) -> Result<(), CliError> {
    let saved_sort = app.preferences().get()?.sort;
    let view = collection_view(filter, saved_sort);
    let items = app.catalog().list_collection(&view).await?;

    if as_json {
        println!("{}", serde_json::to_string_pretty(&items)?);
        return Ok(());
    }

    if items.is_empty() {
        println!("No items match.");
        return Ok(());
    }
    for line in format_item_lines(&items) {
        println!("{line}");
    }
    Ok(())
}
