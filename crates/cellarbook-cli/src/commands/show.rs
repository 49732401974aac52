use cellarbook_core::services::AppContext;
use chrono::Utc;

use crate::commands::common::{format_item_details, resolve_item};
use crate::error::CliError;

pub async fn run_show(app: &AppContext, item: &str, as_json: bool) -> Result<(), CliError> {
    let details = resolve_item(item, app.catalog()).await?;

    if as_json {
        println!("{}", serde_json::to_string_pretty(&details)?);
    } else {
        for line in format_item_details(&details, Utc::now().timestamp_millis()) {
            println!("{line}");
        }
    }
    Ok(())
}
