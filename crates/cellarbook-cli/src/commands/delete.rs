use cellarbook_core::services::AppContext;

use crate::commands::common::{item_title, resolve_item};
use crate::error::CliError;

pub async fn run_delete(app: &AppContext, item: &str) -> Result<(), CliError> {
    let details = resolve_item(item, app.catalog()).await?;

    app.catalog().delete_item(details.item.id).await?;
    println!("Deleted #{} {}", details.item.id, item_title(&details));
    Ok(())
}
