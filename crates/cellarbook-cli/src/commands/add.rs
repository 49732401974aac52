use cellarbook_core::models::ItemDraft;
use cellarbook_core::services::AppContext;

use crate::cli::ItemFields;
use crate::commands::common::{apply_item_fields, item_title};
use crate::error::CliError;

pub async fn run_add(
    app: &AppContext,
    brand: &str,
    blend: &str,
    fields: &ItemFields,
) -> Result<(), CliError> {
    let mut draft = ItemDraft::new(brand, blend);
    apply_item_fields(&mut draft, fields);

    let details = app.catalog().add_item(&draft).await?;
    println!("#{} {}", details.item.id, item_title(&details));
    Ok(())
}
