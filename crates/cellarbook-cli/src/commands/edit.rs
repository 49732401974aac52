use cellarbook_core::models::ItemDraft;
use cellarbook_core::services::AppContext;

use crate::cli::ItemFields;
use crate::commands::common::{apply_item_fields, item_title, resolve_item};
use crate::error::CliError;

pub struct ItemEdit<'a> {
    pub brand: Option<&'a str>,
    pub blend: Option<&'a str>,
    pub fields: &'a ItemFields,
    pub clear_rating: bool,
}

pub async fn run_edit(app: &AppContext, item: &str, edit: &ItemEdit<'_>) -> Result<(), CliError> {
    let details = resolve_item(item, app.catalog()).await?;

    let original = ItemDraft::from_details(&details);
    let mut draft = original.clone();
    if let Some(brand) = edit.brand {
        draft.brand = brand.to_string();
    }
    if let Some(blend) = edit.blend {
        draft.blend = blend.to_string();
    }
    apply_item_fields(&mut draft, edit.fields);
    if edit.clear_rating {
        draft.rating = None;
    }

    if draft == original {
        return Err(CliError::NothingToUpdate);
    }

    let updated = app.catalog().update_item(details.item.id, &draft).await?;
    println!("#{} {}", updated.item.id, item_title(&updated));
    Ok(())
}
