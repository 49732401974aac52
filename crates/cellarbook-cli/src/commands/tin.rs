use cellarbook_core::models::{TinDraft, TinId};
use cellarbook_core::services::AppContext;
use chrono::Utc;

use crate::cli::TinFields;
use crate::commands::common::{apply_tin_fields, format_tin_lines, item_title, resolve_item};
use crate::error::CliError;

pub async fn run_tin_add(
    app: &AppContext,
    item: &str,
    label: &str,
    fields: &TinFields,
) -> Result<(), CliError> {
    let details = resolve_item(item, app.catalog()).await?;
    let mut draft = TinDraft::new(label);
    apply_tin_fields(&mut draft, fields)?;

    let tin = app.catalog().add_tin(details.item.id, &draft).await?;
    println!("#{} {} ({})", tin.id.get(), tin.label, item_title(&details));
    Ok(())
}

pub async fn run_tin_list(app: &AppContext, item: &str, as_json: bool) -> Result<(), CliError> {
    let details = resolve_item(item, app.catalog()).await?;
    let tins = app.catalog().list_tins(details.item.id).await?;

    if as_json {
        println!("{}", serde_json::to_string_pretty(&tins)?);
        return Ok(());
    }

    if tins.is_empty() {
        println!("No tins for {}.", item_title(&details));
        return Ok(());
    }
    for line in format_tin_lines(&tins, Utc::now().timestamp_millis()) {
        println!("{line}");
    }
    Ok(())
}

async fn load_tin_draft(app: &AppContext, id: i64) -> Result<(TinId, TinDraft), CliError> {
    let tin_id = TinId::new(id);
    let tin = app
        .catalog()
        .get_tin(tin_id)
        .await?
        .ok_or(CliError::TinNotFound(id))?;
    Ok((tin_id, TinDraft::from_tin(&tin)))
}

pub async fn run_tin_edit(
    app: &AppContext,
    id: i64,
    label: Option<&str>,
    fields: &TinFields,
) -> Result<(), CliError> {
    let (tin_id, original) = load_tin_draft(app, id).await?;
    let mut draft = original.clone();
    if let Some(label) = label {
        draft.label = label.to_string();
    }
    apply_tin_fields(&mut draft, fields)?;

    if draft == original {
        return Err(CliError::NothingToUpdate);
    }

    let tin = app.catalog().update_tin(tin_id, &draft).await?;
    println!("#{} {}", tin.id.get(), tin.label);
    Ok(())
}

pub async fn run_tin_finish(app: &AppContext, id: i64) -> Result<(), CliError> {
    let (tin_id, mut draft) = load_tin_draft(app, id).await?;
    if draft.finished {
        println!("#{id} {} is already finished", draft.label);
        return Ok(());
    }
    draft.finished = true;

    let tin = app.catalog().update_tin(tin_id, &draft).await?;
    println!("#{} {} finished", tin.id.get(), tin.label);
    Ok(())
}

pub async fn run_tin_delete(app: &AppContext, id: i64) -> Result<(), CliError> {
    let (tin_id, draft) = load_tin_draft(app, id).await?;

    app.catalog().delete_tin(tin_id).await?;
    println!("Deleted #{id} {}", draft.label);
    Ok(())
}
