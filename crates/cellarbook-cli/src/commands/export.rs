use std::path::Path;

use cellarbook_core::export::{ExportFormat as CoreFormat, ExportScope};
use cellarbook_core::services::AppContext;

use crate::cli::{ExportFormat, FilterArgs};
use crate::commands::common::collection_view;
use crate::error::CliError;

pub async fn run_export(
    app: &AppContext,
    format: ExportFormat,
    tins: bool,
    filter: &FilterArgs,
    output_path: Option<&Path>,
) -> Result<(), CliError> {
    let view = collection_view(filter, app.preferences().get()?.sort);
    let format = match format {
        ExportFormat::Csv => CoreFormat::Csv,
        ExportFormat::Json => CoreFormat::Json,
    };
    let scope = if tins { ExportScope::Tins } else { ExportScope::Items };
    let rendered = app.catalog().export(&view, format, scope).await?;

    if let Some(path) = output_path {
        std::fs::write(path, rendered)?;
        println!("{}", path.display());
    } else {
        print!("{rendered}");
    }

    Ok(())
}
