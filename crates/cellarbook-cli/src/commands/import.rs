use std::path::Path;

use cellarbook_core::import::{DuplicateStrategy, ImportSummary};
use cellarbook_core::services::AppContext;

use crate::error::CliError;

pub fn format_import_summary(summary: &ImportSummary) -> String {
    format!(
        "Imported {} new, {} updated, {} skipped, {} malformed rows, {} tins added",
        summary.inserted, summary.updated, summary.skipped, summary.malformed, summary.tins_added
    )
}

pub async fn run_import(app: &AppContext, path: &Path, merge: bool) -> Result<(), CliError> {
    let text = tokio::fs::read_to_string(path).await?;
    let strategy = if merge {
        DuplicateStrategy::Merge
    } else {
        DuplicateStrategy::Skip
    };

    let summary = app.catalog().import_csv(&text, strategy).await?;
    println!("{}", format_import_summary(&summary));
    Ok(())
}
