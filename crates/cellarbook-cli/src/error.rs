use std::io;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum CliError {
    #[error(transparent)]
    Core(#[from] cellarbook_core::Error),
    #[error(transparent)]
    Io(#[from] io::Error),
    #[error(transparent)]
    Serialization(#[from] serde_json::Error),
    #[error("Item not found: {0}")]
    ItemNotFound(String),
    #[error("{0}")]
    AmbiguousItem(String),
    #[error("Tin not found: {0}")]
    TinNotFound(i64),
    #[error("Invalid date '{0}'. Use YYYY-MM-DD, MM/DD/YYYY, MM/YYYY or YYYY, or 'none' to clear")]
    InvalidDate(String),
    #[error("Invalid tin quantity '{0}'. Use an amount with an optional unit, e.g. '1.75 oz' or '50g'")]
    InvalidQuantity(String),
    #[error("Nothing to change. Pass at least one field to update")]
    NothingToUpdate,
    #[error("No data directory found for this platform. Pass --db-path or set CELLARBOOK_DB_PATH")]
    NoDataDir,
    #[error("Sync {0} did not complete and should be retried (run with RUST_LOG=cellarbook=debug for details)")]
    SyncIncomplete(&'static str),
    #[error(
        "Sync is not configured. Set \"remote\" in the config file, or set CELLARBOOK_REMOTE_DIR or CELLARBOOK_S3_BUCKET."
    )]
    SyncNotConfigured,
}
