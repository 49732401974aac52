//! Database layer for cellarbook

mod connection;
mod migrations;
mod repository;
mod sync_queue;

pub use connection::Database;
pub use migrations::SCHEMA_VERSION;
pub use repository::{CatalogRepository, LibSqlCatalogRepository, SyncGate};
pub use sync_queue::SyncQueue;

pub(crate) use repository::{finish_transaction, ReplayWriter};
