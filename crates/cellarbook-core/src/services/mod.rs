//! Services shared by every front end

mod app;
mod catalog;
mod legacy_flags;
mod live;

pub use app::{AppContext, SyncPass};
pub use catalog::CatalogService;
pub use legacy_flags::migrate_legacy_sync_flags;
pub use live::{ChangeFeed, LiveQuery, LiveQueryHub, Table};
