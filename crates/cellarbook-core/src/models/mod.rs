//! Data models for cellarbook

mod item;
mod name;
mod preferences;
mod sync_operation;
mod tin;

pub use item::{Item, ItemDetails, ItemDraft, ItemId, ItemKey, MAX_RATING};
pub use name::{NameKind, NameUsage};
pub use preferences::{Preferences, ThemeMode, ViewMode};
pub use sync_operation::{
    EntityType, ItemPayload, NamePayload, OperationType, PendingSyncOperation, SyncOperation,
    TinPayload,
};
pub use tin::{Tin, TinDraft, TinId};
