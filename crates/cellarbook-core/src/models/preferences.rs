//! User preferences model

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

use crate::collection::SortOrder;

/// Theme mode options
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ThemeMode {
    /// Light theme
    Light,
    /// Dark theme
    Dark,
    /// Follow system preference
    #[default]
    System,
}

/// Collection layout
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ViewMode {
    #[default]
    List,
    Table,
}

/// Key-value preferences persisted outside the catalog database
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Preferences {
    pub view_mode: ViewMode,
    pub theme: ThemeMode,
    /// Default collection sort
    pub sort: SortOrder,
    /// Master switch for queueing and running sync
    pub sync_enabled: bool,
    /// Only upload/download on unmetered networks
    pub sync_unmetered_only: bool,
    /// Remote batch ids already replayed (or uploaded) by this device
    pub processed_remote_ids: BTreeSet<String>,
    /// Per-item sync flags from before `items.sync_enabled` existed, keyed by item id
    pub legacy_item_sync_flags: BTreeMap<i64, bool>,
    /// Set once the legacy flags were copied into the database
    pub sync_flag_migration_complete: bool,
}

impl Default for Preferences {
    fn default() -> Self {
        Self {
            view_mode: ViewMode::List,
            theme: ThemeMode::System,
            sort: SortOrder::default(),
            sync_enabled: false,
            sync_unmetered_only: true,
            processed_remote_ids: BTreeSet::new(),
            legacy_item_sync_flags: BTreeMap::new(),
            sync_flag_migration_complete: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_preferences_default() {
        let prefs = Preferences::default();
        assert_eq!(prefs.theme, ThemeMode::System);
        assert_eq!(prefs.view_mode, ViewMode::List);
        assert!(!prefs.sync_enabled);
        assert!(prefs.sync_unmetered_only);
        assert!(!prefs.sync_flag_migration_complete);
    }

    #[test]
    fn missing_keys_fall_back_to_defaults() {
        let prefs: Preferences = serde_json::from_str(r#"{"theme":"dark"}"#).unwrap();
        assert_eq!(prefs.theme, ThemeMode::Dark);
        assert!(prefs.processed_remote_ids.is_empty());
    }
}
