//! Key-value preference store persisted as a JSON file

use std::path::{Path, PathBuf};
use std::sync::Mutex;

use crate::error::{Error, Result};
use crate::models::Preferences;

/// Preference store shared by the catalog, the sync workers and front ends.
///
/// Reads return a snapshot; every update is written through to disk before
/// it becomes visible to other readers.
#[derive(Debug)]
pub struct PreferenceStore {
    path: Option<PathBuf>,
    current: Mutex<Preferences>,
}

impl PreferenceStore {
    /// Load preferences from `path`, starting from defaults when the file is missing
    pub fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let prefs = load_from_path(&path)?;
        Ok(Self {
            path: Some(path),
            current: Mutex::new(prefs),
        })
    }

    /// Non-persistent store (tests and ephemeral runs)
    #[must_use]
    pub fn in_memory(prefs: Preferences) -> Self {
        Self {
            path: None,
            current: Mutex::new(prefs),
        }
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    pub fn get(&self) -> Result<Preferences> {
        self.current
            .lock()
            .map(|prefs| prefs.clone())
            .map_err(|_| Error::Preferences("preference lock poisoned".into()))
    }

    /// Apply `change`, persist the result and return it
    pub fn update<F>(&self, change: F) -> Result<Preferences>
    where
        F: FnOnce(&mut Preferences),
    {
        let mut current = self
            .current
            .lock()
            .map_err(|_| Error::Preferences("preference lock poisoned".into()))?;
        let mut next = current.clone();
        change(&mut next);
        if next != *current {
            if let Some(path) = &self.path {
                save_to_path(path, &next)?;
            }
            *current = next;
        }
        Ok(current.clone())
    }
}

fn load_from_path(path: &Path) -> Result<Preferences> {
    if !path.exists() {
        return Ok(Preferences::default());
    }
    let raw = std::fs::read_to_string(path).map_err(|error| {
        Error::Preferences(format!(
            "Failed to read preferences at {}: {error}",
            path.display()
        ))
    })?;
    serde_json::from_str(&raw).map_err(|error| {
        Error::Preferences(format!(
            "Failed to parse preferences at {}: {error}",
            path.display()
        ))
    })
}

fn save_to_path(path: &Path, prefs: &Preferences) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let serialized = serde_json::to_string_pretty(prefs)?;
    let tmp = path.with_extension("json.tmp");
    std::fs::write(&tmp, serialized)?;
    std::fs::rename(&tmp, path)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ThemeMode;
    use tempfile::tempdir;

    #[test]
    fn missing_file_starts_with_defaults() {
        let tmp = tempdir().unwrap();
        let store = PreferenceStore::open(tmp.path().join("prefs.json")).unwrap();
        assert_eq!(store.get().unwrap(), Preferences::default());
    }

    #[test]
    fn updates_persist_across_reopen() {
        let tmp = tempdir().unwrap();
        let path = tmp.path().join("nested").join("prefs.json");

        let store = PreferenceStore::open(&path).unwrap();
        store
            .update(|prefs| {
                prefs.sync_enabled = true;
                prefs.theme = ThemeMode::Dark;
                prefs.processed_remote_ids.insert("batch-1".into());
            })
            .unwrap();

        let reopened = PreferenceStore::open(&path).unwrap();
        let prefs = reopened.get().unwrap();
        assert!(prefs.sync_enabled);
        assert_eq!(prefs.theme, ThemeMode::Dark);
        assert!(prefs.processed_remote_ids.contains("batch-1"));
    }

    #[test]
    fn corrupt_file_is_reported() {
        let tmp = tempdir().unwrap();
        let path = tmp.path().join("prefs.json");
        std::fs::write(&path, "{not json").unwrap();
        assert!(matches!(
            PreferenceStore::open(&path),
            Err(Error::Preferences(_))
        ));
    }

    #[test]
    fn in_memory_store_never_touches_disk() {
        let store = PreferenceStore::in_memory(Preferences::default());
        let prefs = store.update(|prefs| prefs.sync_enabled = true).unwrap();
        assert!(prefs.sync_enabled);
        assert!(store.path().is_none());
    }
}
