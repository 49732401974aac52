//! Remote store backed by a shared folder

use std::path::{Path, PathBuf};
use std::time::UNIX_EPOCH;

use super::remote::{parse_batch_timestamp, RemoteAccount, RemoteObject, RemoteStore};
use crate::error::{Error, Result};

const TMP_SUFFIX: &str = ".tmp";

/// Batch objects stored as files in one directory (a network share or a
/// folder kept in step by a file-sync client). Writes land under a
/// temporary name and are renamed into place.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirectoryRemoteStore {
    root: PathBuf,
}

impl DirectoryRemoteStore {
    #[must_use]
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    fn object_path(&self, name: &str) -> Result<PathBuf> {
        validate_object_name(name)?;
        Ok(self.root.join(name))
    }
}

fn validate_object_name(name: &str) -> Result<()> {
    let invalid = name.is_empty()
        || name.starts_with('.')
        || name.contains(['/', '\\'])
        || name.contains("..");
    if invalid {
        return Err(Error::InvalidInput(format!(
            "Invalid remote object name '{name}'"
        )));
    }
    Ok(())
}

fn storage_error(operation: &str, path: &Path, error: impl std::fmt::Display) -> Error {
    Error::Storage(format!(
        "Directory {operation} failed for {}: {error}",
        path.display()
    ))
}

async fn modified_millis(path: &Path) -> Option<i64> {
    let modified = tokio::fs::metadata(path).await.ok()?.modified().ok()?;
    let elapsed = modified.duration_since(UNIX_EPOCH).ok()?;
    i64::try_from(elapsed.as_millis()).ok()
}

impl RemoteStore for DirectoryRemoteStore {
    async fn account(&self) -> Result<Option<RemoteAccount>> {
        tokio::fs::create_dir_all(&self.root)
            .await
            .map_err(|error| storage_error("create_dir", &self.root, error))?;
        let display_name = self.root.display().to_string();
        Ok(Some(RemoteAccount {
            id: display_name.clone(),
            display_name,
        }))
    }

    async fn list_objects(&self) -> Result<Vec<RemoteObject>> {
        let mut entries = match tokio::fs::read_dir(&self.root).await {
            Ok(entries) => entries,
            Err(error) if error.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(error) => return Err(storage_error("read_dir", &self.root, error)),
        };

        let mut objects = Vec::new();
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|error| storage_error("read_dir", &self.root, error))?
        {
            let Ok(name) = entry.file_name().into_string() else {
                continue;
            };
            if validate_object_name(&name).is_err()
                || name.ends_with(TMP_SUFFIX)
                || !name.ends_with(".json")
            {
                continue;
            }
            let created_at = match parse_batch_timestamp(&name) {
                Some(created_at) => created_at,
                None => modified_millis(&entry.path()).await.unwrap_or_default(),
            };
            objects.push(RemoteObject {
                id: name.clone(),
                name,
                created_at,
            });
        }
        objects.sort_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.name.cmp(&b.name)));
        Ok(objects)
    }

    async fn get_object(&self, id: &str) -> Result<Vec<u8>> {
        let path = self.object_path(id)?;
        tokio::fs::read(&path)
            .await
            .map_err(|error| storage_error("read", &path, error))
    }

    async fn put_object(&self, name: &str, bytes: Vec<u8>) -> Result<RemoteObject> {
        let path = self.object_path(name)?;
        tokio::fs::create_dir_all(&self.root)
            .await
            .map_err(|error| storage_error("create_dir", &self.root, error))?;

        let tmp = self.root.join(format!(".{name}{TMP_SUFFIX}"));
        tokio::fs::write(&tmp, bytes)
            .await
            .map_err(|error| storage_error("write", &tmp, error))?;
        tokio::fs::rename(&tmp, &path)
            .await
            .map_err(|error| storage_error("rename", &path, error))?;

        let created_at = match parse_batch_timestamp(name) {
            Some(created_at) => created_at,
            None => modified_millis(&path).await.unwrap_or_default(),
        };
        Ok(RemoteObject {
            id: name.to_string(),
            name: name.to_string(),
            created_at,
        })
    }

    async fn delete_object(&self, id: &str) -> Result<()> {
        let path = self.object_path(id)?;
        match tokio::fs::remove_file(&path).await {
            Ok(()) => Ok(()),
            Err(error) if error.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(error) => Err(storage_error("remove", &path, error)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sync::batch_object_name;
    use pretty_assertions::assert_eq;
    use tempfile::tempdir;

    #[tokio::test(flavor = "multi_thread")]
    async fn put_list_get_delete() {
        let tmp = tempdir().unwrap();
        let store = DirectoryRemoteStore::new(tmp.path().join("remote"));
        assert!(store.list_objects().await.unwrap().is_empty());

        let older = store
            .put_object(&batch_object_name(10), b"[1]".to_vec())
            .await
            .unwrap();
        let newer = store
            .put_object(&batch_object_name(20), b"[2]".to_vec())
            .await
            .unwrap();

        let listed = store.list_objects().await.unwrap();
        assert_eq!(listed, vec![older.clone(), newer.clone()]);
        assert_eq!(store.get_object(&newer.id).await.unwrap(), b"[2]".to_vec());

        store.delete_object(&older.id).await.unwrap();
        store.delete_object(&older.id).await.unwrap();
        assert_eq!(store.list_objects().await.unwrap(), vec![newer]);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn temporary_and_foreign_files_are_ignored() {
        let tmp = tempdir().unwrap();
        let store = DirectoryRemoteStore::new(tmp.path());
        std::fs::write(tmp.path().join(".batch-1-a.json.tmp"), b"[]").unwrap();
        std::fs::write(tmp.path().join("readme.txt"), b"hi").unwrap();
        assert!(store.list_objects().await.unwrap().is_empty());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn path_traversal_is_rejected() {
        let tmp = tempdir().unwrap();
        let store = DirectoryRemoteStore::new(tmp.path());
        assert!(matches!(
            store.get_object("../secret.json").await,
            Err(Error::InvalidInput(_))
        ));
        assert!(store.put_object("a/b.json", Vec::new()).await.is_err());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn account_creates_the_folder() {
        let tmp = tempdir().unwrap();
        let root = tmp.path().join("new-remote");
        let store = DirectoryRemoteStore::new(&root);
        assert!(store.account().await.unwrap().is_some());
        assert!(root.is_dir());
    }
}
