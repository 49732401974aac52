//! Remote object storage seam shared by the sync workers

use std::future::Future;
use std::sync::OnceLock;

use regex::Regex;
use serde::Serialize;
use uuid::Uuid;

use super::directory::DirectoryRemoteStore;
use super::memory::MemoryRemoteStore;
use super::s3::S3RemoteStore;
use crate::config::{RemoteConfig, S3Credentials};
use crate::error::{Error, Result};

/// The signed-in remote identity
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RemoteAccount {
    pub id: String,
    pub display_name: String,
}

/// One stored batch object
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RemoteObject {
    /// Store-specific identifier passed back to `get_object`/`delete_object`
    pub id: String,
    pub name: String,
    /// Creation time (Unix ms)
    pub created_at: i64,
}

/// Application-private folder of sync batch objects.
pub trait RemoteStore: Send + Sync {
    /// The signed-in account, or `None` when signed out.
    fn account(&self) -> impl Future<Output = Result<Option<RemoteAccount>>> + Send;

    fn list_objects(&self) -> impl Future<Output = Result<Vec<RemoteObject>>> + Send;

    fn get_object(&self, id: &str) -> impl Future<Output = Result<Vec<u8>>> + Send;

    fn put_object(
        &self,
        name: &str,
        bytes: Vec<u8>,
    ) -> impl Future<Output = Result<RemoteObject>> + Send;

    fn delete_object(&self, id: &str) -> impl Future<Output = Result<()>> + Send;
}

/// Unique, time-ordered batch name: `batch-<unix ms>-<uuid v7>.json`
#[must_use]
pub fn batch_object_name(now_ms: i64) -> String {
    format!("batch-{now_ms}-{}.json", Uuid::now_v7())
}

/// Creation timestamp encoded in a batch object name
#[must_use]
pub fn parse_batch_timestamp(name: &str) -> Option<i64> {
    static BATCH_NAME: OnceLock<Regex> = OnceLock::new();
    let re = BATCH_NAME.get_or_init(|| {
        Regex::new(r"^batch-(\d+)-[0-9a-fA-F-]+\.json$").expect("Invalid regex")
    });
    re.captures(name)?.get(1)?.as_str().parse().ok()
}

/// The configured remote store.
#[derive(Debug, Clone, Default)]
pub enum RemoteBackend {
    /// No remote configured; behaves as signed out
    #[default]
    Disconnected,
    Memory(MemoryRemoteStore),
    Directory(DirectoryRemoteStore),
    S3(S3RemoteStore),
}

impl RemoteBackend {
    /// Build the backend described by `config`. S3 credentials come from `lookup`.
    pub fn from_config(
        config: &RemoteConfig,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<Self> {
        match config {
            RemoteConfig::None => Ok(Self::Disconnected),
            RemoteConfig::Directory { path } => {
                Ok(Self::Directory(DirectoryRemoteStore::new(path.clone())))
            }
            RemoteConfig::S3(s3) => {
                let credentials = S3Credentials::from_lookup(lookup)?;
                Ok(Self::S3(S3RemoteStore::new(s3.clone(), &credentials)))
            }
        }
    }

    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::Disconnected => "none",
            Self::Memory(_) => "memory",
            Self::Directory(_) => "directory",
            Self::S3(_) => "s3",
        }
    }
}

fn disconnected() -> Error {
    Error::Storage("no remote store is configured".into())
}

impl RemoteStore for RemoteBackend {
    async fn account(&self) -> Result<Option<RemoteAccount>> {
        match self {
            Self::Disconnected => Ok(None),
            Self::Memory(store) => store.account().await,
            Self::Directory(store) => store.account().await,
            Self::S3(store) => store.account().await,
        }
    }

    async fn list_objects(&self) -> Result<Vec<RemoteObject>> {
        match self {
            Self::Disconnected => Err(disconnected()),
            Self::Memory(store) => store.list_objects().await,
            Self::Directory(store) => store.list_objects().await,
            Self::S3(store) => store.list_objects().await,
        }
    }

    async fn get_object(&self, id: &str) -> Result<Vec<u8>> {
        match self {
            Self::Disconnected => Err(disconnected()),
            Self::Memory(store) => store.get_object(id).await,
            Self::Directory(store) => store.get_object(id).await,
            Self::S3(store) => store.get_object(id).await,
        }
    }

    async fn put_object(&self, name: &str, bytes: Vec<u8>) -> Result<RemoteObject> {
        match self {
            Self::Disconnected => Err(disconnected()),
            Self::Memory(store) => store.put_object(name, bytes).await,
            Self::Directory(store) => store.put_object(name, bytes).await,
            Self::S3(store) => store.put_object(name, bytes).await,
        }
    }

    async fn delete_object(&self, id: &str) -> Result<()> {
        match self {
            Self::Disconnected => Err(disconnected()),
            Self::Memory(store) => store.delete_object(id).await,
            Self::Directory(store) => store.delete_object(id).await,
            Self::S3(store) => store.delete_object(id).await,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn batch_names_carry_their_timestamp() {
        let name = batch_object_name(1_700_000_000_123);
        assert!(name.starts_with("batch-1700000000123-"));
        assert!(name.ends_with(".json"));
        assert_eq!(parse_batch_timestamp(&name), Some(1_700_000_000_123));
        assert_ne!(name, batch_object_name(1_700_000_000_123));
    }

    #[test]
    fn foreign_names_have_no_timestamp() {
        assert_eq!(parse_batch_timestamp("notes.txt"), None);
        assert_eq!(parse_batch_timestamp("batch-abc-123.json"), None);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn disconnected_backend_is_signed_out() {
        let backend = RemoteBackend::from_config(&RemoteConfig::None, |_| None).unwrap();
        assert_eq!(backend.kind(), "none");
        assert!(backend.account().await.unwrap().is_none());
        assert!(backend.list_objects().await.is_err());
    }

    #[test]
    fn s3_backend_requires_credentials() {
        let config = RemoteConfig::S3(crate::config::S3Config {
            bucket: "cellar".into(),
            endpoint_url: None,
            region: None,
            prefix: None,
        });
        assert!(matches!(
            RemoteBackend::from_config(&config, |_| None),
            Err(Error::Config(_))
        ));
    }
}
