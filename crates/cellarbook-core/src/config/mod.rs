//! Application configuration.
//!
//! `AppConfig` is read from an optional JSON file, then individual fields
//! are overridden from `CELLARBOOK_*` environment variables. Secrets (S3
//! credentials) are only ever read from the environment.

use std::env;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::util::normalize_text_option;

const DEFAULT_SYNC_INTERVAL_SECS: u64 = 900;
const DEFAULT_RETENTION_DAYS: u32 = 30;
const DEFAULT_LIVE_QUERY_IDLE_MS: u64 = 5000;

const DATABASE_FILE_NAME: &str = "cellarbook.db";
const PREFERENCES_FILE_NAME: &str = "preferences.json";

const ENV_DB_PATH: &str = "CELLARBOOK_DB_PATH";
const ENV_PREFERENCES_PATH: &str = "CELLARBOOK_PREFERENCES_PATH";
const ENV_REMOTE_DIR: &str = "CELLARBOOK_REMOTE_DIR";
const ENV_S3_BUCKET: &str = "CELLARBOOK_S3_BUCKET";
const ENV_S3_ENDPOINT_URL: &str = "CELLARBOOK_S3_ENDPOINT_URL";
const ENV_S3_REGION: &str = "CELLARBOOK_S3_REGION";
const ENV_S3_PREFIX: &str = "CELLARBOOK_S3_PREFIX";
const ENV_S3_ACCESS_KEY_ID: &str = "CELLARBOOK_S3_ACCESS_KEY_ID";
const ENV_S3_SECRET_ACCESS_KEY: &str = "CELLARBOOK_S3_SECRET_ACCESS_KEY";
const ENV_UPLOAD_INTERVAL: &str = "CELLARBOOK_UPLOAD_INTERVAL_SECS";
const ENV_DOWNLOAD_INTERVAL: &str = "CELLARBOOK_DOWNLOAD_INTERVAL_SECS";
const ENV_RETENTION_DAYS: &str = "CELLARBOOK_RETENTION_DAYS";
const ENV_LIVE_QUERY_IDLE_MS: &str = "CELLARBOOK_LIVE_QUERY_IDLE_MS";

/// Where uploaded sync batches are stored.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RemoteConfig {
    /// Sync has no remote; workers report `Skipped`
    #[default]
    None,
    /// A folder shared between devices (network share, synced drive)
    Directory { path: PathBuf },
    /// Any S3-compatible bucket
    S3(S3Config),
}

/// S3-compatible bucket settings (credentials come from the environment)
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct S3Config {
    pub bucket: String,
    #[serde(default)]
    pub endpoint_url: Option<String>,
    #[serde(default)]
    pub region: Option<String>,
    /// Key prefix; defaults to `cellarbook-sync/`
    #[serde(default)]
    pub prefix: Option<String>,
}

/// Access keys for the S3 remote
#[derive(Clone, PartialEq, Eq)]
pub struct S3Credentials {
    pub access_key_id: String,
    pub secret_access_key: String,
}

impl std::fmt::Debug for S3Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("S3Credentials")
            .field("access_key_id", &self.access_key_id)
            .field("secret_access_key", &"<redacted>")
            .finish()
    }
}

impl S3Credentials {
    /// Load credentials from the environment.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        parse_credentials(lookup)
    }
}

/// Runtime configuration shared by every front end
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct AppConfig {
    #[serde(default)]
    pub database_path: Option<PathBuf>,
    #[serde(default)]
    pub preferences_path: Option<PathBuf>,
    #[serde(default)]
    pub remote: RemoteConfig,
    #[serde(default = "default_sync_interval")]
    pub upload_interval_secs: u64,
    #[serde(default = "default_sync_interval")]
    pub download_interval_secs: u64,
    #[serde(default = "default_retention_days")]
    pub retention_days: u32,
    #[serde(default = "default_live_query_idle_ms")]
    pub live_query_idle_ms: u64,
}

const fn default_sync_interval() -> u64 {
    DEFAULT_SYNC_INTERVAL_SECS
}

const fn default_retention_days() -> u32 {
    DEFAULT_RETENTION_DAYS
}

const fn default_live_query_idle_ms() -> u64 {
    DEFAULT_LIVE_QUERY_IDLE_MS
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            database_path: None,
            preferences_path: None,
            remote: RemoteConfig::None,
            upload_interval_secs: DEFAULT_SYNC_INTERVAL_SECS,
            download_interval_secs: DEFAULT_SYNC_INTERVAL_SECS,
            retention_days: DEFAULT_RETENTION_DAYS,
            live_query_idle_ms: DEFAULT_LIVE_QUERY_IDLE_MS,
        }
    }
}

impl AppConfig {
    /// Load the config file (if any) and apply environment overrides.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut config = match path {
            Some(path) => Self::load_from_path(path)?,
            None => Self::default(),
        };
        config.apply_overrides(|key| env::var(key).ok())?;
        config.validate()?;
        Ok(config)
    }

    /// Read a config file; a missing file yields the defaults.
    pub fn load_from_path(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let raw = std::fs::read_to_string(path).map_err(|error| {
            Error::Config(format!("Failed to read config at {}: {error}", path.display()))
        })?;
        serde_json::from_str(&raw).map_err(|error| {
            Error::Config(format!("Failed to parse config at {}: {error}", path.display()))
        })
    }

    /// Override fields from `lookup` (the environment in production).
    pub fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) -> Result<()> {
        let lookup = |key: &str| normalize_text_option(lookup(key));

        if let Some(path) = lookup(ENV_DB_PATH) {
            self.database_path = Some(PathBuf::from(path));
        }
        if let Some(path) = lookup(ENV_PREFERENCES_PATH) {
            self.preferences_path = Some(PathBuf::from(path));
        }
        if let Some(path) = lookup(ENV_REMOTE_DIR) {
            self.remote = RemoteConfig::Directory {
                path: PathBuf::from(path),
            };
        }
        if let Some(bucket) = lookup(ENV_S3_BUCKET) {
            let mut s3 = match &self.remote {
                RemoteConfig::S3(existing) => existing.clone(),
                _ => S3Config::default(),
            };
            s3.bucket = bucket;
            self.remote = RemoteConfig::S3(s3);
        }
        if let RemoteConfig::S3(s3) = &mut self.remote {
            if let Some(endpoint) = lookup(ENV_S3_ENDPOINT_URL) {
                s3.endpoint_url = Some(endpoint);
            }
            if let Some(region) = lookup(ENV_S3_REGION) {
                s3.region = Some(region);
            }
            if let Some(prefix) = lookup(ENV_S3_PREFIX) {
                s3.prefix = Some(prefix);
            }
        }

        if let Some(value) = lookup(ENV_UPLOAD_INTERVAL) {
            self.upload_interval_secs = parse_number(ENV_UPLOAD_INTERVAL, &value)?;
        }
        if let Some(value) = lookup(ENV_DOWNLOAD_INTERVAL) {
            self.download_interval_secs = parse_number(ENV_DOWNLOAD_INTERVAL, &value)?;
        }
        if let Some(value) = lookup(ENV_RETENTION_DAYS) {
            self.retention_days = parse_number(ENV_RETENTION_DAYS, &value)?;
        }
        if let Some(value) = lookup(ENV_LIVE_QUERY_IDLE_MS) {
            self.live_query_idle_ms = parse_number(ENV_LIVE_QUERY_IDLE_MS, &value)?;
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        if self.upload_interval_secs == 0 || self.download_interval_secs == 0 {
            return Err(Error::Config("sync intervals must be at least 1 second".into()));
        }
        if self.retention_days == 0 {
            return Err(Error::Config("retention_days must be at least 1".into()));
        }
        match &self.remote {
            RemoteConfig::S3(s3) if s3.bucket.trim().is_empty() => {
                Err(Error::Config("S3 remote requires a bucket".into()))
            }
            RemoteConfig::S3(S3Config {
                endpoint_url: Some(url),
                ..
            }) if !crate::util::is_http_url(url) => Err(Error::Config(
                "S3 endpoint_url must start with http:// or https://".into(),
            )),
            RemoteConfig::Directory { path } if path.as_os_str().is_empty() => {
                Err(Error::Config("directory remote requires a path".into()))
            }
            _ => Ok(()),
        }
    }

    /// Database path, falling back to `data_dir/cellarbook.db`
    #[must_use]
    pub fn database_path_or(&self, data_dir: &Path) -> PathBuf {
        self.database_path
            .clone()
            .unwrap_or_else(|| data_dir.join(DATABASE_FILE_NAME))
    }

    /// Preferences path, falling back to `data_dir/preferences.json`
    #[must_use]
    pub fn preferences_path_or(&self, data_dir: &Path) -> PathBuf {
        self.preferences_path
            .clone()
            .unwrap_or_else(|| data_dir.join(PREFERENCES_FILE_NAME))
    }

    #[must_use]
    pub const fn upload_interval(&self) -> Duration {
        Duration::from_secs(self.upload_interval_secs)
    }

    #[must_use]
    pub const fn download_interval(&self) -> Duration {
        Duration::from_secs(self.download_interval_secs)
    }

    #[must_use]
    pub const fn retention(&self) -> Duration {
        Duration::from_secs(self.retention_days as u64 * 24 * 60 * 60)
    }

    #[must_use]
    pub const fn live_query_idle(&self) -> Duration {
        Duration::from_millis(self.live_query_idle_ms)
    }
}

fn parse_number<T: std::str::FromStr>(key: &str, value: &str) -> Result<T> {
    value
        .parse()
        .map_err(|_| Error::Config(format!("{key} must be a non-negative integer, got '{value}'")))
}

fn parse_credentials(lookup: impl Fn(&str) -> Option<String>) -> Result<S3Credentials> {
    let access_key_id = normalize_text_option(lookup(ENV_S3_ACCESS_KEY_ID));
    let secret_access_key = normalize_text_option(lookup(ENV_S3_SECRET_ACCESS_KEY));

    match (access_key_id, secret_access_key) {
        (Some(access_key_id), Some(secret_access_key)) => Ok(S3Credentials {
            access_key_id,
            secret_access_key,
        }),
        (access_key_id, secret_access_key) => {
            let mut missing = Vec::new();
            if access_key_id.is_none() {
                missing.push(ENV_S3_ACCESS_KEY_ID);
            }
            if secret_access_key.is_none() {
                missing.push(ENV_S3_SECRET_ACCESS_KEY);
            }
            Err(Error::Config(format!(
                "S3 credentials are incomplete. Missing: {}",
                missing.join(", ")
            )))
        }
    }
}
