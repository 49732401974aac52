//! Composition root shared by every front end.

use std::env;
use std::path::Path;
use std::sync::Arc;

use super::catalog::CatalogService;
use super::legacy_flags::migrate_legacy_sync_flags;
use crate::config::AppConfig;
use crate::error::Result;
use crate::models::Preferences;
use crate::preferences::PreferenceStore;
use crate::sync::{
    CancelSignal, DownloadReport, DownloadWorker, NetworkMonitor, RemoteBackend, StaticNetwork,
    SyncScheduler, UploadWorker, WorkOutcome,
};

/// Result of one manual upload + download pass
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncPass {
    pub upload: WorkOutcome,
    pub download: WorkOutcome,
    pub report: DownloadReport,
}

/// Owns the configuration, the catalog and the configured remote.
pub struct AppContext {
    config: AppConfig,
    catalog: CatalogService,
    remote: RemoteBackend,
    network: Arc<dyn NetworkMonitor>,
}

impl AppContext {
    /// Open the catalog and preference store under `data_dir` (unless the
    /// config names explicit paths) and run the legacy flag migration.
    pub async fn open(config: AppConfig, data_dir: &Path) -> Result<Self> {
        Self::open_with_lookup(config, data_dir, |key| env::var(key).ok()).await
    }

    /// Like [`AppContext::open`], reading S3 credentials from `lookup`.
    pub async fn open_with_lookup(
        config: AppConfig,
        data_dir: &Path,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<Self> {
        config.validate()?;
        let remote = RemoteBackend::from_config(&config.remote, lookup)?;

        let prefs = Arc::new(PreferenceStore::open(config.preferences_path_or(data_dir))?);
        let catalog = CatalogService::open_path(
            config.database_path_or(data_dir),
            Arc::clone(&prefs),
            config.live_query_idle(),
        )
        .await?;
        migrate_legacy_sync_flags(&catalog, &prefs).await?;

        tracing::debug!("Remote backend: {}", remote.kind());
        Ok(Self {
            config,
            catalog,
            remote,
            network: Arc::new(StaticNetwork::default()),
        })
    }

    /// In-memory catalog with default config (primarily for tests).
    pub async fn in_memory(remote: RemoteBackend, prefs: Preferences) -> Result<Self> {
        let prefs = Arc::new(PreferenceStore::in_memory(prefs));
        let catalog = CatalogService::open_in_memory(Arc::clone(&prefs)).await?;
        migrate_legacy_sync_flags(&catalog, &prefs).await?;
        Ok(Self {
            config: AppConfig::default(),
            catalog,
            remote,
            network: Arc::new(StaticNetwork::default()),
        })
    }

    #[must_use]
    pub fn with_network(mut self, network: Arc<dyn NetworkMonitor>) -> Self {
        self.network = network;
        self
    }

    pub const fn config(&self) -> &AppConfig {
        &self.config
    }

    pub const fn catalog(&self) -> &CatalogService {
        &self.catalog
    }

    pub fn preferences(&self) -> &Arc<PreferenceStore> {
        self.catalog.preferences()
    }

    pub const fn remote(&self) -> &RemoteBackend {
        &self.remote
    }

    pub fn network(&self) -> &Arc<dyn NetworkMonitor> {
        &self.network
    }

    pub fn upload_worker(&self) -> UploadWorker<RemoteBackend> {
        UploadWorker::new(
            self.catalog.clone(),
            self.remote.clone(),
            Arc::clone(&self.network),
        )
    }

    pub fn download_worker(&self) -> DownloadWorker<RemoteBackend> {
        DownloadWorker::new(
            self.catalog.clone(),
            self.remote.clone(),
            Arc::clone(&self.network),
            self.config.retention(),
        )
    }

    /// Upload the local queue, then replay remote batches.
    pub async fn sync_once(&self, cancel: &CancelSignal) -> SyncPass {
        let upload = self.upload_worker().run(cancel).await;
        let (download, report) = self.download_worker().run_with_report(cancel).await;
        SyncPass {
            upload,
            download,
            report,
        }
    }

    /// Spawn the periodic workers on the current tokio runtime.
    pub fn start_scheduler(&self) -> SyncScheduler {
        SyncScheduler::start(
            Arc::new(self.upload_worker()),
            Arc::new(self.download_worker()),
            self.config.upload_interval(),
            self.config.download_interval(),
        )
    }
}
