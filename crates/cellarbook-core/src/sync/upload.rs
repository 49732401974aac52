//! Upload worker: ships the pending operation queue as one batch object

use std::sync::Arc;

use super::network::NetworkMonitor;
use super::remote::{batch_object_name, RemoteStore};
use super::{skip_reason, CancelSignal, WorkOutcome};
use crate::error::Result;
use crate::models::SyncOperation;
use crate::services::CatalogService;
use crate::util::now_millis;

/// Uploads every queued operation as a single JSON array.
///
/// Queue rows are deleted only after the remote write is confirmed, so a
/// failed or interrupted upload leaves the queue intact for the next run.
pub struct UploadWorker<S> {
    catalog: CatalogService,
    remote: S,
    network: Arc<dyn NetworkMonitor>,
}

impl<S: RemoteStore> UploadWorker<S> {
    pub fn new(catalog: CatalogService, remote: S, network: Arc<dyn NetworkMonitor>) -> Self {
        Self {
            catalog,
            remote,
            network,
        }
    }

    pub async fn run(&self, cancel: &CancelSignal) -> WorkOutcome {
        match self.try_run(cancel).await {
            Ok(outcome) => outcome,
            Err(error) => {
                tracing::warn!("Sync upload failed, will retry: {error}");
                WorkOutcome::Retry
            }
        }
    }

    async fn try_run(&self, cancel: &CancelSignal) -> Result<WorkOutcome> {
        let prefs = self.catalog.preferences().get()?;
        if let Some(reason) = skip_reason(&prefs, self.network.current()) {
            return Ok(WorkOutcome::Skipped(reason));
        }
        if self.remote.account().await?.is_none() {
            return Ok(WorkOutcome::Skipped("not signed in to a remote".into()));
        }

        let pending = self.catalog.list_pending().await?;
        if pending.is_empty() {
            tracing::debug!("Sync upload: queue is empty");
            return Ok(WorkOutcome::Success);
        }
        if cancel.is_cancelled() {
            return Ok(WorkOutcome::Retry);
        }

        let operations: Vec<&SyncOperation> = pending.iter().map(|row| &row.operation).collect();
        let bytes = serde_json::to_vec(&operations)?;
        let name = batch_object_name(now_millis());
        let object = self.remote.put_object(&name, bytes).await?;

        // Our own batch must not be replayed back onto this device
        self.catalog.preferences().update(|prefs| {
            prefs.processed_remote_ids.insert(object.id.clone());
        })?;
        let ids: Vec<i64> = pending.iter().map(|row| row.id).collect();
        self.catalog.delete_pending(&ids).await?;

        tracing::info!("Uploaded {} sync operations as {}", ids.len(), object.name);
        Ok(WorkOutcome::Success)
    }
}
