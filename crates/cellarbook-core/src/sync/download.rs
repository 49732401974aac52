//! Download worker: replays other devices' batch objects

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;

use super::network::NetworkMonitor;
use super::remote::{RemoteObject, RemoteStore};
use super::replay::{replay_batch, ReplayCounts};
use super::{skip_reason, CancelSignal, WorkOutcome};
use crate::error::Result;
use crate::models::SyncOperation;
use crate::services::{CatalogService, Table};
use crate::util::now_millis;

/// What one download cycle did
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct DownloadReport {
    /// Objects fully evaluated and marked processed
    pub objects_processed: usize,
    /// Objects that failed and will be retried
    pub objects_failed: usize,
    /// Objects past the retention window removed from the remote
    pub objects_expired: usize,
    /// Objects whose body is not a batch; marked processed and skipped
    pub objects_undecodable: usize,
    pub applied: usize,
    pub stale: usize,
    pub missing: usize,
    pub schema_mismatch: usize,
}

impl DownloadReport {
    fn add(&mut self, counts: ReplayCounts) {
        self.objects_processed += 1;
        self.applied += counts.applied;
        self.stale += counts.stale;
        self.missing += counts.missing;
        self.schema_mismatch += counts.schema_mismatch;
    }
}

enum ObjectReplay {
    Replayed(ReplayCounts),
    Undecodable(serde_json::Error),
    Cancelled,
}

/// Lists unprocessed batch objects and replays them oldest first.
///
/// An object is marked processed only after all of its operations were
/// evaluated. Objects older than the retention window are deleted from the
/// remote and forgotten locally.
pub struct DownloadWorker<S> {
    catalog: CatalogService,
    remote: S,
    network: Arc<dyn NetworkMonitor>,
    retention: Duration,
}

impl<S: RemoteStore> DownloadWorker<S> {
    pub fn new(
        catalog: CatalogService,
        remote: S,
        network: Arc<dyn NetworkMonitor>,
        retention: Duration,
    ) -> Self {
        Self {
            catalog,
            remote,
            network,
            retention,
        }
    }

    pub async fn run(&self, cancel: &CancelSignal) -> WorkOutcome {
        self.run_with_report(cancel).await.0
    }

    pub async fn run_with_report(&self, cancel: &CancelSignal) -> (WorkOutcome, DownloadReport) {
        let mut report = DownloadReport::default();
        let outcome = match self.try_run(cancel, &mut report).await {
            Ok(outcome) => outcome,
            Err(error) => {
                tracing::warn!("Sync download failed, will retry: {error}");
                WorkOutcome::Retry
            }
        };
        (outcome, report)
    }

    fn retention_cutoff(&self) -> i64 {
        let window = i64::try_from(self.retention.as_millis()).unwrap_or(i64::MAX);
        now_millis().saturating_sub(window)
    }

    async fn try_run(
        &self,
        cancel: &CancelSignal,
        report: &mut DownloadReport,
    ) -> Result<WorkOutcome> {
        let prefs = self.catalog.preferences().get()?;
        if let Some(reason) = skip_reason(&prefs, self.network.current()) {
            return Ok(WorkOutcome::Skipped(reason));
        }
        if self.remote.account().await?.is_none() {
            return Ok(WorkOutcome::Skipped("not signed in to a remote".into()));
        }

        let mut objects = self.remote.list_objects().await?;
        objects.sort_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.name.cmp(&b.name)));

        let cutoff = self.retention_cutoff();
        let (expired, live): (Vec<RemoteObject>, Vec<RemoteObject>) =
            objects.into_iter().partition(|object| object.created_at < cutoff);

        for object in &expired {
            if cancel.is_cancelled() {
                return Ok(WorkOutcome::Retry);
            }
            self.remote.delete_object(&object.id).await?;
            report.objects_expired += 1;
        }

        // Forget expired ids and ids that vanished remotely
        let live_ids: HashSet<&str> = live.iter().map(|object| object.id.as_str()).collect();
        let prefs = self.catalog.preferences().update(|prefs| {
            prefs
                .processed_remote_ids
                .retain(|id| live_ids.contains(id.as_str()));
        })?;

        let mut failed = false;
        let unprocessed = live
            .iter()
            .filter(|object| !prefs.processed_remote_ids.contains(&object.id));
        for object in unprocessed {
            if cancel.is_cancelled() {
                return Ok(WorkOutcome::Retry);
            }
            match self.replay_object(object, cancel).await {
                Ok(ObjectReplay::Replayed(counts)) => {
                    self.mark_processed(object)?;
                    if counts.applied > 0 {
                        self.catalog.notify(&Table::ALL);
                    }
                    tracing::info!(
                        "Replayed {}: {} applied, {} stale, {} missing, {} other schema",
                        object.name,
                        counts.applied,
                        counts.stale,
                        counts.missing,
                        counts.schema_mismatch
                    );
                    report.add(counts);
                }
                Ok(ObjectReplay::Undecodable(error)) => {
                    // Retrying cannot help; skip it like a foreign schema
                    tracing::warn!("Skipping {}: not a sync batch: {error}", object.name);
                    self.mark_processed(object)?;
                    report.objects_undecodable += 1;
                }
                Ok(ObjectReplay::Cancelled) => return Ok(WorkOutcome::Retry),
                Err(error) => {
                    tracing::warn!("Failed to replay {}: {error}", object.name);
                    report.objects_failed += 1;
                    failed = true;
                }
            }
        }

        if failed {
            Ok(WorkOutcome::Retry)
        } else {
            Ok(WorkOutcome::Success)
        }
    }

    fn mark_processed(&self, object: &RemoteObject) -> Result<()> {
        self.catalog.preferences().update(|prefs| {
            prefs.processed_remote_ids.insert(object.id.clone());
        })?;
        Ok(())
    }

    async fn replay_object(
        &self,
        object: &RemoteObject,
        cancel: &CancelSignal,
    ) -> Result<ObjectReplay> {
        let bytes = self.remote.get_object(&object.id).await?;
        let operations: Vec<SyncOperation> = match serde_json::from_slice(&bytes) {
            Ok(operations) => operations,
            Err(error) => return Ok(ObjectReplay::Undecodable(error)),
        };
        let db = self.catalog.lock_db().await;
        Ok(match replay_batch(db.connection(), &operations, cancel).await? {
            Some(counts) => ObjectReplay::Replayed(counts),
            None => ObjectReplay::Cancelled,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::SCHEMA_VERSION;
    use crate::models::{EntityType, ItemDraft, ItemPayload, OperationType, Preferences};
    use crate::preferences::PreferenceStore;
    use crate::sync::{MemoryRemoteStore, NetworkKind, StaticNetwork, UploadWorker};
    use pretty_assertions::assert_eq;

    const DAY_MS: i64 = 24 * 60 * 60 * 1000;
    const RETENTION: Duration = Duration::from_secs(30 * 24 * 60 * 60);

    async fn device() -> CatalogService {
        let prefs = PreferenceStore::in_memory(Preferences {
            sync_enabled: true,
            ..Preferences::default()
        });
        CatalogService::open_in_memory(Arc::new(prefs)).await.unwrap()
    }

    fn network() -> Arc<dyn NetworkMonitor> {
        Arc::new(StaticNetwork::new(NetworkKind::Unmetered))
    }

    fn downloader(
        catalog: &CatalogService,
        remote: &MemoryRemoteStore,
    ) -> DownloadWorker<MemoryRemoteStore> {
        DownloadWorker::new(catalog.clone(), remote.clone(), network(), RETENTION)
    }

    fn batch(brand: &str, blend: &str, db_version: i32) -> Vec<u8> {
        let payload: ItemPayload = serde_json::from_value(serde_json::json!({
            "brand": brand,
            "blend": blend,
            "lastModified": now_millis(),
        }))
        .unwrap();
        let mut operation =
            SyncOperation::new(OperationType::Insert, EntityType::Item, "1", &payload).unwrap();
        operation.db_version = db_version;
        serde_json::to_vec(&vec![operation]).unwrap()
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn devices_converge_through_shared_remote() {
        let remote = MemoryRemoteStore::new();
        let phone = device().await;
        let laptop = device().await;

        phone.add_item(&ItemDraft::new("Peterson", "Irish Flake")).await.unwrap();
        let upload = UploadWorker::new(phone.clone(), remote.clone(), network());
        assert_eq!(upload.run(&CancelSignal::never()).await, WorkOutcome::Success);

        let (outcome, report) = downloader(&laptop, &remote)
            .run_with_report(&CancelSignal::never())
            .await;
        assert_eq!(outcome, WorkOutcome::Success);
        assert_eq!(report.objects_processed, 1);
        assert_eq!(report.applied, 1);
        assert!(laptop.exists("Peterson", "Irish Flake").await.unwrap());
        assert_eq!(laptop.pending_count().await.unwrap(), 0);

        // Already processed on both sides
        let (_, again) = downloader(&laptop, &remote)
            .run_with_report(&CancelSignal::never())
            .await;
        assert_eq!(again.objects_processed, 0);
        let (_, own) = downloader(&phone, &remote)
            .run_with_report(&CancelSignal::never())
            .await;
        assert_eq!(own.objects_processed, 0);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn failed_object_is_retried_later() {
        let remote = MemoryRemoteStore::new();
        let catalog = device().await;
        let object = remote
            .insert_object("batch-x.json", batch("A", "B", SCHEMA_VERSION), now_millis())
            .unwrap();
        remote.set_fail_get(&object.id, true);

        let worker = downloader(&catalog, &remote);
        let (outcome, report) = worker.run_with_report(&CancelSignal::never()).await;
        assert_eq!(outcome, WorkOutcome::Retry);
        assert_eq!(report.objects_failed, 1);
        assert!(!catalog.preferences().get().unwrap().processed_remote_ids.contains(&object.id));

        remote.set_fail_get(&object.id, false);
        assert_eq!(worker.run(&CancelSignal::never()).await, WorkOutcome::Success);
        assert!(catalog.preferences().get().unwrap().processed_remote_ids.contains(&object.id));
        assert!(catalog.exists("A", "B").await.unwrap());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn malformed_batch_is_skipped_once() {
        let remote = MemoryRemoteStore::new();
        let catalog = device().await;
        let object = remote
            .insert_object("batch-bad.json", b"{not json".to_vec(), now_millis())
            .unwrap();

        let worker = downloader(&catalog, &remote);
        let (outcome, report) = worker.run_with_report(&CancelSignal::never()).await;
        assert_eq!(outcome, WorkOutcome::Success);
        assert_eq!(report.objects_undecodable, 1);
        assert_eq!(report.objects_failed, 0);
        assert!(catalog.preferences().get().unwrap().processed_remote_ids.contains(&object.id));

        let (outcome, report) = worker.run_with_report(&CancelSignal::never()).await;
        assert_eq!(outcome, WorkOutcome::Success);
        assert_eq!(report.objects_undecodable, 0);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn schema_mismatch_still_counts_as_processed() {
        let remote = MemoryRemoteStore::new();
        let catalog = device().await;
        let object = remote
            .insert_object("batch-old.json", batch("A", "B", SCHEMA_VERSION - 1), now_millis())
            .unwrap();

        let (outcome, report) = downloader(&catalog, &remote)
            .run_with_report(&CancelSignal::never())
            .await;
        assert_eq!(outcome, WorkOutcome::Success);
        assert_eq!(report.schema_mismatch, 1);
        assert!(!catalog.exists("A", "B").await.unwrap());
        assert!(catalog.preferences().get().unwrap().processed_remote_ids.contains(&object.id));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn retention_prunes_remote_and_processed_set() {
        let remote = MemoryRemoteStore::new();
        let catalog = device().await;
        let old = remote
            .insert_object(
                "batch-old.json",
                batch("Old", "Blend", SCHEMA_VERSION),
                now_millis() - 31 * DAY_MS,
            )
            .unwrap();
        let fresh = remote
            .insert_object(
                "batch-new.json",
                batch("New", "Blend", SCHEMA_VERSION),
                now_millis() - DAY_MS,
            )
            .unwrap();
        catalog
            .preferences()
            .update(|prefs| {
                prefs.processed_remote_ids.insert(old.id.clone());
                prefs.processed_remote_ids.insert("vanished.json".into());
            })
            .unwrap();

        let (outcome, report) = downloader(&catalog, &remote)
            .run_with_report(&CancelSignal::never())
            .await;
        assert_eq!(outcome, WorkOutcome::Success);
        assert_eq!(report.objects_expired, 1);
        assert_eq!(remote.object_names(), vec![fresh.id.clone()]);

        let processed = catalog.preferences().get().unwrap().processed_remote_ids;
        assert_eq!(processed.into_iter().collect::<Vec<_>>(), vec![fresh.id]);
        assert!(!catalog.exists("Old", "Blend").await.unwrap());
        assert!(catalog.exists("New", "Blend").await.unwrap());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn list_failure_requests_retry() {
        let remote = MemoryRemoteStore::new();
        remote.set_fail_lists(true);
        let catalog = device().await;
        let outcome = downloader(&catalog, &remote)
            .run(&CancelSignal::never())
            .await;
        assert_eq!(outcome, WorkOutcome::Retry);
    }
}
