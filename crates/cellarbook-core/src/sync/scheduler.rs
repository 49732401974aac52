//! Periodic background runs of the upload and download workers

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Notify;
use tokio::task::JoinHandle;

use super::download::DownloadWorker;
use super::remote::RemoteStore;
use super::upload::UploadWorker;
use super::{cancel_pair, CancelHandle, CancelSignal, WorkOutcome};

/// First delay after a failed run; doubles up to the regular interval
const INITIAL_BACKOFF: Duration = Duration::from_secs(5);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncTrigger {
    Upload,
    Download,
    Both,
}

/// Owns the two background sync loops.
///
/// Each loop runs its worker once at start and then every interval. A
/// [`WorkOutcome::Retry`] shortens the next wait to an exponential backoff.
/// [`SyncScheduler::trigger`] wakes a loop early, and `shutdown` cancels any
/// in-flight run and waits for both loops to exit.
pub struct SyncScheduler {
    upload_wake: Arc<Notify>,
    download_wake: Arc<Notify>,
    cancel: CancelHandle,
    tasks: Vec<JoinHandle<()>>,
}

impl SyncScheduler {
    pub fn start<S>(
        upload: Arc<UploadWorker<S>>,
        download: Arc<DownloadWorker<S>>,
        upload_interval: Duration,
        download_interval: Duration,
    ) -> Self
    where
        S: RemoteStore + 'static,
    {
        let (cancel, signal) = cancel_pair();
        let upload_wake = Arc::new(Notify::new());
        let download_wake = Arc::new(Notify::new());

        let upload_task = tokio::spawn(run_periodically(
            "upload",
            upload_interval,
            Arc::clone(&upload_wake),
            signal.clone(),
            move |signal| {
                let worker = Arc::clone(&upload);
                async move { worker.run(&signal).await }
            },
        ));
        let download_task = tokio::spawn(run_periodically(
            "download",
            download_interval,
            Arc::clone(&download_wake),
            signal,
            move |signal| {
                let worker = Arc::clone(&download);
                async move { worker.run(&signal).await }
            },
        ));

        tracing::info!(
            "Sync scheduler started: upload every {}s, download every {}s",
            upload_interval.as_secs(),
            download_interval.as_secs()
        );

        Self {
            upload_wake,
            download_wake,
            cancel,
            tasks: vec![upload_task, download_task],
        }
    }

    /// Run the named worker as soon as it is idle.
    pub fn trigger(&self, trigger: SyncTrigger) {
        if matches!(trigger, SyncTrigger::Upload | SyncTrigger::Both) {
            self.upload_wake.notify_one();
        }
        if matches!(trigger, SyncTrigger::Download | SyncTrigger::Both) {
            self.download_wake.notify_one();
        }
    }

    pub async fn shutdown(self) {
        self.cancel.cancel();
        for task in self.tasks {
            if let Err(error) = task.await {
                tracing::warn!("Sync loop ended abnormally: {error}");
            }
        }
        tracing::info!("Sync scheduler stopped");
    }
}

async fn run_periodically<F, Fut>(
    name: &'static str,
    interval: Duration,
    wake: Arc<Notify>,
    mut cancel: CancelSignal,
    run: F,
) where
    F: Fn(CancelSignal) -> Fut,
    Fut: Future<Output = WorkOutcome>,
{
    let mut backoff = None;
    loop {
        if cancel.is_cancelled() {
            break;
        }
        let outcome = run(cancel.clone()).await;
        if let WorkOutcome::Skipped(reason) = &outcome {
            tracing::debug!("Sync {name} skipped: {reason}");
        }

        let (delay, next_backoff) = next_delay(&outcome, backoff, interval);
        backoff = next_backoff;
        tracing::debug!("Next sync {name} in {}s", delay.as_secs());

        tokio::select! {
            () = tokio::time::sleep(delay) => {}
            () = wake.notified() => {
                tracing::debug!("Sync {name} triggered");
            }
            () = cancel.cancelled() => break,
        }
    }
}

/// Delay before the next run and the backoff to carry forward.
fn next_delay(
    outcome: &WorkOutcome,
    backoff: Option<Duration>,
    interval: Duration,
) -> (Duration, Option<Duration>) {
    if outcome.is_retry() {
        let next = backoff.map_or(INITIAL_BACKOFF, |current| current.saturating_mul(2));
        let next = next.min(interval);
        (next, Some(next))
    } else {
        (interval, None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{ItemDraft, Preferences};
    use crate::preferences::PreferenceStore;
    use crate::services::CatalogService;
    use crate::sync::{MemoryRemoteStore, NetworkKind, NetworkMonitor, StaticNetwork};
    use pretty_assertions::assert_eq;

    const HOUR: Duration = Duration::from_secs(3600);

    #[test]
    fn backoff_doubles_up_to_interval() {
        let interval = Duration::from_secs(30);
        let (first, backoff) = next_delay(&WorkOutcome::Retry, None, interval);
        assert_eq!(first, Duration::from_secs(5));
        let (second, backoff) = next_delay(&WorkOutcome::Retry, backoff, interval);
        assert_eq!(second, Duration::from_secs(10));
        let (third, backoff) = next_delay(&WorkOutcome::Retry, backoff, interval);
        assert_eq!(third, Duration::from_secs(20));
        let (capped, backoff) = next_delay(&WorkOutcome::Retry, backoff, interval);
        assert_eq!(capped, interval);

        let (reset, backoff) = next_delay(&WorkOutcome::Success, backoff, interval);
        assert_eq!(reset, interval);
        assert_eq!(backoff, None);

        let (skipped, _) = next_delay(&WorkOutcome::Skipped("offline".into()), None, interval);
        assert_eq!(skipped, interval);
    }

    async fn wait_for_pending(catalog: &CatalogService, expected: usize) {
        for _ in 0..200 {
            if catalog.pending_count().await.unwrap() == expected {
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("pending count never reached {expected}");
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn trigger_runs_upload_before_interval() {
        let prefs = PreferenceStore::in_memory(Preferences {
            sync_enabled: true,
            ..Preferences::default()
        });
        let catalog = CatalogService::open_in_memory(Arc::new(prefs)).await.unwrap();
        let remote = MemoryRemoteStore::new();
        let network: Arc<dyn NetworkMonitor> = Arc::new(StaticNetwork::new(NetworkKind::Unmetered));

        let upload = Arc::new(UploadWorker::new(
            catalog.clone(),
            remote.clone(),
            Arc::clone(&network),
        ));
        let download = Arc::new(DownloadWorker::new(
            catalog.clone(),
            remote.clone(),
            network,
            Duration::from_secs(30 * 86_400),
        ));
        let scheduler = SyncScheduler::start(upload, download, HOUR, HOUR);

        // Let the initial runs finish against an empty queue
        tokio::time::sleep(Duration::from_millis(100)).await;
        catalog.add_item(&ItemDraft::new("A", "B")).await.unwrap();
        assert_eq!(catalog.pending_count().await.unwrap(), 1);

        scheduler.trigger(SyncTrigger::Upload);
        wait_for_pending(&catalog, 0).await;
        assert_eq!(remote.object_names().len(), 1);

        tokio::time::timeout(Duration::from_secs(5), scheduler.shutdown())
            .await
            .unwrap();
    }
}
