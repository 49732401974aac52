//! Device sync: queue upload, remote batch replay and scheduling.
//!
//! Each device appends its local writes to `pending_sync_operations`. The
//! upload worker ships the queue as one JSON batch object; the download
//! worker replays other devices' batches with last-write-wins on
//! `last_modified`. Neither worker returns an error: failures become
//! [`WorkOutcome::Retry`].

mod directory;
mod download;
mod memory;
mod network;
mod remote;
mod replay;
mod s3;
mod scheduler;
mod upload;

use tokio::sync::watch;

pub use directory::DirectoryRemoteStore;
pub use download::{DownloadReport, DownloadWorker};
pub use memory::MemoryRemoteStore;
pub use network::{NetworkKind, NetworkMonitor, StaticNetwork};
pub use remote::{
    batch_object_name, parse_batch_timestamp, RemoteAccount, RemoteBackend, RemoteObject,
    RemoteStore,
};
pub use replay::{replay_batch, replay_operation, ReplayCounts, ReplayOutcome};
pub use s3::{S3RemoteStore, SYNC_PREFIX};
pub use scheduler::{SyncScheduler, SyncTrigger};
pub use upload::UploadWorker;

use crate::models::Preferences;

/// Result of one worker run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WorkOutcome {
    Success,
    /// Transient failure or cancellation; run again later
    Retry,
    /// Preconditions not met; nothing was attempted
    Skipped(String),
}

impl WorkOutcome {
    #[must_use]
    pub const fn is_retry(&self) -> bool {
        matches!(self, Self::Retry)
    }
}

/// Worker-side view of a cancellation request
#[derive(Debug, Clone)]
pub struct CancelSignal {
    receiver: watch::Receiver<bool>,
}

impl CancelSignal {
    /// A signal that is never raised
    #[must_use]
    pub fn never() -> Self {
        let (_sender, receiver) = watch::channel(false);
        Self { receiver }
    }

    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        *self.receiver.borrow()
    }

    /// Wait until cancellation is requested.
    pub async fn cancelled(&mut self) {
        if self.receiver.wait_for(|cancelled| *cancelled).await.is_err() {
            // Sender dropped without cancelling: never resolves
            std::future::pending::<()>().await;
        }
    }
}

/// Owner side of a cancellation request
#[derive(Debug)]
pub struct CancelHandle {
    sender: watch::Sender<bool>,
}

impl CancelHandle {
    pub fn cancel(&self) {
        self.sender.send_replace(true);
    }

    #[must_use]
    pub fn signal(&self) -> CancelSignal {
        CancelSignal {
            receiver: self.sender.subscribe(),
        }
    }
}

#[must_use]
pub fn cancel_pair() -> (CancelHandle, CancelSignal) {
    let (sender, receiver) = watch::channel(false);
    (CancelHandle { sender }, CancelSignal { receiver })
}

/// Reason a worker should not run, if any.
pub(crate) fn skip_reason(prefs: &Preferences, network: NetworkKind) -> Option<String> {
    if !prefs.sync_enabled {
        return Some("sync is disabled".into());
    }
    match network {
        NetworkKind::Offline => Some("no network connection".into()),
        NetworkKind::Metered if prefs.sync_unmetered_only => {
            Some("waiting for an unmetered network".into())
        }
        NetworkKind::Metered | NetworkKind::Unmetered => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn skip_reason_checks_switch_and_network() {
        let mut prefs = Preferences::default();
        assert!(skip_reason(&prefs, NetworkKind::Unmetered).is_some());

        prefs.sync_enabled = true;
        assert_eq!(skip_reason(&prefs, NetworkKind::Unmetered), None);
        assert!(skip_reason(&prefs, NetworkKind::Metered).is_some());
        assert!(skip_reason(&prefs, NetworkKind::Offline).is_some());

        prefs.sync_unmetered_only = false;
        assert_eq!(skip_reason(&prefs, NetworkKind::Metered), None);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn cancel_pair_raises_signal() {
        let (handle, mut signal) = cancel_pair();
        let other = handle.signal();
        assert!(!signal.is_cancelled());

        handle.cancel();
        signal.cancelled().await;
        assert!(signal.is_cancelled());
        assert!(other.is_cancelled());
        assert!(!CancelSignal::never().is_cancelled());
    }
}
