//! Live queries: table change notifications and shared per-shape query streams

use std::collections::HashMap;
use std::future::Future;
use std::hash::Hash;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::broadcast::error::RecvError;
use tokio::sync::{broadcast, watch, Mutex};
use tokio::time::Instant;

use crate::error::Result;

const FEED_CAPACITY: usize = 64;

/// Tables whose changes are published on the [`ChangeFeed`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Table {
    Items,
    Tins,
    Components,
    Flavoring,
    PendingOperations,
}

impl Table {
    pub const ALL: [Self; 5] = [
        Self::Items,
        Self::Tins,
        Self::Components,
        Self::Flavoring,
        Self::PendingOperations,
    ];
}

/// Broadcast of table changes after each committed write
#[derive(Debug, Clone)]
pub struct ChangeFeed {
    sender: broadcast::Sender<Table>,
}

impl Default for ChangeFeed {
    fn default() -> Self {
        Self::new()
    }
}

impl ChangeFeed {
    #[must_use]
    pub fn new() -> Self {
        let (sender, _) = broadcast::channel(FEED_CAPACITY);
        Self { sender }
    }

    pub fn publish(&self, tables: &[Table]) {
        for table in tables {
            // No subscribers is fine
            let _ = self.sender.send(*table);
        }
    }

    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<Table> {
        self.sender.subscribe()
    }
}

/// Boxed future returned by a live query fetcher
pub type FetchFuture<V> = Pin<Box<dyn Future<Output = Result<V>> + Send>>;

type Fetcher<K, V> = Arc<dyn Fn(K) -> FetchFuture<V> + Send + Sync>;
type Entries<K, V> = Arc<Mutex<HashMap<K, watch::Sender<Option<Arc<V>>>>>>;

/// Subscriber side of a live query.
///
/// Yields the current result first, then one value per relevant change.
#[derive(Debug, Clone)]
pub struct LiveQuery<V> {
    receiver: watch::Receiver<Option<Arc<V>>>,
}

impl<V> LiveQuery<V> {
    /// Wait for the next result; `None` once the query has shut down.
    pub async fn next(&mut self) -> Option<Arc<V>> {
        loop {
            if self.receiver.changed().await.is_err() {
                return None;
            }
            if let Some(value) = self.receiver.borrow_and_update().clone() {
                return Some(value);
            }
        }
    }

    /// Most recent result without waiting
    #[must_use]
    pub fn latest(&self) -> Option<Arc<V>> {
        self.receiver.borrow().clone()
    }
}

/// Multiplexes live queries by key.
///
/// All subscribers of one key share a single refresh task and one query
/// execution per change. The task stops `idle` after its last subscriber
/// goes away.
pub struct LiveQueryHub<K, V> {
    entries: Entries<K, V>,
    feed: ChangeFeed,
    tables: &'static [Table],
    idle: Duration,
    fetch: Fetcher<K, V>,
}

impl<K, V> LiveQueryHub<K, V>
where
    K: Clone + Eq + Hash + Send + Sync + std::fmt::Debug + 'static,
    V: Send + Sync + 'static,
{
    pub fn new<F>(feed: ChangeFeed, tables: &'static [Table], idle: Duration, fetch: F) -> Self
    where
        F: Fn(K) -> FetchFuture<V> + Send + Sync + 'static,
    {
        Self {
            entries: Arc::new(Mutex::new(HashMap::new())),
            feed,
            tables,
            idle,
            fetch: Arc::new(fetch),
        }
    }

    pub async fn subscribe(&self, key: K) -> LiveQuery<V> {
        let mut entries = self.entries.lock().await;
        if let Some(sender) = entries.get(&key) {
            let mut receiver = sender.subscribe();
            receiver.mark_changed();
            return LiveQuery { receiver };
        }

        let (sender, receiver) = watch::channel(None);
        entries.insert(key.clone(), sender.clone());
        drop(entries);

        let task = RefreshTask {
            key,
            sender,
            entries: Arc::clone(&self.entries),
            changes: self.feed.subscribe(),
            tables: self.tables,
            idle: self.idle,
            fetch: Arc::clone(&self.fetch),
        };
        tokio::spawn(task.run());
        LiveQuery { receiver }
    }

    /// Number of query shapes with a running refresh task
    pub async fn active_queries(&self) -> usize {
        self.entries.lock().await.len()
    }
}

struct RefreshTask<K, V> {
    key: K,
    sender: watch::Sender<Option<Arc<V>>>,
    entries: Entries<K, V>,
    changes: broadcast::Receiver<Table>,
    tables: &'static [Table],
    idle: Duration,
    fetch: Fetcher<K, V>,
}

impl<K, V> RefreshTask<K, V>
where
    K: Clone + Eq + Hash + Send + Sync + std::fmt::Debug + 'static,
    V: Send + Sync + 'static,
{
    async fn run(mut self) {
        self.refresh().await;
        // Set while the query has no subscribers
        let mut idle_deadline: Option<Instant> = None;
        loop {
            let pending_deadline = idle_deadline;
            let idle_expired = async move {
                match pending_deadline {
                    Some(deadline) => tokio::time::sleep_until(deadline).await,
                    None => std::future::pending().await,
                }
            };
            tokio::select! {
                change = self.changes.recv() => {
                    if idle_deadline.is_some() && self.sender.receiver_count() > 0 {
                        idle_deadline = None;
                    }
                    match change {
                        Ok(table) if self.tables.contains(&table) => {
                            // Coalesce a burst of changes into one query
                            while self.changes.try_recv().is_ok() {}
                            self.refresh().await;
                        }
                        Ok(_) => {}
                        Err(RecvError::Lagged(_)) => self.refresh().await,
                        Err(RecvError::Closed) => break,
                    }
                }
                () = self.sender.closed(), if idle_deadline.is_none() => {
                    idle_deadline = Some(Instant::now() + self.idle);
                }
                () = idle_expired => {
                    let mut entries = self.entries.lock().await;
                    if self.sender.receiver_count() == 0 {
                        entries.remove(&self.key);
                        tracing::debug!("Live query {:?} stopped after idle timeout", self.key);
                        break;
                    }
                    idle_deadline = None;
                }
            }
        }
    }

    async fn refresh(&self) {
        match (self.fetch)(self.key.clone()).await {
            Ok(value) => {
                self.sender.send_replace(Some(Arc::new(value)));
            }
            Err(error) => tracing::warn!("Live query {:?} failed: {error}", self.key),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;
    use pretty_assertions::assert_eq;

    const TABLES: &[Table] = &[Table::Items];

    type CountingHub = LiveQueryHub<u32, (u32, usize)>;

    fn counting_hub(idle: Duration) -> (ChangeFeed, Arc<AtomicUsize>, CountingHub) {
        let feed = ChangeFeed::new();
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);
        let hub = LiveQueryHub::new(feed.clone(), TABLES, idle, move |key: u32| {
            let counter = Arc::clone(&counter);
            Box::pin(async move {
                let call = counter.fetch_add(1, Ordering::SeqCst) + 1;
                Ok((key, call))
            }) as FetchFuture<(u32, usize)>
        });
        (feed, calls, hub)
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn identical_subscriptions_share_one_query() {
        let (feed, calls, hub) = counting_hub(Duration::from_secs(5));

        let mut first = hub.subscribe(7).await;
        let value = first.next().await.unwrap();
        assert_eq!(value.0, 7);

        let mut second = hub.subscribe(7).await;
        let shared = second.next().await.unwrap();
        assert!(Arc::ptr_eq(&value, &shared));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(hub.active_queries().await, 1);

        feed.publish(&[Table::Items]);
        let a = first.next().await.unwrap();
        let b = second.next().await.unwrap();
        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn unrelated_tables_do_not_refresh() {
        let (feed, calls, hub) = counting_hub(Duration::from_secs(5));
        let mut query = hub.subscribe(1).await;
        query.next().await.unwrap();

        feed.publish(&[Table::Tins, Table::PendingOperations]);
        feed.publish(&[Table::Items]);
        query.next().await.unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn distinct_keys_run_separately() {
        let (_feed, calls, hub) = counting_hub(Duration::from_secs(5));
        let mut a = hub.subscribe(1).await;
        let mut b = hub.subscribe(2).await;
        assert_eq!(a.next().await.unwrap().0, 1);
        assert_eq!(b.next().await.unwrap().0, 2);
        assert_eq!(calls.load(Ordering::SeqCst), 2);
        assert_eq!(hub.active_queries().await, 2);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn idle_query_stops_after_timeout() {
        let (_feed, _calls, hub) = counting_hub(Duration::from_millis(50));
        let mut query = hub.subscribe(1).await;
        query.next().await.unwrap();
        drop(query);

        tokio::time::sleep(Duration::from_millis(300)).await;
        assert_eq!(hub.active_queries().await, 0);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn resubscribe_within_timeout_keeps_task() {
        let (_feed, calls, hub) = counting_hub(Duration::from_millis(200));
        let mut query = hub.subscribe(1).await;
        query.next().await.unwrap();
        drop(query);

        tokio::time::sleep(Duration::from_millis(20)).await;
        let mut again = hub.subscribe(1).await;
        again.next().await.unwrap();
        tokio::time::sleep(Duration::from_millis(400)).await;

        assert_eq!(hub.active_queries().await, 1);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(again.latest().is_some());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn resubscribed_query_sees_changes_before_idle_timeout() {
        let (feed, calls, hub) = counting_hub(Duration::from_secs(1));
        let mut query = hub.subscribe(1).await;
        query.next().await.unwrap();
        drop(query);

        tokio::time::sleep(Duration::from_millis(20)).await;
        let mut again = hub.subscribe(1).await;
        again.next().await.unwrap();

        feed.publish(&[Table::Items]);
        let refreshed = tokio::time::timeout(Duration::from_millis(200), again.next())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(refreshed.1, 2);
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }
}
