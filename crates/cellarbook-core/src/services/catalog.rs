//! Shared catalog service used by every front end.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{Mutex, MutexGuard};

use super::live::{ChangeFeed, FetchFuture, LiveQuery, LiveQueryHub, Table};
use crate::collection::{CollectionStats, CollectionView};
use crate::db::{CatalogRepository, Database, LibSqlCatalogRepository, SyncGate};
use crate::error::{Error, Result};
use crate::export::{render_export, ExportFormat, ExportScope};
use crate::import::{
    import_items, map_records, parse_csv, ColumnMapping, CsvParseResult, DuplicateStrategy,
    ImportSummary,
};
use crate::models::{
    Item, ItemDetails, ItemDraft, ItemId, NameKind, NameUsage, PendingSyncOperation, Tin,
    TinDraft, TinId,
};
use crate::preferences::PreferenceStore;
use crate::util::now_millis;

const DEFAULT_IDLE: Duration = Duration::from_secs(5);

const ITEM_TABLES: &[Table] = &[
    Table::Items,
    Table::Components,
    Table::Flavoring,
    Table::PendingOperations,
];
const TIN_TABLES: &[Table] = &[Table::Tins, Table::PendingOperations];
const COLLECTION_TABLES: &[Table] = &[
    Table::Items,
    Table::Tins,
    Table::Components,
    Table::Flavoring,
];
const NAME_TABLES: &[Table] = &[Table::Items, Table::Components, Table::Flavoring];
const QUEUE_TABLES: &[Table] = &[Table::PendingOperations];

type SharedDb = Arc<Mutex<Database>>;

struct LiveHubs {
    collection: LiveQueryHub<CollectionView, Vec<ItemDetails>>,
    tins: LiveQueryHub<ItemId, Vec<Tin>>,
    names: LiveQueryHub<NameKind, Vec<NameUsage>>,
    pending: LiveQueryHub<(), usize>,
}

impl LiveHubs {
    fn new(db: &SharedDb, feed: &ChangeFeed, idle: Duration) -> Self {
        let collection = {
            let db = Arc::clone(db);
            LiveQueryHub::new(feed.clone(), COLLECTION_TABLES, idle, move |view: CollectionView| {
                let db = Arc::clone(&db);
                Box::pin(async move {
                    let db = db.lock().await;
                    let items = read_repo(&db).list_item_details().await?;
                    Ok(view.apply(items))
                }) as FetchFuture<_>
            })
        };
        let tins = {
            let db = Arc::clone(db);
            LiveQueryHub::new(feed.clone(), TIN_TABLES, idle, move |item_id: ItemId| {
                let db = Arc::clone(&db);
                Box::pin(async move {
                    let db = db.lock().await;
                    read_repo(&db).list_tins(item_id).await
                }) as FetchFuture<_>
            })
        };
        let names = {
            let db = Arc::clone(db);
            LiveQueryHub::new(feed.clone(), NAME_TABLES, idle, move |kind: NameKind| {
                let db = Arc::clone(&db);
                Box::pin(async move {
                    let db = db.lock().await;
                    read_repo(&db).list_names(kind).await
                }) as FetchFuture<_>
            })
        };
        let pending = {
            let db = Arc::clone(db);
            LiveQueryHub::new(feed.clone(), QUEUE_TABLES, idle, move |(): ()| {
                let db = Arc::clone(&db);
                Box::pin(async move {
                    let db = db.lock().await;
                    read_repo(&db).count_pending_operations().await
                }) as FetchFuture<_>
            })
        };
        Self {
            collection,
            tins,
            names,
            pending,
        }
    }
}

fn read_repo(db: &Database) -> LibSqlCatalogRepository<'_> {
    LibSqlCatalogRepository::new(db.connection(), SyncGate::Disabled)
}

/// Thread-safe catalog handle: repository writes, change notification and live queries.
#[derive(Clone)]
pub struct CatalogService {
    db: SharedDb,
    prefs: Arc<PreferenceStore>,
    feed: ChangeFeed,
    live: Arc<LiveHubs>,
    db_path: Option<PathBuf>,
}

impl CatalogService {
    /// Open the catalog database at `db_path`, creating parent directories.
    pub async fn open_path(
        db_path: impl Into<PathBuf>,
        prefs: Arc<PreferenceStore>,
        idle: Duration,
    ) -> Result<Self> {
        let db_path = db_path.into();
        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let db = Database::open(&db_path).await?;
        tracing::info!("Opened catalog at {}", db_path.display());
        Ok(Self::from_database(db, prefs, idle, Some(db_path)))
    }

    /// Open an in-memory catalog (primarily for tests).
    pub async fn open_in_memory(prefs: Arc<PreferenceStore>) -> Result<Self> {
        let db = Database::open_in_memory().await?;
        Ok(Self::from_database(db, prefs, DEFAULT_IDLE, None))
    }

    fn from_database(
        db: Database,
        prefs: Arc<PreferenceStore>,
        idle: Duration,
        db_path: Option<PathBuf>,
    ) -> Self {
        let db = Arc::new(Mutex::new(db));
        let feed = ChangeFeed::new();
        let live = Arc::new(LiveHubs::new(&db, &feed, idle));
        Self {
            db,
            prefs,
            feed,
            live,
            db_path,
        }
    }

    pub fn db_path(&self) -> Option<&Path> {
        self.db_path.as_deref()
    }

    pub fn preferences(&self) -> &Arc<PreferenceStore> {
        &self.prefs
    }

    pub fn change_feed(&self) -> &ChangeFeed {
        &self.feed
    }

    pub(crate) async fn lock_db(&self) -> MutexGuard<'_, Database> {
        self.db.lock().await
    }

    pub(crate) fn notify(&self, tables: &[Table]) {
        self.feed.publish(tables);
    }

    fn gate(&self) -> Result<SyncGate> {
        Ok(SyncGate::from_enabled(self.prefs.get()?.sync_enabled))
    }

    fn repo<'a>(&self, db: &'a Database) -> Result<LibSqlCatalogRepository<'a>> {
        Ok(LibSqlCatalogRepository::new(db.connection(), self.gate()?))
    }

    fn committed<T>(&self, tables: &[Table], result: Result<T>) -> Result<T> {
        if result.is_ok() {
            self.notify(tables);
        }
        result
    }

    // Items

    pub async fn add_item(&self, draft: &ItemDraft) -> Result<ItemDetails> {
        let result = {
            let db = self.db.lock().await;
            self.repo(&db)?.insert_item(draft).await
        };
        self.committed(ITEM_TABLES, result)
    }

    pub async fn update_item(&self, id: ItemId, draft: &ItemDraft) -> Result<ItemDetails> {
        let result = {
            let db = self.db.lock().await;
            self.repo(&db)?.update_item(id, draft).await
        };
        self.committed(ITEM_TABLES, result)
    }

    /// Delete an item; its tins and name links cascade.
    pub async fn delete_item(&self, id: ItemId) -> Result<()> {
        let result = {
            let db = self.db.lock().await;
            self.repo(&db)?.delete_item(id).await
        };
        self.committed(&Table::ALL, result)
    }

    pub async fn set_item_sync_enabled(&self, id: ItemId, enabled: bool) -> Result<()> {
        let result = {
            let db = self.db.lock().await;
            self.repo(&db)?.set_item_sync_enabled(id, enabled).await
        };
        self.committed(&[Table::Items, Table::PendingOperations], result)
    }

    pub async fn get_item(&self, id: ItemId) -> Result<Option<ItemDetails>> {
        let db = self.db.lock().await;
        read_repo(&db).get_item(id).await
    }

    pub async fn find_item(&self, brand: &str, blend: &str) -> Result<Option<Item>> {
        let db = self.db.lock().await;
        read_repo(&db).find_item(brand, blend).await
    }

    pub async fn exists(&self, brand: &str, blend: &str) -> Result<bool> {
        let db = self.db.lock().await;
        read_repo(&db).exists(brand, blend).await
    }

    pub async fn list_items(&self) -> Result<Vec<Item>> {
        let db = self.db.lock().await;
        read_repo(&db).list_items().await
    }

    /// Items with names and tins, filtered and sorted by `view`.
    pub async fn list_collection(&self, view: &CollectionView) -> Result<Vec<ItemDetails>> {
        let db = self.db.lock().await;
        let items = read_repo(&db).list_item_details().await?;
        Ok(view.apply(items))
    }

    // Tins

    pub async fn add_tin(&self, item_id: ItemId, draft: &TinDraft) -> Result<Tin> {
        let result = {
            let db = self.db.lock().await;
            self.repo(&db)?.insert_tin(item_id, draft).await
        };
        self.committed(TIN_TABLES, result)
    }

    pub async fn update_tin(&self, id: TinId, draft: &TinDraft) -> Result<Tin> {
        let result = {
            let db = self.db.lock().await;
            self.repo(&db)?.update_tin(id, draft).await
        };
        self.committed(TIN_TABLES, result)
    }

    pub async fn delete_tin(&self, id: TinId) -> Result<()> {
        let result = {
            let db = self.db.lock().await;
            self.repo(&db)?.delete_tin(id).await
        };
        self.committed(TIN_TABLES, result)
    }

    pub async fn get_tin(&self, id: TinId) -> Result<Option<Tin>> {
        let db = self.db.lock().await;
        read_repo(&db).get_tin(id).await
    }

    pub async fn list_tins(&self, item_id: ItemId) -> Result<Vec<Tin>> {
        let db = self.db.lock().await;
        read_repo(&db).list_tins(item_id).await
    }

    // Names

    pub async fn list_components(&self) -> Result<Vec<NameUsage>> {
        let db = self.db.lock().await;
        read_repo(&db).list_components().await
    }

    pub async fn list_flavoring(&self) -> Result<Vec<NameUsage>> {
        let db = self.db.lock().await;
        read_repo(&db).list_flavoring().await
    }

    /// Remove component and flavoring names no item references.
    pub async fn delete_unused_names(&self) -> Result<usize> {
        let result = {
            let db = self.db.lock().await;
            self.repo(&db)?.delete_unused_names().await
        };
        self.committed(
            &[Table::Components, Table::Flavoring, Table::PendingOperations],
            result,
        )
    }

    // Sync queue

    pub async fn pending_count(&self) -> Result<usize> {
        let db = self.db.lock().await;
        read_repo(&db).count_pending_operations().await
    }

    pub async fn list_pending(&self) -> Result<Vec<PendingSyncOperation>> {
        let db = self.db.lock().await;
        read_repo(&db).list_pending_operations().await
    }

    pub(crate) async fn delete_pending(&self, ids: &[i64]) -> Result<u64> {
        let result = {
            let db = self.db.lock().await;
            self.repo(&db)?.delete_pending_operations(ids).await
        };
        self.committed(QUEUE_TABLES, result)
    }

    // Interchange

    /// Import CSV text. Blank input imports nothing.
    pub async fn import_csv(
        &self,
        text: &str,
        strategy: DuplicateStrategy,
    ) -> Result<ImportSummary> {
        let (header, records) = match parse_csv(text) {
            CsvParseResult::Success { header, records } => (header, records),
            CsvParseResult::Empty => return Ok(ImportSummary::default()),
            CsvParseResult::Error(message) => return Err(Error::InvalidInput(message)),
        };
        let mapping = ColumnMapping::from_header(&header)?;
        let mapped = map_records(&mapping, &records);

        let summary = {
            let db = self.db.lock().await;
            import_items(&self.repo(&db)?, &mapped, strategy).await
        };
        // Partial imports still changed the catalog
        self.notify(&Table::ALL);
        let summary = summary?;
        tracing::info!(
            "Imported CSV: {} inserted, {} updated, {} skipped, {} malformed, {} tins",
            summary.inserted,
            summary.updated,
            summary.skipped,
            summary.malformed,
            summary.tins_added
        );
        Ok(summary)
    }

    pub async fn export(
        &self,
        view: &CollectionView,
        format: ExportFormat,
        scope: ExportScope,
    ) -> Result<String> {
        let items = self.list_collection(view).await?;
        render_export(&items, format, scope)
    }

    pub async fn stats(&self, view: &CollectionView) -> Result<CollectionStats> {
        let items = self.list_collection(view).await?;
        Ok(CollectionStats::compute(&items, now_millis()))
    }

    // Live queries

    pub async fn watch_collection(&self, view: CollectionView) -> LiveQuery<Vec<ItemDetails>> {
        self.live.collection.subscribe(view).await
    }

    pub async fn watch_tins(&self, item_id: ItemId) -> LiveQuery<Vec<Tin>> {
        self.live.tins.subscribe(item_id).await
    }

    pub async fn watch_components(&self) -> LiveQuery<Vec<NameUsage>> {
        self.live.names.subscribe(NameKind::Component).await
    }

    pub async fn watch_flavoring(&self) -> LiveQuery<Vec<NameUsage>> {
        self.live.names.subscribe(NameKind::Flavoring).await
    }

    pub async fn watch_pending_count(&self) -> LiveQuery<usize> {
        self.live.pending.subscribe(()).await
    }
}
