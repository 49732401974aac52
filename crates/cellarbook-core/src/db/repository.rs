//! Catalog repository implementation
//!
//! Every item or tin write runs in one transaction together with the
//! append to `pending_sync_operations`, so a committed write always has
//! its queued operation and a rolled back write never does.

use libsql::{params, Connection, Row, Value};

use super::sync_queue::SyncQueue;
use crate::error::{Error, Result};
use crate::models::{
    EntityType, Item, ItemDetails, ItemDraft, ItemId, ItemKey, ItemPayload, NameKind,
    NamePayload, NameUsage, OperationType, PendingSyncOperation, SyncOperation, Tin, TinDraft,
    TinId, TinPayload,
};
use crate::util::now_millis;

const ITEM_COLUMNS: &str = "id, brand, blend, type, sub_genre, cut, quantity, favorite, disliked, \
     in_production, rating, notes, sync_enabled, last_modified";

const TIN_COLUMNS: &str = "id, item_id, label, container, quantity, unit, manufacture_date, \
     cellar_date, open_date, finished, last_modified";

/// Whether local writes are appended to the sync queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncGate {
    Enabled,
    Disabled,
}

impl SyncGate {
    #[must_use]
    pub const fn from_enabled(enabled: bool) -> Self {
        if enabled {
            Self::Enabled
        } else {
            Self::Disabled
        }
    }

    const fn allows(self, item: &Item) -> bool {
        matches!(self, Self::Enabled) && item.sync_enabled
    }
}

/// Trait for catalog storage operations (async)
#[allow(async_fn_in_trait)]
pub trait CatalogRepository {
    /// Create an item; fails with `Duplicate` if brand + blend is taken
    async fn insert_item(&self, draft: &ItemDraft) -> Result<ItemDetails>;

    /// Replace an item's fields and names
    async fn update_item(&self, id: ItemId, draft: &ItemDraft) -> Result<ItemDetails>;

    /// Delete an item together with its tins and name links
    async fn delete_item(&self, id: ItemId) -> Result<()>;

    /// Get an item with its names and tins
    async fn get_item(&self, id: ItemId) -> Result<Option<ItemDetails>>;

    /// Find an item by its natural key
    async fn find_item(&self, brand: &str, blend: &str) -> Result<Option<Item>>;

    /// Whether an item with this brand + blend exists
    async fn exists(&self, brand: &str, blend: &str) -> Result<bool>;

    /// List items ordered by brand, then blend
    async fn list_items(&self) -> Result<Vec<Item>>;

    /// List items with names and tins attached
    async fn list_item_details(&self) -> Result<Vec<ItemDetails>>;

    /// Toggle whether an item participates in sync
    async fn set_item_sync_enabled(&self, id: ItemId, enabled: bool) -> Result<()>;

    /// Add a tin to an item; labels are unique per item
    async fn insert_tin(&self, item_id: ItemId, draft: &TinDraft) -> Result<Tin>;

    /// Replace a tin's fields
    async fn update_tin(&self, id: TinId, draft: &TinDraft) -> Result<Tin>;

    /// Delete a single tin
    async fn delete_tin(&self, id: TinId) -> Result<()>;

    /// Get a tin by ID
    async fn get_tin(&self, id: TinId) -> Result<Option<Tin>>;

    /// List an item's tins ordered by label
    async fn list_tins(&self, item_id: ItemId) -> Result<Vec<Tin>>;

    /// List every tin in the catalog
    async fn list_all_tins(&self) -> Result<Vec<Tin>>;

    /// List names of one kind with usage counts
    async fn list_names(&self, kind: NameKind) -> Result<Vec<NameUsage>>;

    /// Components with usage counts
    async fn list_components(&self) -> Result<Vec<NameUsage>> {
        self.list_names(NameKind::Component).await
    }

    /// Flavoring with usage counts
    async fn list_flavoring(&self) -> Result<Vec<NameUsage>> {
        self.list_names(NameKind::Flavoring).await
    }

    /// Delete components and flavoring no item references
    async fn delete_unused_names(&self) -> Result<usize>;

    /// Queued operations, oldest first
    async fn list_pending_operations(&self) -> Result<Vec<PendingSyncOperation>>;

    /// Remove queued operations by row id
    async fn delete_pending_operations(&self, ids: &[i64]) -> Result<u64>;

    /// Number of queued operations
    async fn count_pending_operations(&self) -> Result<usize>;
}

/// libSQL implementation of `CatalogRepository`
pub struct LibSqlCatalogRepository<'a> {
    conn: &'a Connection,
    gate: SyncGate,
}

impl<'a> LibSqlCatalogRepository<'a> {
    /// Create a new repository with the given connection
    pub const fn new(conn: &'a Connection, gate: SyncGate) -> Self {
        Self { conn, gate }
    }

    fn queue(&self) -> SyncQueue<'a> {
        SyncQueue::new(self.conn)
    }

    async fn begin(&self) -> Result<()> {
        self.conn.execute("BEGIN IMMEDIATE", ()).await?;
        Ok(())
    }

    async fn enqueue_item(&self, op: OperationType, details: &ItemDetails) -> Result<()> {
        self.enqueue_item_payload(
            op,
            details,
            ItemPayload::new(&details.item, &details.components, &details.flavoring),
        )
        .await
    }

    async fn enqueue_item_payload(
        &self,
        op: OperationType,
        details: &ItemDetails,
        payload: ItemPayload,
    ) -> Result<()> {
        if !self.gate.allows(&details.item) {
            return Ok(());
        }
        let operation =
            SyncOperation::new(op, EntityType::Item, details.item.id.to_string(), &payload)?;
        self.queue().enqueue(&operation).await?;
        Ok(())
    }

    async fn enqueue_tin(&self, op: OperationType, item: &Item, tin: &Tin) -> Result<()> {
        self.enqueue_tin_payload(op, item, tin, TinPayload::new(item, tin))
            .await
    }

    async fn enqueue_tin_payload(
        &self,
        op: OperationType,
        item: &Item,
        tin: &Tin,
        payload: TinPayload,
    ) -> Result<()> {
        if !self.gate.allows(item) {
            return Ok(());
        }
        let operation = SyncOperation::new(op, EntityType::Tin, tin.id.to_string(), &payload)?;
        self.queue().enqueue(&operation).await?;
        Ok(())
    }

    async fn insert_item_inner(&self, draft: &ItemDraft) -> Result<ItemDetails> {
        if fetch_item_by_key(self.conn, &draft.brand, &draft.blend)
            .await?
            .is_some()
        {
            return Err(Error::Duplicate(draft.key().to_string()));
        }

        let id = insert_item_row(self.conn, draft, now_millis()).await?;
        replace_names(self.conn, NameKind::Component, id, &draft.components).await?;
        replace_names(self.conn, NameKind::Flavoring, id, &draft.flavoring).await?;

        let details = load_details_by_id(self.conn, id).await?;
        self.enqueue_item(OperationType::Insert, &details).await?;
        Ok(details)
    }

    async fn update_item_inner(&self, id: ItemId, draft: &ItemDraft) -> Result<ItemDetails> {
        let before = load_details_by_id(self.conn, id).await?;

        if let Some(other) = fetch_item_by_key(self.conn, &draft.brand, &draft.blend).await? {
            if other.id != id {
                return Err(Error::Duplicate(draft.key().to_string()));
            }
        }

        update_item_row(self.conn, id, draft, now_millis()).await?;
        replace_names(self.conn, NameKind::Component, id, &draft.components).await?;
        replace_names(self.conn, NameKind::Flavoring, id, &draft.flavoring).await?;
        let after = load_details_by_id(self.conn, id).await?;

        let mut payload = ItemPayload::new(&after.item, &after.components, &after.flavoring);
        if before.item.key() != after.item.key() {
            // Peers resolve by natural key and only know the old one
            payload.previous_key = Some(before.item.key());
        }
        let newly_shared = after.item.sync_enabled && !before.item.sync_enabled;
        if newly_shared {
            // Same snapshot as set_item_sync_enabled: peers never saw this item
            self.enqueue_item_payload(OperationType::Insert, &after, payload)
                .await?;
            for tin in &after.tins {
                self.enqueue_tin(OperationType::Insert, &after.item, tin)
                    .await?;
            }
        } else {
            self.enqueue_item_payload(OperationType::Update, &after, payload)
                .await?;
        }
        Ok(after)
    }

    async fn delete_item_inner(&self, id: ItemId) -> Result<()> {
        let details = load_details_by_id(self.conn, id).await?;
        self.conn
            .execute("DELETE FROM items WHERE id = ?", [id.get()])
            .await?;
        self.enqueue_item(OperationType::Delete, &details).await
    }

    async fn set_sync_inner(&self, id: ItemId, enabled: bool) -> Result<()> {
        let before = fetch_item(self.conn, id)
            .await?
            .ok_or_else(|| Error::NotFound(format!("item {id}")))?;
        self.conn
            .execute(
                "UPDATE items SET sync_enabled = ? WHERE id = ?",
                params![i64::from(enabled), id.get()],
            )
            .await?;

        if enabled && !before.sync_enabled {
            // Newly shared item: publish its current state so peers catch up
            let details = load_details_by_id(self.conn, id).await?;
            self.enqueue_item(OperationType::Insert, &details).await?;
            for tin in &details.tins {
                self.enqueue_tin(OperationType::Insert, &details.item, tin)
                    .await?;
            }
        }
        Ok(())
    }

    async fn insert_tin_inner(&self, item_id: ItemId, draft: &TinDraft) -> Result<Tin> {
        let item = fetch_item(self.conn, item_id)
            .await?
            .ok_or_else(|| Error::NotFound(format!("item {item_id}")))?;
        if fetch_tin_by_label(self.conn, item_id, &draft.label)
            .await?
            .is_some()
        {
            return Err(Error::Duplicate(format!(
                "tin '{}' of {}",
                draft.label,
                item.key()
            )));
        }

        let tin_id = insert_tin_row(self.conn, item_id, draft, now_millis()).await?;
        let tin = fetch_tin(self.conn, tin_id)
            .await?
            .ok_or_else(|| Error::NotFound(format!("tin {tin_id}")))?;
        self.enqueue_tin(OperationType::Insert, &item, &tin).await?;
        Ok(tin)
    }

    async fn update_tin_inner(&self, id: TinId, draft: &TinDraft) -> Result<Tin> {
        let before = fetch_tin(self.conn, id)
            .await?
            .ok_or_else(|| Error::NotFound(format!("tin {id}")))?;
        let item = fetch_item(self.conn, before.item_id)
            .await?
            .ok_or_else(|| Error::NotFound(format!("item {}", before.item_id)))?;

        if let Some(other) = fetch_tin_by_label(self.conn, before.item_id, &draft.label).await? {
            if other.id != id {
                return Err(Error::Duplicate(format!(
                    "tin '{}' of {}",
                    draft.label,
                    item.key()
                )));
            }
        }

        update_tin_row(self.conn, id, draft, now_millis()).await?;
        let after = fetch_tin(self.conn, id)
            .await?
            .ok_or_else(|| Error::NotFound(format!("tin {id}")))?;

        let mut payload = TinPayload::new(&item, &after);
        if before.label != after.label {
            payload.previous_label = Some(before.label);
        }
        self.enqueue_tin_payload(OperationType::Update, &item, &after, payload)
            .await?;
        Ok(after)
    }

    async fn delete_tin_inner(&self, id: TinId) -> Result<()> {
        let tin = fetch_tin(self.conn, id)
            .await?
            .ok_or_else(|| Error::NotFound(format!("tin {id}")))?;
        let item = fetch_item(self.conn, tin.item_id)
            .await?
            .ok_or_else(|| Error::NotFound(format!("item {}", tin.item_id)))?;
        self.conn
            .execute("DELETE FROM tins WHERE id = ?", [id.get()])
            .await?;
        self.enqueue_tin(OperationType::Delete, &item, &tin).await
    }

    async fn delete_unused_inner(&self) -> Result<usize> {
        let mut removed = 0;
        for kind in [NameKind::Component, NameKind::Flavoring] {
            let sql = format!(
                "SELECT id, name FROM {table} n
                 WHERE NOT EXISTS (SELECT 1 FROM {join} j WHERE j.{column} = n.id)",
                table = kind.table(),
                join = kind.join_table(),
                column = kind.join_column(),
            );
            let mut rows = self.conn.query(&sql, ()).await?;
            let mut unused = Vec::new();
            while let Some(row) = rows.next().await? {
                unused.push((row.get::<i64>(0)?, row.get::<String>(1)?));
            }

            let entity = match kind {
                NameKind::Component => EntityType::Component,
                NameKind::Flavoring => EntityType::Flavoring,
            };
            for (id, name) in unused {
                self.conn
                    .execute(&format!("DELETE FROM {} WHERE id = ?", kind.table()), [id])
                    .await?;
                if matches!(self.gate, SyncGate::Enabled) {
                    let operation = SyncOperation::new(
                        OperationType::Delete,
                        entity,
                        id.to_string(),
                        &NamePayload { name },
                    )?;
                    self.queue().enqueue(&operation).await?;
                }
                removed += 1;
            }
        }
        Ok(removed)
    }
}

impl CatalogRepository for LibSqlCatalogRepository<'_> {
    async fn insert_item(&self, draft: &ItemDraft) -> Result<ItemDetails> {
        let draft = draft.normalized()?;
        self.begin().await?;
        let result = self.insert_item_inner(&draft).await;
        finish_transaction(self.conn, result).await
    }

    async fn update_item(&self, id: ItemId, draft: &ItemDraft) -> Result<ItemDetails> {
        let draft = draft.normalized()?;
        self.begin().await?;
        let result = self.update_item_inner(id, &draft).await;
        finish_transaction(self.conn, result).await
    }

    async fn delete_item(&self, id: ItemId) -> Result<()> {
        self.begin().await?;
        let result = self.delete_item_inner(id).await;
        finish_transaction(self.conn, result).await
    }

    async fn get_item(&self, id: ItemId) -> Result<Option<ItemDetails>> {
        match fetch_item(self.conn, id).await? {
            Some(item) => Ok(Some(load_details(self.conn, item).await?)),
            None => Ok(None),
        }
    }

    async fn find_item(&self, brand: &str, blend: &str) -> Result<Option<Item>> {
        fetch_item_by_key(self.conn, brand.trim(), blend.trim()).await
    }

    async fn exists(&self, brand: &str, blend: &str) -> Result<bool> {
        Ok(self.find_item(brand, blend).await?.is_some())
    }

    async fn list_items(&self) -> Result<Vec<Item>> {
        let sql = format!(
            "SELECT {ITEM_COLUMNS} FROM items ORDER BY brand COLLATE NOCASE, blend COLLATE NOCASE"
        );
        let mut rows = self.conn.query(&sql, ()).await?;
        let mut items = Vec::new();
        while let Some(row) = rows.next().await? {
            items.push(parse_item(&row)?);
        }
        Ok(items)
    }

    async fn list_item_details(&self) -> Result<Vec<ItemDetails>> {
        let items = self.list_items().await?;
        let mut component_map = load_name_map(self.conn, NameKind::Component).await?;
        let mut flavoring_map = load_name_map(self.conn, NameKind::Flavoring).await?;
        let mut tin_map = std::collections::HashMap::<ItemId, Vec<Tin>>::new();
        for tin in self.list_all_tins().await? {
            tin_map.entry(tin.item_id).or_default().push(tin);
        }

        Ok(items
            .into_iter()
            .map(|item| {
                let id = item.id;
                ItemDetails {
                    item,
                    components: component_map.remove(&id).unwrap_or_default(),
                    flavoring: flavoring_map.remove(&id).unwrap_or_default(),
                    tins: tin_map.remove(&id).unwrap_or_default(),
                }
            })
            .collect())
    }

    async fn set_item_sync_enabled(&self, id: ItemId, enabled: bool) -> Result<()> {
        self.begin().await?;
        let result = self.set_sync_inner(id, enabled).await;
        finish_transaction(self.conn, result).await
    }

    async fn insert_tin(&self, item_id: ItemId, draft: &TinDraft) -> Result<Tin> {
        let draft = draft.normalized()?;
        self.begin().await?;
        let result = self.insert_tin_inner(item_id, &draft).await;
        finish_transaction(self.conn, result).await
    }

    async fn update_tin(&self, id: TinId, draft: &TinDraft) -> Result<Tin> {
        let draft = draft.normalized()?;
        self.begin().await?;
        let result = self.update_tin_inner(id, &draft).await;
        finish_transaction(self.conn, result).await
    }

    async fn delete_tin(&self, id: TinId) -> Result<()> {
        self.begin().await?;
        let result = self.delete_tin_inner(id).await;
        finish_transaction(self.conn, result).await
    }

    async fn get_tin(&self, id: TinId) -> Result<Option<Tin>> {
        fetch_tin(self.conn, id).await
    }

    async fn list_tins(&self, item_id: ItemId) -> Result<Vec<Tin>> {
        let sql = format!(
            "SELECT {TIN_COLUMNS} FROM tins WHERE item_id = ? ORDER BY label COLLATE NOCASE"
        );
        let mut rows = self.conn.query(&sql, [item_id.get()]).await?;
        let mut tins = Vec::new();
        while let Some(row) = rows.next().await? {
            tins.push(parse_tin(&row)?);
        }
        Ok(tins)
    }

    async fn list_all_tins(&self) -> Result<Vec<Tin>> {
        let sql = format!("SELECT {TIN_COLUMNS} FROM tins ORDER BY item_id, label COLLATE NOCASE");
        let mut rows = self.conn.query(&sql, ()).await?;
        let mut tins = Vec::new();
        while let Some(row) = rows.next().await? {
            tins.push(parse_tin(&row)?);
        }
        Ok(tins)
    }

    async fn list_names(&self, kind: NameKind) -> Result<Vec<NameUsage>> {
        let sql = format!(
            "SELECT n.name, COUNT(j.item_id) AS count
             FROM {table} n
             LEFT JOIN {join} j ON j.{column} = n.id
             GROUP BY n.id
             ORDER BY n.name COLLATE NOCASE",
            table = kind.table(),
            join = kind.join_table(),
            column = kind.join_column(),
        );
        let mut rows = self.conn.query(&sql, ()).await?;
        let mut names = Vec::new();
        while let Some(row) = rows.next().await? {
            names.push(NameUsage {
                name: row.get(0)?,
                item_count: usize::try_from(row.get::<i64>(1)?).unwrap_or_default(),
            });
        }
        Ok(names)
    }

    async fn delete_unused_names(&self) -> Result<usize> {
        self.begin().await?;
        let result = self.delete_unused_inner().await;
        let removed = finish_transaction(self.conn, result).await?;
        if removed > 0 {
            tracing::info!("Removed {removed} unused component/flavoring names");
        }
        Ok(removed)
    }

    async fn list_pending_operations(&self) -> Result<Vec<PendingSyncOperation>> {
        self.queue().list_pending().await
    }

    async fn delete_pending_operations(&self, ids: &[i64]) -> Result<u64> {
        self.queue().delete(ids).await
    }

    async fn count_pending_operations(&self) -> Result<usize> {
        self.queue().count().await
    }
}

/// Writes applied on behalf of a remote peer.
///
/// Keeps the incoming `last_modified` and never touches the sync queue.
pub(crate) struct ReplayWriter<'a> {
    conn: &'a Connection,
}

impl<'a> ReplayWriter<'a> {
    pub(crate) const fn new(conn: &'a Connection) -> Self {
        Self { conn }
    }

    pub(crate) async fn begin(&self) -> Result<()> {
        self.conn.execute("BEGIN IMMEDIATE", ()).await?;
        Ok(())
    }

    pub(crate) const fn connection(&self) -> &'a Connection {
        self.conn
    }

    pub(crate) async fn find_item(&self, key: &ItemKey) -> Result<Option<Item>> {
        fetch_item_by_key(self.conn, &key.brand, &key.blend).await
    }

    pub(crate) async fn find_tin(&self, item_id: ItemId, label: &str) -> Result<Option<Tin>> {
        fetch_tin_by_label(self.conn, item_id, label).await
    }

    pub(crate) async fn find_name(&self, kind: NameKind, name: &str) -> Result<Option<i64>> {
        find_name_id(self.conn, kind, name).await
    }

    /// Insert or overwrite an item from its payload, keeping the local sync flag.
    pub(crate) async fn write_item(
        &self,
        payload: &ItemPayload,
        existing: Option<&Item>,
    ) -> Result<ItemId> {
        let mut draft = ItemDraft::new(payload.brand.clone(), payload.blend.clone());
        draft.item_type.clone_from(&payload.item_type);
        draft.sub_genre.clone_from(&payload.sub_genre);
        draft.cut.clone_from(&payload.cut);
        draft.quantity = payload.quantity;
        draft.favorite = payload.favorite;
        draft.disliked = payload.disliked;
        draft.in_production = payload.in_production;
        draft.rating = payload.rating;
        draft.notes.clone_from(&payload.notes);
        draft.components.clone_from(&payload.components);
        draft.flavoring.clone_from(&payload.flavoring);
        let mut draft = draft.normalized()?;

        let id = match existing {
            Some(item) => {
                draft.sync_enabled = item.sync_enabled;
                update_item_row(self.conn, item.id, &draft, payload.last_modified).await?;
                item.id
            }
            None => insert_item_row(self.conn, &draft, payload.last_modified).await?,
        };
        replace_names(self.conn, NameKind::Component, id, &draft.components).await?;
        replace_names(self.conn, NameKind::Flavoring, id, &draft.flavoring).await?;
        Ok(id)
    }

    pub(crate) async fn delete_item(&self, id: ItemId) -> Result<()> {
        self.conn
            .execute("DELETE FROM items WHERE id = ?", [id.get()])
            .await?;
        Ok(())
    }

    pub(crate) async fn write_tin(
        &self,
        item_id: ItemId,
        payload: &TinPayload,
        existing: Option<&Tin>,
    ) -> Result<TinId> {
        let draft = TinDraft {
            label: payload.label.clone(),
            container: payload.container.clone(),
            quantity: payload.quantity,
            unit: payload.unit.clone(),
            manufacture_date: payload.manufacture_date,
            cellar_date: payload.cellar_date,
            open_date: payload.open_date,
            finished: payload.finished,
        }
        .normalized()?;

        match existing {
            Some(tin) => {
                update_tin_row(self.conn, tin.id, &draft, payload.last_modified).await?;
                Ok(tin.id)
            }
            None => insert_tin_row(self.conn, item_id, &draft, payload.last_modified).await,
        }
    }

    pub(crate) async fn delete_tin(&self, id: TinId) -> Result<()> {
        self.conn
            .execute("DELETE FROM tins WHERE id = ?", [id.get()])
            .await?;
        Ok(())
    }

    pub(crate) async fn ensure_name(&self, kind: NameKind, name: &str) -> Result<()> {
        get_or_create_name(self.conn, kind, name).await.map(|_| ())
    }

    pub(crate) async fn delete_name(&self, id: i64, kind: NameKind) -> Result<()> {
        self.conn
            .execute(&format!("DELETE FROM {} WHERE id = ?", kind.table()), [id])
            .await?;
        Ok(())
    }
}

/// Commit on success, roll back on failure.
pub(crate) async fn finish_transaction<T>(conn: &Connection, result: Result<T>) -> Result<T> {
    match result {
        Ok(value) => {
            if let Err(error) = conn.execute("COMMIT", ()).await {
                conn.execute("ROLLBACK", ()).await.ok();
                return Err(error.into());
            }
            Ok(value)
        }
        Err(error) => {
            conn.execute("ROLLBACK", ()).await.ok();
            Err(error)
        }
    }
}

fn optional_integer(value: Option<i64>) -> Value {
    value.map_or(Value::Null, Value::Integer)
}

fn optional_real(value: Option<f64>) -> Value {
    value.map_or(Value::Null, Value::Real)
}

fn parse_item(row: &Row) -> Result<Item> {
    Ok(Item {
        id: ItemId::new(row.get(0)?),
        brand: row.get(1)?,
        blend: row.get(2)?,
        item_type: row.get(3)?,
        sub_genre: row.get(4)?,
        cut: row.get(5)?,
        quantity: row.get(6)?,
        favorite: row.get::<i64>(7)? != 0,
        disliked: row.get::<i64>(8)? != 0,
        in_production: row.get::<i64>(9)? != 0,
        rating: row.get::<Option<f64>>(10)?,
        notes: row.get(11)?,
        sync_enabled: row.get::<i64>(12)? != 0,
        last_modified: row.get(13)?,
    })
}

fn parse_tin(row: &Row) -> Result<Tin> {
    Ok(Tin {
        id: TinId::new(row.get(0)?),
        item_id: ItemId::new(row.get(1)?),
        label: row.get(2)?,
        container: row.get(3)?,
        quantity: row.get(4)?,
        unit: row.get(5)?,
        manufacture_date: row.get::<Option<i64>>(6)?,
        cellar_date: row.get::<Option<i64>>(7)?,
        open_date: row.get::<Option<i64>>(8)?,
        finished: row.get::<i64>(9)? != 0,
        last_modified: row.get(10)?,
    })
}

async fn fetch_item(conn: &Connection, id: ItemId) -> Result<Option<Item>> {
    let sql = format!("SELECT {ITEM_COLUMNS} FROM items WHERE id = ?");
    let mut rows = conn.query(&sql, [id.get()]).await?;
    match rows.next().await? {
        Some(row) => Ok(Some(parse_item(&row)?)),
        None => Ok(None),
    }
}

async fn fetch_item_by_key(conn: &Connection, brand: &str, blend: &str) -> Result<Option<Item>> {
    let sql = format!("SELECT {ITEM_COLUMNS} FROM items \
         WHERE brand = ? COLLATE NOCASE AND blend = ? COLLATE NOCASE \
         ORDER BY id LIMIT 1");
    let mut rows = conn.query(&sql, [brand, blend]).await?;
    match rows.next().await? {
        Some(row) => Ok(Some(parse_item(&row)?)),
        None => Ok(None),
    }
}

async fn fetch_tin(conn: &Connection, id: TinId) -> Result<Option<Tin>> {
    let sql = format!("SELECT {TIN_COLUMNS} FROM tins WHERE id = ?");
    let mut rows = conn.query(&sql, [id.get()]).await?;
    match rows.next().await? {
        Some(row) => Ok(Some(parse_tin(&row)?)),
        None => Ok(None),
    }
}

async fn fetch_tin_by_label(
    conn: &Connection,
    item_id: ItemId,
    label: &str,
) -> Result<Option<Tin>> {
    let sql = format!("SELECT {TIN_COLUMNS} FROM tins WHERE item_id = ? AND label = ?");
    let mut rows = conn.query(&sql, params![item_id.get(), label]).await?;
    match rows.next().await? {
        Some(row) => Ok(Some(parse_tin(&row)?)),
        None => Ok(None),
    }
}

async fn insert_item_row(
    conn: &Connection,
    draft: &ItemDraft,
    last_modified: i64,
) -> Result<ItemId> {
    conn.execute(
        "INSERT INTO items (brand, blend, type, sub_genre, cut, quantity, favorite, disliked,
            in_production, rating, notes, sync_enabled, last_modified)
         VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        params![
            draft.brand.as_str(),
            draft.blend.as_str(),
            draft.item_type.as_str(),
            draft.sub_genre.as_str(),
            draft.cut.as_str(),
            draft.quantity,
            i64::from(draft.favorite),
            i64::from(draft.disliked),
            i64::from(draft.in_production),
            optional_real(draft.rating),
            draft.notes.as_str(),
            i64::from(draft.sync_enabled),
            last_modified
        ],
    )
    .await?;
    Ok(ItemId::new(conn.last_insert_rowid()))
}

async fn update_item_row(
    conn: &Connection,
    id: ItemId,
    draft: &ItemDraft,
    last_modified: i64,
) -> Result<()> {
    let changed = conn
        .execute(
            "UPDATE items SET brand = ?, blend = ?, type = ?, sub_genre = ?, cut = ?, quantity = ?,
                favorite = ?, disliked = ?, in_production = ?, rating = ?, notes = ?,
                sync_enabled = ?, last_modified = ?
             WHERE id = ?",
            params![
                draft.brand.as_str(),
                draft.blend.as_str(),
                draft.item_type.as_str(),
                draft.sub_genre.as_str(),
                draft.cut.as_str(),
                draft.quantity,
                i64::from(draft.favorite),
                i64::from(draft.disliked),
                i64::from(draft.in_production),
                optional_real(draft.rating),
                draft.notes.as_str(),
                i64::from(draft.sync_enabled),
                last_modified,
                id.get()
            ],
        )
        .await?;
    if changed == 0 {
        return Err(Error::NotFound(format!("item {id}")));
    }
    Ok(())
}

async fn insert_tin_row(
    conn: &Connection,
    item_id: ItemId,
    draft: &TinDraft,
    last_modified: i64,
) -> Result<TinId> {
    conn.execute(
        "INSERT INTO tins (item_id, label, container, quantity, unit, manufacture_date,
            cellar_date, open_date, finished, last_modified)
         VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        params![
            item_id.get(),
            draft.label.as_str(),
            draft.container.as_str(),
            draft.quantity,
            draft.unit.as_str(),
            optional_integer(draft.manufacture_date),
            optional_integer(draft.cellar_date),
            optional_integer(draft.open_date),
            i64::from(draft.finished),
            last_modified
        ],
    )
    .await?;
    Ok(TinId::new(conn.last_insert_rowid()))
}

async fn update_tin_row(
    conn: &Connection,
    id: TinId,
    draft: &TinDraft,
    last_modified: i64,
) -> Result<()> {
    let changed = conn
        .execute(
            "UPDATE tins SET label = ?, container = ?, quantity = ?, unit = ?,
                manufacture_date = ?, cellar_date = ?, open_date = ?, finished = ?,
                last_modified = ?
             WHERE id = ?",
            params![
                draft.label.as_str(),
                draft.container.as_str(),
                draft.quantity,
                draft.unit.as_str(),
                optional_integer(draft.manufacture_date),
                optional_integer(draft.cellar_date),
                optional_integer(draft.open_date),
                i64::from(draft.finished),
                last_modified,
                id.get()
            ],
        )
        .await?;
    if changed == 0 {
        return Err(Error::NotFound(format!("tin {id}")));
    }
    Ok(())
}

async fn find_name_id(conn: &Connection, kind: NameKind, name: &str) -> Result<Option<i64>> {
    let sql = format!(
        "SELECT id FROM {} WHERE name = ? COLLATE NOCASE",
        kind.table()
    );
    let mut rows = conn.query(&sql, [name]).await?;
    match rows.next().await? {
        Some(row) => Ok(Some(row.get(0)?)),
        None => Ok(None),
    }
}

/// Get or create a component/flavoring by name
async fn get_or_create_name(conn: &Connection, kind: NameKind, name: &str) -> Result<i64> {
    if let Some(id) = find_name_id(conn, kind, name).await? {
        return Ok(id);
    }
    conn.execute(
        &format!("INSERT INTO {} (name) VALUES (?)", kind.table()),
        [name],
    )
    .await?;
    Ok(conn.last_insert_rowid())
}

/// Relink an item's names (create new names, link/unlink as needed)
async fn replace_names(
    conn: &Connection,
    kind: NameKind,
    item_id: ItemId,
    names: &[String],
) -> Result<()> {
    conn.execute(
        &format!("DELETE FROM {} WHERE item_id = ?", kind.join_table()),
        [item_id.get()],
    )
    .await?;

    let link_sql = format!(
        "INSERT OR IGNORE INTO {} (item_id, {}) VALUES (?, ?)",
        kind.join_table(),
        kind.join_column()
    );
    for name in names {
        let name_id = get_or_create_name(conn, kind, name).await?;
        conn.execute(&link_sql, params![item_id.get(), name_id])
            .await?;
    }
    Ok(())
}

async fn load_names(conn: &Connection, kind: NameKind, item_id: ItemId) -> Result<Vec<String>> {
    let sql = format!(
        "SELECT n.name FROM {table} n
         JOIN {join} j ON j.{column} = n.id
         WHERE j.item_id = ?
         ORDER BY n.name COLLATE NOCASE",
        table = kind.table(),
        join = kind.join_table(),
        column = kind.join_column(),
    );
    let mut rows = conn.query(&sql, [item_id.get()]).await?;
    let mut names = Vec::new();
    while let Some(row) = rows.next().await? {
        names.push(row.get(0)?);
    }
    Ok(names)
}

async fn load_name_map(
    conn: &Connection,
    kind: NameKind,
) -> Result<std::collections::HashMap<ItemId, Vec<String>>> {
    let sql = format!(
        "SELECT j.item_id, n.name FROM {table} n
         JOIN {join} j ON j.{column} = n.id
         ORDER BY n.name COLLATE NOCASE",
        table = kind.table(),
        join = kind.join_table(),
        column = kind.join_column(),
    );
    let mut rows = conn.query(&sql, ()).await?;
    let mut map = std::collections::HashMap::<ItemId, Vec<String>>::new();
    while let Some(row) = rows.next().await? {
        map.entry(ItemId::new(row.get(0)?))
            .or_default()
            .push(row.get(1)?);
    }
    Ok(map)
}

async fn load_details(conn: &Connection, item: Item) -> Result<ItemDetails> {
    let components = load_names(conn, NameKind::Component, item.id).await?;
    let flavoring = load_names(conn, NameKind::Flavoring, item.id).await?;
    let repo = LibSqlCatalogRepository::new(conn, SyncGate::Disabled);
    let tins = repo.list_tins(item.id).await?;
    Ok(ItemDetails {
        item,
        components,
        flavoring,
        tins,
    })
}

async fn load_details_by_id(conn: &Connection, id: ItemId) -> Result<ItemDetails> {
    let item = fetch_item(conn, id)
        .await?
        .ok_or_else(|| Error::NotFound(format!("item {id}")))?;
    load_details(conn, item).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::Database;
    use pretty_assertions::assert_eq;

    async fn setup() -> Database {
        Database::open_in_memory().await.unwrap()
    }

    fn draft(brand: &str, blend: &str) -> ItemDraft {
        let mut draft = ItemDraft::new(brand, blend);
        draft.item_type = "Virginia".into();
        draft.components = vec!["Virginia".into(), "Perique".into()];
        draft
    }

    async fn pending_for(conn: &Connection, entity: EntityType, id: &str) -> usize {
        SyncQueue::new(conn)
            .count_for_entity(entity, id)
            .await
            .unwrap()
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_insert_and_get() {
        let db = setup().await;
        let repo = LibSqlCatalogRepository::new(db.connection(), SyncGate::Disabled);

        let created = repo.insert_item(&draft("Peterson", "University Flake")).await.unwrap();
        assert_eq!(created.components, vec!["Perique", "Virginia"]);
        assert!(created.item.last_modified > 0);

        let fetched = repo.get_item(created.item.id).await.unwrap().unwrap();
        assert_eq!(fetched, created);
        assert!(repo.exists("Peterson", "University Flake").await.unwrap());
        assert!(!repo.exists("Peterson", "Irish Flake").await.unwrap());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_duplicate_brand_blend_rejected() {
        let db = setup().await;
        let repo = LibSqlCatalogRepository::new(db.connection(), SyncGate::Enabled);

        repo.insert_item(&draft("A", "B")).await.unwrap();
        let error = repo.insert_item(&draft("A", "B")).await.unwrap_err();
        assert!(matches!(error, Error::Duplicate(_)));

        // The failed write rolled back, including its queued operation
        assert_eq!(SyncQueue::new(db.connection()).count().await.unwrap(), 1);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn each_item_write_queues_exactly_one_operation() {
        let db = setup().await;
        let repo = LibSqlCatalogRepository::new(db.connection(), SyncGate::Enabled);

        let created = repo.insert_item(&draft("A", "B")).await.unwrap();
        let id = created.item.id.to_string();
        assert_eq!(pending_for(db.connection(), EntityType::Item, &id).await, 1);

        let mut edit = ItemDraft::from_details(&created);
        edit.notes = "Stoved".into();
        repo.update_item(created.item.id, &edit).await.unwrap();
        assert_eq!(pending_for(db.connection(), EntityType::Item, &id).await, 2);

        edit.favorite = true;
        repo.update_item(created.item.id, &edit).await.unwrap();
        assert_eq!(pending_for(db.connection(), EntityType::Item, &id).await, 3);

        repo.delete_item(created.item.id).await.unwrap();
        assert_eq!(pending_for(db.connection(), EntityType::Item, &id).await, 4);

        let ops = SyncQueue::new(db.connection()).list_pending().await.unwrap();
        let kinds: Vec<_> = ops.iter().map(|op| op.operation.operation_type).collect();
        assert_eq!(
            kinds,
            vec![
                OperationType::Insert,
                OperationType::Update,
                OperationType::Update,
                OperationType::Delete
            ]
        );
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn disabled_gate_or_item_flag_skips_queue() {
        let db = setup().await;
        let repo = LibSqlCatalogRepository::new(db.connection(), SyncGate::Disabled);
        repo.insert_item(&draft("A", "B")).await.unwrap();
        assert_eq!(SyncQueue::new(db.connection()).count().await.unwrap(), 0);

        let repo = LibSqlCatalogRepository::new(db.connection(), SyncGate::Enabled);
        let mut private = draft("C", "D");
        private.sync_enabled = false;
        repo.insert_item(&private).await.unwrap();
        assert_eq!(SyncQueue::new(db.connection()).count().await.unwrap(), 0);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn rename_carries_previous_key() {
        let db = setup().await;
        let repo = LibSqlCatalogRepository::new(db.connection(), SyncGate::Enabled);
        let created = repo.insert_item(&draft("A", "B")).await.unwrap();
        SyncQueue::new(db.connection())
            .delete(&[1])
            .await
            .unwrap();

        let mut edit = ItemDraft::from_details(&created);
        edit.blend = "B Renamed".into();
        repo.update_item(created.item.id, &edit).await.unwrap();

        let ops = SyncQueue::new(db.connection()).list_pending().await.unwrap();
        assert_eq!(ops.len(), 1);
        assert_eq!(ops[0].operation.operation_type, OperationType::Update);
        let payload: ItemPayload = ops[0].operation.decode_payload().unwrap();
        assert_eq!(payload.blend, "B Renamed");
        assert_eq!(payload.previous_key, Some(ItemKey::new("A", "B")));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_tins_cascade_with_item() {
        let db = setup().await;
        let repo = LibSqlCatalogRepository::new(db.connection(), SyncGate::Enabled);
        let item = repo.insert_item(&draft("A", "B")).await.unwrap().item;

        let mut tin = TinDraft::new("Lot 1");
        tin.quantity = 50.0;
        tin.unit = "g".into();
        let created = repo.insert_tin(item.id, &tin).await.unwrap();
        assert_eq!(pending_for(db.connection(), EntityType::Tin, &created.id.to_string()).await, 1);

        let duplicate = repo.insert_tin(item.id, &tin).await.unwrap_err();
        assert!(matches!(duplicate, Error::Duplicate(_)));

        repo.insert_tin(item.id, &TinDraft::new("Lot 2")).await.unwrap();
        assert_eq!(repo.list_tins(item.id).await.unwrap().len(), 2);

        repo.delete_item(item.id).await.unwrap();
        assert!(repo.list_all_tins().await.unwrap().is_empty());
        assert!(repo.get_tin(created.id).await.unwrap().is_none());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_update_tin_bumps_last_modified() {
        let db = setup().await;
        let repo = LibSqlCatalogRepository::new(db.connection(), SyncGate::Disabled);
        let item = repo.insert_item(&draft("A", "B")).await.unwrap().item;
        let tin = repo.insert_tin(item.id, &TinDraft::new("Lot 1")).await.unwrap();

        let mut edit = TinDraft::from_tin(&tin);
        edit.open_date = Some(1_700_000_000_000);
        edit.finished = true;
        let updated = repo.update_tin(tin.id, &edit).await.unwrap();

        assert!(updated.is_opened());
        assert!(updated.finished);
        assert!(updated.last_modified >= tin.last_modified);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_names_and_prune() {
        let db = setup().await;
        let repo = LibSqlCatalogRepository::new(db.connection(), SyncGate::Enabled);
        let first = repo.insert_item(&draft("A", "B")).await.unwrap();
        let mut other = draft("C", "D");
        other.components = vec!["Latakia".into(), "virginia".into()];
        other.flavoring = vec!["Vanilla".into()];
        repo.insert_item(&other).await.unwrap();

        let components = repo.list_names(NameKind::Component).await.unwrap();
        let names: Vec<_> = components.iter().map(|n| (n.name.as_str(), n.item_count)).collect();
        assert_eq!(names, vec![("Latakia", 1), ("Perique", 1), ("Virginia", 2)]);

        let mut edit = ItemDraft::from_details(&first);
        edit.components = vec!["Virginia".into()];
        repo.update_item(first.item.id, &edit).await.unwrap();

        let before = SyncQueue::new(db.connection()).count().await.unwrap();
        assert_eq!(repo.delete_unused_names().await.unwrap(), 1);
        assert_eq!(SyncQueue::new(db.connection()).count().await.unwrap(), before + 1);

        let components = repo.list_names(NameKind::Component).await.unwrap();
        assert!(components.iter().all(|n| n.name != "Perique"));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn enabling_item_sync_publishes_snapshot() {
        let db = setup().await;
        let repo = LibSqlCatalogRepository::new(db.connection(), SyncGate::Enabled);
        let mut private = draft("A", "B");
        private.sync_enabled = false;
        let created = repo.insert_item(&private).await.unwrap();
        repo.insert_tin(created.item.id, &TinDraft::new("Lot 1"))
            .await
            .unwrap();
        assert_eq!(SyncQueue::new(db.connection()).count().await.unwrap(), 0);

        repo.set_item_sync_enabled(created.item.id, true).await.unwrap();
        assert_eq!(SyncQueue::new(db.connection()).count().await.unwrap(), 2);

        // Already enabled: no new snapshot
        repo.set_item_sync_enabled(created.item.id, true).await.unwrap();
        assert_eq!(SyncQueue::new(db.connection()).count().await.unwrap(), 2);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn update_that_enables_sync_publishes_tins() {
        let db = setup().await;
        let repo = LibSqlCatalogRepository::new(db.connection(), SyncGate::Enabled);
        let mut private = draft("A", "B");
        private.sync_enabled = false;
        let created = repo.insert_item(&private).await.unwrap();
        let tin = repo
            .insert_tin(created.item.id, &TinDraft::new("Lot 1"))
            .await
            .unwrap();

        let mut shared = private.clone();
        shared.sync_enabled = true;
        repo.update_item(created.item.id, &shared).await.unwrap();

        let item_id = created.item.id.to_string();
        assert_eq!(pending_for(db.connection(), EntityType::Item, &item_id).await, 1);
        assert_eq!(
            pending_for(db.connection(), EntityType::Tin, &tin.id.to_string()).await,
            1
        );
        let pending = repo.list_pending_operations().await.unwrap();
        assert_eq!(pending[0].operation.operation_type, OperationType::Insert);

        // Later edits are plain updates again
        repo.update_item(created.item.id, &shared).await.unwrap();
        assert_eq!(pending_for(db.connection(), EntityType::Item, &item_id).await, 2);
        assert_eq!(
            pending_for(db.connection(), EntityType::Tin, &tin.id.to_string()).await,
            1
        );
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn natural_key_ignores_case() {
        let db = setup().await;
        let repo = LibSqlCatalogRepository::new(db.connection(), SyncGate::Disabled);
        let created = repo.insert_item(&draft("Peterson", "Irish Flake")).await.unwrap();

        assert!(repo.exists("peterson", "IRISH FLAKE").await.unwrap());
        let found = repo.find_item("PETERSON", "irish flake").await.unwrap().unwrap();
        assert_eq!(found.id, created.item.id);
        assert!(matches!(
            repo.insert_item(&draft("peterson", "irish flake")).await,
            Err(Error::Duplicate(_))
        ));

        // Changing only the case is a rename of the same item
        let renamed = repo
            .update_item(created.item.id, &draft("Peterson", "Irish flake"))
            .await
            .unwrap();
        assert_eq!(renamed.item.blend, "Irish flake");
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn list_item_details_attaches_everything() {
        let db = setup().await;
        let repo = LibSqlCatalogRepository::new(db.connection(), SyncGate::Disabled);
        let a = repo.insert_item(&draft("Zeta", "One")).await.unwrap();
        repo.insert_item(&draft("Alpha", "Two")).await.unwrap();
        repo.insert_tin(a.item.id, &TinDraft::new("Lot 1")).await.unwrap();

        let details = repo.list_item_details().await.unwrap();
        assert_eq!(details.len(), 2);
        assert_eq!(details[0].item.brand, "Alpha");
        assert!(details[0].tins.is_empty());
        assert_eq!(details[1].tins.len(), 1);
        assert_eq!(details[1].components, vec!["Perique", "Virginia"]);
    }
}
