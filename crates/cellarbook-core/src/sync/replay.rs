//! Last-write-wins replay of remote operations

use libsql::Connection;

use super::CancelSignal;
use crate::db::{finish_transaction, ReplayWriter, SCHEMA_VERSION};
use crate::error::{Error, Result};
use crate::models::{
    EntityType, Item, ItemPayload, NameKind, NamePayload, OperationType, SyncOperation, Tin,
    TinPayload,
};

/// How one remote operation was evaluated.
///
/// Every variant counts as successfully evaluated; only errors keep a
/// batch from being marked processed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReplayOutcome {
    Applied,
    /// Local copy is as new or newer
    Stale,
    /// No local counterpart (or no parent item for a tin)
    Missing,
    /// Written by a different schema version; skipped
    SchemaMismatch,
}

/// Outcome tally for one batch
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReplayCounts {
    pub applied: usize,
    pub stale: usize,
    pub missing: usize,
    pub schema_mismatch: usize,
}

impl ReplayCounts {
    fn record(&mut self, outcome: ReplayOutcome) {
        match outcome {
            ReplayOutcome::Applied => self.applied += 1,
            ReplayOutcome::Stale => self.stale += 1,
            ReplayOutcome::Missing => self.missing += 1,
            ReplayOutcome::SchemaMismatch => self.schema_mismatch += 1,
        }
    }
}

/// Replay a batch inside one transaction.
///
/// Returns `None` (with nothing written) when `cancel` is raised between
/// operations.
pub async fn replay_batch(
    conn: &Connection,
    operations: &[SyncOperation],
    cancel: &CancelSignal,
) -> Result<Option<ReplayCounts>> {
    let writer = ReplayWriter::new(conn);
    writer.begin().await?;
    let result = async {
        let mut counts = ReplayCounts::default();
        for operation in operations {
            if cancel.is_cancelled() {
                return Ok(None);
            }
            counts.record(apply(&writer, operation).await?);
        }
        Ok::<_, Error>(Some(counts))
    }
    .await;

    match result {
        Ok(None) => {
            conn.execute("ROLLBACK", ()).await.ok();
            Ok(None)
        }
        other => finish_transaction(conn, other).await,
    }
}

/// Replay a single operation outside any caller transaction.
pub async fn replay_operation(
    conn: &Connection,
    operation: &SyncOperation,
) -> Result<ReplayOutcome> {
    let writer = ReplayWriter::new(conn);
    writer.begin().await?;
    let result = apply(&writer, operation).await;
    finish_transaction(conn, result).await
}

async fn apply(writer: &ReplayWriter<'_>, operation: &SyncOperation) -> Result<ReplayOutcome> {
    if operation.db_version != SCHEMA_VERSION {
        tracing::debug!(
            "Skipping {} {} {}: schema version {} != {SCHEMA_VERSION}",
            operation.operation_type,
            operation.entity_type,
            operation.entity_id,
            operation.db_version
        );
        return Ok(ReplayOutcome::SchemaMismatch);
    }

    let op = operation.operation_type;
    let outcome = match operation.entity_type {
        EntityType::Item => replay_item(writer, op, &operation.decode_payload()?).await?,
        EntityType::Tin => replay_tin(writer, op, &operation.decode_payload()?).await?,
        EntityType::Component => {
            replay_name(writer, NameKind::Component, op, &operation.decode_payload()?).await?
        }
        EntityType::Flavoring => {
            replay_name(writer, NameKind::Flavoring, op, &operation.decode_payload()?).await?
        }
    };
    tracing::debug!(
        "Replayed {op} {} {}: {outcome:?}",
        operation.entity_type,
        operation.entity_id
    );
    Ok(outcome)
}

async fn resolve_item(writer: &ReplayWriter<'_>, payload: &ItemPayload) -> Result<Option<Item>> {
    if let Some(previous) = &payload.previous_key {
        if let Some(item) = writer.find_item(previous).await? {
            return Ok(Some(item));
        }
    }
    writer.find_item(&payload.key()).await
}

async fn replay_item(
    writer: &ReplayWriter<'_>,
    op: OperationType,
    payload: &ItemPayload,
) -> Result<ReplayOutcome> {
    if op == OperationType::Delete {
        return match writer.find_item(&payload.key()).await? {
            Some(local) => {
                writer.delete_item(local.id).await?;
                Ok(ReplayOutcome::Applied)
            }
            None => Ok(ReplayOutcome::Missing),
        };
    }

    let Some(local) = resolve_item(writer, payload).await? else {
        if op == OperationType::Update {
            return Ok(ReplayOutcome::Missing);
        }
        writer.write_item(payload, None).await?;
        return Ok(ReplayOutcome::Applied);
    };

    if local.last_modified >= payload.last_modified {
        return Ok(ReplayOutcome::Stale);
    }
    if local.key() != payload.key() {
        // Renamed onto a key another local item already holds
        if let Some(other) = writer.find_item(&payload.key()).await? {
            if other.id != local.id {
                return Ok(ReplayOutcome::Stale);
            }
        }
    }
    writer.write_item(payload, Some(&local)).await?;
    Ok(ReplayOutcome::Applied)
}

async fn resolve_tin(
    writer: &ReplayWriter<'_>,
    parent: &Item,
    payload: &TinPayload,
) -> Result<Option<Tin>> {
    if let Some(previous) = &payload.previous_label {
        if let Some(tin) = writer.find_tin(parent.id, previous).await? {
            return Ok(Some(tin));
        }
    }
    writer.find_tin(parent.id, &payload.label).await
}

async fn replay_tin(
    writer: &ReplayWriter<'_>,
    op: OperationType,
    payload: &TinPayload,
) -> Result<ReplayOutcome> {
    let Some(parent) = writer.find_item(&payload.item_key()).await? else {
        return Ok(ReplayOutcome::Missing);
    };

    if op == OperationType::Delete {
        return match writer.find_tin(parent.id, &payload.label).await? {
            Some(local) => {
                writer.delete_tin(local.id).await?;
                Ok(ReplayOutcome::Applied)
            }
            None => Ok(ReplayOutcome::Missing),
        };
    }

    let Some(local) = resolve_tin(writer, &parent, payload).await? else {
        if op == OperationType::Update {
            return Ok(ReplayOutcome::Missing);
        }
        writer.write_tin(parent.id, payload, None).await?;
        return Ok(ReplayOutcome::Applied);
    };

    if local.last_modified >= payload.last_modified {
        return Ok(ReplayOutcome::Stale);
    }
    if local.label != payload.label {
        if let Some(other) = writer.find_tin(parent.id, &payload.label).await? {
            if other.id != local.id {
                return Ok(ReplayOutcome::Stale);
            }
        }
    }
    writer.write_tin(parent.id, payload, Some(&local)).await?;
    Ok(ReplayOutcome::Applied)
}

async fn name_in_use(writer: &ReplayWriter<'_>, kind: NameKind, id: i64) -> Result<bool> {
    let sql = format!(
        "SELECT 1 FROM {} WHERE {} = ? LIMIT 1",
        kind.join_table(),
        kind.join_column()
    );
    let mut rows = writer.connection().query(&sql, [id]).await?;
    Ok(rows.next().await?.is_some())
}

async fn replay_name(
    writer: &ReplayWriter<'_>,
    kind: NameKind,
    op: OperationType,
    payload: &NamePayload,
) -> Result<ReplayOutcome> {
    let existing = writer.find_name(kind, &payload.name).await?;
    match (op, existing) {
        (OperationType::Insert, None) => {
            writer.ensure_name(kind, &payload.name).await?;
            Ok(ReplayOutcome::Applied)
        }
        (OperationType::Insert | OperationType::Update, Some(_)) => Ok(ReplayOutcome::Stale),
        (OperationType::Update | OperationType::Delete, None) => Ok(ReplayOutcome::Missing),
        (OperationType::Delete, Some(id)) => {
            // Names still linked to local items stay
            if name_in_use(writer, kind, id).await? {
                return Ok(ReplayOutcome::Stale);
            }
            writer.delete_name(id, kind).await?;
            Ok(ReplayOutcome::Applied)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{CatalogRepository, Database, LibSqlCatalogRepository, SyncGate, SyncQueue};
    use crate::models::{ItemDraft, ItemKey, TinDraft};
    use pretty_assertions::assert_eq;

    async fn setup() -> Database {
        Database::open_in_memory().await.unwrap()
    }

    fn repo(db: &Database) -> LibSqlCatalogRepository<'_> {
        LibSqlCatalogRepository::new(db.connection(), SyncGate::Disabled)
    }

    fn item_payload(brand: &str, blend: &str, last_modified: i64) -> ItemPayload {
        let mut payload: ItemPayload = serde_json::from_value(serde_json::json!({
            "brand": brand,
            "blend": blend,
            "lastModified": last_modified,
        }))
        .unwrap();
        payload.item_type = "English".into();
        payload.components = vec!["Latakia".into()];
        payload
    }

    async fn replay(db: &Database, operation: &SyncOperation) -> ReplayOutcome {
        replay_operation(db.connection(), operation).await.unwrap()
    }

    fn op(
        operation_type: OperationType,
        entity_type: EntityType,
        payload: &impl serde::Serialize,
    ) -> SyncOperation {
        SyncOperation::new(operation_type, entity_type, "1", payload).unwrap()
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn insert_creates_missing_item_with_names() {
        let db = setup().await;
        let payload = item_payload("A", "B", 1_000);
        let operation = op(OperationType::Insert, EntityType::Item, &payload);
        let outcome = replay(&db, &operation).await;
        assert_eq!(outcome, ReplayOutcome::Applied);

        let item = repo(&db).find_item("A", "B").await.unwrap().unwrap();
        assert_eq!(item.last_modified, 1_000);
        assert_eq!(item.item_type, "English");
        let details = repo(&db).get_item(item.id).await.unwrap().unwrap();
        assert_eq!(details.components, vec!["Latakia".to_string()]);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn insert_older_than_local_leaves_row_unchanged() {
        let db = setup().await;
        let local = repo(&db).insert_item(&ItemDraft::new("A", "B")).await.unwrap();

        let payload = item_payload("A", "B", local.item.last_modified - 1_000);
        let operation = op(OperationType::Insert, EntityType::Item, &payload);
        let outcome = replay(&db, &operation).await;
        assert_eq!(outcome, ReplayOutcome::Stale);

        let after = repo(&db).get_item(local.item.id).await.unwrap().unwrap();
        assert_eq!(after, local);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn newer_update_overwrites_but_keeps_local_sync_flag() {
        let db = setup().await;
        let mut draft = ItemDraft::new("A", "B");
        draft.sync_enabled = false;
        let local = repo(&db).insert_item(&draft).await.unwrap();

        let payload = item_payload("A", "B", local.item.last_modified + 1_000);
        let operation = op(OperationType::Update, EntityType::Item, &payload);
        let outcome = replay(&db, &operation).await;
        assert_eq!(outcome, ReplayOutcome::Applied);

        let after = repo(&db).get_item(local.item.id).await.unwrap().unwrap();
        assert_eq!(after.item.item_type, "English");
        assert_eq!(after.item.last_modified, payload.last_modified);
        assert!(!after.item.sync_enabled);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn update_and_delete_without_local_are_noops() {
        let db = setup().await;
        let payload = item_payload("Ghost", "Blend", 5);
        for kind in [OperationType::Update, OperationType::Delete] {
            let operation = op(kind, EntityType::Item, &payload);
            let outcome = replay(&db, &operation).await;
            assert_eq!(outcome, ReplayOutcome::Missing);
        }
        assert!(repo(&db).list_items().await.unwrap().is_empty());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn delete_removes_existing_item() {
        let db = setup().await;
        let local = repo(&db).insert_item(&ItemDraft::new("A", "B")).await.unwrap();
        let payload = ItemPayload::new(&local.item, &[], &[]);
        let operation = op(OperationType::Delete, EntityType::Item, &payload);
        let outcome = replay(&db, &operation).await;
        assert_eq!(outcome, ReplayOutcome::Applied);
        assert!(repo(&db).get_item(local.item.id).await.unwrap().is_none());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn other_schema_versions_are_skipped() {
        let db = setup().await;
        let mut operation = op(
            OperationType::Insert,
            EntityType::Item,
            &item_payload("A", "B", 1),
        );
        operation.db_version = SCHEMA_VERSION - 1;
        assert_eq!(replay(&db, &operation).await, ReplayOutcome::SchemaMismatch);
        assert!(!repo(&db).exists("A", "B").await.unwrap());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn rename_resolves_previous_key() {
        let db = setup().await;
        let local = repo(&db).insert_item(&ItemDraft::new("A", "Old")).await.unwrap();

        let mut payload = item_payload("A", "New", local.item.last_modified + 1);
        payload.previous_key = Some(ItemKey::new("A", "Old"));
        let operation = op(OperationType::Update, EntityType::Item, &payload);
        let outcome = replay(&db, &operation).await;
        assert_eq!(outcome, ReplayOutcome::Applied);

        let renamed = repo(&db).get_item(local.item.id).await.unwrap().unwrap();
        assert_eq!(renamed.item.blend, "New");
        assert!(!repo(&db).exists("A", "Old").await.unwrap());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn tins_need_their_parent() {
        let db = setup().await;
        let orphan: TinPayload = serde_json::from_value(serde_json::json!({
            "itemBrand": "A",
            "itemBlend": "B",
            "label": "Lot 1",
            "quantity": 2.0,
            "unit": "oz",
            "lastModified": 10,
        }))
        .unwrap();
        let insert = op(OperationType::Insert, EntityType::Tin, &orphan);
        assert_eq!(replay(&db, &insert).await, ReplayOutcome::Missing);

        let parent = repo(&db).insert_item(&ItemDraft::new("A", "B")).await.unwrap();
        assert_eq!(replay(&db, &insert).await, ReplayOutcome::Applied);
        let tins = repo(&db).list_tins(parent.item.id).await.unwrap();
        assert_eq!(tins.len(), 1);
        assert_eq!(tins[0].unit, "oz");
        assert_eq!(tins[0].last_modified, 10);

        // Same payload again: local copy is not older
        assert_eq!(replay(&db, &insert).await, ReplayOutcome::Stale);
    }

    async fn item_with_tin(db: &Database) -> (Item, Tin) {
        let parent = repo(db).insert_item(&ItemDraft::new("A", "B")).await.unwrap();
        let mut draft = TinDraft::new("Lot 1");
        draft.quantity = 2.0;
        draft.unit = "oz".into();
        let tin = repo(db).insert_tin(parent.item.id, &draft).await.unwrap();
        (parent.item, tin)
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn newer_tin_update_overwrites_local_row() {
        let db = setup().await;
        let (parent, tin) = item_with_tin(&db).await;

        let mut payload = TinPayload::new(&parent, &tin);
        payload.quantity = 1.5;
        payload.finished = true;
        payload.last_modified = tin.last_modified + 1_000;
        let update = op(OperationType::Update, EntityType::Tin, &payload);
        assert_eq!(replay(&db, &update).await, ReplayOutcome::Applied);

        let after = repo(&db).get_tin(tin.id).await.unwrap().unwrap();
        assert!((after.quantity - 1.5).abs() < f64::EPSILON);
        assert!(after.finished);
        assert_eq!(after.last_modified, payload.last_modified);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn tin_rename_resolves_previous_label() {
        let db = setup().await;
        let (parent, tin) = item_with_tin(&db).await;

        let mut payload = TinPayload::new(&parent, &tin);
        payload.label = "Cellar jar".into();
        payload.previous_label = Some("Lot 1".into());
        payload.last_modified = tin.last_modified + 1;
        let update = op(OperationType::Update, EntityType::Tin, &payload);
        assert_eq!(replay(&db, &update).await, ReplayOutcome::Applied);

        let tins = repo(&db).list_tins(parent.id).await.unwrap();
        assert_eq!(tins.len(), 1);
        assert_eq!(tins[0].id, tin.id);
        assert_eq!(tins[0].label, "Cellar jar");
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn tin_delete_removes_local_row() {
        let db = setup().await;
        let (parent, tin) = item_with_tin(&db).await;

        let payload = TinPayload::new(&parent, &tin);
        let delete = op(OperationType::Delete, EntityType::Tin, &payload);
        assert_eq!(replay(&db, &delete).await, ReplayOutcome::Applied);
        assert!(repo(&db).get_tin(tin.id).await.unwrap().is_none());
        assert_eq!(replay(&db, &delete).await, ReplayOutcome::Missing);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn name_deletes_respect_local_usage() {
        let db = setup().await;
        let mut draft = ItemDraft::new("A", "B");
        draft.components = vec!["Latakia".into()];
        repo(&db).insert_item(&draft).await.unwrap();
        let writer = ReplayWriter::new(db.connection());
        writer.ensure_name(NameKind::Component, "Orphan").await.unwrap();

        let delete = |name: &str| {
            op(
                OperationType::Delete,
                EntityType::Component,
                &NamePayload { name: name.into() },
            )
        };
        assert_eq!(replay(&db, &delete("Latakia")).await, ReplayOutcome::Stale);
        assert_eq!(replay(&db, &delete("Orphan")).await, ReplayOutcome::Applied);
        assert_eq!(replay(&db, &delete("Orphan")).await, ReplayOutcome::Missing);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn batch_replay_counts_and_never_enqueues() {
        let db = setup().await;
        let ops = vec![
            op(OperationType::Insert, EntityType::Item, &item_payload("A", "B", 1)),
            op(OperationType::Update, EntityType::Item, &item_payload("C", "D", 1)),
            op(OperationType::Insert, EntityType::Item, &item_payload("A", "B", 1)),
        ];
        let counts = replay_batch(db.connection(), &ops, &CancelSignal::never())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(
            counts,
            ReplayCounts {
                applied: 1,
                stale: 1,
                missing: 1,
                schema_mismatch: 0,
            }
        );
        assert_eq!(SyncQueue::new(db.connection()).count().await.unwrap(), 0);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn cancelled_batch_writes_nothing() {
        let db = setup().await;
        let (handle, signal) = crate::sync::cancel_pair();
        handle.cancel();
        let ops = vec![op(OperationType::Insert, EntityType::Item, &item_payload("A", "B", 1))];
        assert_eq!(replay_batch(db.connection(), &ops, &signal).await.unwrap(), None);
        assert!(!repo(&db).exists("A", "B").await.unwrap());
    }
}
