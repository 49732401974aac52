//! Pending sync operation queue

use libsql::{params, Connection};

use crate::error::Result;
use crate::models::{EntityType, PendingSyncOperation, SyncOperation};

/// Access to `pending_sync_operations` on a borrowed connection.
///
/// Appends are issued by the catalog repository inside its write
/// transaction; the upload worker drains rows once they are stored remotely.
pub struct SyncQueue<'a> {
    conn: &'a Connection,
}

impl<'a> SyncQueue<'a> {
    pub const fn new(conn: &'a Connection) -> Self {
        Self { conn }
    }

    /// Append one operation, returning its row id
    pub async fn enqueue(&self, operation: &SyncOperation) -> Result<i64> {
        self.conn
            .execute(
                "INSERT INTO pending_sync_operations
                    (operation_type, entity_type, entity_id, payload, db_version, timestamp)
                 VALUES (?, ?, ?, ?, ?, ?)",
                params![
                    operation.operation_type.as_str(),
                    operation.entity_type.as_str(),
                    operation.entity_id.as_str(),
                    operation.payload.as_str(),
                    i64::from(operation.db_version),
                    operation.timestamp
                ],
            )
            .await?;
        Ok(self.conn.last_insert_rowid())
    }

    /// All queued operations in insertion order
    pub async fn list_pending(&self) -> Result<Vec<PendingSyncOperation>> {
        let mut rows = self
            .conn
            .query(
                "SELECT id, operation_type, entity_type, entity_id, payload, db_version, timestamp
                 FROM pending_sync_operations
                 ORDER BY id",
                (),
            )
            .await?;

        let mut operations = Vec::new();
        while let Some(row) = rows.next().await? {
            let operation_type: String = row.get(1)?;
            let entity_type: String = row.get(2)?;
            operations.push(PendingSyncOperation {
                id: row.get(0)?,
                operation: SyncOperation {
                    operation_type: operation_type.parse()?,
                    entity_type: entity_type.parse()?,
                    entity_id: row.get(3)?,
                    payload: row.get(4)?,
                    db_version: i32::try_from(row.get::<i64>(5)?).unwrap_or_default(),
                    timestamp: row.get(6)?,
                },
            });
        }
        Ok(operations)
    }

    /// Delete the given rows and nothing else
    pub async fn delete(&self, ids: &[i64]) -> Result<u64> {
        let mut removed = 0;
        for chunk in ids.chunks(500) {
            let placeholders = vec!["?"; chunk.len()].join(", ");
            let sql = format!("DELETE FROM pending_sync_operations WHERE id IN ({placeholders})");
            let values: Vec<libsql::Value> =
                chunk.iter().map(|id| libsql::Value::Integer(*id)).collect();
            removed += self.conn.execute(&sql, values).await?;
        }
        Ok(removed)
    }

    pub async fn count(&self) -> Result<usize> {
        let mut rows = self
            .conn
            .query("SELECT COUNT(*) FROM pending_sync_operations", ())
            .await?;
        count_from(rows.next().await?)
    }

    /// Queued operations that refer to one local entity
    pub async fn count_for_entity(&self, entity: EntityType, entity_id: &str) -> Result<usize> {
        let mut rows = self
            .conn
            .query(
                "SELECT COUNT(*) FROM pending_sync_operations WHERE entity_type = ? AND entity_id = ?",
                [entity.as_str(), entity_id],
            )
            .await?;
        count_from(rows.next().await?)
    }
}

fn count_from(row: Option<libsql::Row>) -> Result<usize> {
    let count = match row {
        Some(row) => row.get::<i64>(0)?,
        None => 0,
    };
    Ok(usize::try_from(count).unwrap_or_default())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::Database;
    use crate::models::{NamePayload, OperationType};
    use pretty_assertions::assert_eq;

    fn operation(name: &str) -> SyncOperation {
        SyncOperation::new(
            OperationType::Delete,
            EntityType::Flavoring,
            "1",
            &NamePayload { name: name.into() },
        )
        .unwrap()
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_enqueue_list_roundtrip() {
        let db = Database::open_in_memory().await.unwrap();
        let queue = SyncQueue::new(db.connection());

        let first = queue.enqueue(&operation("Vanilla")).await.unwrap();
        let second = queue.enqueue(&operation("Rum")).await.unwrap();
        assert!(second > first);

        let pending = queue.list_pending().await.unwrap();
        assert_eq!(pending.len(), 2);
        assert_eq!(pending[0].id, first);
        assert_eq!(pending[0].operation, operation_with_time("Vanilla", &pending[0].operation));
    }

    fn operation_with_time(name: &str, actual: &SyncOperation) -> SyncOperation {
        SyncOperation {
            timestamp: actual.timestamp,
            ..operation(name)
        }
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn delete_removes_only_listed_rows() {
        let db = Database::open_in_memory().await.unwrap();
        let queue = SyncQueue::new(db.connection());
        let a = queue.enqueue(&operation("A")).await.unwrap();
        let b = queue.enqueue(&operation("B")).await.unwrap();
        let c = queue.enqueue(&operation("C")).await.unwrap();

        assert_eq!(queue.delete(&[a, c]).await.unwrap(), 2);
        let remaining: Vec<_> = queue
            .list_pending()
            .await
            .unwrap()
            .into_iter()
            .map(|op| op.id)
            .collect();
        assert_eq!(remaining, vec![b]);
        assert_eq!(queue.count().await.unwrap(), 1);
        assert_eq!(queue.delete(&[]).await.unwrap(), 0);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_count_for_entity() {
        let db = Database::open_in_memory().await.unwrap();
        let queue = SyncQueue::new(db.connection());
        queue.enqueue(&operation("A")).await.unwrap();
        assert_eq!(
            queue.count_for_entity(EntityType::Flavoring, "1").await.unwrap(),
            1
        );
        assert_eq!(queue.count_for_entity(EntityType::Item, "1").await.unwrap(), 0);
    }
}
