//! One-time move of per-item sync flags from preferences into the database

use super::catalog::CatalogService;
use super::live::Table;
use crate::db::finish_transaction;
use crate::error::{Error, Result};
use crate::preferences::PreferenceStore;

/// Copy legacy per-item sync flags into `items.sync_enabled`.
///
/// Runs once: afterwards the completion flag is set and the legacy map is
/// cleared. The copy neither enqueues operations nor bumps `last_modified`.
/// Returns the number of items updated.
pub async fn migrate_legacy_sync_flags(
    catalog: &CatalogService,
    prefs: &PreferenceStore,
) -> Result<usize> {
    let current = prefs.get()?;
    if current.sync_flag_migration_complete {
        return Ok(0);
    }

    let flags: Vec<(i64, bool)> = current
        .legacy_item_sync_flags
        .iter()
        .map(|(id, enabled)| (*id, *enabled))
        .collect();

    let updated = if flags.is_empty() {
        0
    } else {
        let db = catalog.lock_db().await;
        let conn = db.connection();
        conn.execute("BEGIN IMMEDIATE", ()).await?;
        let result = async {
            let mut updated: u64 = 0;
            for (id, enabled) in &flags {
                updated += conn
                    .execute(
                        "UPDATE items SET sync_enabled = ? WHERE id = ?",
                        libsql::params![i64::from(*enabled), *id],
                    )
                    .await?;
            }
            Ok::<_, Error>(updated)
        }
        .await;
        finish_transaction(conn, result).await?
    };

    prefs.update(|prefs| {
        prefs.sync_flag_migration_complete = true;
        prefs.legacy_item_sync_flags.clear();
    })?;

    if updated > 0 {
        catalog.notify(&[Table::Items]);
    }
    tracing::info!("Migrated {updated} legacy item sync flags");
    usize::try_from(updated).map_err(|error| Error::Database(error.to_string()))
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::models::{ItemDraft, Preferences};
    use pretty_assertions::assert_eq;

    #[tokio::test(flavor = "multi_thread")]
    async fn flags_move_once_without_queueing() {
        let prefs = Arc::new(PreferenceStore::in_memory(Preferences::default()));
        let catalog = CatalogService::open_in_memory(Arc::clone(&prefs)).await.unwrap();

        let mut shared = ItemDraft::new("A", "Shared");
        shared.sync_enabled = false;
        let shared = catalog.add_item(&shared).await.unwrap();
        let private = catalog.add_item(&ItemDraft::new("A", "Private")).await.unwrap();
        let before = shared.item.last_modified;

        prefs
            .update(|prefs| {
                prefs.sync_enabled = true;
                prefs.legacy_item_sync_flags.insert(shared.item.id.get(), true);
                prefs.legacy_item_sync_flags.insert(private.item.id.get(), false);
                prefs.legacy_item_sync_flags.insert(999, true);
            })
            .unwrap();

        assert_eq!(migrate_legacy_sync_flags(&catalog, &prefs).await.unwrap(), 2);

        let shared = catalog.get_item(shared.item.id).await.unwrap().unwrap();
        let private = catalog.get_item(private.item.id).await.unwrap().unwrap();
        assert!(shared.item.sync_enabled);
        assert!(!private.item.sync_enabled);
        assert_eq!(shared.item.last_modified, before);
        assert_eq!(catalog.pending_count().await.unwrap(), 0);

        let after = prefs.get().unwrap();
        assert!(after.sync_flag_migration_complete);
        assert!(after.legacy_item_sync_flags.is_empty());

        // Second run is a no-op even if flags reappear
        prefs
            .update(|prefs| {
                prefs.legacy_item_sync_flags.insert(private.item.id.get(), true);
            })
            .unwrap();
        assert_eq!(migrate_legacy_sync_flags(&catalog, &prefs).await.unwrap(), 0);
        let private = catalog.get_item(private.item.id).await.unwrap().unwrap();
        assert!(!private.item.sync_enabled);
    }
}
