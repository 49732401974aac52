//! Database migrations
//!
//! Versions are applied in ascending order, each inside its own
//! transaction. There is no downgrade path.

use crate::error::{Error, Result};
use libsql::Connection;

/// Current schema version, also stamped on every queued sync operation
pub const SCHEMA_VERSION: i32 = 5;

const V1: &[&str] = &[
    "CREATE TABLE IF NOT EXISTS schema_version (
        version INTEGER PRIMARY KEY
    )",
    "CREATE TABLE IF NOT EXISTS items (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        brand TEXT NOT NULL,
        blend TEXT NOT NULL,
        type TEXT NOT NULL DEFAULT '',
        quantity INTEGER NOT NULL DEFAULT 1,
        favorite INTEGER NOT NULL DEFAULT 0,
        disliked INTEGER NOT NULL DEFAULT 0,
        notes TEXT NOT NULL DEFAULT '',
        UNIQUE (brand, blend)
    )",
    "CREATE TABLE IF NOT EXISTS components (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        name TEXT NOT NULL UNIQUE COLLATE NOCASE
    )",
    "CREATE TABLE IF NOT EXISTS items_components (
        item_id INTEGER NOT NULL REFERENCES items(id) ON DELETE CASCADE,
        component_id INTEGER NOT NULL REFERENCES components(id) ON DELETE CASCADE,
        PRIMARY KEY (item_id, component_id)
    )",
    "CREATE INDEX IF NOT EXISTS idx_items_components_component ON items_components(component_id)",
];

const V2: &[&str] = &[
    "ALTER TABLE items ADD COLUMN sub_genre TEXT NOT NULL DEFAULT ''",
    "ALTER TABLE items ADD COLUMN cut TEXT NOT NULL DEFAULT ''",
    "ALTER TABLE items ADD COLUMN in_production INTEGER NOT NULL DEFAULT 1",
    "CREATE TABLE IF NOT EXISTS tins (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        item_id INTEGER NOT NULL REFERENCES items(id) ON DELETE CASCADE,
        label TEXT NOT NULL,
        container TEXT NOT NULL DEFAULT '',
        quantity REAL NOT NULL DEFAULT 0,
        unit TEXT NOT NULL DEFAULT '',
        manufacture_date INTEGER,
        cellar_date INTEGER,
        open_date INTEGER,
        UNIQUE (item_id, label)
    )",
    "CREATE INDEX IF NOT EXISTS idx_tins_item ON tins(item_id)",
];

const V3: &[&str] = &[
    "CREATE TABLE IF NOT EXISTS flavoring (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        name TEXT NOT NULL UNIQUE COLLATE NOCASE
    )",
    "CREATE TABLE IF NOT EXISTS items_flavoring (
        item_id INTEGER NOT NULL REFERENCES items(id) ON DELETE CASCADE,
        flavoring_id INTEGER NOT NULL REFERENCES flavoring(id) ON DELETE CASCADE,
        PRIMARY KEY (item_id, flavoring_id)
    )",
    "CREATE INDEX IF NOT EXISTS idx_items_flavoring_flavoring ON items_flavoring(flavoring_id)",
    "ALTER TABLE tins ADD COLUMN finished INTEGER NOT NULL DEFAULT 0",
    "ALTER TABLE items ADD COLUMN rating REAL",
];

const V4: &[&str] = &[
    "ALTER TABLE items ADD COLUMN last_modified INTEGER NOT NULL DEFAULT 0",
    "ALTER TABLE tins ADD COLUMN last_modified INTEGER NOT NULL DEFAULT 0",
    "CREATE INDEX IF NOT EXISTS idx_items_brand ON items(brand COLLATE NOCASE)",
    "CREATE INDEX IF NOT EXISTS idx_items_last_modified ON items(last_modified DESC)",
];

const V5: &[&str] = &[
    "CREATE TABLE IF NOT EXISTS pending_sync_operations (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        operation_type TEXT NOT NULL,
        entity_type TEXT NOT NULL,
        entity_id TEXT NOT NULL,
        payload TEXT NOT NULL,
        db_version INTEGER NOT NULL,
        timestamp INTEGER NOT NULL
    )",
    "CREATE INDEX IF NOT EXISTS idx_pending_sync_entity ON pending_sync_operations(entity_type, entity_id)",
    "ALTER TABLE items ADD COLUMN sync_enabled INTEGER NOT NULL DEFAULT 1",
];

const STEPS: [(i32, &[&str]); 5] = [(1, V1), (2, V2), (3, V3), (4, V4), (5, V5)];

/// Run all pending migrations
pub async fn run(conn: &Connection) -> Result<()> {
    let version = get_version(conn).await?;
    if version > SCHEMA_VERSION {
        return Err(Error::Database(format!(
            "database schema version {version} is newer than supported version {SCHEMA_VERSION}"
        )));
    }
    run_up_to(conn, version, SCHEMA_VERSION).await
}

async fn run_up_to(conn: &Connection, from: i32, target: i32) -> Result<()> {
    for (version, statements) in STEPS {
        if version > from && version <= target {
            apply(conn, version, statements).await?;
        }
    }
    Ok(())
}

/// Get the current schema version
pub async fn get_version(conn: &Connection) -> Result<i32> {
    // Check if schema_version table exists
    let mut rows = conn
        .query(
            "SELECT EXISTS(SELECT 1 FROM sqlite_master WHERE type='table' AND name='schema_version')",
            (),
        )
        .await?;

    let exists: bool = if let Some(row) = rows.next().await? {
        row.get::<i32>(0)? != 0
    } else {
        false
    };

    if !exists {
        return Ok(0);
    }

    let mut rows = conn
        .query("SELECT COALESCE(MAX(version), 0) FROM schema_version", ())
        .await?;

    let version: i32 = if let Some(row) = rows.next().await? {
        row.get(0)?
    } else {
        0
    };

    Ok(version)
}

async fn apply(conn: &Connection, version: i32, statements: &[&str]) -> Result<()> {
    // libsql doesn't have execute_batch, so we run each statement separately
    conn.execute("BEGIN TRANSACTION", ()).await?;

    for stmt in statements {
        if let Err(e) = conn.execute(stmt, ()).await {
            conn.execute("ROLLBACK", ()).await.ok();
            return Err(e.into());
        }
    }

    if let Err(e) = conn
        .execute(
            "INSERT INTO schema_version (version) VALUES (?)",
            [i64::from(version)],
        )
        .await
    {
        conn.execute("ROLLBACK", ()).await.ok();
        return Err(e.into());
    }

    if let Err(e) = conn.execute("COMMIT", ()).await {
        conn.execute("ROLLBACK", ()).await.ok();
        return Err(e.into());
    }

    tracing::info!("Migrated database to version {version}");
    Ok(())
}
