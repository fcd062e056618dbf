//! Database migrations

use rusqlite::Connection;

use crate::error::Result;

/// Current schema version
const CURRENT_VERSION: i32 = 2;

/// Run all pending migrations
pub fn run(conn: &Connection) -> Result<()> {
    let version = get_version(conn)?;

    if version < 1 {
        migrate_v1(conn)?;
    }
    if version < 2 {
        migrate_v2(conn)?;
    }

    Ok(())
}

/// Get the current schema version
fn get_version(conn: &Connection) -> Result<i32> {
    let exists: bool = conn.query_row(
        "SELECT EXISTS(SELECT 1 FROM sqlite_master WHERE type='table' AND name='schema_version')",
        [],
        |row| row.get(0),
    )?;

    if !exists {
        return Ok(0);
    }

    let version: i32 = conn.query_row(
        "SELECT COALESCE(MAX(version), 0) FROM schema_version",
        [],
        |row| row.get(0),
    )?;

    Ok(version)
}

fn apply(conn: &Connection, statements: &[&str]) -> Result<()> {
    conn.execute("BEGIN TRANSACTION", [])?;

    for stmt in statements {
        if let Err(e) = conn.execute(stmt, []) {
            conn.execute("ROLLBACK", []).ok();
            return Err(e.into());
        }
    }

    if let Err(e) = conn.execute("COMMIT", []) {
        conn.execute("ROLLBACK", []).ok();
        return Err(e.into());
    }

    Ok(())
}

/// Migration to version 1: offline records, conflicts, device sync state
fn migrate_v1(conn: &Connection) -> Result<()> {
    apply(
        conn,
        &[
            // Schema version tracking
            "CREATE TABLE IF NOT EXISTS schema_version (
                version INTEGER PRIMARY KEY
            )",
            // Offline records table (append-only; status transitions only)
            "CREATE TABLE IF NOT EXISTS offline_records (
                record_id TEXT PRIMARY KEY,
                record_type TEXT NOT NULL,
                data TEXT NOT NULL,
                timestamp INTEGER NOT NULL,
                worker_id TEXT NOT NULL,
                device_id TEXT NOT NULL,
                checksum TEXT NOT NULL,
                sync_status TEXT NOT NULL DEFAULT 'pending',
                parent_record_id TEXT,
                operation TEXT NOT NULL DEFAULT 'create',
                retry_count INTEGER NOT NULL DEFAULT 0,
                last_sync_attempt INTEGER
            )",
            "CREATE INDEX IF NOT EXISTS idx_records_device_status
                ON offline_records(device_id, sync_status)",
            "CREATE INDEX IF NOT EXISTS idx_records_status ON offline_records(sync_status)",
            "CREATE INDEX IF NOT EXISTS idx_records_timestamp ON offline_records(timestamp ASC)",
            // Sync conflicts table
            "CREATE TABLE IF NOT EXISTS sync_conflicts (
                conflict_id TEXT PRIMARY KEY,
                local_record_id TEXT NOT NULL,
                remote_data TEXT NOT NULL,
                conflict_type TEXT NOT NULL,
                resolution_strategy TEXT NOT NULL,
                created_at INTEGER NOT NULL,
                resolved_at INTEGER,
                resolved_by TEXT
            )",
            "CREATE INDEX IF NOT EXISTS idx_conflicts_resolved_at
                ON sync_conflicts(resolved_at)",
            // At most one unresolved conflict per local record
            "CREATE UNIQUE INDEX IF NOT EXISTS idx_conflicts_unresolved_record
                ON sync_conflicts(local_record_id) WHERE resolved_at IS NULL",
            // Device sync state table
            "CREATE TABLE IF NOT EXISTS device_sync_state (
                device_id TEXT PRIMARY KEY,
                last_sync_timestamp INTEGER,
                network_status TEXT NOT NULL DEFAULT 'offline',
                pending_records_count INTEGER NOT NULL DEFAULT 0,
                failed_syncs_count INTEGER NOT NULL DEFAULT 0
            )",
            // Record migration version
            "INSERT INTO schema_version (version) VALUES (1)",
        ],
    )?;

    tracing::info!("Migrated database to version 1");
    Ok(())
}

/// Migration to version 2: recovery provenance
fn migrate_v2(conn: &Connection) -> Result<()> {
    apply(
        conn,
        &[
            "ALTER TABLE offline_records ADD COLUMN origin_record_id TEXT",
            "CREATE INDEX IF NOT EXISTS idx_records_origin
                ON offline_records(device_id, origin_record_id)",
            "INSERT INTO schema_version (version) VALUES (2)",
        ],
    )?;

    tracing::info!("Migrated database to version {CURRENT_VERSION}");
    Ok(())
}
