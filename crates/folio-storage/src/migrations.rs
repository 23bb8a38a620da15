//! Database schema migrations.

use rusqlite::Connection;
use tracing::info;

use crate::error::StoreError;

/// Run all pending database migrations.
pub fn run_migrations(conn: &Connection) -> Result<(), StoreError> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS schema_migrations (
            version     INTEGER PRIMARY KEY NOT NULL,
            name        TEXT NOT NULL,
            applied_at  INTEGER NOT NULL DEFAULT (strftime('%s', 'now'))
        );",
    )
    .map_err(|e| StoreError::Fatal(format!("Failed to create migrations table: {}", e)))?;

    let current_version: i64 = conn
        .query_row(
            "SELECT COALESCE(MAX(version), 0) FROM schema_migrations",
            [],
            |row| row.get(0),
        )
        .map_err(|e| StoreError::Fatal(format!("Failed to query migration version: {}", e)))?;

    if current_version < 1 {
        apply_v1(conn)?;
        info!("Applied migration v1: sessions");
    }

    Ok(())
}

/// Version 1: one row per session.
///
/// `data` holds the full JSON document. The other columns are denormalized
/// for listing, ordering, and purging without decoding the document.
/// Timestamps are microseconds since the Unix epoch.
fn apply_v1(conn: &Connection) -> Result<(), StoreError> {
    conn.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS sessions (
            id                   TEXT PRIMARY KEY NOT NULL,
            version              INTEGER NOT NULL CHECK (version > 0),
            created_at           INTEGER NOT NULL,
            updated_at           INTEGER NOT NULL,
            last_action          TEXT,
            message_count        INTEGER NOT NULL DEFAULT 0,
            recommendation_count INTEGER NOT NULL DEFAULT 0,
            data                 TEXT NOT NULL
        );

        CREATE INDEX IF NOT EXISTS idx_sessions_updated_at
            ON sessions (updated_at DESC);

        INSERT OR IGNORE INTO schema_migrations (version, name) VALUES (1, 'sessions');
        ",
    )
    .map_err(|e| StoreError::Fatal(format!("Migration v1 failed: {}", e)))?;
    Ok(())
}
