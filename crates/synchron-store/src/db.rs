use chrono::{DateTime, Utc};
use rusqlite::Connection;

use crate::error::{Result, StoreError};

/// Initialise every table this crate owns. Safe to call on every startup:
/// `IF NOT EXISTS` throughout.
pub fn init_db(conn: &Connection) -> Result<()> {
    create_owners_table(conn)?;
    create_sync_configs_table(conn)?;
    Ok(())
}

fn create_owners_table(conn: &Connection) -> Result<()> {
    // Tokens are written by the external OAuth flow; the scheduler only reads them.
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS owners (
            id            TEXT PRIMARY KEY NOT NULL,
            email         TEXT,
            access_token  TEXT NOT NULL,
            refresh_token TEXT,
            created_at    TEXT NOT NULL,
            updated_at    TEXT NOT NULL
        );",
    )?;
    Ok(())
}

fn create_sync_configs_table(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS sync_configs (
            id               TEXT    PRIMARY KEY NOT NULL,
            owner_id         TEXT    NOT NULL,
            name             TEXT    NOT NULL,
            sheet_id         TEXT    NOT NULL,
            sheet_name       TEXT    NOT NULL,
            tab_name         TEXT    NOT NULL,
            local_path       TEXT    NOT NULL,
            sync_interval    INTEGER NOT NULL CHECK (sync_interval >= 5),  -- minutes
            is_active        INTEGER NOT NULL DEFAULT 1,
            last_sync_time   TEXT,              -- ISO-8601 or NULL
            last_sync_status TEXT,              -- pending | success | failed | NULL
            last_sync_error  TEXT,
            created_at       TEXT    NOT NULL
        );
        CREATE INDEX IF NOT EXISTS idx_sync_configs_owner
            ON sync_configs(owner_id, created_at);
        CREATE INDEX IF NOT EXISTS idx_sync_configs_active
            ON sync_configs(is_active);",
    )?;
    Ok(())
}

pub(crate) fn parse_timestamp(column: &'static str, value: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|_| StoreError::Corrupt {
            column,
            value: value.to_string(),
        })
}
