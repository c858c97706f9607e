use std::sync::{Mutex, MutexGuard};

use chrono::Utc;
use rusqlite::{Connection, OptionalExtension};
use synchron_core::{
    NewSyncConfig, OwnerId, SyncConfig, SyncConfigId, SyncConfigUpdate, SyncOutcome, SyncStatus,
};
use tracing::{debug, info};

use crate::db::{init_db, parse_timestamp};
use crate::error::{Result, StoreError};

/// CRUD over sync configurations plus field-level status writes.
///
/// Every status write is a single `UPDATE`, so concurrent attempts for
/// different configurations never overwrite each other's fields.
pub trait SyncConfigStore: Send + Sync {
    fn insert(&self, new: NewSyncConfig) -> Result<SyncConfig>;
    fn get(&self, id: &SyncConfigId) -> Result<Option<SyncConfig>>;
    fn list_by_owner(&self, owner: &OwnerId) -> Result<Vec<SyncConfig>>;
    fn list_active(&self) -> Result<Vec<SyncConfig>>;
    fn list_all(&self) -> Result<Vec<SyncConfig>>;
    /// Apply the present fields of `changes`. `None` when the id is unknown.
    fn update(&self, id: &SyncConfigId, changes: &SyncConfigUpdate) -> Result<Option<SyncConfig>>;
    /// Delete and return the removed row, if any.
    fn delete(&self, id: &SyncConfigId) -> Result<Option<SyncConfig>>;
    /// Set `last_sync_status = pending`, leaving time and error untouched.
    fn mark_pending(&self, id: &SyncConfigId) -> Result<Option<SyncConfig>>;
    fn record_outcome(&self, id: &SyncConfigId, outcome: &SyncOutcome)
        -> Result<Option<SyncConfig>>;
}

const SELECT_CONFIG_SQL: &str = "SELECT id, owner_id, name, sheet_id, sheet_name, tab_name,
        local_path, sync_interval, is_active, last_sync_time, last_sync_status,
        last_sync_error, created_at
 FROM sync_configs";

/// Column values as stored, before timestamp/status decoding.
struct StoredRow {
    id: String,
    owner_id: String,
    name: String,
    sheet_id: String,
    sheet_name: String,
    tab_name: String,
    local_path: String,
    sync_interval: u32,
    is_active: bool,
    last_sync_time: Option<String>,
    last_sync_status: Option<String>,
    last_sync_error: Option<String>,
    created_at: String,
}

fn read_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<StoredRow> {
    Ok(StoredRow {
        id: row.get(0)?,
        owner_id: row.get(1)?,
        name: row.get(2)?,
        sheet_id: row.get(3)?,
        sheet_name: row.get(4)?,
        tab_name: row.get(5)?,
        local_path: row.get(6)?,
        sync_interval: row.get(7)?,
        is_active: row.get(8)?,
        last_sync_time: row.get(9)?,
        last_sync_status: row.get(10)?,
        last_sync_error: row.get(11)?,
        created_at: row.get(12)?,
    })
}

impl TryFrom<StoredRow> for SyncConfig {
    type Error = StoreError;

    fn try_from(row: StoredRow) -> Result<Self> {
        let last_sync_time = row
            .last_sync_time
            .as_deref()
            .map(|t| parse_timestamp("last_sync_time", t))
            .transpose()?;
        let last_sync_status = row
            .last_sync_status
            .as_deref()
            .map(|s| {
                s.parse::<SyncStatus>().map_err(|_| StoreError::Corrupt {
                    column: "last_sync_status",
                    value: s.to_string(),
                })
            })
            .transpose()?;
        Ok(SyncConfig {
            id: SyncConfigId(row.id),
            owner_id: OwnerId(row.owner_id),
            name: row.name,
            sheet_id: row.sheet_id,
            sheet_name: row.sheet_name,
            tab_name: row.tab_name,
            local_path: row.local_path,
            sync_interval: row.sync_interval,
            is_active: row.is_active,
            last_sync_time,
            last_sync_status,
            last_sync_error: row.last_sync_error,
            created_at: parse_timestamp("created_at", &row.created_at)?,
        })
    }
}

pub struct SqliteSyncConfigStore {
    conn: Mutex<Connection>,
}

impl SqliteSyncConfigStore {
    pub fn new(conn: Connection) -> Result<Self> {
        init_db(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    pub fn open_in_memory() -> Result<Self> {
        Self::new(Connection::open_in_memory()?)
    }

    fn conn(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn.lock().map_err(|_| StoreError::LockPoisoned)
    }

    fn query(conn: &Connection, filter: &str, params: impl rusqlite::Params) -> Result<Vec<SyncConfig>> {
        let sql = format!("{SELECT_CONFIG_SQL} {filter}");
        let mut stmt = conn.prepare_cached(&sql)?;
        let rows = stmt
            .query_map(params, read_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        rows.into_iter().map(SyncConfig::try_from).collect()
    }

    fn fetch(conn: &Connection, id: &SyncConfigId) -> Result<Option<SyncConfig>> {
        let sql = format!("{SELECT_CONFIG_SQL} WHERE id = ?1");
        conn.query_row(&sql, [id.as_str()], read_row)
            .optional()?
            .map(SyncConfig::try_from)
            .transpose()
    }
}

impl SyncConfigStore for SqliteSyncConfigStore {
    fn insert(&self, new: NewSyncConfig) -> Result<SyncConfig> {
        let conn = self.conn()?;
        let id = SyncConfigId::new();
        let created_at = Utc::now();

        conn.execute(
            "INSERT INTO sync_configs
             (id, owner_id, name, sheet_id, sheet_name, tab_name, local_path,
              sync_interval, is_active, last_sync_time, last_sync_status,
              last_sync_error, created_at)
             VALUES (?1,?2,?3,?4,?5,?6,?7,?8,?9,NULL,NULL,NULL,?10)",
            rusqlite::params![
                id.as_str(),
                new.owner_id.as_str(),
                new.name,
                new.sheet_id,
                new.sheet_name,
                new.tab_name,
                new.local_path,
                new.sync_interval,
                new.is_active,
                created_at.to_rfc3339(),
            ],
        )?;
        info!(config_id = %id, name = %new.name, "sync configuration stored");

        Ok(SyncConfig {
            id,
            owner_id: new.owner_id,
            name: new.name,
            sheet_id: new.sheet_id,
            sheet_name: new.sheet_name,
            tab_name: new.tab_name,
            local_path: new.local_path,
            sync_interval: new.sync_interval,
            is_active: new.is_active,
            last_sync_time: None,
            last_sync_status: None,
            last_sync_error: None,
            created_at,
        })
    }

    fn get(&self, id: &SyncConfigId) -> Result<Option<SyncConfig>> {
        let conn = self.conn()?;
        Self::fetch(&conn, id)
    }

    fn list_by_owner(&self, owner: &OwnerId) -> Result<Vec<SyncConfig>> {
        let conn = self.conn()?;
        Self::query(&conn, "WHERE owner_id = ?1 ORDER BY created_at", [owner.as_str()])
    }

    fn list_active(&self) -> Result<Vec<SyncConfig>> {
        let conn = self.conn()?;
        Self::query(&conn, "WHERE is_active = 1 ORDER BY created_at", [])
    }

    fn list_all(&self) -> Result<Vec<SyncConfig>> {
        let conn = self.conn()?;
        Self::query(&conn, "ORDER BY created_at", [])
    }

    fn update(&self, id: &SyncConfigId, changes: &SyncConfigUpdate) -> Result<Option<SyncConfig>> {
        let conn = self.conn()?;
        let n = conn.execute(
            "UPDATE sync_configs SET
                name          = COALESCE(?1, name),
                sheet_id      = COALESCE(?2, sheet_id),
                sheet_name    = COALESCE(?3, sheet_name),
                tab_name      = COALESCE(?4, tab_name),
                local_path    = COALESCE(?5, local_path),
                sync_interval = COALESCE(?6, sync_interval),
                is_active     = COALESCE(?7, is_active)
             WHERE id = ?8",
            rusqlite::params![
                changes.name,
                changes.sheet_id,
                changes.sheet_name,
                changes.tab_name,
                changes.local_path,
                changes.sync_interval,
                changes.is_active,
                id.as_str(),
            ],
        )?;
        if n == 0 {
            return Ok(None);
        }
        debug!(config_id = %id, "sync configuration updated");
        Self::fetch(&conn, id)
    }

    fn delete(&self, id: &SyncConfigId) -> Result<Option<SyncConfig>> {
        let conn = self.conn()?;
        let Some(existing) = Self::fetch(&conn, id)? else {
            return Ok(None);
        };
        conn.execute("DELETE FROM sync_configs WHERE id = ?1", [id.as_str()])?;
        info!(config_id = %id, "sync configuration deleted");
        Ok(Some(existing))
    }

    fn mark_pending(&self, id: &SyncConfigId) -> Result<Option<SyncConfig>> {
        let conn = self.conn()?;
        let n = conn.execute(
            "UPDATE sync_configs SET last_sync_status = ?1 WHERE id = ?2",
            rusqlite::params![SyncStatus::Pending.to_string(), id.as_str()],
        )?;
        if n == 0 {
            return Ok(None);
        }
        Self::fetch(&conn, id)
    }

    fn record_outcome(
        &self,
        id: &SyncConfigId,
        outcome: &SyncOutcome,
    ) -> Result<Option<SyncConfig>> {
        let conn = self.conn()?;
        let n = conn.execute(
            "UPDATE sync_configs
             SET last_sync_time = ?1, last_sync_status = ?2, last_sync_error = ?3
             WHERE id = ?4",
            rusqlite::params![
                outcome.finished_at.to_rfc3339(),
                outcome.status.to_string(),
                outcome.error,
                id.as_str(),
            ],
        )?;
        if n == 0 {
            return Ok(None);
        }
        Self::fetch(&conn, id)
    }
}
