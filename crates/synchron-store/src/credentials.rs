use std::sync::{Mutex, MutexGuard};

use chrono::{DateTime, Utc};
use rusqlite::{Connection, OptionalExtension};
use synchron_core::{Credential, OwnerId};
use tracing::info;

use crate::db::{init_db, parse_timestamp};
use crate::error::{Result, StoreError};

/// Resolves an owner to the credential used for their remote fetches.
///
/// `Ok(None)` means the owner is unknown. Expiry and refresh are the
/// implementor's concern.
pub trait CredentialProvider: Send + Sync {
    fn credential_for(&self, owner: &OwnerId) -> Result<Option<Credential>>;
}

/// Local record of a principal and the tokens deposited for them.
#[derive(Debug, Clone)]
pub struct Owner {
    pub id: OwnerId,
    pub email: Option<String>,
    pub credential: Credential,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// SQLite-backed `owners` table.
pub struct SqliteCredentialStore {
    conn: Mutex<Connection>,
}

impl SqliteCredentialStore {
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

    /// Create the owner or replace its tokens (and email, when given).
    pub fn upsert_owner(
        &self,
        id: &OwnerId,
        email: Option<&str>,
        credential: &Credential,
    ) -> Result<()> {
        let conn = self.conn()?;
        let now = Utc::now().to_rfc3339();
        conn.execute(
            "INSERT INTO owners (id, email, access_token, refresh_token, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?5)
             ON CONFLICT(id) DO UPDATE SET
                email         = COALESCE(excluded.email, owners.email),
                access_token  = excluded.access_token,
                refresh_token = COALESCE(excluded.refresh_token, owners.refresh_token),
                updated_at    = excluded.updated_at",
            rusqlite::params![
                id.as_str(),
                email,
                credential.access_token,
                credential.refresh_token,
                now
            ],
        )?;
        info!(owner_id = %id, "owner credentials stored");
        Ok(())
    }

    pub fn get_owner(&self, id: &OwnerId) -> Result<Option<Owner>> {
        let conn = self.conn()?;
        let row = conn
            .query_row(
                "SELECT id, email, access_token, refresh_token, created_at, updated_at
                 FROM owners WHERE id = ?1",
                [id.as_str()],
                |row| {
                    Ok((
                        row.get::<_, String>(0)?,
                        row.get::<_, Option<String>>(1)?,
                        row.get::<_, String>(2)?,
                        row.get::<_, Option<String>>(3)?,
                        row.get::<_, String>(4)?,
                        row.get::<_, String>(5)?,
                    ))
                },
            )
            .optional()?;

        row.map(|(id, email, access, refresh, created_at, updated_at)| -> Result<Owner> {
            Ok(Owner {
                id: OwnerId(id),
                email,
                credential: Credential::new(access, refresh),
                created_at: parse_timestamp("created_at", &created_at)?,
                updated_at: parse_timestamp("updated_at", &updated_at)?,
            })
        })
        .transpose()
    }

    /// Returns whether a row was removed.
    pub fn delete_owner(&self, id: &OwnerId) -> Result<bool> {
        let conn = self.conn()?;
        let n = conn.execute("DELETE FROM owners WHERE id = ?1", [id.as_str()])?;
        Ok(n > 0)
    }
}

impl CredentialProvider for SqliteCredentialStore {
    fn credential_for(&self, owner: &OwnerId) -> Result<Option<Credential>> {
        let conn = self.conn()?;
        let cred = conn
            .query_row(
                "SELECT access_token, refresh_token FROM owners WHERE id = ?1",
                [owner.as_str()],
                |row| Ok(Credential::new(row.get::<_, String>(0)?, row.get(1)?)),
            )
            .optional()?;
        Ok(cred)
    }
}
