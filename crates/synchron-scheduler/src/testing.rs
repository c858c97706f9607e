//! Fakes shared by the unit tests in this crate.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use synchron_core::{
    Credential, NewSyncConfig, OwnerId, SyncConfig, SyncConfigId, SyncConfigUpdate, SyncOutcome,
};
use synchron_sheets::{Rows, SheetSource, SourceError, SourceInfo, TabInfo};
use synchron_store::{SqliteCredentialStore, SqliteSyncConfigStore, StoreError, SyncConfigStore};
use tokio::sync::Semaphore;

pub const OWNER: &str = "owner-1";

/// Scripted remote source. Optionally blocks `fetch_range` until released.
pub struct FakeSource {
    rows: Mutex<Result<Rows, String>>,
    pub fetches: AtomicUsize,
    gate: Option<Arc<Semaphore>>,
    gated_sheet: Option<String>,
}

impl FakeSource {
    pub fn with_rows(rows: &[&[&str]]) -> Self {
        Self {
            rows: Mutex::new(Ok(to_rows(rows))),
            fetches: AtomicUsize::new(0),
            gate: None,
            gated_sheet: None,
        }
    }

    pub fn failing(message: &str) -> Self {
        Self {
            rows: Mutex::new(Err(message.to_string())),
            fetches: AtomicUsize::new(0),
            gate: None,
            gated_sheet: None,
        }
    }

    /// Every fetch waits for a permit on `gate`.
    pub fn gated(mut self, gate: Arc<Semaphore>) -> Self {
        self.gate = Some(gate);
        self
    }

    /// Restrict the gate to fetches of `sheet_id`.
    pub fn only_for(mut self, sheet_id: &str) -> Self {
        self.gated_sheet = Some(sheet_id.to_string());
        self
    }

    pub fn set_rows(&self, rows: &[&[&str]]) {
        *self.rows.lock().unwrap() = Ok(to_rows(rows));
    }

    pub fn fetch_count(&self) -> usize {
        self.fetches.load(Ordering::SeqCst)
    }
}

pub fn to_rows(rows: &[&[&str]]) -> Rows {
    rows.iter()
        .map(|r| r.iter().map(|c| c.to_string()).collect())
        .collect()
}

#[async_trait]
impl SheetSource for FakeSource {
    fn name(&self) -> &str {
        "fake"
    }

    async fn list_sources(&self, _credential: &Credential) -> Result<Vec<SourceInfo>, SourceError> {
        Ok(vec![SourceInfo {
            id: "sheet-1".into(),
            name: "Inventory".into(),
        }])
    }

    async fn list_tabs(
        &self,
        _credential: &Credential,
        sheet_id: &str,
    ) -> Result<Vec<TabInfo>, SourceError> {
        if sheet_id != "sheet-1" {
            return Err(SourceError::NotFound(sheet_id.to_string()));
        }
        Ok(vec![TabInfo {
            id: 0,
            name: "Stock".into(),
        }])
    }

    async fn fetch_range(
        &self,
        _credential: &Credential,
        sheet_id: &str,
        _tab_name: &str,
    ) -> Result<Rows, SourceError> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        let waits = self
            .gated_sheet
            .as_deref()
            .map_or(true, |gated| gated == sheet_id);
        if let (Some(gate), true) = (&self.gate, waits) {
            let permit = gate.acquire().await.expect("gate closed");
            permit.forget();
        }
        self.rows
            .lock()
            .unwrap()
            .clone()
            .map_err(SourceError::Unauthorized)
    }
}

/// Wraps the SQLite store and can be told to fail specific calls.
pub struct FlakyStore {
    inner: SqliteSyncConfigStore,
    pub fail_status_writes: AtomicBool,
    pub fail_list_active: AtomicBool,
}

impl FlakyStore {
    pub fn new() -> Self {
        Self {
            inner: SqliteSyncConfigStore::open_in_memory().unwrap(),
            fail_status_writes: AtomicBool::new(false),
            fail_list_active: AtomicBool::new(false),
        }
    }

    fn injected() -> StoreError {
        StoreError::LockPoisoned
    }
}

impl SyncConfigStore for FlakyStore {
    fn insert(&self, new: NewSyncConfig) -> synchron_store::Result<SyncConfig> {
        self.inner.insert(new)
    }
    fn get(&self, id: &SyncConfigId) -> synchron_store::Result<Option<SyncConfig>> {
        self.inner.get(id)
    }
    fn list_by_owner(&self, owner: &OwnerId) -> synchron_store::Result<Vec<SyncConfig>> {
        self.inner.list_by_owner(owner)
    }
    fn list_active(&self) -> synchron_store::Result<Vec<SyncConfig>> {
        if self.fail_list_active.load(Ordering::SeqCst) {
            return Err(Self::injected());
        }
        self.inner.list_active()
    }
    fn list_all(&self) -> synchron_store::Result<Vec<SyncConfig>> {
        self.inner.list_all()
    }
    fn update(
        &self,
        id: &SyncConfigId,
        changes: &SyncConfigUpdate,
    ) -> synchron_store::Result<Option<SyncConfig>> {
        self.inner.update(id, changes)
    }
    fn delete(&self, id: &SyncConfigId) -> synchron_store::Result<Option<SyncConfig>> {
        self.inner.delete(id)
    }
    fn mark_pending(&self, id: &SyncConfigId) -> synchron_store::Result<Option<SyncConfig>> {
        if self.fail_status_writes.load(Ordering::SeqCst) {
            return Err(Self::injected());
        }
        self.inner.mark_pending(id)
    }
    fn record_outcome(
        &self,
        id: &SyncConfigId,
        outcome: &SyncOutcome,
    ) -> synchron_store::Result<Option<SyncConfig>> {
        if self.fail_status_writes.load(Ordering::SeqCst) {
            return Err(Self::injected());
        }
        self.inner.record_outcome(id, outcome)
    }
}

pub fn credentials_with_owner() -> Arc<SqliteCredentialStore> {
    let creds = SqliteCredentialStore::open_in_memory().unwrap();
    creds
        .upsert_owner(
            &OWNER.into(),
            Some("owner@example.com"),
            &Credential::new("access", Some("refresh".into())),
        )
        .unwrap();
    Arc::new(creds)
}

pub fn new_config(local_path: &str, interval: u32) -> NewSyncConfig {
    NewSyncConfig {
        owner_id: OWNER.into(),
        name: "Inventory".to_string(),
        sheet_id: "sheet-1".to_string(),
        sheet_name: "Inventory 2026".to_string(),
        tab_name: "Stock".to_string(),
        local_path: local_path.to_string(),
        sync_interval: interval,
        is_active: true,
    }
}
