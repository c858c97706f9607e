use std::path::Path;
use std::sync::Arc;

use chrono::Utc;
use synchron_core::{Credential, SyncConfig, SyncOutcome, SyncResult};
use synchron_sheets::SheetSource;
use synchron_store::{CredentialProvider, SyncConfigStore};
use tracing::{debug, error, info, warn};

use crate::error::SyncError;
use crate::pipeline::{write_table, Table};

/// Runs one sync attempt end to end. Shared by scheduled firings and
/// on-demand triggers.
pub struct SyncExecutor {
    store: Arc<dyn SyncConfigStore>,
    credentials: Arc<dyn CredentialProvider>,
    source: Arc<dyn SheetSource>,
}

impl SyncExecutor {
    pub fn new(
        store: Arc<dyn SyncConfigStore>,
        credentials: Arc<dyn CredentialProvider>,
        source: Arc<dyn SheetSource>,
    ) -> Self {
        Self {
            store,
            credentials,
            source,
        }
    }

    pub fn source(&self) -> &Arc<dyn SheetSource> {
        &self.source
    }

    /// Fetch, transform and write `config`, then record the outcome.
    ///
    /// Never returns an error: every failure becomes a failed [`SyncResult`]
    /// and a `failed` status on the stored configuration.
    pub async fn execute(&self, config: SyncConfig, credential: &Credential) -> SyncResult {
        if let Err(e) = self.store.mark_pending(&config.id) {
            let e = SyncError::StatusPersist(e);
            warn!(config_id = %config.id, code = e.code(), error = %e, "could not mark sync pending");
        }

        let attempt = self.run_pipeline(&config, credential).await;
        self.finish(config, attempt)
    }

    /// Resolve the owner's credential, then [`execute`](Self::execute).
    pub async fn execute_for_owner(&self, config: SyncConfig) -> SyncResult {
        match self.credentials.credential_for(&config.owner_id) {
            Ok(Some(credential)) => self.execute(config, &credential).await,
            Ok(None) => {
                let e = SyncError::owner_not_found(&config.owner_id);
                self.finish(config, Err(e))
            }
            Err(e) => self.finish(config, Err(SyncError::CredentialLookup(e))),
        }
    }

    async fn run_pipeline(
        &self,
        config: &SyncConfig,
        credential: &Credential,
    ) -> Result<usize, SyncError> {
        debug!(
            config_id = %config.id,
            source = self.source.name(),
            sheet_id = %config.sheet_id,
            tab = %config.tab_name,
            "fetching range"
        );
        let rows = self
            .source
            .fetch_range(credential, &config.sheet_id, &config.tab_name)
            .await
            .map_err(|source| SyncError::SourceFetch {
                source_name: self.source.name().to_string(),
                sheet_id: config.sheet_id.clone(),
                tab_name: config.tab_name.clone(),
                source,
            })?;

        let table = Table::from_rows(rows)?;
        write_table(Path::new(&config.local_path), &table).await?;
        Ok(table.records.len())
    }

    fn finish(&self, mut config: SyncConfig, attempt: Result<usize, SyncError>) -> SyncResult {
        let now = Utc::now();
        let outcome = match &attempt {
            Ok(records) => {
                info!(
                    config_id = %config.id,
                    name = %config.name,
                    records,
                    path = %config.local_path,
                    "sync completed"
                );
                SyncOutcome::success(now)
            }
            Err(e) => {
                error!(config_id = %config.id, name = %config.name, code = e.code(), error = %e, "sync failed");
                SyncOutcome::failure(now, e.to_string())
            }
        };

        config.apply_outcome(&outcome);
        match self.store.record_outcome(&config.id, &outcome) {
            Ok(Some(stored)) => config = stored,
            Ok(None) => {
                warn!(config_id = %config.id, "configuration vanished before status could be recorded")
            }
            Err(e) => {
                let e = SyncError::StatusPersist(e);
                warn!(config_id = %config.id, code = e.code(), error = %e, "could not record sync outcome");
            }
        }

        match attempt {
            Ok(_) => SyncResult::succeeded(config),
            Err(e) => SyncResult::failed(config, e.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::Ordering;

    use synchron_core::SyncStatus;
    use synchron_store::SqliteCredentialStore;

    use super::*;
    use crate::testing::{credentials_with_owner, new_config, FakeSource, FlakyStore};

    struct Harness {
        store: Arc<FlakyStore>,
        source: Arc<FakeSource>,
        executor: SyncExecutor,
        dir: tempfile::TempDir,
    }

    fn harness(source: FakeSource) -> Harness {
        let store = Arc::new(FlakyStore::new());
        let source = Arc::new(source);
        let executor = SyncExecutor::new(store.clone(), credentials_with_owner(), source.clone());
        Harness {
            store,
            source,
            executor,
            dir: tempfile::tempdir().unwrap(),
        }
    }

    impl Harness {
        fn config(&self, file: &str) -> SyncConfig {
            let path = self.dir.path().join(file);
            self.store
                .insert(new_config(path.to_str().unwrap(), 15))
                .unwrap()
        }
    }

    #[tokio::test]
    async fn success_writes_csv_and_records_status() {
        let h = harness(FakeSource::with_rows(&[&["sku", "qty"], &["A-1", "3"], &["B-2", "7"]]));
        let config = h.config("out/stock.csv");

        let result = h.executor.execute_for_owner(config.clone()).await;
        assert!(result.success, "{:?}", result.error);
        assert_eq!(result.message, "Sync completed successfully");
        assert_eq!(result.config.last_sync_status, Some(SyncStatus::Success));
        assert!(result.config.last_sync_error.is_none());

        let content = std::fs::read_to_string(&config.local_path).unwrap();
        assert_eq!(content, "sku,qty\nA-1,3\nB-2,7\n");

        let stored = h.store.get(&config.id).unwrap().unwrap();
        assert_eq!(stored.last_sync_status, Some(SyncStatus::Success));
        assert!(stored.last_sync_time.is_some());
    }

    #[tokio::test]
    async fn header_only_sheet_fails_without_creating_file() {
        let h = harness(FakeSource::with_rows(&[&["sku", "qty"]]));
        let config = h.config("stock.csv");

        let result = h.executor.execute_for_owner(config.clone()).await;
        assert!(!result.success);
        assert!(result.error.as_deref().unwrap().contains("empty dataset"));
        assert!(!Path::new(&config.local_path).exists());

        let stored = h.store.get(&config.id).unwrap().unwrap();
        assert_eq!(stored.last_sync_status, Some(SyncStatus::Failed));
        assert!(stored.last_sync_error.unwrap().contains("empty dataset"));
    }

    #[tokio::test]
    async fn empty_dataset_leaves_previous_file_untouched() {
        let h = harness(FakeSource::with_rows(&[&["k"], &["v"]]));
        let config = h.config("stock.csv");
        assert!(h.executor.execute_for_owner(config.clone()).await.success);

        h.source.set_rows(&[]);
        let result = h.executor.execute_for_owner(config.clone()).await;
        assert!(!result.success);
        assert_eq!(std::fs::read_to_string(&config.local_path).unwrap(), "k\nv\n");
    }

    #[tokio::test]
    async fn ragged_rows_are_padded_in_the_file() {
        let h = harness(FakeSource::with_rows(&[&["a", "b", "c"], &["1"], &["1", "2", "3", "4"]]));
        let config = h.config("ragged.csv");
        assert!(h.executor.execute_for_owner(config.clone()).await.success);

        let mut reader = csv::Reader::from_path(&config.local_path).unwrap();
        let records: Vec<csv::StringRecord> = reader.records().map(|r| r.unwrap()).collect();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].iter().collect::<Vec<_>>(), vec!["1", "", ""]);
        assert_eq!(records[1].iter().collect::<Vec<_>>(), vec!["1", "2", "3"]);
    }

    #[tokio::test]
    async fn later_success_clears_previous_error() {
        let h = harness(FakeSource::with_rows(&[&["k"]]));
        let config = h.config("stock.csv");
        let failed = h.executor.execute_for_owner(config.clone()).await;
        assert!(failed.config.last_sync_error.is_some());

        h.source.set_rows(&[&["k"], &["v"]]);
        let ok = h.executor.execute_for_owner(config.clone()).await;
        assert!(ok.success);
        assert!(ok.config.last_sync_error.is_none());
        let stored = h.store.get(&config.id).unwrap().unwrap();
        assert!(stored.last_sync_error.is_none());
    }

    #[tokio::test]
    async fn source_failure_is_recorded() {
        let h = harness(FakeSource::failing("token expired"));
        let config = h.config("stock.csv");

        let result = h.executor.execute_for_owner(config.clone()).await;
        assert!(!result.success);
        let message = result.error.unwrap();
        assert!(message.contains("token expired"), "{message}");
        assert!(message.contains("sheet-1"), "{message}");
        assert!(message.starts_with("fake failed to fetch"), "{message}");

        let stored = h.store.get(&config.id).unwrap().unwrap();
        assert_eq!(stored.last_sync_status, Some(SyncStatus::Failed));
    }

    #[tokio::test]
    async fn unwritable_destination_is_recorded() {
        let h = harness(FakeSource::with_rows(&[&["k"], &["v"]]));
        let blocker = h.dir.path().join("blocker");
        std::fs::write(&blocker, "file, not a directory").unwrap();
        let config = h
            .store
            .insert(new_config(blocker.join("out.csv").to_str().unwrap(), 15))
            .unwrap();

        let result = h.executor.execute_for_owner(config.clone()).await;
        assert!(!result.success);
        assert!(result.error.unwrap().contains("not writable"));
        let stored = h.store.get(&config.id).unwrap().unwrap();
        assert_eq!(stored.last_sync_status, Some(SyncStatus::Failed));
    }

    #[tokio::test]
    async fn status_persist_failure_does_not_flip_success() {
        let h = harness(FakeSource::with_rows(&[&["k"], &["v"]]));
        let config = h.config("stock.csv");
        h.store.fail_status_writes.store(true, Ordering::SeqCst);

        let result = h.executor.execute_for_owner(config.clone()).await;
        assert!(result.success);
        assert_eq!(result.config.last_sync_status, Some(SyncStatus::Success));
        assert!(Path::new(&config.local_path).exists());

        let stored = h.store.get(&config.id).unwrap().unwrap();
        assert!(stored.last_sync_status.is_none());
    }

    #[tokio::test]
    async fn unknown_owner_is_a_failed_run() {
        let store = Arc::new(FlakyStore::new());
        let source = Arc::new(FakeSource::with_rows(&[&["k"], &["v"]]));
        let empty = Arc::new(SqliteCredentialStore::open_in_memory().unwrap());
        let executor = SyncExecutor::new(store.clone(), empty, source.clone());
        let dir = tempfile::tempdir().unwrap();
        let config = store
            .insert(new_config(dir.path().join("x.csv").to_str().unwrap(), 15))
            .unwrap();

        let result = executor.execute_for_owner(config.clone()).await;
        assert!(!result.success);
        assert!(result.error.unwrap().contains("owner not found"));
        assert_eq!(source.fetch_count(), 0);
        let stored = store.get(&config.id).unwrap().unwrap();
        assert_eq!(stored.last_sync_status, Some(SyncStatus::Failed));
    }

    #[tokio::test]
    async fn repeated_runs_produce_identical_files() {
        let h = harness(FakeSource::with_rows(&[&["name", "note"], &["Ada", "a, b"], &["Bo", "\"q\""]]));
        let config = h.config("stable.csv");

        h.executor.execute_for_owner(config.clone()).await;
        let first = std::fs::read(&config.local_path).unwrap();
        h.executor.execute_for_owner(config.clone()).await;
        let second = std::fs::read(&config.local_path).unwrap();
        assert_eq!(first, second);
        assert_eq!(h.source.fetch_count(), 2);
    }
}
