use std::sync::Arc;

use dashmap::DashSet;
use synchron_core::{SyncConfigId, SyncResult};
use synchron_store::SyncConfigStore;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::error::SyncError;
use crate::executor::SyncExecutor;
use crate::registry::{JobRegistry, SyncTask};

/// Drains timer firings and runs each as its own tokio task.
pub struct Dispatcher {
    tasks: mpsc::Receiver<SyncTask>,
    registry: Arc<JobRegistry>,
    store: Arc<dyn SyncConfigStore>,
    executor: Arc<SyncExecutor>,
    in_flight: Arc<DashSet<SyncConfigId>>,
    skip_if_running: bool,
}

/// Clears the in-flight mark when a run ends, including on panic or abort.
struct InFlight {
    set: Arc<DashSet<SyncConfigId>>,
    id: SyncConfigId,
}

impl Drop for InFlight {
    fn drop(&mut self) {
        self.set.remove(&self.id);
    }
}

impl Dispatcher {
    pub fn new(
        tasks: mpsc::Receiver<SyncTask>,
        registry: Arc<JobRegistry>,
        store: Arc<dyn SyncConfigStore>,
        executor: Arc<SyncExecutor>,
        skip_if_running: bool,
    ) -> Self {
        Self {
            tasks,
            registry,
            store,
            executor,
            in_flight: Arc::new(DashSet::new()),
            skip_if_running,
        }
    }

    /// Run until `shutdown` flips to `true` or every sender is gone.
    /// Runs already spawned are left to finish.
    pub async fn run(mut self, mut shutdown: watch::Receiver<bool>) {
        info!(skip_if_running = self.skip_if_running, "dispatcher started");
        loop {
            tokio::select! {
                task = self.tasks.recv() => match task {
                    Some(task) => {
                        self.dispatch(task);
                    }
                    None => {
                        info!("dispatch queue closed");
                        break;
                    }
                },
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        info!("dispatcher shutting down");
                        break;
                    }
                }
            }
        }
    }

    /// Start a run for `task` unless it is stale or its configuration is busy.
    pub fn dispatch(&self, task: SyncTask) -> Option<JoinHandle<Option<SyncResult>>> {
        if !self.registry.is_current(&task.config_id, task.generation) {
            debug!(
                config_id = %task.config_id,
                generation = task.generation,
                "stale firing dropped"
            );
            return None;
        }

        let guard = if self.skip_if_running {
            if !self.in_flight.insert(task.config_id.clone()) {
                warn!(
                    config_id = %task.config_id,
                    at = %task.scheduled_for,
                    "previous run still in flight, firing skipped"
                );
                return None;
            }
            Some(InFlight {
                set: self.in_flight.clone(),
                id: task.config_id.clone(),
            })
        } else {
            None
        };

        let store = self.store.clone();
        let executor = self.executor.clone();
        Some(tokio::spawn(async move {
            let _guard = guard;
            run_fired(store.as_ref(), &executor, &task.config_id).await
        }))
    }
}

/// Body of one scheduled firing. Reads the latest persisted configuration.
async fn run_fired(
    store: &dyn SyncConfigStore,
    executor: &SyncExecutor,
    id: &SyncConfigId,
) -> Option<SyncResult> {
    let config = match store.get(id) {
        Ok(Some(config)) => config,
        Ok(None) => {
            let e = SyncError::ConfigurationNotFound {
                what: "sync configuration",
                id: id.to_string(),
            };
            warn!(config_id = %id, code = e.code(), "{e}");
            return None;
        }
        Err(e) => {
            error!(config_id = %id, error = %e, "could not load configuration for firing");
            return None;
        }
    };

    if !config.is_active {
        info!(config_id = %id, "configuration inactive, firing skipped");
        return None;
    }

    Some(executor.execute_for_owner(config).await)
}

#[cfg(test)]
mod tests {
    use chrono::Utc;
    use synchron_core::{SyncConfigUpdate, SyncStatus};
    use tokio::sync::Semaphore;

    use super::*;
    use crate::testing::{credentials_with_owner, new_config, FakeSource, FlakyStore};

    struct Harness {
        store: Arc<FlakyStore>,
        registry: Arc<JobRegistry>,
        dispatcher: Dispatcher,
        source: Arc<FakeSource>,
        dir: tempfile::TempDir,
    }

    fn harness(source: FakeSource, skip_if_running: bool) -> Harness {
        let (tx, rx) = mpsc::channel(16);
        let store = Arc::new(FlakyStore::new());
        let source = Arc::new(source);
        let registry = Arc::new(JobRegistry::new(tx));
        let executor = Arc::new(SyncExecutor::new(
            store.clone(),
            credentials_with_owner(),
            source.clone(),
        ));
        let dispatcher = Dispatcher::new(rx, registry.clone(), store.clone(), executor, skip_if_running);
        Harness {
            store,
            registry,
            dispatcher,
            source,
            dir: tempfile::tempdir().unwrap(),
        }
    }

    impl Harness {
        fn scheduled(&self) -> (synchron_core::SyncConfig, SyncTask) {
            self.scheduled_on("sheet-1", "out.csv")
        }

        fn scheduled_on(&self, sheet_id: &str, file: &str) -> (synchron_core::SyncConfig, SyncTask) {
            let path = self.dir.path().join(file);
            let mut new = new_config(path.to_str().unwrap(), 5);
            new.sheet_id = sheet_id.to_string();
            let config = self.store.insert(new).unwrap();
            self.registry.install(&config);
            let task = SyncTask {
                config_id: config.id.clone(),
                generation: self.registry.generation_of(&config.id).unwrap(),
                scheduled_for: Utc::now(),
            };
            (config, task)
        }
    }

    #[tokio::test]
    async fn current_firing_runs_a_sync() {
        let h = harness(FakeSource::with_rows(&[&["k"], &["v"]]), true);
        let (config, task) = h.scheduled();

        let result = h.dispatcher.dispatch(task).unwrap().await.unwrap().unwrap();
        assert!(result.success);
        assert!(std::path::Path::new(&config.local_path).exists());
    }

    #[tokio::test]
    async fn stale_generation_is_dropped() {
        let h = harness(FakeSource::with_rows(&[&["k"], &["v"]]), true);
        let (config, task) = h.scheduled();
        h.registry.install(&config);

        assert!(h.dispatcher.dispatch(task).is_none());
        assert_eq!(h.source.fetch_count(), 0);
    }

    #[tokio::test]
    async fn cancelled_timer_task_is_dropped() {
        let h = harness(FakeSource::with_rows(&[&["k"], &["v"]]), true);
        let (config, task) = h.scheduled();
        h.registry.cancel(&config.id);

        assert!(h.dispatcher.dispatch(task).is_none());
    }

    #[tokio::test]
    async fn deleted_configuration_is_a_no_op() {
        let h = harness(FakeSource::with_rows(&[&["k"], &["v"]]), true);
        let (config, task) = h.scheduled();
        h.store.delete(&config.id).unwrap();

        let outcome = h.dispatcher.dispatch(task).unwrap().await.unwrap();
        assert!(outcome.is_none());
        assert_eq!(h.source.fetch_count(), 0);
    }

    #[tokio::test]
    async fn busy_configuration_skips_the_firing() {
        let gate = Arc::new(Semaphore::new(0));
        let h = harness(FakeSource::with_rows(&[&["k"], &["v"]]).gated(gate.clone()), true);
        let (_config, task) = h.scheduled();

        let first = h.dispatcher.dispatch(task.clone()).unwrap();
        while h.source.fetch_count() == 0 {
            tokio::task::yield_now().await;
        }
        assert!(h.dispatcher.dispatch(task.clone()).is_none());

        gate.add_permits(1);
        assert!(first.await.unwrap().unwrap().success);

        gate.add_permits(1);
        let again = h.dispatcher.dispatch(task).unwrap();
        assert!(again.await.unwrap().unwrap().success);
    }

    #[tokio::test]
    async fn in_flight_run_completes_after_deactivation() {
        let gate = Arc::new(Semaphore::new(0));
        let h = harness(FakeSource::with_rows(&[&["k"], &["v"]]).gated(gate.clone()), true);
        let (config, task) = h.scheduled();

        let running = h.dispatcher.dispatch(task).unwrap();
        while h.source.fetch_count() == 0 {
            tokio::task::yield_now().await;
        }
        h.store.update(&config.id, &SyncConfigUpdate::deactivate()).unwrap();
        h.registry.cancel(&config.id);

        gate.add_permits(1);
        let result = running.await.unwrap().unwrap();
        assert!(result.success);
        let stored = h.store.get(&config.id).unwrap().unwrap();
        assert!(!stored.is_active);
        assert_eq!(stored.last_sync_status, Some(SyncStatus::Success));
    }

    #[tokio::test]
    async fn blocked_fetch_does_not_hold_up_other_configurations() {
        let gate = Arc::new(Semaphore::new(0));
        let source = FakeSource::with_rows(&[&["k"], &["v"]])
            .gated(gate.clone())
            .only_for("slow");
        let h = harness(source, true);
        let (_slow, slow_task) = h.scheduled_on("slow", "slow.csv");
        let (fast, fast_task) = h.scheduled_on("sheet-1", "fast.csv");

        let slow_run = h.dispatcher.dispatch(slow_task).unwrap();
        while h.source.fetch_count() == 0 {
            tokio::task::yield_now().await;
        }

        let fast_run = h.dispatcher.dispatch(fast_task).unwrap();
        let result = tokio::time::timeout(std::time::Duration::from_secs(5), fast_run)
            .await
            .expect("second configuration waited on the first")
            .unwrap()
            .unwrap();
        assert!(result.success);
        assert!(std::path::Path::new(&fast.local_path).exists());
        assert!(!slow_run.is_finished());

        gate.add_permits(1);
        assert!(slow_run.await.unwrap().unwrap().success);
    }

    #[tokio::test]
    async fn run_exits_on_shutdown_signal() {
        let h = harness(FakeSource::with_rows(&[&["k"], &["v"]]), true);
        let (tx, rx) = watch::channel(false);
        let handle = tokio::spawn(h.dispatcher.run(rx));
        tx.send(true).unwrap();
        handle.await.unwrap();
    }
}
