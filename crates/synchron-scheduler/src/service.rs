use std::collections::HashSet;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use synchron_core::config::SchedulerConfig;
use synchron_core::{
    Credential, NewSyncConfig, OwnerId, SyncConfig, SyncConfigId, SyncConfigUpdate, SyncResult,
};
use synchron_sheets::{Rows, SheetSource, SourceInfo, TabInfo};
use synchron_store::{CredentialProvider, SyncConfigStore};
use tokio::sync::{mpsc, watch};
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info};

use crate::dispatch::Dispatcher;
use crate::error::{Result, ServiceError};
use crate::executor::SyncExecutor;
use crate::registry::JobRegistry;
use crate::schedule::Trigger;

/// Wire a service and its dispatcher around one task queue.
///
/// The caller spawns [`Dispatcher::run`]; until then timer firings wait in
/// the queue (and are skipped once it is full).
pub fn build(
    store: Arc<dyn SyncConfigStore>,
    credentials: Arc<dyn CredentialProvider>,
    source: Arc<dyn SheetSource>,
    config: &SchedulerConfig,
) -> (SyncService, Dispatcher) {
    let (tx, rx) = mpsc::channel(config.dispatch_capacity.max(1));
    let registry = Arc::new(JobRegistry::new(tx));
    let executor = Arc::new(SyncExecutor::new(
        store.clone(),
        credentials.clone(),
        source,
    ));
    let dispatcher = Dispatcher::new(
        rx,
        registry.clone(),
        store.clone(),
        executor.clone(),
        config.skip_if_running,
    );
    let service = SyncService {
        store,
        credentials,
        registry,
        executor,
        mutations: Mutex::new(()),
        reconcile_every: (config.reconcile_secs > 0)
            .then(|| Duration::from_secs(config.reconcile_secs)),
    };
    (service, dispatcher)
}

/// Caller-facing operations. The only component that installs or cancels timers.
pub struct SyncService {
    store: Arc<dyn SyncConfigStore>,
    credentials: Arc<dyn CredentialProvider>,
    registry: Arc<JobRegistry>,
    executor: Arc<SyncExecutor>,
    /// Held across every store write that is followed by a timer change.
    mutations: Mutex<()>,
    reconcile_every: Option<Duration>,
}

impl SyncService {
    fn mutation(&self) -> MutexGuard<'_, ()> {
        self.mutations.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Install a timer for every active configuration. Never fails: a store
    /// error is logged and nothing is scheduled.
    pub fn initialize(&self) -> usize {
        let configs = match self.store.list_active() {
            Ok(configs) => configs,
            Err(e) => {
                error!(error = %e, "could not load active configurations, nothing scheduled");
                return 0;
            }
        };

        let scheduled = configs
            .iter()
            .filter(|config| self.registry.install(config))
            .count();
        info!(scheduled, "scheduler initialized");
        scheduled
    }

    /// Persist, schedule, then run once immediately.
    pub async fn create_and_schedule(&self, new: NewSyncConfig) -> Result<SyncResult> {
        new.validate()?;
        let config = {
            let _guard = self.mutation();
            let config = self.store.insert(new)?;
            self.registry.install(&config);
            config
        };
        info!(config_id = %config.id, name = %config.name, owner = %config.owner_id, "configuration created");
        Ok(self.executor.execute_for_owner(config).await)
    }

    /// Apply `changes` and replace the timer to match the result.
    pub fn update_and_reschedule(
        &self,
        id: &SyncConfigId,
        changes: SyncConfigUpdate,
    ) -> Result<SyncConfig> {
        changes.validate()?;
        let _guard = self.mutation();
        let updated = self
            .store
            .update(id, &changes)?
            .ok_or_else(|| ServiceError::NotFound { id: id.clone() })?;

        self.registry.install(&updated);
        info!(config_id = %id, active = updated.is_active, interval = updated.sync_interval, "configuration updated");
        Ok(updated)
    }

    /// Cancel the timer, then remove the configuration.
    pub fn delete_and_unschedule(&self, id: &SyncConfigId) -> Result<()> {
        let _guard = self.mutation();
        self.registry.cancel(id);
        self.store
            .delete(id)?
            .ok_or_else(|| ServiceError::NotFound { id: id.clone() })?;
        info!(config_id = %id, "configuration deleted");
        Ok(())
    }

    /// Run one sync now. The timer, if any, is left alone.
    pub async fn trigger_now(&self, id: &SyncConfigId) -> Result<SyncResult> {
        let config = self.require(id)?;
        info!(config_id = %id, "manual sync triggered");
        Ok(self.executor.execute_for_owner(config).await)
    }

    pub fn get_config(&self, id: &SyncConfigId) -> Result<SyncConfig> {
        self.require(id)
    }

    pub fn list_configs(&self, owner: &OwnerId) -> Result<Vec<SyncConfig>> {
        Ok(self.store.list_by_owner(owner)?)
    }

    pub fn list_all_configs(&self) -> Result<Vec<SyncConfig>> {
        Ok(self.store.list_all()?)
    }

    pub async fn list_sources(&self, owner: &OwnerId) -> Result<Vec<SourceInfo>> {
        let credential = self.credential(owner)?;
        Ok(self.executor.source().list_sources(&credential).await?)
    }

    pub async fn list_tabs(&self, owner: &OwnerId, sheet_id: &str) -> Result<Vec<TabInfo>> {
        let credential = self.credential(owner)?;
        Ok(self.executor.source().list_tabs(&credential, sheet_id).await?)
    }

    /// Raw rows of a tab, header row first. Nothing is written.
    pub async fn preview(&self, owner: &OwnerId, sheet_id: &str, tab_name: &str) -> Result<Rows> {
        let credential = self.credential(owner)?;
        Ok(self
            .executor
            .source()
            .fetch_range(&credential, sheet_id, tab_name)
            .await?)
    }

    /// Bring the timers in line with the store.
    ///
    /// Configurations written by another process (or directly to the store)
    /// get a timer when active, lose it when inactive or deleted, and are
    /// reinstalled when their interval maps to a different trigger. Returns
    /// how many timers were installed, replaced or cancelled.
    pub fn reconcile(&self) -> Result<usize> {
        let _guard = self.mutation();
        let configs = self.store.list_all()?;

        let mut changed = 0;
        let mut known = HashSet::with_capacity(configs.len());
        for config in &configs {
            known.insert(config.id.clone());
            let wanted = config
                .is_active
                .then(|| Trigger::from_interval(config.sync_interval));
            if self.registry.trigger_for(&config.id) != wanted {
                self.registry.install(config);
                changed += 1;
            }
        }
        for id in self.registry.scheduled_ids() {
            if !known.contains(&id) && self.registry.cancel(&id) {
                changed += 1;
            }
        }

        if changed > 0 {
            info!(changed, "timers reconciled with store");
        } else {
            debug!("timers already match store");
        }
        Ok(changed)
    }

    /// Call [`reconcile`](Self::reconcile) every `scheduler.reconcile_secs`
    /// until `shutdown` flips to `true`. Returns at once when disabled.
    pub async fn watch_store(&self, mut shutdown: watch::Receiver<bool>) {
        let Some(every) = self.reconcile_every else {
            info!("store reconciliation disabled");
            return;
        };

        let mut ticker = tokio::time::interval(every);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        ticker.tick().await;
        info!(every_secs = every.as_secs(), "watching store for configuration changes");
        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    if let Err(e) = self.reconcile() {
                        error!(code = e.code(), error = %e, "reconcile failed");
                    }
                }
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        info!("store watcher shutting down");
                        break;
                    }
                }
            }
        }
    }

    pub fn registry(&self) -> &Arc<JobRegistry> {
        &self.registry
    }

    pub fn shutdown(&self) {
        self.registry.shutdown();
    }

    fn require(&self, id: &SyncConfigId) -> Result<SyncConfig> {
        self.store
            .get(id)?
            .ok_or_else(|| ServiceError::NotFound { id: id.clone() })
    }

    fn credential(&self, owner: &OwnerId) -> Result<Credential> {
        self.credentials
            .credential_for(owner)?
            .ok_or_else(|| ServiceError::OwnerNotFound { id: owner.clone() })
    }
}
