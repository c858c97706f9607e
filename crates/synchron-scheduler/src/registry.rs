use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};

use chrono::{DateTime, Utc};
use synchron_core::{SyncConfig, SyncConfigId};
use tokio::sync::mpsc::{self, error::TrySendError};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::schedule::Trigger;

/// Emitted by a timer when its trigger fires.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncTask {
    pub config_id: SyncConfigId,
    /// Install generation of the timer that emitted this task.
    pub generation: u64,
    pub scheduled_for: DateTime<Utc>,
}

struct TimerEntry {
    generation: u64,
    trigger: Trigger,
    handle: JoinHandle<()>,
}

/// Owns every live timer, keyed by configuration id.
///
/// At most one timer exists per id. Installing or cancelling takes the map
/// lock, so a timer is aborted and removed in one step.
pub struct JobRegistry {
    timers: Mutex<HashMap<SyncConfigId, TimerEntry>>,
    next_generation: AtomicU64,
    tasks: mpsc::Sender<SyncTask>,
}

impl JobRegistry {
    pub fn new(tasks: mpsc::Sender<SyncTask>) -> Self {
        Self {
            timers: Mutex::new(HashMap::new()),
            next_generation: AtomicU64::new(1),
            tasks,
        }
    }

    fn timers(&self) -> MutexGuard<'_, HashMap<SyncConfigId, TimerEntry>> {
        self.timers.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Replace any timer for `config` with one matching its current interval.
    ///
    /// Returns `true` when a timer is live afterwards; inactive configurations
    /// end up with none.
    pub fn install(&self, config: &SyncConfig) -> bool {
        self.install_anchored(config, Utc::now())
    }

    /// Like [`install`](Self::install) with an explicit wall-clock anchor.
    /// The timer measures elapsed time on the tokio clock from this call.
    pub(crate) fn install_anchored(&self, config: &SyncConfig, anchor: DateTime<Utc>) -> bool {
        let mut timers = self.timers();
        if let Some(old) = timers.remove(&config.id) {
            old.handle.abort();
            debug!(config_id = %config.id, generation = old.generation, "previous timer replaced");
        }

        if !config.is_active {
            info!(config_id = %config.id, name = %config.name, "configuration inactive, not scheduled");
            return false;
        }

        let trigger = Trigger::from_interval(config.sync_interval);
        let generation = self.next_generation.fetch_add(1, Ordering::Relaxed);
        let handle = tokio::spawn(run_timer(
            config.id.clone(),
            generation,
            trigger,
            anchor,
            Instant::now(),
            self.tasks.clone(),
        ));

        info!(
            config_id = %config.id,
            name = %config.name,
            interval = config.sync_interval,
            cron = %trigger.cron_expression(),
            generation,
            "sync scheduled"
        );
        timers.insert(
            config.id.clone(),
            TimerEntry {
                generation,
                trigger,
                handle,
            },
        );
        true
    }

    /// Stop the timer for `id`. Unknown ids are a no-op returning `false`.
    pub fn cancel(&self, id: &SyncConfigId) -> bool {
        match self.timers().remove(id) {
            Some(entry) => {
                entry.handle.abort();
                info!(config_id = %id, generation = entry.generation, "sync unscheduled");
                true
            }
            None => false,
        }
    }

    /// Whether a task tagged `generation` came from the timer currently live for `id`.
    pub fn is_current(&self, id: &SyncConfigId, generation: u64) -> bool {
        self.timers()
            .get(id)
            .is_some_and(|entry| entry.generation == generation)
    }

    pub fn is_scheduled(&self, id: &SyncConfigId) -> bool {
        self.timers().contains_key(id)
    }

    pub fn live_count(&self) -> usize {
        self.timers().len()
    }

    pub fn trigger_for(&self, id: &SyncConfigId) -> Option<Trigger> {
        self.timers().get(id).map(|entry| entry.trigger)
    }

    pub fn generation_of(&self, id: &SyncConfigId) -> Option<u64> {
        self.timers().get(id).map(|entry| entry.generation)
    }

    pub fn scheduled_ids(&self) -> Vec<SyncConfigId> {
        self.timers().keys().cloned().collect()
    }

    /// Abort every timer.
    pub fn shutdown(&self) {
        let mut timers = self.timers();
        let count = timers.len();
        for (_, entry) in timers.drain() {
            entry.handle.abort();
        }
        if count > 0 {
            info!(count, "all sync timers stopped");
        }
    }
}

impl Drop for JobRegistry {
    fn drop(&mut self) {
        self.shutdown();
    }
}

/// Timer body. Sleeps until each trigger instant and enqueues a task; never
/// does I/O. Firings missed while the process was descheduled are coalesced
/// into the next one.
async fn run_timer(
    config_id: SyncConfigId,
    generation: u64,
    trigger: Trigger,
    anchor: DateTime<Utc>,
    origin: Instant,
    tasks: mpsc::Sender<SyncTask>,
) {
    let mut cursor = anchor;
    loop {
        let elapsed = chrono::Duration::from_std(origin.elapsed())
            .unwrap_or_else(|_| chrono::Duration::zero());
        let next = trigger.next_after(cursor.max(anchor + elapsed));
        let wait = (next - anchor).to_std().unwrap_or_default();
        tokio::time::sleep_until(origin + wait).await;
        cursor = next;

        let task = SyncTask {
            config_id: config_id.clone(),
            generation,
            scheduled_for: next,
        };
        match tasks.try_send(task) {
            Ok(()) => debug!(config_id = %config_id, generation, at = %next, "sync queued"),
            Err(TrySendError::Full(_)) => {
                warn!(config_id = %config_id, at = %next, "dispatch queue full, firing skipped")
            }
            Err(TrySendError::Closed(_)) => {
                debug!(config_id = %config_id, "dispatch queue closed, timer exiting");
                break;
            }
        }
    }
}
