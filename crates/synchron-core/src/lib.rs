//! Shared types, configuration and errors for every synchron crate.

pub mod config;
pub mod error;
pub mod types;

pub use error::{Result, SynchronError};
pub use types::{
    Credential, NewSyncConfig, OwnerId, SyncConfig, SyncConfigId, SyncConfigUpdate, SyncOutcome,
    SyncResult, SyncStatus, MIN_SYNC_INTERVAL_MINUTES,
};
