//! `synchron-store`: SQLite persistence for sync configurations and owner
//! credentials.
//!
//! Both stores wrap their own `Connection` behind a `Mutex`, so the scheduler
//! and foreground callers can share one database file without contending on a
//! single handle.

pub mod configs;
pub mod credentials;
pub mod db;
pub mod error;

pub use configs::{SqliteSyncConfigStore, SyncConfigStore};
pub use credentials::{CredentialProvider, Owner, SqliteCredentialStore};
pub use error::{Result, StoreError};
