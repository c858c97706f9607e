//! `synchron-scheduler`: recurring spreadsheet-to-CSV sync engine.
//!
//! # Overview
//!
//! The [`registry::JobRegistry`] owns exactly one tokio timer per active
//! configuration. A timer never does I/O: when it fires it emits a
//! [`registry::SyncTask`] into an mpsc queue. The [`dispatch::Dispatcher`]
//! drains that queue, reloads the configuration and its owner's credential,
//! and hands both to the [`executor::SyncExecutor`], which fetches the tab,
//! rewrites the destination CSV and records the outcome on the configuration.
//!
//! # Cadence
//!
//! | Interval (minutes) | Trigger            | Cron equivalent |
//! |--------------------|--------------------|-----------------|
//! | `m < 60`           | `EveryMinutes(m)`  | `*/m * * * *`   |
//! | `m >= 60`          | `EveryHours(m/60)` | `0 */h * * *`   |
//!
//! [`service::SyncService`] is the entry point callers use; it is the only
//! component that asks the registry to install or cancel timers.

pub mod dispatch;
pub mod error;
pub mod executor;
pub mod pipeline;
pub mod registry;
pub mod schedule;
pub mod service;

#[cfg(test)]
mod testing;

pub use dispatch::Dispatcher;
pub use error::{ServiceError, SyncError};
pub use executor::SyncExecutor;
pub use registry::{JobRegistry, SyncTask};
pub use schedule::Trigger;
pub use service::{build, SyncService};
