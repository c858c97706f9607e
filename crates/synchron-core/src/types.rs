use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

use crate::error::{Result, SynchronError};

/// Shortest cadence a configuration may request.
pub const MIN_SYNC_INTERVAL_MINUTES: u32 = 5;

/// Unique identifier for a sync configuration (UUIDv7, time-sortable in logs).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SyncConfigId(pub String);

impl SyncConfigId {
    pub fn new() -> Self {
        Self(Uuid::now_v7().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for SyncConfigId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for SyncConfigId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<String> for SyncConfigId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for SyncConfigId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// The principal whose credential authorizes a configuration's fetches.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OwnerId(pub String);

impl OwnerId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for OwnerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<String> for OwnerId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for OwnerId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// Outcome of the most recent sync attempt.
///
/// A configuration that never ran carries `None` instead of a status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncStatus {
    /// An attempt is in flight.
    Pending,
    Success,
    Failed,
}

impl fmt::Display for SyncStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            SyncStatus::Pending => "pending",
            SyncStatus::Success => "success",
            SyncStatus::Failed => "failed",
        };
        write!(f, "{s}")
    }
}

impl std::str::FromStr for SyncStatus {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "pending" => Ok(SyncStatus::Pending),
            "success" => Ok(SyncStatus::Success),
            "failed" => Ok(SyncStatus::Failed),
            other => Err(format!("unknown sync status: {other}")),
        }
    }
}

/// A persisted rule mapping one remote tab to one local file on a cadence.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SyncConfig {
    pub id: SyncConfigId,
    pub owner_id: OwnerId,
    /// Human-readable label.
    pub name: String,
    /// Remote spreadsheet identifier.
    pub sheet_id: String,
    /// Remote spreadsheet display name.
    pub sheet_name: String,
    /// Tab (or A1 range) to read.
    pub tab_name: String,
    /// Destination CSV file.
    pub local_path: String,
    /// Cadence in minutes, never below [`MIN_SYNC_INTERVAL_MINUTES`].
    pub sync_interval: u32,
    /// Only active configurations own a timer.
    pub is_active: bool,
    pub last_sync_time: Option<DateTime<Utc>>,
    pub last_sync_status: Option<SyncStatus>,
    /// Set on failure, cleared on success.
    pub last_sync_error: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl SyncConfig {
    /// Apply an attempt's outcome to this in-memory snapshot.
    pub fn apply_outcome(&mut self, outcome: &SyncOutcome) {
        self.last_sync_time = Some(outcome.finished_at);
        self.last_sync_status = Some(outcome.status);
        self.last_sync_error = outcome.error.clone();
    }
}

/// Creation request for a configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewSyncConfig {
    pub owner_id: OwnerId,
    pub name: String,
    pub sheet_id: String,
    pub sheet_name: String,
    pub tab_name: String,
    pub local_path: String,
    pub sync_interval: u32,
    #[serde(default = "bool_true")]
    pub is_active: bool,
}

fn bool_true() -> bool {
    true
}

impl NewSyncConfig {
    pub fn validate(&self) -> Result<()> {
        require_text("owner_id", &self.owner_id.0)?;
        require_text("name", &self.name)?;
        require_text("sheet_id", &self.sheet_id)?;
        require_text("tab_name", &self.tab_name)?;
        require_text("local_path", &self.local_path)?;
        require_interval(self.sync_interval)
    }
}

/// Partial update; `None` leaves the stored value unchanged.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SyncConfigUpdate {
    pub name: Option<String>,
    pub sheet_id: Option<String>,
    pub sheet_name: Option<String>,
    pub tab_name: Option<String>,
    pub local_path: Option<String>,
    pub sync_interval: Option<u32>,
    pub is_active: Option<bool>,
}

impl SyncConfigUpdate {
    /// Deactivate without touching any other field.
    pub fn deactivate() -> Self {
        Self {
            is_active: Some(false),
            ..Self::default()
        }
    }

    pub fn validate(&self) -> Result<()> {
        let texts = [
            ("name", &self.name),
            ("sheet_id", &self.sheet_id),
            ("tab_name", &self.tab_name),
            ("local_path", &self.local_path),
        ];
        for (field, value) in texts {
            if let Some(v) = value {
                require_text(field, v)?;
            }
        }
        match self.sync_interval {
            Some(minutes) => require_interval(minutes),
            None => Ok(()),
        }
    }
}

fn require_text(field: &str, value: &str) -> Result<()> {
    if value.trim().is_empty() {
        return Err(SynchronError::Validation(format!("{field} must not be empty")));
    }
    Ok(())
}

fn require_interval(minutes: u32) -> Result<()> {
    if minutes < MIN_SYNC_INTERVAL_MINUTES {
        return Err(SynchronError::Validation(format!(
            "sync_interval must be at least {MIN_SYNC_INTERVAL_MINUTES} minutes (got {minutes})"
        )));
    }
    Ok(())
}

/// Owner-scoped token pair. Opaque to the core; never persisted or refreshed by it.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Credential {
    pub access_token: String,
    pub refresh_token: Option<String>,
}

impl Credential {
    pub fn new(access_token: impl Into<String>, refresh_token: Option<String>) -> Self {
        Self {
            access_token: access_token.into(),
            refresh_token,
        }
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credential")
            .field("access_token", &"<redacted>")
            .field(
                "refresh_token",
                &self.refresh_token.as_ref().map(|_| "<redacted>"),
            )
            .finish()
    }
}

/// Terminal status write for one attempt.
#[derive(Debug, Clone, PartialEq)]
pub struct SyncOutcome {
    pub status: SyncStatus,
    pub finished_at: DateTime<Utc>,
    pub error: Option<String>,
}

impl SyncOutcome {
    pub fn success(finished_at: DateTime<Utc>) -> Self {
        Self {
            status: SyncStatus::Success,
            finished_at,
            error: None,
        }
    }

    pub fn failure(finished_at: DateTime<Utc>, error: impl Into<String>) -> Self {
        Self {
            status: SyncStatus::Failed,
            finished_at,
            error: Some(error.into()),
        }
    }
}

/// Result of one execution attempt. Only its effect on [`SyncConfig`] is persisted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncResult {
    pub success: bool,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Configuration snapshot with the outcome applied.
    pub config: SyncConfig,
}

impl SyncResult {
    pub fn succeeded(config: SyncConfig) -> Self {
        Self {
            success: true,
            message: "Sync completed successfully".to_string(),
            error: None,
            config,
        }
    }

    pub fn failed(config: SyncConfig, error: impl Into<String>) -> Self {
        Self {
            success: false,
            message: "Sync failed".to_string(),
            error: Some(error.into()),
            config,
        }
    }
}
