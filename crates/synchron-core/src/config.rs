use figment::{
    providers::{Env, Format, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};

pub const DEFAULT_DISPATCH_CAPACITY: usize = 256;
pub const DEFAULT_SHEETS_BASE_URL: &str = "https://sheets.googleapis.com";
pub const DEFAULT_DRIVE_BASE_URL: &str = "https://www.googleapis.com";
pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 30;
pub const DEFAULT_RECONCILE_SECS: u64 = 30;

/// Top-level config (synchron.toml + SYNCHRON_* env overrides).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SynchronConfig {
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub scheduler: SchedulerConfig,
    #[serde(default)]
    pub google: GoogleConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    #[serde(default = "default_db_path")]
    pub path: String,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: default_db_path(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulerConfig {
    /// Buffered firings between the timers and the dispatcher. A full buffer
    /// drops the firing; the next tick retries.
    #[serde(default = "default_dispatch_capacity")]
    pub dispatch_capacity: usize,
    /// Skip a scheduled firing while the previous run of the same
    /// configuration is still in flight.
    #[serde(default = "bool_true")]
    pub skip_if_running: bool,
    /// How often a running scheduler re-reads the store to pick up
    /// configurations changed by other processes. `0` disables it.
    #[serde(default = "default_reconcile_secs")]
    pub reconcile_secs: u64,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            dispatch_capacity: DEFAULT_DISPATCH_CAPACITY,
            skip_if_running: true,
            reconcile_secs: DEFAULT_RECONCILE_SECS,
        }
    }
}

/// Endpoints for the Google Sheets / Drive REST APIs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GoogleConfig {
    #[serde(default = "default_sheets_base_url")]
    pub sheets_base_url: String,
    #[serde(default = "default_drive_base_url")]
    pub drive_base_url: String,
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
}

impl Default for GoogleConfig {
    fn default() -> Self {
        Self {
            sheets_base_url: default_sheets_base_url(),
            drive_base_url: default_drive_base_url(),
            request_timeout_secs: DEFAULT_REQUEST_TIMEOUT_SECS,
        }
    }
}

fn bool_true() -> bool {
    true
}
fn default_dispatch_capacity() -> usize {
    DEFAULT_DISPATCH_CAPACITY
}
fn default_reconcile_secs() -> u64 {
    DEFAULT_RECONCILE_SECS
}
fn default_sheets_base_url() -> String {
    DEFAULT_SHEETS_BASE_URL.to_string()
}
fn default_drive_base_url() -> String {
    DEFAULT_DRIVE_BASE_URL.to_string()
}
fn default_request_timeout_secs() -> u64 {
    DEFAULT_REQUEST_TIMEOUT_SECS
}
fn default_db_path() -> String {
    format!("{}/synchron.db", home_dir())
}

fn home_dir() -> String {
    let home = std::env::var("HOME").unwrap_or_else(|_| ".".to_string());
    format!("{home}/.synchron")
}

impl SynchronConfig {
    /// Load config from a TOML file with SYNCHRON_* env var overrides.
    ///
    /// Nested keys use a double underscore, e.g.
    /// `SYNCHRON_SCHEDULER__DISPATCH_CAPACITY=64`. A missing file yields the
    /// defaults.
    pub fn load(config_path: Option<&str>) -> crate::error::Result<Self> {
        let path = config_path
            .map(String::from)
            .unwrap_or_else(default_config_path);
        tracing::debug!(path = %path, "loading configuration");

        Self::from_figment(
            Figment::new()
                .merge(Toml::file(&path))
                .merge(Env::prefixed("SYNCHRON_").split("__")),
        )
    }

    fn from_figment(figment: Figment) -> crate::error::Result<Self> {
        figment
            .extract()
            .map_err(|e| crate::error::SynchronError::Config(e.to_string()))
    }
}

fn default_config_path() -> String {
    format!("{}/synchron.toml", home_dir())
}
