use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use synchron_core::Credential;

/// Ordered rows of ordered cell texts. Row 0 is the header by convention.
pub type Rows = Vec<Vec<String>>;

/// A spreadsheet visible to the credential's owner.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceInfo {
    pub id: String,
    pub name: String,
}

/// A tab inside a spreadsheet.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TabInfo {
    pub id: i64,
    pub name: String,
}

#[derive(Debug, thiserror::Error)]
pub enum SourceError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Token rejected or lacking scope. Refreshing is the credential provider's job.
    #[error("not authorized: {0}")]
    Unauthorized(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("API error ({status}): {message}")]
    Api { status: u16, message: String },

    #[error("Parse error: {0}")]
    Parse(String),
}

/// Common interface for remote tabular sources.
#[async_trait]
pub trait SheetSource: Send + Sync {
    /// Source name for logging.
    fn name(&self) -> &str;

    async fn list_sources(&self, credential: &Credential) -> Result<Vec<SourceInfo>, SourceError>;

    async fn list_tabs(
        &self,
        credential: &Credential,
        sheet_id: &str,
    ) -> Result<Vec<TabInfo>, SourceError>;

    async fn fetch_range(
        &self,
        credential: &Credential,
        sheet_id: &str,
        tab_name: &str,
    ) -> Result<Rows, SourceError>;
}
