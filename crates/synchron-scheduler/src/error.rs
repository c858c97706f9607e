use synchron_core::{OwnerId, SyncConfigId, SynchronError};
use synchron_sheets::SourceError;
use synchron_store::StoreError;
use thiserror::Error;

/// Why a single sync attempt failed.
///
/// Every variant is caught at the execution boundary and turned into a failed
/// status on the configuration; none of them stop a timer.
#[derive(Debug, Error)]
pub enum SyncError {
    /// Transport, auth or not-found problem reported by the remote source.
    #[error("{source_name} failed to fetch '{tab_name}' from sheet {sheet_id}: {source}")]
    SourceFetch {
        source_name: String,
        sheet_id: String,
        tab_name: String,
        #[source]
        source: SourceError,
    },

    /// No header, or a header with no data rows beneath it.
    #[error("empty dataset: no data rows found in the sheet")]
    EmptyDataset,

    #[error("destination {path} is not writable: {source}")]
    DestinationUnwritable {
        path: String,
        #[source]
        source: std::io::Error,
    },

    /// The owner or configuration disappeared between scheduling and firing.
    #[error("{what} not found: {id}")]
    ConfigurationNotFound { what: &'static str, id: String },

    #[error("credential lookup failed: {0}")]
    CredentialLookup(#[source] StoreError),

    /// Writing status fields back failed; never changes the reported outcome.
    #[error("failed to persist sync status: {0}")]
    StatusPersist(#[from] StoreError),
}

impl SyncError {
    pub fn code(&self) -> &'static str {
        match self {
            SyncError::SourceFetch { .. } => "SOURCE_FETCH_ERROR",
            SyncError::EmptyDataset => "EMPTY_DATASET",
            SyncError::DestinationUnwritable { .. } => "DESTINATION_UNWRITABLE",
            SyncError::ConfigurationNotFound { .. } => "CONFIGURATION_NOT_FOUND",
            SyncError::CredentialLookup(_) => "CREDENTIAL_LOOKUP_ERROR",
            SyncError::StatusPersist(_) => "STATUS_PERSIST_ERROR",
        }
    }

    pub(crate) fn owner_not_found(owner: &OwnerId) -> Self {
        SyncError::ConfigurationNotFound {
            what: "owner",
            id: owner.to_string(),
        }
    }
}

/// Errors returned to callers of [`crate::service::SyncService`].
#[derive(Debug, Error)]
pub enum ServiceError {
    #[error("Sync configuration not found: {id}")]
    NotFound { id: SyncConfigId },

    #[error("Owner not found: {id}")]
    OwnerNotFound { id: OwnerId },

    #[error(transparent)]
    Validation(#[from] SynchronError),

    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("Source error: {0}")]
    Source(#[from] SourceError),
}

impl ServiceError {
    pub fn code(&self) -> &'static str {
        match self {
            ServiceError::NotFound { .. } => "NOT_FOUND",
            ServiceError::OwnerNotFound { .. } => "OWNER_NOT_FOUND",
            ServiceError::Validation(e) => e.code(),
            ServiceError::Store(_) => "STORE_ERROR",
            ServiceError::Source(_) => "SOURCE_ERROR",
        }
    }
}

pub type Result<T> = std::result::Result<T, ServiceError>;
