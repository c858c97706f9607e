use thiserror::Error;

#[derive(Debug, Error)]
pub enum SynchronError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Validation failed: {0}")]
    Validation(String),
}

impl SynchronError {
    /// Short, stable error code for callers that surface errors to clients.
    pub fn code(&self) -> &'static str {
        match self {
            SynchronError::Config(_) => "CONFIG_ERROR",
            SynchronError::Validation(_) => "VALIDATION_ERROR",
        }
    }
}

pub type Result<T> = std::result::Result<T, SynchronError>;
