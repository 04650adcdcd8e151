use thiserror::Error;

use crate::platform::PlatformError;

/// Errors surfaced by a search before or around tab work
///
/// [`SearchOrchestrator`](crate::orchestrator::SearchOrchestrator) turns every
/// one of these into a diagnostic string; none reach its caller as an `Err`.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum SearchError {
    #[error("Unknown supplier: {0}")]
    UnknownSupplier(String),

    #[error("Invalid query: {0}")]
    InvalidQuery(String),

    #[error("Tab acquisition failed: {0}")]
    TabAcquisition(#[from] PlatformError),

    #[error("Agent install failed: {0}")]
    AgentInstall(String),

    #[error("Configuration error: {0}")]
    Config(String),
}

impl From<serde_yaml::Error> for SearchError {
    fn from(err: serde_yaml::Error) -> Self {
        SearchError::Config(err.to_string())
    }
}
