use thiserror::Error;

#[derive(Debug, Error)]
pub enum TaniclawError {
    #[error("not initialized: run 'taniclaw init'")]
    NotInitialized,

    #[error("plant not found: {0}")]
    PlantNotFound(String),

    #[error("invalid plant state: {0}")]
    InvalidState(String),

    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("rule document {path}: {reason}")]
    RuleDocument { path: String, reason: String },

    #[error("store error: {0}")]
    Store(String),

    #[error("store {0} is held by another taniclaw process")]
    StoreBusy(String),

    #[error("agent setup failed: {0}")]
    Setup(String),

    #[error("background task failed: {0}")]
    Task(String),

    #[error("http error: {0}")]
    Http(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Yaml(#[from] serde_yaml::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

impl From<reqwest::Error> for TaniclawError {
    fn from(e: reqwest::Error) -> Self {
        TaniclawError::Http(e.to_string())
    }
}

impl From<tokio::task::JoinError> for TaniclawError {
    fn from(e: tokio::task::JoinError) -> Self {
        TaniclawError::Task(e.to_string())
    }
}

pub type Result<T> = std::result::Result<T, TaniclawError>;
