use thiserror::Error;

#[derive(Debug, Error)]
pub enum InfraError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("Invalid entry: {0}")]
    InvalidEntry(String),
    #[error("Entry not found: {0}")]
    EntryNotFound(String),
    #[error("Engine state error: {0}")]
    State(String),
}
