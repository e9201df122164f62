//! Error types for the enrichment pipeline and its engine

use thiserror::Error;

/// Result type alias used across the crate
pub type Result<T> = std::result::Result<T, BroadcastJoinError>;

/// Main error type
#[derive(Error, Debug)]
pub enum BroadcastJoinError {
    #[error("HTTP error: {0}")]
    Http(String),

    #[error("Decode error: {0}")]
    Decode(String),

    #[error("Plan error: {0}")]
    Plan(String),

    #[error("Execution error: {0}")]
    Execution(String),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Commit conflict: version {0} already exists")]
    CommitConflict(u64),

    #[error("Table already exists: {0}")]
    TableExists(String),

    #[error("Table not found: {0}")]
    TableNotFound(String),

    #[error("Column not found: {0}")]
    ColumnNotFound(String),

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Internal error: {0}")]
    Internal(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Arrow error: {0}")]
    Arrow(#[from] arrow::error::ArrowError),

    #[error("Parquet error: {0}")]
    Parquet(#[from] parquet::errors::ParquetError),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl From<reqwest::Error> for BroadcastJoinError {
    fn from(e: reqwest::Error) -> Self {
        BroadcastJoinError::Http(e.to_string())
    }
}
