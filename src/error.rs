//! Error types for the vault transaction engine.

use crate::transaction::ResultInfo;
use thiserror::Error;

/// Storage-related errors
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Node not found: {0}")]
    NodeNotFound(String),

    #[error("Node already exists: {0}")]
    NodeExists(String),

    #[error("Invalid path: {0}")]
    InvalidPath(String),

    #[error("Import failed at {path}: {reason}")]
    ImportFailed { path: String, reason: String },

    #[error("Metadata document error: {0}")]
    Analyze(#[from] AnalyzeError),

    #[error("Storage I/O error: {0}")]
    IoError(#[from] std::io::Error),
}

/// Errors raised while reading a metadata document
#[derive(Debug, Error)]
pub enum AnalyzeError {
    #[error("Malformed XML: {0}")]
    Xml(String),

    #[error("Not a metadata document: root element is {0:?}")]
    NotDocView(String),

    #[error("Failed to read payload: {0}")]
    Io(#[from] std::io::Error),
}

/// Transaction-level errors
#[derive(Debug, Error)]
pub enum TransactionError {
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Failed to read input: {0}")]
    Input(#[from] std::io::Error),

    #[error("Metadata document error: {0}")]
    Analyze(#[from] AnalyzeError),

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("Transaction aborted: {} change(s) could not be resolved", errors.len())]
    Aborted { errors: Vec<ResultInfo> },
}

/// Configuration and setup errors
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Storage error: {0}")]
    StorageError(#[from] StorageError),
}

impl From<config::ConfigError> for ApiError {
    fn from(err: config::ConfigError) -> Self {
        ApiError::ConfigError(err.to_string())
    }
}
