//! Error types for binshare operations.

use std::path::PathBuf;

use thiserror::Error;

/// Result type alias for binshare operations
pub type Result<T> = std::result::Result<T, BinShareError>;

#[derive(Error, Debug)]
pub enum BinShareError {
    /// A matrix, table or list does not have the expected shape
    #[error("Malformed input '{path}': {reason}")]
    MalformedInput { path: String, reason: String },

    /// A per-method table or annotation file is required but absent
    #[error("Missing external resource: {} does not exist", path.display())]
    MissingExternalResource { path: PathBuf },

    /// An assembly method has no registered lookup tables
    #[error("Unknown assembly method '{method}': {reason}")]
    UnknownMethod { method: String, reason: String },

    /// The clustering result is not a partition of the matrix bins
    #[error("Cluster consistency violation: {labeled} bins labeled, {expected} bins in the matrix")]
    ClusterConsistencyViolation { labeled: usize, expected: usize },

    /// A bin is absent from a table every bin is expected to be in
    #[error("Bin '{bin}' not found in {table}")]
    LookupMiss { bin: String, table: String },

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Csv(#[from] csv::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

impl BinShareError {
    pub fn malformed(path: impl Into<String>, reason: impl Into<String>) -> Self {
        BinShareError::MalformedInput { path: path.into(), reason: reason.into() }
    }
}
