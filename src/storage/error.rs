//! Storage layer error types.

use std::path::PathBuf;

use thiserror::Error;

use crate::storage::types::{InvalidNameError, RowKey, TableName};
use crate::transaction::{Classify, ErrorKind};

/// The main error type for storage operations.
#[derive(Debug, Error)]
pub enum StorageError {
    /// Error from the underlying Git library.
    #[error("git error: {0}")]
    Git(#[from] git2::Error),

    #[error("row not found: table={table}, key={key}")]
    RowNotFound { table: TableName, key: RowKey },

    /// Duplicate primary key.
    #[error("row already exists: table={table}, key={key}")]
    RowAlreadyExists { table: TableName, key: RowKey },

    #[error("invalid name: {0}")]
    InvalidName(#[from] InvalidNameError),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("ref not found: {0}")]
    RefNotFound(String),

    #[error("corrupted data at {path}: {reason}")]
    CorruptedData { path: PathBuf, reason: String },

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("repository not initialized: {0}")]
    NotInitialized(PathBuf),

    /// Branch update lost a compare-and-swap race.
    #[error("concurrent modification: branch {branch} was updated by another writer")]
    ConcurrentModification { branch: String },

    #[error("schema violation: {0}")]
    SchemaViolation(String),
}

impl StorageError {
    /// Check if this error indicates the resource doesn't exist.
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            StorageError::RowNotFound { .. } | StorageError::RefNotFound(_)
        )
    }

    pub fn is_conflict(&self) -> bool {
        matches!(
            self,
            StorageError::RowAlreadyExists { .. } | StorageError::ConcurrentModification { .. }
        )
    }

    /// Check if this error is recoverable by retry.
    pub fn is_retriable(&self) -> bool {
        matches!(self, StorageError::ConcurrentModification { .. })
    }
}

impl Classify for StorageError {
    fn kind(&self) -> ErrorKind {
        ErrorKind::from_static(match self {
            StorageError::Git(_) => "storage.git",
            StorageError::RowNotFound { .. } => "storage.row_not_found",
            StorageError::RowAlreadyExists { .. } => "storage.row_already_exists",
            StorageError::InvalidName(_) => "storage.invalid_name",
            StorageError::Serialization(_) => "storage.serialization",
            StorageError::RefNotFound(_) => "storage.ref_not_found",
            StorageError::CorruptedData { .. } => "storage.corrupted_data",
            StorageError::Io(_) => "storage.io",
            StorageError::NotInitialized(_) => "storage.not_initialized",
            StorageError::ConcurrentModification { .. } => "storage.concurrent_modification",
            StorageError::SchemaViolation(_) => "storage.schema_violation",
        })
    }
}

pub type StorageResult<T> = Result<T, StorageError>;
