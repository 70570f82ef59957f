//! Errors raised by resource providers and native transaction demarcation.

use std::path::PathBuf;

use thiserror::Error;

use crate::resource::BackendName;
use crate::storage::StorageError;
use crate::transaction::{Classify, ErrorKind};

pub type ResourceResult<T> = Result<T, ResourceError>;

#[derive(Debug, Error)]
pub enum ResourceError {
    /// The backend failed to open, commit or roll back.
    #[error("storage error: {0}")]
    Storage(#[from] StorageError),

    /// A native transaction was requested on a resource already inside one.
    #[error("resource is already inside a native transaction")]
    NestedTransaction,

    /// Committing would overwrite paths changed concurrently.
    #[error("transaction {tx_id} conflicts on paths: {}", paths_display(.paths))]
    Conflict { tx_id: String, paths: Vec<PathBuf> },

    #[error("no data source configured under the name '{0}'")]
    UnknownBackend(BackendName),
}

fn paths_display(paths: &[PathBuf]) -> String {
    paths
        .iter()
        .map(|p| p.display().to_string())
        .collect::<Vec<_>>()
        .join(", ")
}

impl ResourceError {
    pub fn is_retryable(&self) -> bool {
        match self {
            ResourceError::Conflict { .. } => true,
            ResourceError::Storage(e) => e.is_retriable(),
            _ => false,
        }
    }
}

impl Classify for ResourceError {
    fn kind(&self) -> ErrorKind {
        match self {
            ResourceError::Storage(e) => e.kind(),
            ResourceError::NestedTransaction => {
                ErrorKind::from_static("resource.nested_transaction")
            }
            ResourceError::Conflict { .. } => ErrorKind::from_static("resource.conflict"),
            ResourceError::UnknownBackend(_) => ErrorKind::from_static("resource.unknown_backend"),
        }
    }
}
