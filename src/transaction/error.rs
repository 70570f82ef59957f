//! Transaction error types.

use thiserror::Error;

use crate::resource::ResourceError;
use crate::storage::StorageError;
use crate::transaction::policy::{Classify, ErrorKind};

/// Result type for transaction operations.
pub type TransactionResult<T> = Result<T, TransactionError>;

/// Errors raised by the propagation engine itself.
///
/// Errors produced by a unit of work never pass through this type; they reach
/// the caller untouched.
#[derive(Debug, Error)]
pub enum TransactionError {
    /// `Mandatory` requested with no transaction running.
    #[error("{operation} called outside a transaction context")]
    TransactionRequired { operation: String },

    /// `Never` requested while a transaction is running.
    #[error("{operation} called inside a transaction context")]
    TransactionNotAllowed { operation: String },

    /// Acquiring a resource or demarcating its native transaction failed.
    #[error(transparent)]
    Resource(#[from] ResourceError),
}

impl TransactionError {
    /// Contract violations are raised before any work runs.
    pub fn is_contract_violation(&self) -> bool {
        matches!(
            self,
            TransactionError::TransactionRequired { .. } | TransactionError::TransactionNotAllowed { .. }
        )
    }

    pub fn is_retryable(&self) -> bool {
        match self {
            TransactionError::Resource(e) => e.is_retryable(),
            _ => false,
        }
    }
}

impl From<StorageError> for TransactionError {
    fn from(err: StorageError) -> Self {
        TransactionError::Resource(ResourceError::Storage(err))
    }
}

impl Classify for TransactionError {
    fn kind(&self) -> ErrorKind {
        match self {
            TransactionError::TransactionRequired { .. } => {
                ErrorKind::from_static("transaction.required")
            }
            TransactionError::TransactionNotAllowed { .. } => {
                ErrorKind::from_static("transaction.not_allowed")
            }
            TransactionError::Resource(e) => e.kind(),
        }
    }
}
