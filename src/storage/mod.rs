//! Storage layer: the document model and the two backends.
//!
//! Both backends expose the same [`Documents`] API over JSON rows and
//! implement [`Resource`](crate::resource::Resource), so the transaction
//! layer drives either one without knowing which it has.
//!
//! # Architecture
//!
//! ```text
//!        ┌───────────────────────────┐
//!        │   Documents + Resource    │
//!        └───────────────────────────┘
//!             │                 │
//!             ▼                 ▼
//!  ┌──────────────────┐  ┌──────────────────┐
//!  │  MemorySession   │  │   GitSession     │
//!  │ (write-set       │  │ (tx/{id} branch, │
//!  │  overlay)        │  │  merge to main)  │
//!  └──────────────────┘  └──────────────────┘
//!             │                 │
//!             ▼                 ▼
//!  ┌──────────────────┐  ┌──────────────────┐
//!  │   MemoryStore    │  │  GitRepository   │
//!  └──────────────────┘  └──────────────────┘
//! ```
//!
//! # Usage
//!
//! ```ignore
//! use txscope::storage::{Documents, MemoryStore, Row, RowKey, TableName};
//!
//! let session = MemoryStore::new().session();
//! let users = TableName::new("users")?;
//! let row = Row::from_value(RowKey::generate(), json!({"name": "Alice"}))?;
//! session.insert(&users, row)?;
//! ```

mod documents;
mod error;
mod git;
mod memory;
mod refs;
mod repository;
mod row;
mod types;

pub use documents::{Documents, RowChange};
pub use error::{StorageError, StorageResult};
pub use git::{GitProvider, GitSession};
pub use memory::{MemoryProvider, MemorySession, MemoryStore};
pub use repository::{GitRepository, MergeOutcome};
pub use row::Row;
pub use types::{CommitId, GitSignature, InvalidNameError, RowKey, TableName};
