//! txscope - declarative transaction propagation over document stores.
//!
//! A call site declares how it relates to an ambient transaction
//! (`Required`, `RequiresNew`, `Mandatory`, `Supports`, `NotSupported`,
//! `Never`) together with a rollback directive, and hands its unit of work to
//! [`TransactionContext::run`](transaction::TransactionContext::run). The
//! engine joins, suspends or starts native transactions on the configured
//! backend, decides commit or rollback from the error the work returns, and
//! releases every frame it pushed on every exit path.
//!
//! Two backends ship with the crate: an in-memory store and a Git-backed
//! store where every write is a commit and every transaction a branch.
//!
//! # Example
//!
//! ```no_run
//! use serde_json::json;
//! use txscope::db::{Database, DatabaseError};
//! use txscope::resource::BackendName;
//! use txscope::storage::{Documents, Row, RowKey, TableName};
//! use txscope::transaction::TransactionDefinition;
//!
//! let db = Database::open_in_memory().unwrap();
//! let ctx = db.context();
//! let users = TableName::new("users").unwrap();
//!
//! ctx.run(&TransactionDefinition::new("users::create"), || {
//!     let row = Row::from_value(RowKey::generate(), json!({"name": "Alice"}))?;
//!     ctx.resource(&BackendName::default_name())?.insert(&users, row)?;
//!     Ok::<_, DatabaseError>(())
//! })
//! .unwrap();
//! ```

pub mod db;
pub mod resource;
pub mod storage;
pub mod transaction;
