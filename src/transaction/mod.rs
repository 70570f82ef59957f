//! Declarative transaction propagation.
//!
//! A call site describes its transactional intent with a
//! [`TransactionDefinition`] (propagation mode, rollback directive, backend)
//! and hands its unit of work to [`TransactionContext::run`]. The context
//! keeps one stack of resource frames per backend and decides, per call,
//! whether to join the running transaction, suspend it, start a new one or
//! refuse to run.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                   TransactionManager                        │
//! │        (shared registry of providers, hands out contexts)   │
//! └─────────────────────────────────────────────────────────────┘
//!                              │
//!                              ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │                TransactionContext::run                      │
//! │   resolve plan ─▶ push frame ─▶ native tx ─▶ pop frame      │
//! └─────────────────────────────────────────────────────────────┘
//!        │                     │                     │
//!        ▼                     ▼                     ▼
//!  ┌─────────────┐       ┌─────────────┐       ┌─────────────┐
//!  │  resolver   │       │    stack    │       │   policy    │
//!  │ (mode table)│       │   (frames)  │       │ (rollback)  │
//!  └─────────────┘       └─────────────┘       └─────────────┘
//! ```
//!
//! # Usage
//!
//! ```ignore
//! use txscope::transaction::{PropagationMode, TransactionDefinition, TransactionManager};
//!
//! let manager = TransactionManager::single(MemoryProvider::default());
//! let ctx = manager.context();
//!
//! let place = TransactionDefinition::new("orders::place");
//! ctx.run(&place, || {
//!     ctx.resource(&BackendName::default_name())?.insert(&orders, row)?;
//!     Ok::<_, TransactionError>(())
//! })?;
//! ```

mod context;
mod definition;
mod error;
mod manager;
mod policy;
mod propagation;
mod resolver;
mod stack;

pub use context::TransactionContext;
pub use definition::TransactionDefinition;
pub use error::{TransactionError, TransactionResult};
pub use manager::TransactionManager;
pub use policy::{Classify, ErrorKind, RollbackDirective};
pub use propagation::PropagationMode;
pub use resolver::{resolve, ExecutionPlan, Resolution, Violation};
pub use stack::ResourceContextStack;
