//! The boundary between the transaction engine and storage backends.
//!
//! A backend adapter supplies two things: a [`ResourceProvider`] that hands
//! out live sessions for one named backend, and the [`Resource`] session type
//! itself, which knows whether it is inside a native transaction and how to
//! run a unit of work inside one.
//!
//! ```text
//!   TransactionContext ──acquire/release──▶ ResourceProvider
//!          │                                       │
//!          └──run_in_transaction──▶ Resource ◀──────┘
//! ```
//!
//! Nothing here knows about propagation rules; those live in
//! [`crate::transaction`].

mod error;
mod name;
mod traits;

pub use error::{ResourceError, ResourceResult};
pub use name::BackendName;
pub use traits::{Completion, Resource, ResourceProvider};
