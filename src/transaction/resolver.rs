//! Propagation resolver.
//!
//! | Mode         | Active                 | Not active             |
//! |--------------|------------------------|------------------------|
//! | Mandatory    | join                   | fail (required)        |
//! | Never        | fail (not allowed)     | run as is              |
//! | NotSupported | suspend on fresh frame | run as is              |
//! | Required     | join                   | begin on fresh frame   |
//! | RequiresNew  | begin on fresh frame   | begin on fresh frame   |
//! | Supports     | join                   | run as is              |
//!
//! "Active" means the top frame exists and is inside a native transaction.

use crate::transaction::error::TransactionError;
use crate::transaction::propagation::PropagationMode;

/// What the interceptor does with the context stack.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resolution {
    /// Run on the running transaction's frame.
    Join,
    /// Run on whatever is on top of the stack, possibly nothing.
    RunAsIs,
    /// Park the running transaction under a fresh non-transactional frame.
    Suspend,
    /// Push a fresh frame and run inside a native transaction on it.
    Begin,
}

impl Resolution {
    /// Whether the call pushes, and therefore pops, a frame.
    pub fn is_initiator(&self) -> bool {
        matches!(self, Resolution::Suspend | Resolution::Begin)
    }

    pub fn must_wrap(&self) -> bool {
        matches!(self, Resolution::Begin)
    }
}

/// Contract violations detected before any work runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Violation {
    TransactionRequired,
    TransactionNotAllowed,
}

impl Violation {
    pub fn into_error(self, operation: &str) -> TransactionError {
        let operation = operation.to_string();
        match self {
            Violation::TransactionRequired => TransactionError::TransactionRequired { operation },
            Violation::TransactionNotAllowed => {
                TransactionError::TransactionNotAllowed { operation }
            }
        }
    }
}

pub fn resolve(mode: PropagationMode, active: bool) -> Result<Resolution, Violation> {
    use PropagationMode::*;

    let resolution = match (mode, active) {
        (Mandatory, true) | (Required, true) | (Supports, true) => Resolution::Join,
        (Mandatory, false) => return Err(Violation::TransactionRequired),
        (Never, true) => return Err(Violation::TransactionNotAllowed),
        (Never, false) | (NotSupported, false) | (Supports, false) => Resolution::RunAsIs,
        (NotSupported, true) => Resolution::Suspend,
        (Required, false) | (RequiresNew, _) => Resolution::Begin,
    };
    Ok(resolution)
}

/// Resolver output, with the resource the call will run on.
#[derive(Debug, Clone)]
pub struct ExecutionPlan<R> {
    pub resource: Option<R>,
    pub is_initiator: bool,
    pub must_wrap: bool,
}

impl<R> ExecutionPlan<R> {
    pub(crate) fn new(resolution: Resolution, resource: Option<R>) -> Self {
        Self {
            resource,
            is_initiator: resolution.is_initiator(),
            must_wrap: resolution.must_wrap(),
        }
    }
}
