use serde::{Deserialize, Serialize};

use crate::resource::BackendName;
use crate::transaction::policy::{ErrorKind, RollbackDirective};
use crate::transaction::propagation::PropagationMode;

/// Static configuration of one transactional call site.
///
/// ```ignore
/// let def = TransactionDefinition::new("orders::place")
///     .with_mode(PropagationMode::RequiresNew)
///     .no_rollback_on("app.audit");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransactionDefinition {
    operation: String,
    #[serde(default)]
    mode: PropagationMode,
    #[serde(default)]
    directive: RollbackDirective,
    #[serde(default)]
    backend: BackendName,
}

impl TransactionDefinition {
    /// A `Required` definition on the default backend.
    pub fn new(operation: impl Into<String>) -> Self {
        Self {
            operation: operation.into(),
            mode: PropagationMode::default(),
            directive: RollbackDirective::default(),
            backend: BackendName::default(),
        }
    }

    pub fn with_mode(mut self, mode: PropagationMode) -> Self {
        self.mode = mode;
        self
    }

    pub fn with_directive(mut self, directive: RollbackDirective) -> Self {
        self.directive = directive;
        self
    }

    pub fn rollback_on(mut self, kind: impl Into<ErrorKind>) -> Self {
        self.directive = self.directive.rollback_on(kind);
        self
    }

    pub fn no_rollback_on(mut self, kind: impl Into<ErrorKind>) -> Self {
        self.directive = self.directive.no_rollback_on(kind);
        self
    }

    pub fn on_backend(mut self, backend: BackendName) -> Self {
        self.backend = backend;
        self
    }

    pub fn operation(&self) -> &str {
        &self.operation
    }

    pub fn mode(&self) -> PropagationMode {
        self.mode
    }

    pub fn directive(&self) -> &RollbackDirective {
        &self.directive
    }

    pub fn backend(&self) -> &BackendName {
        &self.backend
    }
}
