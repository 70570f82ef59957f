//! Transaction manager: the shared registry of resource providers.
//!
//! The manager is shared across threads; the per-thread state lives in the
//! [`TransactionContext`] values it hands out.

use std::collections::BTreeMap;
use std::sync::Arc;

use crate::resource::{BackendName, ResourceError, ResourceProvider};
use crate::transaction::context::TransactionContext;
use crate::transaction::error::TransactionResult;

/// Registry of providers keyed by backend name.
///
/// Thread-safe whenever `P` is: can be shared across threads via Clone (uses
/// Arc internally).
pub struct TransactionManager<P> {
    inner: Arc<TransactionManagerInner<P>>,
}

struct TransactionManagerInner<P> {
    providers: BTreeMap<BackendName, P>,
}

impl<P: ResourceProvider> TransactionManager<P> {
    pub fn new(providers: impl IntoIterator<Item = (BackendName, P)>) -> Self {
        Self {
            inner: Arc::new(TransactionManagerInner {
                providers: providers.into_iter().collect(),
            }),
        }
    }

    /// A manager with one provider registered as the default backend.
    pub fn single(provider: P) -> Self {
        Self::new([(BackendName::default_name(), provider)])
    }

    pub fn provider(&self, backend: &BackendName) -> TransactionResult<&P> {
        self.inner
            .providers
            .get(backend)
            .ok_or_else(|| ResourceError::UnknownBackend(backend.clone()).into())
    }

    pub fn backends(&self) -> impl Iterator<Item = &BackendName> {
        self.inner.providers.keys()
    }

    /// Create a context for the calling thread, with empty stacks.
    pub fn context(&self) -> TransactionContext<P> {
        TransactionContext::new(self.clone())
    }
}

impl<P> Clone for TransactionManager<P> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<P> std::fmt::Debug for TransactionManager<P> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TransactionManager")
            .field("backends", &self.inner.providers.keys().collect::<Vec<_>>())
            .finish()
    }
}
