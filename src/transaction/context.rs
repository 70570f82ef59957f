//! Per-thread transaction context and the transactional interceptor.
//!
//! A [`TransactionContext`] owns one [`ResourceContextStack`] per backend and
//! is deliberately `!Sync`: frames belong to the thread that pushed them.
//! [`TransactionContext::run`] is the interceptor. It resolves the
//! definition's propagation mode against the stack, pushes and pops frames
//! through drop guards so that every exit path (including unwinding)
//! releases them in LIFO order, and drives the native transaction when the
//! plan requires one.

use std::cell::RefCell;
use std::collections::BTreeMap;

use tracing::{debug, error, info, warn};

use crate::resource::{BackendName, Completion, Resource, ResourceProvider};
use crate::transaction::definition::TransactionDefinition;
use crate::transaction::error::{TransactionError, TransactionResult};
use crate::transaction::manager::TransactionManager;
use crate::transaction::policy::Classify;
use crate::transaction::resolver::{resolve, ExecutionPlan};
use crate::transaction::stack::ResourceContextStack;

type Stacks<R> = BTreeMap<BackendName, ResourceContextStack<R>>;

/// Thread-confined execution context.
pub struct TransactionContext<P: ResourceProvider> {
    manager: TransactionManager<P>,
    stacks: RefCell<Stacks<P::Resource>>,
    /// Non-transactional resources handed out while no frame existed.
    detached: RefCell<BTreeMap<BackendName, P::Resource>>,
}

impl<P: ResourceProvider> TransactionContext<P> {
    pub(crate) fn new(manager: TransactionManager<P>) -> Self {
        Self {
            manager,
            stacks: RefCell::new(BTreeMap::new()),
            detached: RefCell::new(BTreeMap::new()),
        }
    }

    pub fn manager(&self) -> &TransactionManager<P> {
        &self.manager
    }

    /// Resource on top of the backend's stack, if any.
    pub fn current(&self, backend: &BackendName) -> Option<P::Resource> {
        self.stacks
            .borrow()
            .get(backend)
            .and_then(|stack| stack.current_or_none().cloned())
    }

    pub fn depth(&self, backend: &BackendName) -> usize {
        self.stacks.borrow().get(backend).map_or(0, |stack| stack.depth())
    }

    pub fn is_transaction_active(&self, backend: &BackendName) -> bool {
        self.current(backend)
            .is_some_and(|resource| resource.is_in_transaction())
    }

    /// The resource work should use right now.
    ///
    /// Returns the top frame when there is one. Otherwise a non-transactional
    /// resource is acquired on first use and kept until the context drops.
    pub fn resource(&self, backend: &BackendName) -> TransactionResult<P::Resource> {
        if let Some(resource) = self.current(backend) {
            return Ok(resource);
        }
        if let Some(resource) = self.detached.borrow().get(backend) {
            return Ok(resource.clone());
        }

        let resource = self.manager.provider(backend)?.acquire()?;
        debug!(backend = %backend, "acquired detached resource");
        self.detached
            .borrow_mut()
            .insert(backend.clone(), resource.clone());
        Ok(resource)
    }

    /// Run `work` as configured by `definition`.
    ///
    /// Errors returned by `work` reach the caller as they are; the rollback
    /// directive only decides whether the native transaction commits or rolls
    /// back around them. Contract violations are reported before `work` runs.
    pub fn run<T, E, F>(&self, definition: &TransactionDefinition, work: F) -> Result<T, E>
    where
        F: FnOnce() -> Result<T, E>,
        E: From<TransactionError> + Classify,
    {
        let plan = self.plan(definition)?;
        match plan {
            ExecutionPlan {
                resource: Some(resource),
                is_initiator: true,
                must_wrap,
            } => {
                let _frame = self.push_frame(definition.backend(), resource.clone());
                if must_wrap {
                    self.run_wrapped(definition, &resource, work)
                } else {
                    work()
                }
            }
            _ => work(),
        }
    }

    fn plan(&self, definition: &TransactionDefinition) -> TransactionResult<ExecutionPlan<P::Resource>> {
        let backend = definition.backend();
        let provider = self.manager.provider(backend)?;
        let active = self.is_transaction_active(backend);

        let resolution = resolve(definition.mode(), active).map_err(|violation| {
            debug!(
                backend = %backend,
                operation = definition.operation(),
                mode = %definition.mode(),
                ?violation,
                "propagation contract violated"
            );
            violation.into_error(definition.operation())
        })?;

        let resource = if resolution.is_initiator() {
            Some(provider.acquire()?)
        } else {
            self.current(backend)
        };

        debug!(
            backend = %backend,
            operation = definition.operation(),
            mode = %definition.mode(),
            ?resolution,
            depth = self.depth(backend),
            "execution plan resolved"
        );
        Ok(ExecutionPlan::new(resolution, resource))
    }

    fn run_wrapped<T, E, F>(
        &self,
        definition: &TransactionDefinition,
        resource: &P::Resource,
        work: F,
    ) -> Result<T, E>
    where
        F: FnOnce() -> Result<T, E>,
        E: From<TransactionError> + Classify,
    {
        let backend = definition.backend();
        let operation = definition.operation();
        let mut outcome: Option<Result<T, E>> = None;

        let demarcation = resource.run_in_transaction(|tx| {
            let _swap = self.swap_top(backend, tx.clone());
            let result = work();
            let completion = match &result {
                Ok(_) => Completion::Commit(()),
                Err(failure) => {
                    let kind = failure.kind();
                    if definition.directive().should_rollback(&kind) {
                        info!(backend = %backend, operation, kind = %kind, "rolling back transaction");
                        Completion::Rollback(())
                    } else {
                        warn!(backend = %backend, operation, kind = %kind, "committing transaction despite error");
                        Completion::Commit(())
                    }
                }
            };
            outcome = Some(result);
            completion
        });

        match (demarcation, outcome) {
            (Ok(()), Some(result)) => result,
            (Err(resource_error), Some(Err(work_error))) => {
                error!(
                    backend = %backend,
                    operation,
                    error = %resource_error,
                    "transaction demarcation failed after the unit of work failed"
                );
                Err(work_error)
            }
            (Err(resource_error), _) => {
                error!(backend = %backend, operation, error = %resource_error, "transaction demarcation failed");
                Err(TransactionError::Resource(resource_error).into())
            }
            (Ok(()), None) => panic!("Resource::run_in_transaction returned without invoking its body"),
        }
    }

    fn with_stack<T>(
        &self,
        backend: &BackendName,
        f: impl FnOnce(&mut ResourceContextStack<P::Resource>) -> T,
    ) -> T {
        let mut stacks = self.stacks.borrow_mut();
        f(stacks.entry(backend.clone()).or_default())
    }

    fn push_frame<'a>(&'a self, backend: &'a BackendName, resource: P::Resource) -> FrameGuard<'a, P> {
        let depth = self.with_stack(backend, |stack| {
            stack.push(resource);
            stack.depth()
        });
        debug!(backend = %backend, depth, "frame pushed");
        FrameGuard { context: self, backend }
    }

    fn swap_top<'a>(&'a self, backend: &'a BackendName, resource: P::Resource) -> SwapGuard<'a, P> {
        let previous = self.with_stack(backend, |stack| stack.replace_top(resource));
        SwapGuard {
            context: self,
            backend,
            previous: Some(previous),
        }
    }
}

impl<P: ResourceProvider> Drop for TransactionContext<P> {
    fn drop(&mut self) {
        let detached = std::mem::take(self.detached.get_mut());
        for (backend, resource) in detached {
            if let Ok(provider) = self.manager.provider(&backend) {
                provider.release(resource);
            }
        }
    }
}

impl<P: ResourceProvider> std::fmt::Debug for TransactionContext<P> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let depths: BTreeMap<String, usize> = self
            .stacks
            .borrow()
            .iter()
            .map(|(backend, stack)| (backend.to_string(), stack.depth()))
            .collect();
        f.debug_struct("TransactionContext")
            .field("depths", &depths)
            .finish()
    }
}

/// Pops and releases the frame its call pushed.
struct FrameGuard<'a, P: ResourceProvider> {
    context: &'a TransactionContext<P>,
    backend: &'a BackendName,
}

impl<P: ResourceProvider> Drop for FrameGuard<'_, P> {
    fn drop(&mut self) {
        let (resource, depth) = self.context.with_stack(self.backend, |stack| {
            let resource = stack.pop();
            (resource, stack.depth())
        });
        if let Ok(provider) = self.context.manager.provider(self.backend) {
            provider.release(resource);
        }
        debug!(backend = %self.backend, depth, "frame released");
    }
}

/// Restores the pre-transaction handle on the top frame.
struct SwapGuard<'a, P: ResourceProvider> {
    context: &'a TransactionContext<P>,
    backend: &'a BackendName,
    previous: Option<P::Resource>,
}

impl<P: ResourceProvider> Drop for SwapGuard<'_, P> {
    fn drop(&mut self) {
        if let Some(previous) = self.previous.take() {
            self.context
                .with_stack(self.backend, |stack| stack.replace_top(previous));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::panic::{catch_unwind, AssertUnwindSafe};

    use serde_json::json;
    use thiserror::Error;

    use crate::resource::ResourceError;
    use crate::storage::{Documents, MemoryProvider, Row, RowKey, StorageError, TableName};
    use crate::test_support::init_tracing;
    use crate::transaction::{ErrorKind, PropagationMode};

    #[derive(Debug, Error)]
    enum AppError {
        #[error(transparent)]
        Transaction(#[from] TransactionError),
        #[error(transparent)]
        Storage(#[from] StorageError),
        #[error("validation failed: {0}")]
        Validation(&'static str),
        #[error("audit trail unavailable")]
        Audit,
    }

    impl Classify for AppError {
        fn kind(&self) -> ErrorKind {
            match self {
                AppError::Transaction(e) => e.kind(),
                AppError::Storage(e) => e.kind(),
                AppError::Validation(_) => ErrorKind::from_static("app.validation"),
                AppError::Audit => ErrorKind::from_static("app.audit"),
            }
        }
    }

    type Ctx = TransactionContext<MemoryProvider>;

    fn setup() -> (MemoryProvider, Ctx) {
        init_tracing();
        let provider = MemoryProvider::default();
        let ctx = TransactionManager::single(provider.clone()).context();
        (provider, ctx)
    }

    fn main_backend() -> BackendName {
        BackendName::default_name()
    }

    fn def(operation: &str, mode: PropagationMode) -> TransactionDefinition {
        TransactionDefinition::new(operation).with_mode(mode)
    }

    fn users() -> TableName {
        TableName::new("users").unwrap()
    }

    fn insert(ctx: &Ctx, key: &str) -> Result<(), AppError> {
        let row = Row::from_value(RowKey::new(key).unwrap(), json!({ "key": key }))?;
        ctx.resource(&main_backend())?.insert(&users(), row)?;
        Ok(())
    }

    fn persisted(provider: &MemoryProvider) -> Vec<String> {
        provider
            .store()
            .session()
            .scan(&users())
            .unwrap()
            .into_iter()
            .map(|row| row.key.as_str().to_string())
            .collect()
    }

    fn current_id(ctx: &Ctx) -> ulid::Ulid {
        ctx.current(&main_backend()).unwrap().id()
    }

    fn nest_required(ctx: &Ctx, remaining: usize, seen: &mut Vec<(ulid::Ulid, usize)>) -> Result<(), AppError> {
        ctx.run(&def("nest", PropagationMode::Required), || {
            seen.push((current_id(ctx), ctx.depth(&main_backend())));
            if remaining > 0 {
                nest_required(ctx, remaining - 1, seen)?;
            }
            Ok(())
        })
    }

    #[test]
    fn test_required_nesting_reuses_outer_frame() {
        for depth in 1..=5 {
            let (provider, ctx) = setup();
            let mut seen = Vec::new();
            nest_required(&ctx, depth, &mut seen).unwrap();

            assert_eq!(seen.len(), depth + 1);
            assert!(seen.iter().all(|(id, d)| *id == seen[0].0 && *d == 1));
            assert_eq!(ctx.depth(&main_backend()), 0);
            assert_eq!(provider.open_sessions(), 0);
        }
    }

    #[test]
    fn test_required_nested_failure_rolls_back_both_rows() {
        let (provider, ctx) = setup();

        let result: Result<(), AppError> = ctx.run(&def("a", PropagationMode::Required), || {
            insert(&ctx, "a1")?;
            ctx.run(&def("b", PropagationMode::Required), || {
                insert(&ctx, "b1")?;
                Err(AppError::Validation("b rejected"))
            })
        });

        assert!(matches!(result, Err(AppError::Validation("b rejected"))));
        assert!(persisted(&provider).is_empty());
    }

    #[test]
    fn test_required_commits_on_success() {
        let (provider, ctx) = setup();
        ctx.run(&def("a", PropagationMode::Required), || {
            insert(&ctx, "a1")?;
            assert!(ctx.is_transaction_active(&main_backend()));
            // buffered until the outermost call returns
            assert!(persisted(&provider).is_empty());
            Ok::<_, AppError>(())
        })
        .unwrap();

        assert_eq!(persisted(&provider), vec!["a1"]);
    }

    #[test]
    fn test_mandatory_without_transaction_fails_before_work() {
        let (provider, ctx) = setup();
        let mut ran = false;

        let result: Result<(), AppError> = ctx.run(&def("billing::charge", PropagationMode::Mandatory), || {
            ran = true;
            insert(&ctx, "x")
        });

        match result {
            Err(AppError::Transaction(err @ TransactionError::TransactionRequired { .. })) => {
                assert_eq!(err.to_string(), "billing::charge called outside a transaction context");
                assert!(!err.is_retryable());
            }
            other => panic!("expected TransactionRequired, got {:?}", other),
        }
        assert!(!ran);
        assert!(persisted(&provider).is_empty());
        assert_eq!(provider.open_sessions(), 0);
    }

    #[test]
    fn test_mandatory_joins_running_transaction() {
        let (_provider, ctx) = setup();
        ctx.run(&def("outer", PropagationMode::Required), || {
            let outer = current_id(&ctx);
            ctx.run(&def("inner", PropagationMode::Mandatory), || {
                assert_eq!(current_id(&ctx), outer);
                assert_eq!(ctx.depth(&main_backend()), 1);
                Ok::<_, AppError>(())
            })
        })
        .unwrap();
    }

    #[test]
    fn test_never_without_transaction_creates_no_frame() {
        let (provider, ctx) = setup();
        ctx.run(&def("a", PropagationMode::Never), || {
            assert_eq!(ctx.depth(&main_backend()), 0);
            assert!(ctx.current(&main_backend()).is_none());
            assert!(!ctx.is_transaction_active(&main_backend()));
            Ok::<_, AppError>(())
        })
        .unwrap();
        assert_eq!(provider.open_sessions(), 0);
    }

    #[test]
    fn test_never_inside_required_fails_and_outer_continues() {
        let (provider, ctx) = setup();

        ctx.run(&def("a", PropagationMode::Required), || {
            insert(&ctx, "a1")?;
            let denied: Result<(), AppError> = ctx.run(&def("b", PropagationMode::Never), || insert(&ctx, "b1"));
            match denied {
                Err(AppError::Transaction(err)) => {
                    assert!(err.is_contract_violation());
                    assert_eq!(err.to_string(), "b called inside a transaction context");
                }
                other => panic!("expected TransactionNotAllowed, got {:?}", other),
            }
            insert(&ctx, "a2")
        })
        .unwrap();

        assert_eq!(persisted(&provider), vec!["a1", "a2"]);
    }

    #[test]
    fn test_requires_new_leaves_outer_frame_intact() {
        let (_provider, ctx) = setup();

        ctx.run(&def("outer", PropagationMode::Required), || {
            let outer = current_id(&ctx);

            let inner = ctx.run(&def("ok", PropagationMode::RequiresNew), || {
                assert_eq!(ctx.depth(&main_backend()), 2);
                Ok::<_, AppError>(current_id(&ctx))
            })?;
            assert_ne!(inner, outer);
            assert_eq!(current_id(&ctx), outer);

            let failed: Result<(), AppError> =
                ctx.run(&def("fails", PropagationMode::RequiresNew), || Err(AppError::Audit));
            assert!(failed.is_err());
            assert_eq!(current_id(&ctx), outer);
            assert!(ctx.is_transaction_active(&main_backend()));
            assert_eq!(ctx.depth(&main_backend()), 1);
            Ok::<_, AppError>(())
        })
        .unwrap();
    }

    #[test]
    fn test_requires_new_failure_rolls_back_only_inner() {
        let (provider, ctx) = setup();

        ctx.run(&def("a", PropagationMode::Required), || {
            insert(&ctx, "a1")?;
            let inner: Result<(), AppError> = ctx.run(&def("b", PropagationMode::RequiresNew), || {
                insert(&ctx, "b1")?;
                Err(AppError::Validation("b rejected"))
            });
            assert!(inner.is_err());
            Ok::<_, AppError>(())
        })
        .unwrap();

        assert_eq!(persisted(&provider), vec!["a1"]);
    }

    #[test]
    fn test_requires_new_commits_independently() {
        let (provider, ctx) = setup();

        let result: Result<(), AppError> = ctx.run(&def("a", PropagationMode::Required), || {
            insert(&ctx, "a1")?;
            ctx.run(&def("b", PropagationMode::RequiresNew), || insert(&ctx, "b1"))?;
            assert_eq!(persisted(&provider), vec!["b1"]);
            Err(AppError::Validation("a rejected"))
        });

        assert!(result.is_err());
        assert_eq!(persisted(&provider), vec!["b1"]);
    }

    #[test]
    fn test_outer_commit_conflicts_with_requires_new_insert() {
        let (provider, ctx) = setup();

        let result: Result<(), AppError> = ctx.run(&def("a", PropagationMode::Required), || {
            insert(&ctx, "k")?;
            ctx.run(&def("b", PropagationMode::RequiresNew), || insert(&ctx, "k"))?;
            Ok(())
        });

        match result {
            Err(AppError::Transaction(err)) => {
                assert!(err.is_retryable());
                assert!(matches!(err, TransactionError::Resource(ResourceError::Conflict { .. })));
            }
            other => panic!("expected conflict, got {:?}", other),
        }
        assert_eq!(persisted(&provider), vec!["k"]);
        assert_eq!(ctx.depth(&main_backend()), 0);
    }

    #[test]
    fn test_not_supported_suspends_and_resumes() {
        let (provider, ctx) = setup();

        let result: Result<(), AppError> = ctx.run(&def("a", PropagationMode::Required), || {
            let outer = current_id(&ctx);
            insert(&ctx, "a1")?;

            ctx.run(&def("b", PropagationMode::NotSupported), || {
                assert!(!ctx.is_transaction_active(&main_backend()));
                assert_eq!(ctx.depth(&main_backend()), 2);
                assert_ne!(current_id(&ctx), outer);
                // outside the transaction: written straight through
                insert(&ctx, "b1")?;
                assert_eq!(persisted(&provider), vec!["b1"]);
                Ok::<_, AppError>(())
            })?;

            assert_eq!(current_id(&ctx), outer);
            assert!(ctx.is_transaction_active(&main_backend()));
            Err(AppError::Validation("a rejected"))
        });

        assert!(result.is_err());
        assert_eq!(persisted(&provider), vec!["b1"]);
        assert_eq!(provider.open_sessions(), 0);
    }

    #[test]
    fn test_not_supported_without_transaction_runs_as_is() {
        let (_provider, ctx) = setup();
        ctx.run(&def("a", PropagationMode::NotSupported), || {
            assert_eq!(ctx.depth(&main_backend()), 0);
            Ok::<_, AppError>(())
        })
        .unwrap();
    }

    #[test]
    fn test_never_inside_not_supported_is_allowed() {
        let (_provider, ctx) = setup();
        ctx.run(&def("a", PropagationMode::Required), || {
            ctx.run(&def("b", PropagationMode::NotSupported), || {
                ctx.run(&def("c", PropagationMode::Never), || {
                    assert_eq!(ctx.depth(&main_backend()), 2);
                    Ok::<_, AppError>(())
                })
            })
        })
        .unwrap();
    }

    #[test]
    fn test_required_inside_not_supported_begins_new_transaction() {
        let (provider, ctx) = setup();

        let result: Result<(), AppError> = ctx.run(&def("a", PropagationMode::Required), || {
            insert(&ctx, "a1")?;
            ctx.run(&def("b", PropagationMode::NotSupported), || {
                ctx.run(&def("c", PropagationMode::Required), || {
                    assert_eq!(ctx.depth(&main_backend()), 3);
                    assert!(ctx.is_transaction_active(&main_backend()));
                    insert(&ctx, "c1")
                })
            })?;
            Err(AppError::Audit)
        });

        assert!(result.is_err());
        assert_eq!(persisted(&provider), vec!["c1"]);
    }

    #[test]
    fn test_supports_joins_or_runs_without_transaction() {
        let (_provider, ctx) = setup();

        ctx.run(&def("alone", PropagationMode::Supports), || {
            assert!(ctx.current(&main_backend()).is_none());
            Ok::<_, AppError>(())
        })
        .unwrap();

        ctx.run(&def("outer", PropagationMode::Required), || {
            let outer = current_id(&ctx);
            ctx.run(&def("inner", PropagationMode::Supports), || {
                assert_eq!(current_id(&ctx), outer);
                Ok::<_, AppError>(())
            })
        })
        .unwrap();
    }

    #[test]
    fn test_default_directive_rolls_back_any_error() {
        let (provider, ctx) = setup();
        let result: Result<(), AppError> = ctx.run(&def("a", PropagationMode::Required), || {
            insert(&ctx, "a1")?;
            Err(AppError::Audit)
        });
        assert!(matches!(result, Err(AppError::Audit)));
        assert!(persisted(&provider).is_empty());
    }

    #[test]
    fn test_no_rollback_on_commits_and_reraises() {
        let (provider, ctx) = setup();
        let definition = def("a", PropagationMode::Required)
            .rollback_on("app.audit")
            .no_rollback_on("app.audit");

        let result: Result<(), AppError> = ctx.run(&definition, || {
            insert(&ctx, "a1")?;
            Err(AppError::Audit)
        });

        assert!(matches!(result, Err(AppError::Audit)));
        assert_eq!(persisted(&provider), vec!["a1"]);
    }

    #[test]
    fn test_rollback_on_ignores_unlisted_kinds() {
        let (provider, ctx) = setup();
        let definition = def("a", PropagationMode::Required).rollback_on("storage");

        let result: Result<(), AppError> = ctx.run(&definition, || {
            insert(&ctx, "a1")?;
            Err(AppError::Validation("kept"))
        });
        assert!(result.is_err());
        assert_eq!(persisted(&provider), vec!["a1"]);

        let result: Result<(), AppError> = ctx.run(&definition, || {
            insert(&ctx, "a2")?;
            insert(&ctx, "a1")
        });
        assert!(matches!(result, Err(AppError::Storage(StorageError::RowAlreadyExists { .. }))));
        assert_eq!(persisted(&provider), vec!["a1"]);
    }

    #[test]
    fn test_panic_releases_every_frame() {
        let (provider, ctx) = setup();

        let unwound = catch_unwind(AssertUnwindSafe(|| {
            ctx.run(&def("a", PropagationMode::Required), || {
                insert(&ctx, "a1")?;
                ctx.run(&def("b", PropagationMode::RequiresNew), || -> Result<(), AppError> {
                    insert(&ctx, "b1")?;
                    panic!("boom");
                })
            })
        }));

        assert!(unwound.is_err());
        assert_eq!(ctx.depth(&main_backend()), 0);
        assert_eq!(provider.open_sessions(), 0);
        assert!(persisted(&provider).is_empty());

        // the context stays usable
        ctx.run(&def("c", PropagationMode::Required), || insert(&ctx, "c1"))
            .unwrap();
        assert_eq!(persisted(&provider), vec!["c1"]);
    }

    #[test]
    fn test_backends_have_independent_stacks() {
        init_tracing();
        let orders = BackendName::new("orders").unwrap();
        let audit = BackendName::new("audit").unwrap();
        let manager = TransactionManager::new([
            (orders.clone(), MemoryProvider::default()),
            (audit.clone(), MemoryProvider::default()),
        ]);
        let ctx = manager.context();

        ctx.run(&def("place", PropagationMode::Required).on_backend(orders.clone()), || {
            assert!(!ctx.is_transaction_active(&audit));
            ctx.run(&def("record", PropagationMode::Mandatory).on_backend(audit.clone()), || {
                Ok::<_, AppError>(())
            })
            .unwrap_err();

            ctx.run(&def("record", PropagationMode::Required).on_backend(audit.clone()), || {
                assert_eq!(ctx.depth(&orders), 1);
                assert_eq!(ctx.depth(&audit), 1);
                Ok::<_, AppError>(())
            })
        })
        .unwrap();
    }

    #[test]
    fn test_unknown_backend() {
        let (_provider, ctx) = setup();
        let definition = def("a", PropagationMode::Supports).on_backend(BackendName::new("nope").unwrap());

        let result: Result<(), TransactionError> = ctx.run(&definition, || Ok(()));
        assert!(matches!(
            result,
            Err(TransactionError::Resource(ResourceError::UnknownBackend(_)))
        ));
    }

    #[test]
    fn test_detached_resource_is_reused_and_released() {
        let (provider, ctx) = setup();

        let first = ctx.resource(&main_backend()).unwrap();
        let second = ctx.resource(&main_backend()).unwrap();
        assert_eq!(first.id(), second.id());
        assert!(!first.is_in_transaction());
        assert_eq!(provider.open_sessions(), 1);

        drop(ctx);
        assert_eq!(provider.open_sessions(), 0);
    }

    #[test]
    fn test_transaction_error_as_work_error() {
        let (provider, ctx) = setup();
        let result: TransactionResult<()> = ctx.run(&def("a", PropagationMode::Required), || {
            let row = Row::from_value(RowKey::new("t1").unwrap(), json!({}))?;
            ctx.resource(&main_backend())?.insert(&users(), row)?;
            Ok(())
        });
        result.unwrap();
        assert_eq!(persisted(&provider), vec!["t1"]);
    }
}
