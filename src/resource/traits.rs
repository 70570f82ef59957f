use crate::resource::error::ResourceResult;

/// The verdict a unit of work hands back to a native transaction.
///
/// The carried value crosses the transaction boundary either way; only the
/// persistence outcome differs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Completion<T> {
    Commit(T),
    Rollback(T),
}

impl<T> Completion<T> {
    pub fn is_commit(&self) -> bool {
        matches!(self, Completion::Commit(_))
    }

    pub fn into_inner(self) -> T {
        match self {
            Completion::Commit(value) | Completion::Rollback(value) => value,
        }
    }
}

/// A live backend session able to enter and leave a transactional state.
///
/// Handles are cheap clones of the same session. A resource is owned by the
/// thread that acquired it for as long as it sits on a context stack.
pub trait Resource: Clone {
    fn is_in_transaction(&self) -> bool;

    /// Run `body` inside a native transaction.
    ///
    /// `body` receives the handle representing the in-flight transaction,
    /// which may be a different session than `self`. The backend commits on
    /// [`Completion::Commit`] and rolls back on [`Completion::Rollback`]. If
    /// `body` unwinds, nothing may be committed.
    ///
    /// Returns `Err` only when the demarcation itself fails (begin, commit or
    /// rollback); the value produced by `body` is lost in that case.
    fn run_in_transaction<T, F>(&self, body: F) -> ResourceResult<T>
    where
        F: FnOnce(&Self) -> Completion<T>;
}

/// Creates resources bound to one named backend.
pub trait ResourceProvider {
    type Resource: Resource;

    /// Open a fresh, non-transactional resource.
    fn acquire(&self) -> ResourceResult<Self::Resource>;

    /// Give back a resource previously returned by [`acquire`](Self::acquire).
    fn release(&self, resource: Self::Resource);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_completion_into_inner() {
        assert!(Completion::Commit(1).is_commit());
        assert!(!Completion::Rollback(1).is_commit());
        assert_eq!(Completion::Rollback("x").into_inner(), "x");
    }
}
