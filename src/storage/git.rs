//! Git-backed sessions.
//!
//! A [`GitSession`] outside a transaction commits every write straight to
//! `main`. Inside a transaction it writes to its own `tx/{id}` branch and
//! reads from that branch's head, so it sees its own writes and nobody
//! else's until commit.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use tracing::{debug, warn};
use ulid::Ulid;

use crate::resource::{Completion, Resource, ResourceError, ResourceProvider, ResourceResult};
use crate::storage::documents::{Documents, RowChange};
use crate::storage::error::StorageResult;
use crate::storage::repository::{GitRepository, MergeOutcome};
use crate::storage::row::Row;
use crate::storage::types::{CommitId, RowKey, TableName};

#[derive(Debug)]
struct GitTransaction {
    id: String,
    base: CommitId,
}

/// A session on a [`GitRepository`].
#[derive(Debug, Clone)]
pub struct GitSession {
    id: Ulid,
    repo: GitRepository,
    tx: Option<Arc<GitTransaction>>,
}

impl GitSession {
    pub fn new(repo: GitRepository) -> Self {
        Self {
            id: Ulid::new(),
            repo,
            tx: None,
        }
    }

    pub fn id(&self) -> Ulid {
        self.id
    }

    pub fn transaction_id(&self) -> Option<&str> {
        self.tx.as_ref().map(|tx| tx.id.as_str())
    }

    /// Commit of `main` the running transaction branched from.
    pub fn transaction_base(&self) -> Option<CommitId> {
        self.tx.as_ref().map(|tx| tx.base)
    }

    pub fn repository(&self) -> &GitRepository {
        &self.repo
    }

    /// Commit this session reads from.
    fn snapshot(&self) -> StorageResult<CommitId> {
        match &self.tx {
            Some(tx) => self.repo.transaction_head(&tx.id),
            None => self.repo.head(),
        }
    }
}

impl Documents for GitSession {
    fn get(&self, table: &TableName, key: &RowKey) -> StorageResult<Option<Row>> {
        self.repo.read_row(table, key, self.snapshot()?)
    }

    fn scan(&self, table: &TableName) -> StorageResult<Vec<Row>> {
        self.repo.scan_table(table, self.snapshot()?)
    }

    fn apply(&self, table: &TableName, change: RowChange) -> StorageResult<()> {
        match &self.tx {
            Some(tx) => self.repo.commit_to_transaction(&tx.id, table, change)?,
            None => self.repo.commit_to_main(table, change)?,
        };
        Ok(())
    }
}

/// Deletes the transaction branch when dropped, including during unwind.
struct BranchGuard<'a> {
    repo: &'a GitRepository,
    tx_id: &'a str,
}

impl Drop for BranchGuard<'_> {
    fn drop(&mut self) {
        if let Err(e) = self.repo.abandon_transaction(self.tx_id) {
            warn!(tx_id = %self.tx_id, error = %e, "failed to delete transaction branch");
        }
    }
}

impl Resource for GitSession {
    fn is_in_transaction(&self) -> bool {
        self.tx.is_some()
    }

    fn run_in_transaction<T, F>(&self, body: F) -> ResourceResult<T>
    where
        F: FnOnce(&Self) -> Completion<T>,
    {
        if self.tx.is_some() {
            return Err(ResourceError::NestedTransaction);
        }

        let tx_id = Ulid::new().to_string().to_lowercase();
        let base = self.repo.begin_transaction(&tx_id)?;
        let _branch = BranchGuard {
            repo: &self.repo,
            tx_id: &tx_id,
        };

        let handle = GitSession {
            id: self.id,
            repo: self.repo.clone(),
            tx: Some(Arc::new(GitTransaction {
                id: tx_id.clone(),
                base,
            })),
        };
        let completion = body(&handle);
        drop(handle);

        if !completion.is_commit() {
            debug!(tx_id = %tx_id, "git transaction rolled back");
            return Ok(completion.into_inner());
        }
        let value = completion.into_inner();

        match self.repo.merge_transaction(&tx_id, base)? {
            MergeOutcome::Conflict(paths) => {
                warn!(tx_id = %tx_id, conflicts = paths.len(), "git transaction conflicts with main");
                Err(ResourceError::Conflict {
                    tx_id: tx_id.clone(),
                    paths,
                })
            }
            outcome => {
                debug!(tx_id = %tx_id, ?outcome, "git transaction committed");
                Ok(value)
            }
        }
    }
}

/// Hands out sessions on one [`GitRepository`].
#[derive(Debug, Clone)]
pub struct GitProvider {
    repo: GitRepository,
    open: Arc<AtomicUsize>,
}

impl GitProvider {
    pub fn new(repo: GitRepository) -> Self {
        Self {
            repo,
            open: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn repository(&self) -> &GitRepository {
        &self.repo
    }

    pub fn open_sessions(&self) -> usize {
        self.open.load(Ordering::SeqCst)
    }
}

impl ResourceProvider for GitProvider {
    type Resource = GitSession;

    fn acquire(&self) -> ResourceResult<GitSession> {
        self.open.fetch_add(1, Ordering::SeqCst);
        Ok(GitSession::new(self.repo.clone()))
    }

    fn release(&self, resource: GitSession) {
        self.open.fetch_sub(1, Ordering::SeqCst);
        drop(resource);
    }
}
