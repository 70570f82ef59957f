//! Git repository wrapper for the Git document backend.
//!
//! Layout of every commit tree:
//!
//! ```text
//! <root>
//! ├── users/
//! │   ├── 01hv...json
//! │   └── 01hw...json
//! └── orders/
//!     └── ...
//! ```
//!
//! Every write produces one commit. Writes outside a transaction land on
//! `main` directly; transactional writes accumulate on a `tx/{id}` branch
//! until the transaction is merged back or abandoned.

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use git2::{ErrorCode, FileMode, ObjectType, Repository, Tree};
use parking_lot::Mutex;
use tracing::{debug, info, warn};

use crate::storage::documents::RowChange;
use crate::storage::error::{StorageError, StorageResult};
use crate::storage::refs::{tx_ref, RefManager, MAIN_REF};
use crate::storage::row::{deserialize_row, serialize_row, Row};
use crate::storage::types::{CommitId, GitSignature, RowKey, TableName};

/// Result of folding a transaction branch back into `main`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MergeOutcome {
    /// The transaction wrote nothing.
    Unchanged,
    /// `main` had not moved; it now points at the transaction head.
    FastForward(CommitId),
    /// `main` moved; a merge commit joins both histories.
    Merged(CommitId),
    /// Both sides changed the same rows. `main` is untouched.
    Conflict(Vec<PathBuf>),
}

/// Thread-safe handle to a Git-backed document store.
///
/// Clone to share; all clones serialize on one repository lock.
#[derive(Clone)]
pub struct GitRepository {
    inner: Arc<GitRepositoryInner>,
}

struct GitRepositoryInner {
    repo: Mutex<Repository>,
    path: PathBuf,
    signature: GitSignature,
    /// Transactions begun through this handle and not yet abandoned.
    live: Mutex<BTreeSet<String>>,
}

impl GitRepository {
    pub fn open(path: impl AsRef<Path>, signature: GitSignature) -> StorageResult<Self> {
        let path = path.as_ref();
        let repo = Repository::open(path)
            .map_err(|_| StorageError::NotInitialized(path.to_path_buf()))?;
        Ok(Self::wrap(repo, path, signature))
    }

    /// Initialize a repository whose `main` branch holds one empty commit.
    pub fn init(path: impl AsRef<Path>, signature: GitSignature) -> StorageResult<Self> {
        let path = path.as_ref();
        let repo = Repository::init(path)?;
        {
            let sig = signature.to_git2_signature()?;
            let tree_id = repo.treebuilder(None)?.write()?;
            let tree = repo.find_tree(tree_id)?;
            repo.commit(Some(MAIN_REF), &sig, &sig, "initialize document store", &tree, &[])?;
            repo.set_head(MAIN_REF)?;
        }
        debug!(path = %path.display(), "initialized git document store");
        Ok(Self::wrap(repo, path, signature))
    }

    pub fn open_or_init(path: impl AsRef<Path>, signature: GitSignature) -> StorageResult<Self> {
        let path = path.as_ref();
        if path.join(".git").exists() {
            Self::open(path, signature)
        } else {
            Self::init(path, signature)
        }
    }

    fn wrap(repo: Repository, path: &Path, signature: GitSignature) -> Self {
        Self {
            inner: Arc::new(GitRepositoryInner {
                repo: Mutex::new(repo),
                path: path.to_path_buf(),
                signature,
                live: Mutex::new(BTreeSet::new()),
            }),
        }
    }

    pub fn path(&self) -> &Path {
        &self.inner.path
    }

    fn with_repo<F, T>(&self, f: F) -> StorageResult<T>
    where
        F: FnOnce(&Repository) -> StorageResult<T>,
    {
        let repo = self.inner.repo.lock();
        f(&repo)
    }

    // ==================== Reads ====================

    /// Tip of `main`.
    pub fn head(&self) -> StorageResult<CommitId> {
        self.with_repo(|repo| RefManager::resolve(repo, MAIN_REF))
    }

    pub fn read_row(&self, table: &TableName, key: &RowKey, at: CommitId) -> StorageResult<Option<Row>> {
        self.with_repo(|repo| {
            let tree = tree_at(repo, at)?;
            read_row_in(repo, &tree, table, key)
        })
    }

    pub fn scan_table(&self, table: &TableName, at: CommitId) -> StorageResult<Vec<Row>> {
        self.with_repo(|repo| {
            let tree = tree_at(repo, at)?;
            let Some(entry) = tree.get_name(table.as_str()) else {
                return Ok(Vec::new());
            };
            if entry.kind() != Some(ObjectType::Tree) {
                return Ok(Vec::new());
            }

            let table_tree = repo.find_tree(entry.id())?;
            let mut rows = Vec::with_capacity(table_tree.len());
            for entry in table_tree.iter() {
                let Some(stem) = entry.name().and_then(|n| n.strip_suffix(".json")) else {
                    continue;
                };
                let key = RowKey::new(stem)?;
                let blob = repo.find_blob(entry.id())?;
                rows.push(deserialize_row(blob.content(), &key)?);
            }
            rows.sort_by(|a, b| a.key.cmp(&b.key));
            Ok(rows)
        })
    }

    /// Summaries of the most recent commits on `main`, newest first.
    pub fn log(&self, limit: usize) -> StorageResult<Vec<String>> {
        self.with_repo(|repo| {
            let head = RefManager::resolve(repo, MAIN_REF)?;
            let mut walk = repo.revwalk()?;
            walk.push(head.raw())?;

            let mut summaries = Vec::new();
            for oid in walk.take(limit) {
                let commit = repo.find_commit(oid?)?;
                summaries.push(commit.summary().unwrap_or_default().to_string());
            }
            Ok(summaries)
        })
    }

    // ==================== Writes ====================

    /// Apply `change` directly on `main`.
    pub fn commit_to_main(&self, table: &TableName, change: RowChange) -> StorageResult<CommitId> {
        self.with_repo(|repo| {
            let head = RefManager::resolve(repo, MAIN_REF)?;
            let next = write_change(repo, &self.inner.signature, head, table, change, None)?;
            RefManager::update_if_unchanged(repo, MAIN_REF, head, next)?;
            Ok(next)
        })
    }

    /// Create the `tx/{tx_id}` branch at the tip of `main`, returning the base.
    pub fn begin_transaction(&self, tx_id: &str) -> StorageResult<CommitId> {
        let base = self.with_repo(|repo| {
            let base = RefManager::resolve(repo, MAIN_REF)?;
            RefManager::create(repo, &tx_ref(tx_id), base)?;
            Ok(base)
        })?;
        self.inner.live.lock().insert(tx_id.to_string());
        debug!(tx_id, base = %base.short(), "transaction branch created");
        Ok(base)
    }

    pub fn transaction_head(&self, tx_id: &str) -> StorageResult<CommitId> {
        self.with_repo(|repo| RefManager::resolve(repo, &tx_ref(tx_id)))
    }

    /// Apply `change` on the transaction branch.
    pub fn commit_to_transaction(
        &self,
        tx_id: &str,
        table: &TableName,
        change: RowChange,
    ) -> StorageResult<CommitId> {
        self.with_repo(|repo| {
            let branch = tx_ref(tx_id);
            let head = RefManager::resolve(repo, &branch)?;
            let next = write_change(repo, &self.inner.signature, head, table, change, Some(tx_id))?;
            RefManager::update_if_unchanged(repo, &branch, head, next)?;
            Ok(next)
        })
    }

    /// Fold the transaction branch into `main`.
    ///
    /// Fast-forwards when `main` has not moved since `base`. Otherwise the
    /// trees are merged three-way, provided the two sides touched disjoint
    /// rows. The branch itself is left in place.
    pub fn merge_transaction(&self, tx_id: &str, base: CommitId) -> StorageResult<MergeOutcome> {
        self.with_repo(|repo| {
            let tx_head = RefManager::resolve(repo, &tx_ref(tx_id))?;
            if tx_head == base {
                return Ok(MergeOutcome::Unchanged);
            }

            let main_head = RefManager::resolve(repo, MAIN_REF)?;
            if main_head == base {
                RefManager::update_if_unchanged(repo, MAIN_REF, main_head, tx_head)?;
                return Ok(MergeOutcome::FastForward(tx_head));
            }

            let base_tree = tree_at(repo, base)?;
            let main_tree = tree_at(repo, main_head)?;
            let tx_tree = tree_at(repo, tx_head)?;

            let ours = changed_paths(repo, &base_tree, &main_tree)?;
            let theirs = changed_paths(repo, &base_tree, &tx_tree)?;
            let overlap: Vec<PathBuf> = ours.intersection(&theirs).cloned().collect();
            if !overlap.is_empty() {
                return Ok(MergeOutcome::Conflict(overlap));
            }

            let mut index = repo.merge_trees(&base_tree, &main_tree, &tx_tree, None)?;
            if index.has_conflicts() {
                let mut paths = Vec::new();
                for conflict in index.conflicts()? {
                    let conflict = conflict?;
                    if let Some(entry) = conflict.our.or(conflict.their) {
                        paths.push(PathBuf::from(String::from_utf8_lossy(&entry.path).into_owned()));
                    }
                }
                return Ok(MergeOutcome::Conflict(paths));
            }

            let merged_tree = repo.find_tree(index.write_tree_to(repo)?)?;
            let sig = self.inner.signature.to_git2_signature()?;
            let main_commit = repo.find_commit(main_head.raw())?;
            let tx_commit = repo.find_commit(tx_head.raw())?;
            let merged = CommitId(repo.commit(
                None,
                &sig,
                &sig,
                &format!("merge transaction {}", tx_id),
                &merged_tree,
                &[&main_commit, &tx_commit],
            )?);
            RefManager::update_if_unchanged(repo, MAIN_REF, main_head, merged)?;
            Ok(MergeOutcome::Merged(merged))
        })
    }

    /// Delete the transaction branch, discarding its commits.
    pub fn abandon_transaction(&self, tx_id: &str) -> StorageResult<()> {
        self.inner.live.lock().remove(tx_id);
        self.with_repo(|repo| RefManager::delete(repo, &tx_ref(tx_id)))
    }

    pub fn transaction_ids(&self) -> StorageResult<Vec<String>> {
        self.with_repo(RefManager::list_transactions)
    }

    /// Remove `tx/*` branches left behind by crashed processes.
    ///
    /// Branches of transactions still running on this handle are kept.
    pub fn cleanup_abandoned(&self) -> StorageResult<usize> {
        let live = self.inner.live.lock().clone();
        let cleaned = self.with_repo(|repo| {
            let mut cleaned = 0;
            for tx_id in RefManager::list_transactions(repo)? {
                if live.contains(&tx_id) {
                    continue;
                }
                match RefManager::delete(repo, &tx_ref(&tx_id)) {
                    Ok(()) => cleaned += 1,
                    Err(e) => warn!(tx_id = %tx_id, error = %e, "failed to remove abandoned transaction branch"),
                }
            }
            Ok(cleaned)
        })?;
        if cleaned > 0 {
            info!(cleaned, "removed abandoned transaction branches");
        }
        Ok(cleaned)
    }
}

impl std::fmt::Debug for GitRepository {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GitRepository")
            .field("path", &self.inner.path)
            .finish()
    }
}

fn tree_at<'r>(repo: &'r Repository, at: CommitId) -> StorageResult<Tree<'r>> {
    Ok(repo.find_commit(at.raw())?.tree()?)
}

fn read_row_in(repo: &Repository, tree: &Tree<'_>, table: &TableName, key: &RowKey) -> StorageResult<Option<Row>> {
    let path = format!("{}/{}", table, key.file_name());
    let entry = match tree.get_path(Path::new(&path)) {
        Ok(entry) => entry,
        Err(e) if e.code() == ErrorCode::NotFound => return Ok(None),
        Err(e) => return Err(e.into()),
    };
    let blob = repo.find_blob(entry.id())?;
    Ok(Some(deserialize_row(blob.content(), key)?))
}

/// Write one row change on top of `parent`, returning the detached commit.
fn write_change(
    repo: &Repository,
    signature: &GitSignature,
    parent: CommitId,
    table: &TableName,
    change: RowChange,
    tx_id: Option<&str>,
) -> StorageResult<CommitId> {
    let root = tree_at(repo, parent)?;
    let key = change.key().clone();
    let verb = match &change {
        RowChange::Insert(_) => "insert",
        RowChange::Update(_) => "update",
        RowChange::Upsert(_) => "upsert",
        RowChange::Delete(_) => "delete",
    };

    let existing = read_row_in(repo, &root, table, &key)?;
    let next = change.resolve(table, existing.as_ref())?;

    let table_tree = match root.get_name(table.as_str()) {
        Some(entry) if entry.kind() == Some(ObjectType::Tree) => Some(repo.find_tree(entry.id())?),
        _ => None,
    };
    let mut table_builder = repo.treebuilder(table_tree.as_ref())?;
    match next {
        Some(row) => {
            let blob = repo.blob(&serialize_row(&row)?)?;
            table_builder.insert(key.file_name(), blob, FileMode::Blob.into())?;
        }
        None => table_builder.remove(key.file_name())?,
    }

    let mut root_builder = repo.treebuilder(Some(&root))?;
    if table_builder.len() == 0 {
        if root_builder.get(table.as_str())?.is_some() {
            root_builder.remove(table.as_str())?;
        }
    } else {
        let table_tree_id = table_builder.write()?;
        root_builder.insert(table.as_str(), table_tree_id, FileMode::Tree.into())?;
    }
    let new_root = repo.find_tree(root_builder.write()?)?;

    let mut message = format!("{} {}/{}", verb, table, key);
    if let Some(tx_id) = tx_id {
        message.push_str(&format!("\n\nTransaction: {}", tx_id));
    }

    let sig = signature.to_git2_signature()?;
    let parent_commit = repo.find_commit(parent.raw())?;
    let id = repo.commit(None, &sig, &sig, &message, &new_root, &[&parent_commit])?;
    Ok(CommitId(id))
}

fn changed_paths(repo: &Repository, from: &Tree<'_>, to: &Tree<'_>) -> StorageResult<BTreeSet<PathBuf>> {
    let diff = repo.diff_tree_to_tree(Some(from), Some(to), None)?;
    let mut paths = BTreeSet::new();
    for delta in diff.deltas() {
        if let Some(path) = delta.new_file().path().or_else(|| delta.old_file().path()) {
            paths.insert(path.to_path_buf());
        }
    }
    Ok(paths)
}
