//! Branch management for the Git backend.
//!
//! `main` holds committed data. Each native transaction works on its own
//! branch named `tx/{transaction_id}`, which makes leftovers easy to find
//! and clean up.

use git2::Repository;

use crate::storage::error::{StorageError, StorageResult};
use crate::storage::types::CommitId;

pub(crate) const MAIN_REF: &str = "refs/heads/main";
const TX_REF_PREFIX: &str = "refs/heads/tx/";

/// Full ref path of a transaction branch.
pub(crate) fn tx_ref(tx_id: &str) -> String {
    format!("{}{}", TX_REF_PREFIX, tx_id)
}

pub(crate) struct RefManager;

impl RefManager {
    pub fn resolve(repo: &Repository, ref_name: &str) -> StorageResult<CommitId> {
        let reference = repo
            .find_reference(ref_name)
            .map_err(|_| StorageError::RefNotFound(ref_name.to_string()))?;
        let commit = reference
            .peel_to_commit()
            .map_err(|_| StorageError::RefNotFound(ref_name.to_string()))?;
        Ok(CommitId(commit.id()))
    }

    pub fn create(repo: &Repository, ref_name: &str, target: CommitId) -> StorageResult<()> {
        repo.reference(ref_name, target.raw(), false, "txscope: begin transaction")?;
        Ok(())
    }

    /// Compare-and-swap update: fails if the ref moved away from `expected`.
    pub fn update_if_unchanged(
        repo: &Repository,
        ref_name: &str,
        expected: CommitId,
        new_target: CommitId,
    ) -> StorageResult<()> {
        let current = Self::resolve(repo, ref_name)?;
        if current != expected {
            return Err(StorageError::ConcurrentModification {
                branch: ref_name.trim_start_matches("refs/heads/").to_string(),
            });
        }
        repo.reference(
            ref_name,
            new_target.raw(),
            true,
            &format!("txscope: advance to {}", new_target.short()),
        )?;
        Ok(())
    }

    pub fn delete(repo: &Repository, ref_name: &str) -> StorageResult<()> {
        let mut reference = repo
            .find_reference(ref_name)
            .map_err(|_| StorageError::RefNotFound(ref_name.to_string()))?;
        reference.delete()?;
        Ok(())
    }

    /// Ids of every `tx/*` branch.
    pub fn list_transactions(repo: &Repository) -> StorageResult<Vec<String>> {
        let mut ids = Vec::new();
        for reference in repo.references_glob(&format!("{}*", TX_REF_PREFIX))? {
            let reference = reference?;
            if let Some(id) = reference
                .name()
                .and_then(|name| name.strip_prefix(TX_REF_PREFIX))
            {
                ids.push(id.to_string());
            }
        }
        Ok(ids)
    }
}
