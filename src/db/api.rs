//! Database API - the entry point wiring configuration, data sources and
//! the transaction engine together.

use thiserror::Error;
use tracing::info;

use crate::db::config::{ConfigError, EngineConfig};
use crate::db::source::DataSource;
use crate::resource::BackendName;
use crate::storage::StorageError;
use crate::transaction::{Classify, ErrorKind, TransactionContext, TransactionError, TransactionManager};

/// Result type for database operations.
pub type DatabaseResult<T> = Result<T, DatabaseError>;

/// Database errors.
#[derive(Debug, Error)]
pub enum DatabaseError {
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("transaction error: {0}")]
    Transaction(#[from] TransactionError),
}

impl DatabaseError {
    pub fn is_retryable(&self) -> bool {
        match self {
            DatabaseError::Storage(e) => e.is_retriable(),
            DatabaseError::Transaction(e) => e.is_retryable(),
            DatabaseError::Config(_) => false,
        }
    }
}

impl Classify for DatabaseError {
    fn kind(&self) -> ErrorKind {
        match self {
            DatabaseError::Config(_) => ErrorKind::from_static("database.config"),
            DatabaseError::Storage(e) => e.kind(),
            DatabaseError::Transaction(e) => e.kind(),
        }
    }
}

/// The main database handle.
///
/// Cheap to clone; every clone shares the same data sources. Each thread
/// takes its own [`TransactionContext`] via [`Database::context`].
#[derive(Debug, Clone)]
pub struct Database {
    config: EngineConfig,
    manager: TransactionManager<DataSource>,
}

impl Database {
    pub fn open(config: EngineConfig) -> DatabaseResult<Self> {
        config.validate()?;

        let mut sources = Vec::with_capacity(config.data_sources.len());
        for (name, source_config) in &config.data_sources {
            let source = DataSource::open(name, source_config)?;
            if config.cleanup_on_open {
                if let Some(repo) = source.git_repository() {
                    repo.cleanup_abandoned()?;
                }
            }
            sources.push((name.clone(), source));
        }

        info!(data_sources = sources.len(), "database opened");
        Ok(Self {
            manager: TransactionManager::new(sources),
            config,
        })
    }

    /// A database with a single in-memory data source named `default`.
    pub fn open_in_memory() -> DatabaseResult<Self> {
        Self::open(EngineConfig::in_memory())
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn manager(&self) -> &TransactionManager<DataSource> {
        &self.manager
    }

    /// Fresh execution context for the calling thread.
    pub fn context(&self) -> TransactionContext<DataSource> {
        self.manager.context()
    }

    pub fn data_source(&self, name: &BackendName) -> Option<&DataSource> {
        self.manager.provider(name).ok()
    }

    /// Remove leftover transaction branches from every Git data source.
    pub fn cleanup_abandoned(&self) -> DatabaseResult<usize> {
        let mut cleaned = 0;
        for name in self.manager.backends() {
            if let Some(repo) = self.data_source(name).and_then(DataSource::git_repository) {
                cleaned += repo.cleanup_abandoned()?;
            }
        }
        Ok(cleaned)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::TempDir;

    use crate::db::config::DataSourceConfig;
    use crate::resource::{ResourceError, ResourceProvider};
    use crate::storage::{Documents, GitRepository, GitSignature, Row, RowKey, TableName};
    use crate::test_support::init_tracing;
    use crate::transaction::{PropagationMode, TransactionDefinition};

    fn archive() -> BackendName {
        BackendName::new("archive").unwrap()
    }

    fn users() -> TableName {
        TableName::new("users").unwrap()
    }

    fn open(dir: &TempDir) -> Database {
        init_tracing();
        let config = EngineConfig::new()
            .with_data_source(BackendName::default_name(), DataSourceConfig::memory())
            .with_data_source(archive(), DataSourceConfig::git(dir.path().join("archive")));
        Database::open(config).unwrap()
    }

    fn required(operation: &str) -> TransactionDefinition {
        TransactionDefinition::new(operation).on_backend(archive())
    }

    fn insert(ctx: &TransactionContext<DataSource>, key: &str) -> DatabaseResult<()> {
        let row = Row::from_value(RowKey::new(key).unwrap(), json!({ "key": key }))?;
        ctx.resource(&archive())?.insert(&users(), row)?;
        Ok(())
    }

    fn persisted(db: &Database) -> Vec<String> {
        let source = db.data_source(&archive()).unwrap();
        let session = source.acquire().unwrap();
        let keys = session
            .scan(&users())
            .unwrap()
            .into_iter()
            .map(|row| row.key.as_str().to_string())
            .collect();
        source.release(session);
        keys
    }

    #[test]
    fn test_open_requires_data_source() {
        assert!(matches!(
            Database::open(EngineConfig::new()),
            Err(DatabaseError::Config(ConfigError::NotConfigured))
        ));
        assert!(Database::open_in_memory().is_ok());
    }

    #[test]
    fn test_git_transaction_commits_to_main() {
        let dir = TempDir::new().unwrap();
        let db = open(&dir);
        let ctx = db.context();

        ctx.run(&required("users::create"), || {
            insert(&ctx, "u1")?;
            insert(&ctx, "u2")?;
            assert!(persisted(&db).is_empty());
            Ok::<_, DatabaseError>(())
        })
        .unwrap();

        assert_eq!(persisted(&db), vec!["u1", "u2"]);
        let repo = db.data_source(&archive()).unwrap().git_repository().unwrap();
        assert!(repo.transaction_ids().unwrap().is_empty());
        assert_eq!(repo.log(2).unwrap(), vec!["insert users/u2", "insert users/u1"]);
    }

    #[test]
    fn test_git_nested_failure_leaves_no_trace() {
        let dir = TempDir::new().unwrap();
        let db = open(&dir);
        let ctx = db.context();
        let repo = db.data_source(&archive()).unwrap().git_repository().unwrap().clone();
        let head = repo.head().unwrap();

        let result: DatabaseResult<()> = ctx.run(&required("a"), || {
            insert(&ctx, "a1")?;
            ctx.run(&required("b"), || {
                insert(&ctx, "b1")?;
                insert(&ctx, "a1")
            })
        });

        assert!(matches!(
            result,
            Err(DatabaseError::Storage(StorageError::RowAlreadyExists { .. }))
        ));
        assert_eq!(repo.head().unwrap(), head);
        assert!(repo.transaction_ids().unwrap().is_empty());
    }

    #[test]
    fn test_git_requires_new_commits_independently() {
        let dir = TempDir::new().unwrap();
        let db = open(&dir);
        let ctx = db.context();

        ctx.run(&required("a"), || {
            insert(&ctx, "a1")?;
            let inner: DatabaseResult<()> = ctx.run(
                &required("b").with_mode(PropagationMode::RequiresNew),
                || {
                    insert(&ctx, "b1")?;
                    Err(StorageError::SchemaViolation("rejected".into()).into())
                },
            );
            assert!(inner.is_err());
            ctx.run(&required("c").with_mode(PropagationMode::RequiresNew), || insert(&ctx, "c1"))
        })
        .unwrap();

        // c1 merged first, a1 merged on top of it
        assert_eq!(persisted(&db), vec!["a1", "c1"]);
    }

    #[test]
    fn test_commit_conflict_is_retryable() {
        let dir = TempDir::new().unwrap();
        let db = open(&dir);
        let ctx = db.context();
        let other = db.context();

        let result = ctx.run(&required("a"), || {
            insert(&ctx, "u1")?;
            insert(&other, "u1")
        });

        match result {
            Err(DatabaseError::Transaction(TransactionError::Resource(ResourceError::Conflict { paths, .. }))) => {
                assert_eq!(paths.len(), 1);
            }
            other => panic!("expected conflict, got {:?}", other),
        }
        assert!(DatabaseError::from(TransactionError::from(ResourceError::Conflict {
            tx_id: "x".into(),
            paths: vec![],
        }))
        .is_retryable());
        assert_eq!(persisted(&db), vec!["u1"]);
    }

    #[test]
    fn test_work_error_wins_over_failed_commit() {
        let dir = TempDir::new().unwrap();
        let db = open(&dir);
        let ctx = db.context();
        let other = db.context();
        let definition = required("a").no_rollback_on("storage.schema_violation");

        let result: DatabaseResult<()> = ctx.run(&definition, || {
            insert(&ctx, "u1")?;
            insert(&other, "u1")?;
            Err(StorageError::SchemaViolation("late failure".into()).into())
        });

        assert!(matches!(
            result,
            Err(DatabaseError::Storage(StorageError::SchemaViolation(_)))
        ));
    }

    #[test]
    fn test_backends_do_not_share_transactions() {
        let dir = TempDir::new().unwrap();
        let db = open(&dir);
        let ctx = db.context();
        let memory = BackendName::default_name();

        ctx.run(&required("archive"), || {
            ctx.run(
                &TransactionDefinition::new("memory").with_mode(PropagationMode::Never),
                || Ok::<_, DatabaseError>(()),
            )?;
            assert!(!ctx.is_transaction_active(&memory));
            assert!(ctx.is_transaction_active(&archive()));
            Ok::<_, DatabaseError>(())
        })
        .unwrap();
    }

    #[test]
    fn test_reopen_keeps_data_and_cleans_branches() {
        let dir = TempDir::new().unwrap();
        {
            let db = open(&dir);
            let ctx = db.context();
            ctx.run(&required("a"), || insert(&ctx, "u1")).unwrap();
        }

        // simulate a transaction interrupted by a crash
        let repo = GitRepository::open(dir.path().join("archive"), GitSignature::default()).unwrap();
        repo.begin_transaction("crashed").unwrap();
        drop(repo);

        let db = open(&dir);
        assert_eq!(persisted(&db), vec!["u1"]);
        let repo = db.data_source(&archive()).unwrap().git_repository().unwrap();
        assert!(repo.transaction_ids().unwrap().is_empty());
        assert_eq!(db.cleanup_abandoned().unwrap(), 0);
    }
}
