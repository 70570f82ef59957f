//! Data sources: one provider type covering both storage backends.

use tracing::info;
use ulid::Ulid;

use crate::db::config::DataSourceConfig;
use crate::resource::{BackendName, Completion, Resource, ResourceProvider, ResourceResult};
use crate::storage::{
    Documents, GitProvider, GitRepository, GitSession, MemoryProvider, MemorySession, Row, RowChange,
    RowKey, StorageResult, TableName,
};

/// A configured backend.
#[derive(Debug, Clone)]
pub enum DataSource {
    Memory(MemoryProvider),
    Git(GitProvider),
}

impl DataSource {
    pub fn open(name: &BackendName, config: &DataSourceConfig) -> StorageResult<Self> {
        match config {
            DataSourceConfig::Memory => {
                info!(data_source = %name, "opened memory data source");
                Ok(DataSource::Memory(MemoryProvider::default()))
            }
            DataSourceConfig::Git {
                path,
                create_if_missing,
                signature,
            } => {
                let repo = if *create_if_missing {
                    GitRepository::open_or_init(path, signature.clone())?
                } else {
                    GitRepository::open(path, signature.clone())?
                };
                info!(data_source = %name, path = %path.display(), "opened git data source");
                Ok(DataSource::Git(GitProvider::new(repo)))
            }
        }
    }

    pub fn open_sessions(&self) -> usize {
        match self {
            DataSource::Memory(provider) => provider.open_sessions(),
            DataSource::Git(provider) => provider.open_sessions(),
        }
    }

    pub fn git_repository(&self) -> Option<&GitRepository> {
        match self {
            DataSource::Git(provider) => Some(provider.repository()),
            DataSource::Memory(_) => None,
        }
    }
}

impl ResourceProvider for DataSource {
    type Resource = Session;

    fn acquire(&self) -> ResourceResult<Session> {
        match self {
            DataSource::Memory(provider) => provider.acquire().map(Session::Memory),
            DataSource::Git(provider) => provider.acquire().map(Session::Git),
        }
    }

    fn release(&self, resource: Session) {
        match (self, resource) {
            (DataSource::Memory(provider), Session::Memory(session)) => provider.release(session),
            (DataSource::Git(provider), Session::Git(session)) => provider.release(session),
            (_, session) => drop(session),
        }
    }
}

/// A session on either backend.
#[derive(Debug, Clone)]
pub enum Session {
    Memory(MemorySession),
    Git(GitSession),
}

impl Session {
    pub fn id(&self) -> Ulid {
        match self {
            Session::Memory(session) => session.id(),
            Session::Git(session) => session.id(),
        }
    }

    pub fn transaction_id(&self) -> Option<String> {
        match self {
            Session::Memory(session) => session.transaction_id().map(|id| id.to_string()),
            Session::Git(session) => session.transaction_id().map(str::to_string),
        }
    }
}

impl Resource for Session {
    fn is_in_transaction(&self) -> bool {
        match self {
            Session::Memory(session) => session.is_in_transaction(),
            Session::Git(session) => session.is_in_transaction(),
        }
    }

    fn run_in_transaction<T, F>(&self, body: F) -> ResourceResult<T>
    where
        F: FnOnce(&Self) -> Completion<T>,
    {
        match self {
            Session::Memory(session) => {
                session.run_in_transaction(|tx| body(&Session::Memory(tx.clone())))
            }
            Session::Git(session) => session.run_in_transaction(|tx| body(&Session::Git(tx.clone()))),
        }
    }
}

impl Documents for Session {
    fn get(&self, table: &TableName, key: &RowKey) -> StorageResult<Option<Row>> {
        match self {
            Session::Memory(session) => session.get(table, key),
            Session::Git(session) => session.get(table, key),
        }
    }

    fn scan(&self, table: &TableName) -> StorageResult<Vec<Row>> {
        match self {
            Session::Memory(session) => session.scan(table),
            Session::Git(session) => session.scan(table),
        }
    }

    fn apply(&self, table: &TableName, change: RowChange) -> StorageResult<()> {
        match self {
            Session::Memory(session) => session.apply(table, change),
            Session::Git(session) => session.apply(table, change),
        }
    }
}
