//! The document API shared by every storage session.

use crate::storage::error::{StorageError, StorageResult};
use crate::storage::row::Row;
use crate::storage::types::{RowKey, TableName};

/// A single row mutation.
#[derive(Debug, Clone, PartialEq)]
pub enum RowChange {
    /// Fails if the key already exists.
    Insert(Row),
    /// Fails if the key does not exist.
    Update(Row),
    Upsert(Row),
    /// Fails if the key does not exist.
    Delete(RowKey),
}

impl RowChange {
    pub fn key(&self) -> &RowKey {
        match self {
            RowChange::Insert(row) | RowChange::Update(row) | RowChange::Upsert(row) => &row.key,
            RowChange::Delete(key) => key,
        }
    }

    /// Compute the row that replaces `existing`, or `None` when the row goes away.
    ///
    /// Backends call this while holding whatever lock makes the existence
    /// check and the write atomic.
    pub(crate) fn resolve(self, table: &TableName, existing: Option<&Row>) -> StorageResult<Option<Row>> {
        match (self, existing) {
            (RowChange::Insert(row), Some(_)) => Err(StorageError::RowAlreadyExists {
                table: table.clone(),
                key: row.key,
            }),
            (RowChange::Insert(row), None) | (RowChange::Upsert(row), None) => Ok(Some(row)),
            (RowChange::Update(row), Some(previous)) | (RowChange::Upsert(row), Some(previous)) => {
                Ok(Some(Row::succeed(previous, row)))
            }
            (RowChange::Update(row), None) => Err(StorageError::RowNotFound {
                table: table.clone(),
                key: row.key,
            }),
            (RowChange::Delete(_), Some(_)) => Ok(None),
            (RowChange::Delete(key), None) => Err(StorageError::RowNotFound {
                table: table.clone(),
                key,
            }),
        }
    }
}

/// Row-level access to a backend session.
///
/// Tables spring into existence with their first row.
pub trait Documents {
    fn get(&self, table: &TableName, key: &RowKey) -> StorageResult<Option<Row>>;

    /// All rows of a table ordered by key. Unknown tables are empty.
    fn scan(&self, table: &TableName) -> StorageResult<Vec<Row>>;

    fn apply(&self, table: &TableName, change: RowChange) -> StorageResult<()>;

    fn insert(&self, table: &TableName, row: Row) -> StorageResult<()> {
        self.apply(table, RowChange::Insert(row))
    }

    fn update(&self, table: &TableName, row: Row) -> StorageResult<()> {
        self.apply(table, RowChange::Update(row))
    }

    fn upsert(&self, table: &TableName, row: Row) -> StorageResult<()> {
        self.apply(table, RowChange::Upsert(row))
    }

    fn delete(&self, table: &TableName, key: &RowKey) -> StorageResult<()> {
        self.apply(table, RowChange::Delete(key.clone()))
    }

    fn count(&self, table: &TableName) -> StorageResult<usize> {
        Ok(self.scan(table)?.len())
    }
}
