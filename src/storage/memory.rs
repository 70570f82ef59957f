//! In-memory document backend.
//!
//! A non-transactional [`MemorySession`] writes straight into the shared
//! [`MemoryStore`]. A transactional session keeps a private write set that
//! only it can see; the write set is applied in one step on commit and simply
//! dropped on rollback or unwind.
//!
//! Each buffered write remembers the stored row it was resolved against. A
//! commit whose rows changed underneath it fails with
//! [`ResourceError::Conflict`] and applies nothing.

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};
use tracing::{debug, warn};
use ulid::Ulid;

use crate::resource::{Completion, Resource, ResourceError, ResourceProvider, ResourceResult};
use crate::storage::documents::{Documents, RowChange};
use crate::storage::error::StorageResult;
use crate::storage::row::Row;
use crate::storage::types::{RowKey, TableName};

type Tables = BTreeMap<TableName, BTreeMap<RowKey, Row>>;
type WriteSet = BTreeMap<(TableName, RowKey), PendingWrite>;

#[derive(Debug)]
struct PendingWrite {
    /// Stored row when the transaction first wrote this key.
    read: Option<Row>,
    write: Option<Row>,
}

/// Shared in-memory tables. Clones share the same data.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    tables: Arc<RwLock<Tables>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Open a non-transactional session on this store.
    pub fn session(&self) -> MemorySession {
        MemorySession {
            id: Ulid::new(),
            store: self.clone(),
            tx: None,
        }
    }

    pub fn table_names(&self) -> Vec<TableName> {
        self.tables.read().keys().cloned().collect()
    }

    fn read_row(&self, table: &TableName, key: &RowKey) -> Option<Row> {
        self.tables
            .read()
            .get(table)
            .and_then(|rows| rows.get(key))
            .cloned()
    }

    /// Apply `writes` unless a row they were resolved against has changed.
    fn commit_writes(&self, writes: WriteSet) -> Result<(), Vec<PathBuf>> {
        let mut tables = self.tables.write();

        let mut stale = Vec::new();
        for ((table, key), pending) in &writes {
            let current = tables.get(table).and_then(|rows| rows.get(key));
            if current != pending.read.as_ref() {
                stale.push(PathBuf::from(table.as_str()).join(format!("{}.json", key)));
            }
        }
        if !stale.is_empty() {
            return Err(stale);
        }

        for ((table, key), pending) in writes {
            match pending.write {
                Some(row) => {
                    tables.entry(table).or_default().insert(key, row);
                }
                None => {
                    if let Some(rows) = tables.get_mut(&table) {
                        rows.remove(&key);
                        if rows.is_empty() {
                            tables.remove(&table);
                        }
                    }
                }
            }
        }
        Ok(())
    }
}

#[derive(Debug)]
struct MemoryTransaction {
    id: Ulid,
    writes: Mutex<WriteSet>,
}

/// A session on a [`MemoryStore`].
#[derive(Debug, Clone)]
pub struct MemorySession {
    id: Ulid,
    store: MemoryStore,
    tx: Option<Arc<MemoryTransaction>>,
}

impl MemorySession {
    /// Identity of the session; shared by its transactional handle.
    pub fn id(&self) -> Ulid {
        self.id
    }

    pub fn transaction_id(&self) -> Option<Ulid> {
        self.tx.as_ref().map(|tx| tx.id)
    }

    pub fn store(&self) -> &MemoryStore {
        &self.store
    }

    /// Number of buffered writes not yet committed.
    pub fn pending_writes(&self) -> usize {
        self.tx.as_ref().map_or(0, |tx| tx.writes.lock().len())
    }
}

impl Documents for MemorySession {
    fn get(&self, table: &TableName, key: &RowKey) -> StorageResult<Option<Row>> {
        if let Some(tx) = &self.tx {
            if let Some(pending) = tx.writes.lock().get(&(table.clone(), key.clone())) {
                return Ok(pending.write.clone());
            }
        }
        Ok(self.store.read_row(table, key))
    }

    fn scan(&self, table: &TableName) -> StorageResult<Vec<Row>> {
        let mut rows: BTreeMap<RowKey, Row> = self
            .store
            .tables
            .read()
            .get(table)
            .cloned()
            .unwrap_or_default();

        if let Some(tx) = &self.tx {
            for ((t, key), pending) in tx.writes.lock().iter() {
                if t != table {
                    continue;
                }
                match &pending.write {
                    Some(row) => {
                        rows.insert(key.clone(), row.clone());
                    }
                    None => {
                        rows.remove(key);
                    }
                }
            }
        }

        Ok(rows.into_values().collect())
    }

    fn apply(&self, table: &TableName, change: RowChange) -> StorageResult<()> {
        let key = change.key().clone();
        match &self.tx {
            Some(tx) => {
                let mut writes = tx.writes.lock();
                let slot = (table.clone(), key);
                match writes.get_mut(&slot) {
                    Some(pending) => {
                        pending.write = change.resolve(table, pending.write.as_ref())?;
                    }
                    None => {
                        let read = self.store.read_row(table, &slot.1);
                        let write = change.resolve(table, read.as_ref())?;
                        writes.insert(slot, PendingWrite { read, write });
                    }
                }
            }
            None => {
                let mut tables = self.store.tables.write();
                let existing = tables.get(table).and_then(|rows| rows.get(&key));
                match change.resolve(table, existing)? {
                    Some(row) => {
                        tables.entry(table.clone()).or_default().insert(key, row);
                    }
                    None => {
                        if let Some(rows) = tables.get_mut(table) {
                            rows.remove(&key);
                            if rows.is_empty() {
                                tables.remove(table);
                            }
                        }
                    }
                }
            }
        }
        Ok(())
    }
}

impl Resource for MemorySession {
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

        let tx = Arc::new(MemoryTransaction {
            id: Ulid::new(),
            writes: Mutex::new(BTreeMap::new()),
        });
        let handle = MemorySession {
            id: self.id,
            store: self.store.clone(),
            tx: Some(tx.clone()),
        };
        debug!(session = %self.id, tx_id = %tx.id, "memory transaction started");

        let completion = body(&handle);
        drop(handle);

        let writes = std::mem::take(&mut *tx.writes.lock());
        if !completion.is_commit() {
            debug!(tx_id = %tx.id, discarded = writes.len(), "memory transaction rolled back");
            return Ok(completion.into_inner());
        }

        let count = writes.len();
        match self.store.commit_writes(writes) {
            Ok(()) => {
                debug!(tx_id = %tx.id, writes = count, "memory transaction committed");
                Ok(completion.into_inner())
            }
            Err(paths) => {
                warn!(tx_id = %tx.id, conflicts = paths.len(), "memory transaction conflicts with committed rows");
                Err(ResourceError::Conflict {
                    tx_id: tx.id.to_string(),
                    paths,
                })
            }
        }
    }
}

/// Hands out sessions on one [`MemoryStore`] and tracks how many are open.
#[derive(Debug, Clone, Default)]
pub struct MemoryProvider {
    store: MemoryStore,
    open: Arc<AtomicUsize>,
}

impl MemoryProvider {
    pub fn new(store: MemoryStore) -> Self {
        Self {
            store,
            open: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn store(&self) -> &MemoryStore {
        &self.store
    }

    /// Sessions acquired and not yet released.
    pub fn open_sessions(&self) -> usize {
        self.open.load(Ordering::SeqCst)
    }
}

impl ResourceProvider for MemoryProvider {
    type Resource = MemorySession;

    fn acquire(&self) -> ResourceResult<MemorySession> {
        self.open.fetch_add(1, Ordering::SeqCst);
        Ok(self.store.session())
    }

    fn release(&self, resource: MemorySession) {
        self.open.fetch_sub(1, Ordering::SeqCst);
        drop(resource);
    }
}
