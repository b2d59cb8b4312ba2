//! In-memory session.
//!
//! Writes are staged per transaction and applied atomically on commit, so
//! rolled back or abandoned transactions leave no trace. Each transaction
//! reads its own staged writes on top of the committed state.

use std::collections::{BTreeMap, HashMap};

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::Value;
use uuid::Uuid;

use common::{InfraResult, InfrastructureError};

use super::session::{Session, TxHandle};

type Table = BTreeMap<String, Value>;
type Staged = BTreeMap<String, Write>;

#[derive(Debug, Clone)]
enum Write {
    Insert(Value),
    Upsert(Value),
    Delete,
}

#[derive(Default)]
struct MemoryState {
    committed: HashMap<String, Table>,
    open: HashMap<Uuid, HashMap<String, Staged>>,
}

impl MemoryState {
    fn staged(&mut self, tx: &TxHandle) -> InfraResult<&mut HashMap<String, Staged>> {
        self.open
            .get_mut(&tx.id())
            .ok_or(InfrastructureError::TransactionClosed(tx.id()))
    }

    fn visible(&self, tx: &TxHandle, table: &str, key: &str) -> InfraResult<Option<Value>> {
        let staged = self
            .open
            .get(&tx.id())
            .ok_or(InfrastructureError::TransactionClosed(tx.id()))?;

        match staged.get(table).and_then(|writes| writes.get(key)) {
            Some(Write::Insert(row)) | Some(Write::Upsert(row)) => Ok(Some(row.clone())),
            Some(Write::Delete) => Ok(None),
            None => Ok(self.committed.get(table).and_then(|t| t.get(key)).cloned()),
        }
    }
}

/// Session keeping every table in process memory.
#[derive(Default)]
pub struct InMemorySession {
    state: Mutex<MemoryState>,
}

impl InMemorySession {
    pub fn new() -> Self {
        Self::default()
    }

    /// Committed rows of `table`, ordered by key
    pub fn committed_rows(&self, table: &str) -> Vec<Value> {
        self.state
            .lock()
            .committed
            .get(table)
            .map(|rows| rows.values().cloned().collect())
            .unwrap_or_default()
    }

    pub fn committed_row(&self, table: &str, key: &str) -> Option<Value> {
        self.state.lock().committed.get(table)?.get(key).cloned()
    }

    /// Number of transactions begun and not yet finished
    pub fn open_transactions(&self) -> usize {
        self.state.lock().open.len()
    }
}

#[async_trait]
impl Session for InMemorySession {
    async fn begin(&self) -> InfraResult<TxHandle> {
        let tx = TxHandle::new();
        self.state.lock().open.insert(tx.id(), HashMap::new());
        tracing::debug!(tx = %tx.id(), "transaction started");
        Ok(tx)
    }

    async fn commit(&self, tx: &TxHandle) -> InfraResult<()> {
        let mut state = self.state.lock();
        let staged = state
            .open
            .remove(&tx.id())
            .ok_or(InfrastructureError::TransactionClosed(tx.id()))?;

        // Another transaction may have inserted the same key since it was staged.
        for (table, writes) in &staged {
            for (key, write) in writes {
                let taken = state.committed.get(table).is_some_and(|t| t.contains_key(key));
                if matches!(write, Write::Insert(_)) && taken {
                    return Err(InfrastructureError::ConstraintViolation {
                        table: table.clone(),
                        key: key.clone(),
                    });
                }
            }
        }

        let mut applied = 0usize;
        for (table, writes) in staged {
            let rows = state.committed.entry(table).or_default();
            for (key, write) in writes {
                match write {
                    Write::Insert(row) | Write::Upsert(row) => {
                        rows.insert(key, row);
                    }
                    Write::Delete => {
                        rows.remove(&key);
                    }
                }
                applied += 1;
            }
        }

        tracing::debug!(tx = %tx.id(), writes = applied, "transaction committed");
        Ok(())
    }

    async fn rollback(&self, tx: &TxHandle) -> InfraResult<()> {
        self.state
            .lock()
            .open
            .remove(&tx.id())
            .ok_or(InfrastructureError::TransactionClosed(tx.id()))?;
        tracing::debug!(tx = %tx.id(), "transaction rolled back");
        Ok(())
    }

    fn release(&self, tx: &TxHandle) {
        if self.state.lock().open.remove(&tx.id()).is_some() {
            tracing::debug!(tx = %tx.id(), "transaction released");
        }
    }

    async fn fetch(&self, tx: &TxHandle, table: &str, key: &str) -> InfraResult<Option<Value>> {
        self.state.lock().visible(tx, table, key)
    }

    async fn insert(&self, tx: &TxHandle, table: &str, key: &str, row: Value) -> InfraResult<()> {
        let mut state = self.state.lock();
        let existing = state.visible(tx, table, key)?;
        if existing.is_some() {
            return Err(InfrastructureError::ConstraintViolation {
                table: table.to_string(),
                key: key.to_string(),
            });
        }

        let writes = state.staged(tx)?.entry(table.to_string()).or_default();
        // Re-inserting a row deleted earlier in this transaction replaces it.
        let write = match writes.get(key) {
            Some(Write::Delete) => Write::Upsert(row),
            _ => Write::Insert(row),
        };
        writes.insert(key.to_string(), write);
        Ok(())
    }

    async fn upsert(&self, tx: &TxHandle, table: &str, key: &str, row: Value) -> InfraResult<()> {
        let mut state = self.state.lock();
        let writes = state.staged(tx)?.entry(table.to_string()).or_default();
        let write = match writes.get(key) {
            Some(Write::Insert(_)) => Write::Insert(row),
            _ => Write::Upsert(row),
        };
        writes.insert(key.to_string(), write);
        Ok(())
    }

    async fn remove(&self, tx: &TxHandle, table: &str, key: &str) -> InfraResult<()> {
        let mut state = self.state.lock();
        if state.visible(tx, table, key)?.is_none() {
            return Err(InfrastructureError::RowNotFound {
                table: table.to_string(),
                key: key.to_string(),
            });
        }

        let writes = state.staged(tx)?.entry(table.to_string()).or_default();
        if matches!(writes.get(key), Some(Write::Insert(_))) {
            writes.remove(key);
        } else {
            writes.insert(key.to_string(), Write::Delete);
        }
        Ok(())
    }

    async fn scan(&self, tx: &TxHandle, table: &str) -> InfraResult<Vec<Value>> {
        let state = self.state.lock();
        let staged = state
            .open
            .get(&tx.id())
            .ok_or(InfrastructureError::TransactionClosed(tx.id()))?;

        let mut rows = state.committed.get(table).cloned().unwrap_or_default();
        if let Some(writes) = staged.get(table) {
            for (key, write) in writes {
                match write {
                    Write::Insert(row) | Write::Upsert(row) => {
                        rows.insert(key.clone(), row.clone());
                    }
                    Write::Delete => {
                        rows.remove(key);
                    }
                }
            }
        }
        Ok(rows.into_values().collect())
    }
}
