//! Persistence session contract.
//!
//! The concrete engine is a collaborator behind [`Session`]; the rest of the
//! service only sees [`SessionHandle`], which binds one open transaction to
//! the session that owns it and to the unit of work's event collector.

use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use uuid::Uuid;

use common::{InfraResult, InfrastructureError};
use domain::{Aggregate, DomainEvent};

#[cfg(any(test, feature = "test-utils"))]
use mockall::automock;

/// Identifier of one open transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TxHandle {
    id: Uuid,
}

impl TxHandle {
    pub fn new() -> Self {
        Self { id: Uuid::new_v4() }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }
}

impl Default for TxHandle {
    fn default() -> Self {
        Self::new()
    }
}

/// Persistence session trait for dependency injection.
///
/// Rows are JSON documents addressed by `(table, key)`. Every read and write
/// happens inside a transaction obtained from [`Session::begin`].
#[cfg_attr(any(test, feature = "test-utils"), automock)]
#[async_trait]
pub trait Session: Send + Sync {
    /// Open a new transaction
    async fn begin(&self) -> InfraResult<TxHandle>;

    /// Make every staged write of `tx` visible atomically
    async fn commit(&self, tx: &TxHandle) -> InfraResult<()>;

    /// Discard every staged write of `tx`
    async fn rollback(&self, tx: &TxHandle) -> InfraResult<()>;

    /// Drop `tx` without waiting; used when a transaction is abandoned.
    /// Unknown or already finished transactions are ignored.
    fn release(&self, tx: &TxHandle);

    async fn fetch(&self, tx: &TxHandle, table: &str, key: &str) -> InfraResult<Option<Value>>;

    /// Stage a new row; fails if the key is already taken
    async fn insert(&self, tx: &TxHandle, table: &str, key: &str, row: Value) -> InfraResult<()>;

    /// Stage a row, replacing any existing one
    async fn upsert(&self, tx: &TxHandle, table: &str, key: &str, row: Value) -> InfraResult<()>;

    /// Stage the removal of an existing row
    async fn remove(&self, tx: &TxHandle, table: &str, key: &str) -> InfraResult<()>;

    /// Every visible row of `table`, ordered by key
    async fn scan(&self, tx: &TxHandle, table: &str) -> InfraResult<Vec<Value>>;
}

#[derive(Default)]
struct CollectorState {
    events: Vec<DomainEvent>,
    sealed: bool,
}

/// Pending events of one transaction, shared by the unit of work and every
/// repository bound to it.
#[derive(Clone, Default)]
pub struct EventCollector {
    state: Arc<Mutex<CollectorState>>,
}

impl EventCollector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Take ownership of `events`. Events arriving after the transaction
    /// ended are dropped.
    pub fn extend(&self, events: Vec<DomainEvent>) {
        if events.is_empty() {
            return;
        }
        let mut state = self.state.lock();
        if state.sealed {
            tracing::warn!(
                dropped = events.len(),
                "events collected after transaction end were dropped"
            );
            return;
        }
        state.events.extend(events);
    }

    pub fn len(&self) -> usize {
        self.state.lock().events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Close the collector and hand over every event in raise order.
    pub fn seal_and_drain(&self) -> Vec<DomainEvent> {
        let mut state = self.state.lock();
        state.sealed = true;
        let mut events = std::mem::take(&mut state.events);
        events.sort_by_key(DomainEvent::sequence);
        events
    }

    /// Close the collector and drop every pending event.
    pub fn discard(&self) -> usize {
        let mut state = self.state.lock();
        state.sealed = true;
        let dropped = state.events.len();
        state.events.clear();
        dropped
    }
}

/// One open transaction: what a repository is built from.
#[derive(Clone)]
pub struct SessionHandle {
    tx: TxHandle,
    session: Arc<dyn Session>,
    events: EventCollector,
}

impl SessionHandle {
    pub fn new(tx: TxHandle, session: Arc<dyn Session>, events: EventCollector) -> Self {
        Self { tx, session, events }
    }

    pub fn tx(&self) -> &TxHandle {
        &self.tx
    }

    pub fn session(&self) -> &Arc<dyn Session> {
        &self.session
    }

    pub fn events(&self) -> &EventCollector {
        &self.events
    }

    /// Move the aggregate's pending events into this transaction.
    pub fn collect(&self, aggregate: &mut impl Aggregate) {
        self.events.extend(aggregate.drain_events());
    }

    pub async fn fetch<T: DeserializeOwned>(
        &self,
        table: &str,
        key: &str,
    ) -> InfraResult<Option<T>> {
        match self.session.fetch(&self.tx, table, key).await? {
            Some(row) => decode(row).map(Some),
            None => Ok(None),
        }
    }

    pub async fn insert<T: Serialize>(&self, table: &str, key: &str, row: &T) -> InfraResult<()> {
        let row = encode(row)?;
        self.session.insert(&self.tx, table, key, row).await
    }

    pub async fn upsert<T: Serialize>(&self, table: &str, key: &str, row: &T) -> InfraResult<()> {
        let row = encode(row)?;
        self.session.upsert(&self.tx, table, key, row).await
    }

    pub async fn remove(&self, table: &str, key: &str) -> InfraResult<()> {
        self.session.remove(&self.tx, table, key).await
    }

    pub async fn scan<T: DeserializeOwned>(&self, table: &str) -> InfraResult<Vec<T>> {
        self.session
            .scan(&self.tx, table)
            .await?
            .into_iter()
            .map(decode)
            .collect()
    }
}

fn encode<T: Serialize>(row: &T) -> InfraResult<Value> {
    serde_json::to_value(row).map_err(|e| InfrastructureError::Serialization(e.to_string()))
}

fn decode<T: DeserializeOwned>(row: Value) -> InfraResult<T> {
    serde_json::from_value(row).map_err(|e| InfrastructureError::Serialization(e.to_string()))
}

/// A repository that can be built purely from an open transaction.
pub trait Repository: Send + Sync + 'static {
    fn from_session(session: SessionHandle) -> Self
    where
        Self: Sized;
}
