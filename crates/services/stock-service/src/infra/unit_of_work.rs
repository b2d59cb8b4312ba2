//! Unit of Work pattern implementation.
//!
//! The Unit of Work:
//! - Owns exactly one transaction of the persistence session
//! - Builds repositories lazily, all bound to that transaction
//! - Collects the events raised by aggregates written through them
//! - Publishes those events only after the transaction committed
//!
//! It is registered with a scoped lifetime, so each operation gets its own
//! instance and no transaction is ever shared between operations.

use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use futures::future::BoxFuture;
use parking_lot::Mutex;
use uuid::Uuid;

use common::{AppError, AppResult, TransactionError};
use domain::Aggregate;

use super::event_bus::EventBus;
use super::session::{EventCollector, Repository, Session, SessionHandle};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnitOfWorkState {
    Idle,
    Active,
    /// Commit or rollback is in flight
    Completing,
    Committed,
    RolledBack,
}

impl fmt::Display for UnitOfWorkState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            UnitOfWorkState::Idle => "idle",
            UnitOfWorkState::Active => "active",
            UnitOfWorkState::Completing => "completing",
            UnitOfWorkState::Committed => "committed",
            UnitOfWorkState::RolledBack => "rolled back",
        };
        f.write_str(name)
    }
}

struct Inner {
    state: UnitOfWorkState,
    handle: Option<SessionHandle>,
    repositories: HashMap<TypeId, Arc<dyn Any + Send + Sync>>,
}

pub struct UnitOfWork {
    id: Uuid,
    session: Arc<dyn Session>,
    bus: Arc<EventBus>,
    inner: Mutex<Inner>,
}

impl UnitOfWork {
    pub fn new(session: Arc<dyn Session>, bus: Arc<EventBus>) -> Self {
        Self {
            id: Uuid::new_v4(),
            session,
            bus,
            inner: Mutex::new(Inner {
                state: UnitOfWorkState::Idle,
                handle: None,
                repositories: HashMap::new(),
            }),
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn state(&self) -> UnitOfWorkState {
        self.inner.lock().state
    }

    /// Open the transaction. Only legal once, from `Idle`.
    pub async fn begin(&self) -> AppResult<()> {
        self.ensure_state("begin", UnitOfWorkState::Idle)?;

        let tx = self.session.begin().await.map_err(TransactionError::Begin)?;

        let mut inner = self.inner.lock();
        if inner.state != UnitOfWorkState::Idle {
            // Lost a race against a concurrent begin on the same instance.
            self.session.release(&tx);
            return Err(TransactionError::not_active("begin", inner.state).into());
        }
        inner.handle = Some(SessionHandle::new(
            tx,
            Arc::clone(&self.session),
            EventCollector::new(),
        ));
        inner.state = UnitOfWorkState::Active;
        tracing::debug!(uow = %self.id, tx = %tx.id(), "unit of work started");
        Ok(())
    }

    /// Repository of type `R` bound to the current transaction.
    ///
    /// Built on first use and cached, so every caller in this unit of work
    /// shares the same instance.
    pub fn repository<R: Repository>(&self) -> AppResult<Arc<R>> {
        let mut inner = self.inner.lock();
        let handle = match (&inner.state, &inner.handle) {
            (UnitOfWorkState::Active, Some(handle)) => handle.clone(),
            (state, _) => {
                return Err(TransactionError::not_active("open a repository on", state).into())
            }
        };

        let cached = inner
            .repositories
            .entry(TypeId::of::<R>())
            .or_insert_with(|| Arc::new(R::from_session(handle)) as Arc<dyn Any + Send + Sync>);

        Arc::clone(cached)
            .downcast::<R>()
            .map_err(|_| AppError::internal("repository cache holds an unexpected type"))
    }

    /// Move the pending events of an aggregate into this transaction.
    pub fn collect_from(&self, aggregate: &mut impl Aggregate) -> AppResult<()> {
        let inner = self.inner.lock();
        match (&inner.state, &inner.handle) {
            (UnitOfWorkState::Active, Some(handle)) => {
                handle.collect(aggregate);
                Ok(())
            }
            (state, _) => Err(TransactionError::not_active("collect events in", state).into()),
        }
    }

    /// Number of events waiting for commit
    pub fn pending_events(&self) -> usize {
        self.inner
            .lock()
            .handle
            .as_ref()
            .map_or(0, |handle| handle.events().len())
    }

    /// Commit the transaction, then publish the collected events in raise order.
    ///
    /// A failed commit discards every event. Handler failures after a
    /// successful commit are reported as [`AppError::EventDispatch`]; the
    /// data stays committed.
    pub async fn commit(&self) -> AppResult<()> {
        let handle = self.start_completion("commit")?;

        match self.session.commit(handle.tx()).await {
            Ok(()) => {
                let events = handle.events().seal_and_drain();
                self.finish(UnitOfWorkState::Committed);
                tracing::info!(uow = %self.id, events = events.len(), "transaction committed");

                self.bus.publish_batch(events)?;
                Ok(())
            }
            Err(e) => {
                let discarded = handle.events().discard();
                self.session.release(handle.tx());
                self.finish(UnitOfWorkState::RolledBack);
                tracing::error!(uow = %self.id, error = %e, discarded, "transaction commit failed");
                Err(TransactionError::Commit(e).into())
            }
        }
    }

    /// Abort the transaction and discard every collected event.
    pub async fn rollback(&self) -> AppResult<()> {
        let handle = self.start_completion("roll back")?;
        let discarded = handle.events().discard();

        let result = self.session.rollback(handle.tx()).await;
        self.finish(UnitOfWorkState::RolledBack);

        match result {
            Ok(()) => {
                tracing::info!(uow = %self.id, discarded, "transaction rolled back");
                Ok(())
            }
            Err(e) => {
                self.session.release(handle.tx());
                Err(TransactionError::Rollback(e).into())
            }
        }
    }

    /// Finish the transaction according to the outcome of the operation.
    ///
    /// `Ok` commits; `Err` rolls back and hands back the original error
    /// untouched. A failed rollback is logged, never substituted for the
    /// original error. If the operation already finished the transaction
    /// itself, the outcome is returned as is.
    pub async fn complete<T, E>(&self, outcome: Result<T, E>) -> Result<T, E>
    where
        E: From<AppError>,
    {
        let active = self.state() == UnitOfWorkState::Active;
        match outcome {
            Ok(value) => {
                if active {
                    self.commit().await.map_err(E::from)?;
                }
                Ok(value)
            }
            Err(e) => {
                if active {
                    if let Err(rollback_err) = self.rollback().await {
                        tracing::error!("Transaction rollback failed: {}", rollback_err);
                    }
                }
                Err(e)
            }
        }
    }

    /// Begin, run `operation`, then commit or roll back.
    pub async fn run<T, E, F>(&self, operation: F) -> Result<T, E>
    where
        F: for<'u> FnOnce(&'u UnitOfWork) -> BoxFuture<'u, Result<T, E>>,
        E: From<AppError>,
    {
        self.begin().await.map_err(E::from)?;
        let outcome = operation(self).await;
        self.complete(outcome).await
    }

    /// Abandon an unfinished transaction.
    ///
    /// Called when the owning scope closes. If the operation never reached
    /// commit or rollback (cancelled, timed out, panicked), the transaction is
    /// released and its events are dropped.
    pub fn dispose(&self) {
        let mut inner = self.inner.lock();
        inner.repositories.clear();

        if matches!(inner.state, UnitOfWorkState::Active | UnitOfWorkState::Completing) {
            if let Some(handle) = inner.handle.take() {
                let discarded = handle.events().discard();
                self.session.release(handle.tx());
                tracing::warn!(uow = %self.id, discarded, "unfinished transaction abandoned");
            }
            inner.state = UnitOfWorkState::RolledBack;
        }
        inner.handle = None;
    }

    fn ensure_state(&self, operation: &'static str, expected: UnitOfWorkState) -> AppResult<()> {
        let state = self.state();
        if state == expected {
            Ok(())
        } else {
            Err(TransactionError::not_active(operation, state).into())
        }
    }

    fn start_completion(&self, operation: &'static str) -> AppResult<SessionHandle> {
        let mut inner = self.inner.lock();
        match (inner.state, inner.handle.clone()) {
            (UnitOfWorkState::Active, Some(handle)) => {
                inner.state = UnitOfWorkState::Completing;
                Ok(handle)
            }
            (state, _) => Err(TransactionError::not_active(operation, state).into()),
        }
    }

    fn finish(&self, state: UnitOfWorkState) {
        let mut inner = self.inner.lock();
        inner.state = state;
        inner.handle = None;
        inner.repositories.clear();
    }
}

impl fmt::Debug for UnitOfWork {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UnitOfWork")
            .field("id", &self.id)
            .field("state", &self.state())
            .finish()
    }
}
