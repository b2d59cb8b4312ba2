//! Operation execution.
//!
//! Every call to [`OperationRunner::execute`] is one logical operation: it
//! gets its own scope and its own unit of work, runs under a deadline, and
//! succeeds only if both the body and the commit finished in time. The scope is always closed,
//! including when the returned future is dropped half-way.

use std::sync::Arc;
use std::time::Duration;

use futures::future::BoxFuture;
use tokio::time::Instant;
use tracing::Instrument;

use common::{AppError, OperationConfig, TransactionError};
use container::{Scope, ServiceContainer};

use crate::infra::UnitOfWork;

/// What an operation body can reach: its scope and its unit of work.
#[derive(Clone, Copy)]
pub struct OperationContext<'s> {
    scope: &'s Scope,
    uow: &'s UnitOfWork,
}

impl<'s> OperationContext<'s> {
    /// Resolve a service inside this operation's scope.
    pub fn resolve<T: ?Sized + Send + Sync + 'static>(&self) -> Result<Arc<T>, AppError> {
        Ok(self.scope.resolve::<T>()?)
    }

    pub fn scope(&self) -> &'s Scope {
        self.scope
    }

    pub fn uow(&self) -> &'s UnitOfWork {
        self.uow
    }
}

pub struct OperationRunner {
    container: Arc<ServiceContainer>,
    timeout: Duration,
}

impl OperationRunner {
    pub fn new(container: Arc<ServiceContainer>, timeout: Duration) -> Self {
        Self { container, timeout }
    }

    pub fn from_config(container: Arc<ServiceContainer>, config: &OperationConfig) -> Self {
        Self::new(container, Duration::from_millis(config.timeout_ms))
    }

    pub fn container(&self) -> &Arc<ServiceContainer> {
        &self.container
    }

    /// Run `operation` as one unit of work.
    ///
    /// The body's own error is returned unchanged after rollback. The deadline
    /// covers the body and the commit: missing it rolls the transaction back
    /// and is reported as [`TransactionError::TimedOut`].
    pub async fn execute<T, E, F>(&self, name: &str, operation: F) -> Result<T, E>
    where
        F: for<'s> FnOnce(OperationContext<'s>) -> BoxFuture<'s, Result<T, E>>,
        E: From<AppError>,
    {
        let scope = Scope::open(&self.container);
        let span = tracing::info_span!("operation", name, scope = %scope.id());

        let outcome = self.run_in_scope(&scope, operation).instrument(span).await;
        scope.close();
        outcome
    }

    async fn run_in_scope<T, E, F>(&self, scope: &Scope, operation: F) -> Result<T, E>
    where
        F: for<'s> FnOnce(OperationContext<'s>) -> BoxFuture<'s, Result<T, E>>,
        E: From<AppError>,
    {
        let uow = scope
            .resolve::<UnitOfWork>()
            .map_err(|e| E::from(AppError::from(e)))?;
        uow.begin().await.map_err(E::from)?;

        // One deadline for the body and the commit that follows it.
        let deadline = Instant::now() + self.timeout;
        let context = OperationContext { scope, uow: &*uow };
        let outcome = match tokio::time::timeout_at(deadline, operation(context)).await {
            Ok(outcome) => outcome,
            Err(_) => {
                tracing::warn!(timeout = ?self.timeout, "operation timed out");
                Err(self.timed_out())
            }
        };

        // An unfinished commit is dropped here; closing the scope releases
        // the transaction and discards its events.
        match tokio::time::timeout_at(deadline, uow.complete(outcome)).await {
            Ok(result) => result,
            Err(_) => {
                tracing::warn!(
                    timeout = ?self.timeout,
                    state = %uow.state(),
                    "operation timed out while completing"
                );
                Err(self.timed_out())
            }
        }
    }

    fn timed_out<E: From<AppError>>(&self) -> E {
        E::from(AppError::from(TransactionError::TimedOut(self.timeout)))
    }
}
