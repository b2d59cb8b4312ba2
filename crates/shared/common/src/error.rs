//! Unified error handling.
//!
//! Every layer has its own error enum; [`AppError`] aggregates them for
//! callers of an operation:
//! - container failures ([`ContainerError`]: configuration or lifetime violations)
//! - transaction coordination failures ([`TransactionError`])
//! - business rule violations ([`DomainError`], passed through untouched)
//! - post-commit event handler failures ([`PublishError`])
//!
//! [`InfrastructureError`] is intentionally absent from [`AppError`]:
//! repositories translate it into a [`DomainError`] at their boundary, and the
//! unit of work wraps session failures in a [`TransactionError`].

use std::time::Duration;

use container::ContainerError;
use domain::DomainError;
use thiserror::Error;
use uuid::Uuid;

/// Failures reported by the persistence collaborator.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum InfrastructureError {
    #[error("constraint violated: {table}/{key} already exists")]
    ConstraintViolation { table: String, key: String },

    #[error("row {table}/{key} does not exist")]
    RowNotFound { table: String, key: String },

    #[error("transaction {0} is not open")]
    TransactionClosed(Uuid),

    #[error("row encoding failed: {0}")]
    Serialization(String),

    #[error("persistence unavailable: {0}")]
    Unavailable(String),
}

/// Result type alias for persistence operations
pub type InfraResult<T> = Result<T, InfrastructureError>;

/// Transaction coordination failures.
#[derive(Error, Debug)]
pub enum TransactionError {
    #[error("cannot {operation} a unit of work in state {state}")]
    NotActive {
        operation: &'static str,
        state: String,
    },

    #[error("failed to begin transaction")]
    Begin(#[source] InfrastructureError),

    #[error("failed to commit transaction")]
    Commit(#[source] InfrastructureError),

    #[error("failed to roll back transaction")]
    Rollback(#[source] InfrastructureError),

    #[error("operation timed out after {0:?}")]
    TimedOut(Duration),
}

impl TransactionError {
    pub fn not_active(operation: &'static str, state: impl ToString) -> Self {
        TransactionError::NotActive {
            operation,
            state: state.to_string(),
        }
    }

    /// The persistence failure behind this error, if any
    pub fn infrastructure(&self) -> Option<&InfrastructureError> {
        match self {
            TransactionError::Begin(e)
            | TransactionError::Commit(e)
            | TransactionError::Rollback(e) => Some(e),
            _ => None,
        }
    }
}

/// One handler that failed while an event was being published.
#[derive(Debug)]
pub struct HandlerFailure {
    pub event_id: Uuid,
    pub event_type: String,
    /// Position of the handler in registration order
    pub handler: usize,
    pub error: anyhow::Error,
}

/// Every handler failure of a publish call. Handlers that did not fail
/// have still been invoked.
#[derive(Error, Debug)]
#[error("{} event handler(s) failed", .failures.len())]
pub struct PublishError {
    pub failures: Vec<HandlerFailure>,
}

/// Application error types
#[derive(Error, Debug)]
pub enum AppError {
    #[error(transparent)]
    Container(#[from] ContainerError),

    #[error(transparent)]
    Transaction(#[from] TransactionError),

    #[error(transparent)]
    Domain(#[from] DomainError),

    #[error("committed, but event delivery failed: {0}")]
    EventDispatch(#[from] PublishError),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl AppError {
    /// Get error code for client
    pub fn code(&self) -> &'static str {
        match self {
            AppError::Container(e) if e.is_lifetime_violation() => "LIFETIME_VIOLATION",
            AppError::Container(_) => "CONFIGURATION_ERROR",
            AppError::Transaction(_) => "TRANSACTION_ERROR",
            AppError::Domain(_) => "DOMAIN_ERROR",
            AppError::EventDispatch(_) => "EVENT_DISPATCH_ERROR",
            AppError::Internal(_) => "INTERNAL_ERROR",
        }
    }

    /// The domain error carried unchanged, if this is one
    pub fn as_domain(&self) -> Option<&DomainError> {
        match self {
            AppError::Domain(e) => Some(e),
            _ => None,
        }
    }

    pub fn internal(msg: impl Into<String>) -> Self {
        AppError::Internal(msg.into())
    }
}

/// Result type alias
pub type AppResult<T> = Result<T, AppError>;
