//! Common utilities shared across all services.
//!
//! This crate provides:
//! - The application error taxonomy
//! - Configuration structures

pub mod config;
pub mod error;

pub use config::*;
pub use error::{
    AppError, AppResult, HandlerFailure, InfraResult, InfrastructureError, PublishError,
    TransactionError,
};
