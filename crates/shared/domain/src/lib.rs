//! Domain layer - Core business entities, events and value rules.
//!
//! This crate contains pure domain logic with no infrastructure dependencies.
//! Aggregates raise [`DomainEvent`]s into their own [`EventQueue`]; the unit of
//! work in the service layer drains them and publishes after commit.

pub mod aggregate;
pub mod constants;
pub mod error;
pub mod event;
pub mod portfolio;
pub mod stock;

pub use aggregate::{Aggregate, EventQueue};
pub use constants::*;
pub use error::{DomainError, DomainResult};
pub use event::{DomainEvent, EventPayload};
pub use portfolio::{HoldingAdded, Portfolio, PortfolioOpened};
pub use stock::{normalize_symbol, Stock, StockDelisted, StockListed, StockRenamed};
