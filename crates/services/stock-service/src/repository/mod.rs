//! Repository layer for data access.
//!
//! Repositories are built from a [`SessionHandle`](crate::infra::SessionHandle)
//! by the unit of work and speak [`DomainResult`](domain::DomainResult):
//! persistence failures are translated here and never travel further up.

mod portfolio_repository;
mod stock_repository;
mod translate;

pub use portfolio_repository::{PortfolioRepository, PortfolioStore};
pub use stock_repository::{StockRepository, StockStore};
pub use translate::translate;

#[cfg(any(test, feature = "test-utils"))]
pub use portfolio_repository::MockPortfolioRepository;
#[cfg(any(test, feature = "test-utils"))]
pub use stock_repository::MockStockRepository;

/// Table names
pub mod tables {
    pub const STOCKS: &str = "stocks";
    pub const PORTFOLIOS: &str = "portfolios";
}
