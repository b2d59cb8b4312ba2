//! Listing rules shared by every operation.
//!
//! Stateless, so one instance serves all concurrent operations.

use domain::{DomainError, DomainResult, Stock};

#[cfg(any(test, feature = "test-utils"))]
use mockall::automock;

#[cfg_attr(any(test, feature = "test-utils"), automock)]
pub trait ListingPolicy: Send + Sync {
    /// Check that `symbol` may be listed in `sector`
    fn check_listing(&self, symbol: &str, sector: &str) -> DomainResult<()>;

    /// Check that `quantity` shares of `stock` may be bought
    fn check_order(&self, stock: &Stock, quantity: u64) -> DomainResult<()>;
}

/// Exchange rules: a few reserved tickers and a per-order share limit.
#[derive(Debug, Clone)]
pub struct StandardListingPolicy {
    reserved_symbols: Vec<String>,
    max_order_quantity: u64,
}

impl StandardListingPolicy {
    pub fn new(reserved_symbols: Vec<String>, max_order_quantity: u64) -> Self {
        Self {
            reserved_symbols,
            max_order_quantity,
        }
    }
}

impl Default for StandardListingPolicy {
    fn default() -> Self {
        Self::new(vec!["TEST".to_string(), "NULL".to_string()], 1_000_000)
    }
}

impl ListingPolicy for StandardListingPolicy {
    fn check_listing(&self, symbol: &str, sector: &str) -> DomainResult<()> {
        if self.reserved_symbols.iter().any(|s| s == symbol) {
            return Err(DomainError::validation(format!("symbol {symbol} is reserved")));
        }
        if !domain::is_valid_sector(sector) {
            return Err(DomainError::validation(format!("unknown sector '{sector}'")));
        }
        Ok(())
    }

    fn check_order(&self, stock: &Stock, quantity: u64) -> DomainResult<()> {
        if !stock.listed {
            return Err(DomainError::invalid_state(format!("{} is delisted", stock.symbol)));
        }
        if quantity > self.max_order_quantity {
            return Err(DomainError::validation(format!(
                "order of {quantity} shares exceeds the limit of {}",
                self.max_order_quantity
            )));
        }
        Ok(())
    }
}
