//! Service layer - business use cases.

mod listing_policy;
mod stock_service;

pub use listing_policy::{ListingPolicy, StandardListingPolicy};
pub use stock_service::{
    HoldingOrder, NewListing, NewPortfolio, RenameStock, StockManager, StockService,
};

#[cfg(any(test, feature = "test-utils"))]
pub use listing_policy::MockListingPolicy;
