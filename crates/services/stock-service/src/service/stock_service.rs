//! Stock service - listing and portfolio use cases.
//!
//! Scoped: built once per operation on top of that operation's repositories.

use std::sync::Arc;

use async_trait::async_trait;
use serde::Deserialize;
use uuid::Uuid;
use validator::Validate;

use common::AppResult;
use domain::{normalize_symbol, DomainError, DomainResult, Portfolio, Stock};

use super::listing_policy::ListingPolicy;
use crate::repository::{PortfolioRepository, StockRepository};

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct NewListing {
    #[validate(length(min = 1, max = 8, message = "Symbol must be 1-8 characters"))]
    pub symbol: String,
    #[validate(length(min = 1, message = "Name cannot be empty"))]
    pub name: String,
    #[validate(length(min = 1, message = "Sector cannot be empty"))]
    pub sector: String,
}

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct RenameStock {
    #[validate(length(min = 1, message = "Name cannot be empty"))]
    pub name: String,
}

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct NewPortfolio {
    #[validate(length(min = 1, message = "Name cannot be empty"))]
    pub name: String,
}

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct HoldingOrder {
    pub portfolio_id: Uuid,
    #[validate(length(min = 1, max = 8, message = "Symbol must be 1-8 characters"))]
    pub symbol: String,
    #[validate(range(min = 1, message = "Quantity must be at least 1"))]
    pub quantity: u64,
}

fn check<T: Validate>(input: &T) -> DomainResult<()> {
    input
        .validate()
        .map_err(|e| DomainError::validation(e.to_string()))
}

/// Stock service trait for dependency injection.
#[async_trait]
pub trait StockService: Send + Sync {
    /// List a new stock on the exchange
    async fn list_stock(&self, input: NewListing) -> AppResult<Stock>;

    /// Rename a listed stock
    async fn rename_stock(&self, symbol: &str, input: RenameStock) -> AppResult<Stock>;

    /// Remove a stock from trading
    async fn delist_stock(&self, symbol: &str) -> AppResult<Stock>;

    /// Get stock by ticker symbol
    async fn get_stock(&self, symbol: &str) -> AppResult<Stock>;

    /// List all stocks
    async fn list_stocks(&self) -> AppResult<Vec<Stock>>;

    /// Open an empty portfolio
    async fn open_portfolio(&self, input: NewPortfolio) -> AppResult<Portfolio>;

    /// Buy shares of a listed stock into a portfolio
    async fn add_holding(&self, input: HoldingOrder) -> AppResult<Portfolio>;
}

/// Concrete implementation of StockService using repositories.
pub struct StockManager {
    stocks: Arc<dyn StockRepository>,
    portfolios: Arc<dyn PortfolioRepository>,
    policy: Arc<dyn ListingPolicy>,
}

impl StockManager {
    pub fn new(
        stocks: Arc<dyn StockRepository>,
        portfolios: Arc<dyn PortfolioRepository>,
        policy: Arc<dyn ListingPolicy>,
    ) -> Self {
        Self {
            stocks,
            portfolios,
            policy,
        }
    }

    async fn load_stock(&self, symbol: &str) -> DomainResult<Stock> {
        let symbol = normalize_symbol(symbol)?;
        self.stocks
            .find_by_symbol(&symbol)
            .await?
            .ok_or_else(|| DomainError::not_found(format!("Stock {symbol}")))
    }
}

#[async_trait]
impl StockService for StockManager {
    async fn list_stock(&self, input: NewListing) -> AppResult<Stock> {
        check(&input)?;
        let symbol = normalize_symbol(&input.symbol)?;
        self.policy.check_listing(&symbol, &input.sector)?;

        // Check if symbol already exists
        if self.stocks.find_by_symbol(&symbol).await?.is_some() {
            return Err(DomainError::conflict(format!("Stock {symbol}")).into());
        }

        let mut stock = Stock::list(&symbol, &input.name, &input.sector)?;
        self.stocks.add(&mut stock).await?;
        tracing::info!(symbol = %stock.symbol, "stock listed");
        Ok(stock)
    }

    async fn rename_stock(&self, symbol: &str, input: RenameStock) -> AppResult<Stock> {
        check(&input)?;
        let mut stock = self.load_stock(symbol).await?;
        stock.rename(&input.name)?;
        self.stocks.save(&mut stock).await?;
        Ok(stock)
    }

    async fn delist_stock(&self, symbol: &str) -> AppResult<Stock> {
        let mut stock = self.load_stock(symbol).await?;
        stock.delist()?;
        self.stocks.save(&mut stock).await?;
        tracing::info!(symbol = %stock.symbol, "stock delisted");
        Ok(stock)
    }

    async fn get_stock(&self, symbol: &str) -> AppResult<Stock> {
        Ok(self.load_stock(symbol).await?)
    }

    async fn list_stocks(&self) -> AppResult<Vec<Stock>> {
        Ok(self.stocks.list().await?)
    }

    async fn open_portfolio(&self, input: NewPortfolio) -> AppResult<Portfolio> {
        check(&input)?;
        let mut portfolio = Portfolio::open(&input.name)?;
        self.portfolios.add(&mut portfolio).await?;
        Ok(portfolio)
    }

    async fn add_holding(&self, input: HoldingOrder) -> AppResult<Portfolio> {
        check(&input)?;
        let stock = self.load_stock(&input.symbol).await?;
        self.policy.check_order(&stock, input.quantity)?;

        let mut portfolio = self
            .portfolios
            .find_by_id(input.portfolio_id)
            .await?
            .ok_or_else(|| DomainError::not_found(format!("Portfolio {}", input.portfolio_id)))?;
        portfolio.add_holding(&stock.symbol, input.quantity)?;
        self.portfolios.save(&mut portfolio).await?;
        Ok(portfolio)
    }
}
