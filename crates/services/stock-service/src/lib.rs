//! Stock Service Library
//!
//! Stock listings and portfolios on top of a scoped service container:
//! every operation runs in its own scope with its own unit of work, and
//! domain events reach the event bus only after their transaction commits.

pub mod composition;
pub mod config;
pub mod handlers;
pub mod infra;
pub mod operation;
pub mod repository;
pub mod service;

use std::sync::Arc;

use futures::FutureExt;
use tracing::info;
use uuid::Uuid;

use common::{AppError, AppResult};
use container::{ServiceContainer, VerificationReport};

use crate::composition::CompositionRoot;
use crate::config::StockServiceConfig;
use crate::handlers::{AuditLog, ListingCache};
use crate::operation::OperationRunner;
use crate::service::{HoldingOrder, NewListing, NewPortfolio, RenameStock, StockService};

/// A bootstrapped service: sealed container plus the runner executing
/// operations against it.
pub struct App {
    config: StockServiceConfig,
    container: Arc<ServiceContainer>,
    runner: OperationRunner,
}

impl App {
    /// Compose, verify and seal the container.
    pub async fn bootstrap(config: StockServiceConfig) -> AppResult<Self> {
        let container = CompositionRoot::new(config.clone()).build().await?;
        let runner = OperationRunner::from_config(Arc::clone(&container), &config.operation);
        info!(service = %config.service.service_name, "service ready");
        Ok(Self {
            config,
            container,
            runner,
        })
    }

    pub fn config(&self) -> &StockServiceConfig {
        &self.config
    }

    pub fn container(&self) -> &Arc<ServiceContainer> {
        &self.container
    }

    pub fn runner(&self) -> &OperationRunner {
        &self.runner
    }

    /// Re-run the startup verification against the sealed container.
    pub async fn verify(&self) -> AppResult<VerificationReport> {
        CompositionRoot::verify(&self.container).await
    }

    pub fn listing_cache(&self) -> AppResult<Arc<ListingCache>> {
        Ok(self.container.resolve::<ListingCache>()?)
    }

    pub fn audit_log(&self) -> AppResult<Arc<AuditLog>> {
        Ok(self.container.resolve::<AuditLog>()?)
    }

    /// Run a fixed sequence of sample operations, one of which fails and is
    /// rolled back.
    pub async fn run_demo(&self) -> AppResult<Vec<DemoStep>> {
        let mut steps = Vec::new();

        let listed = self
            .runner
            .execute("list-stocks", |ctx| {
                async move {
                    let stocks = ctx.resolve::<dyn StockService>()?;
                    for (symbol, name) in [("AAPL", "Apple Inc."), ("MSFT", "Microsoft")] {
                        stocks
                            .list_stock(NewListing {
                                symbol: symbol.to_string(),
                                name: name.to_string(),
                                sector: "Technology".to_string(),
                            })
                            .await?;
                    }
                    Ok::<_, AppError>("listed AAPL and MSFT".to_string())
                }
                .boxed()
            })
            .await;
        steps.push(DemoStep::new("list stocks", listed));

        let opened = self
            .runner
            .execute("open-portfolio", |ctx| {
                async move {
                    let stocks = ctx.resolve::<dyn StockService>()?;
                    let portfolio = stocks
                        .open_portfolio(NewPortfolio {
                            name: "Growth".to_string(),
                        })
                        .await?;
                    let portfolio = stocks
                        .add_holding(HoldingOrder {
                            portfolio_id: portfolio.id,
                            symbol: "AAPL".to_string(),
                            quantity: 10,
                        })
                        .await?;
                    Ok::<_, AppError>(portfolio.id)
                }
                .boxed()
            })
            .await;
        let portfolio_id = opened.as_ref().ok().copied();
        steps.push(DemoStep::new(
            "open portfolio",
            opened.map(|id| format!("portfolio {id} holds 10 AAPL")),
        ));

        let renamed = self
            .runner
            .execute("rename-stock", |ctx| {
                async move {
                    let stocks = ctx.resolve::<dyn StockService>()?;
                    let stock = stocks
                        .rename_stock(
                            "MSFT",
                            RenameStock {
                                name: "Microsoft Corporation".to_string(),
                            },
                        )
                        .await?;
                    Ok::<_, AppError>(format!("MSFT is now {}", stock.name))
                }
                .boxed()
            })
            .await;
        steps.push(DemoStep::new("rename stock", renamed));

        // Lists NVDA, then fails: the listing must be rolled back with it.
        let failed = self
            .runner
            .execute("list-and-buy", move |ctx| {
                async move {
                    let stocks = ctx.resolve::<dyn StockService>()?;
                    stocks
                        .list_stock(NewListing {
                            symbol: "NVDA".to_string(),
                            name: "NVIDIA".to_string(),
                            sector: "Technology".to_string(),
                        })
                        .await?;
                    stocks
                        .add_holding(HoldingOrder {
                            portfolio_id: portfolio_id.unwrap_or_else(Uuid::new_v4),
                            symbol: "ZZZZ".to_string(),
                            quantity: 1,
                        })
                        .await?;
                    Ok::<_, AppError>("unreachable".to_string())
                }
                .boxed()
            })
            .await;
        steps.push(DemoStep::new("list NVDA and buy unknown stock", failed));

        let delisted = self
            .runner
            .execute("delist-stock", |ctx| {
                async move {
                    let stocks = ctx.resolve::<dyn StockService>()?;
                    stocks.delist_stock("MSFT").await?;
                    let remaining = stocks.list_stocks().await?;
                    let listed: Vec<_> = remaining
                        .iter()
                        .filter(|s| s.listed)
                        .map(|s| s.symbol.as_str())
                        .collect();
                    Ok::<_, AppError>(format!("still listed: {}", listed.join(", ")))
                }
                .boxed()
            })
            .await;
        steps.push(DemoStep::new("delist stock", delisted));

        Ok(steps)
    }
}

/// Outcome of one demo operation.
#[derive(Debug)]
pub struct DemoStep {
    pub name: &'static str,
    pub outcome: Result<String, String>,
}

impl DemoStep {
    fn new(name: &'static str, outcome: AppResult<String>) -> Self {
        let outcome = outcome.map_err(|e| format!("[{}] {e}", e.code()));
        Self { name, outcome }
    }
}
