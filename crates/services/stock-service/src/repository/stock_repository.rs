//! Stock repository implementation.

use async_trait::async_trait;

use domain::{DomainError, DomainResult, Stock};

use super::tables::STOCKS;
use super::translate::translate;
use crate::infra::{Repository, SessionHandle};

#[cfg(any(test, feature = "test-utils"))]
use mockall::automock;

/// Stock repository trait for dependency injection.
///
/// Writes move the aggregate's pending events into the current transaction.
#[cfg_attr(any(test, feature = "test-utils"), automock)]
#[async_trait]
pub trait StockRepository: Send + Sync {
    /// Find stock by ticker symbol
    async fn find_by_symbol(&self, symbol: &str) -> DomainResult<Option<Stock>>;

    /// Persist a newly listed stock; fails with a conflict if the symbol is taken
    async fn add(&self, stock: &mut Stock) -> DomainResult<()>;

    /// Persist changes to an existing stock
    async fn save(&self, stock: &mut Stock) -> DomainResult<()>;

    /// List every stock, ordered by symbol
    async fn list(&self) -> DomainResult<Vec<Stock>>;
}

/// Concrete implementation of StockRepository
pub struct StockStore {
    session: SessionHandle,
}

impl Repository for StockStore {
    fn from_session(session: SessionHandle) -> Self {
        Self { session }
    }
}

#[async_trait]
impl StockRepository for StockStore {
    async fn find_by_symbol(&self, symbol: &str) -> DomainResult<Option<Stock>> {
        self.session
            .fetch(STOCKS, symbol)
            .await
            .map_err(|e| translate("Stock", e))
    }

    async fn add(&self, stock: &mut Stock) -> DomainResult<()> {
        self.session
            .insert(STOCKS, &stock.symbol, &*stock)
            .await
            .map_err(|e| translate("Stock", e))?;
        self.session.collect(stock);
        Ok(())
    }

    async fn save(&self, stock: &mut Stock) -> DomainResult<()> {
        if self
            .session
            .fetch::<Stock>(STOCKS, &stock.symbol)
            .await
            .map_err(|e| translate("Stock", e))?
            .is_none()
        {
            return Err(DomainError::not_found(format!("Stock {}", stock.symbol)));
        }

        self.session
            .upsert(STOCKS, &stock.symbol, &*stock)
            .await
            .map_err(|e| translate("Stock", e))?;
        self.session.collect(stock);
        Ok(())
    }

    async fn list(&self) -> DomainResult<Vec<Stock>> {
        self.session.scan(STOCKS).await.map_err(|e| translate("Stock", e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use domain::Aggregate;

    use crate::infra::{EventCollector, InMemorySession, Session};

    async fn store() -> (StockStore, EventCollector) {
        let session = Arc::new(InMemorySession::new());
        let tx = session.begin().await.unwrap();
        let events = EventCollector::new();
        let handle = SessionHandle::new(tx, session, events.clone());
        (StockStore::from_session(handle), events)
    }

    #[tokio::test]
    async fn test_add_collects_events() {
        let (store, events) = store().await;
        let mut stock = Stock::list("AAPL", "Apple Inc.", "Technology").unwrap();

        store.add(&mut stock).await.unwrap();

        assert_eq!(stock.pending_events(), 0);
        assert_eq!(events.len(), 1);
        let found = store.find_by_symbol("AAPL").await.unwrap().unwrap();
        assert_eq!(found.name, "Apple Inc.");
        assert_eq!(found.pending_events(), 0);
    }

    #[tokio::test]
    async fn test_duplicate_symbol_is_conflict() {
        let (store, events) = store().await;
        store
            .add(&mut Stock::list("AAPL", "Apple Inc.", "Technology").unwrap())
            .await
            .unwrap();

        let mut duplicate = Stock::list("AAPL", "Apple Again", "Technology").unwrap();
        let err = store.add(&mut duplicate).await.unwrap_err();

        assert_eq!(err, DomainError::conflict("Stock AAPL"));
        // The rejected write keeps its events; nothing reaches the transaction.
        assert_eq!(duplicate.pending_events(), 1);
        assert_eq!(events.len(), 1);
    }

    #[tokio::test]
    async fn test_save_requires_existing_stock() {
        let (store, _) = store().await;
        let mut stock = Stock::list("MSFT", "Microsoft", "Technology").unwrap();

        let err = store.save(&mut stock).await.unwrap_err();
        assert_eq!(err, DomainError::not_found("Stock MSFT"));

        store.add(&mut stock).await.unwrap();
        stock.rename("Microsoft Corporation").unwrap();
        store.save(&mut stock).await.unwrap();

        let names: Vec<_> = store.list().await.unwrap().into_iter().map(|s| s.name).collect();
        assert_eq!(names, vec!["Microsoft Corporation"]);
    }
}
