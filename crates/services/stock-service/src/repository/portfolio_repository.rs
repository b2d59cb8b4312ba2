//! Portfolio repository implementation.

use async_trait::async_trait;
use uuid::Uuid;

use domain::{DomainError, DomainResult, Portfolio};

use super::tables::PORTFOLIOS;
use super::translate::translate;
use crate::infra::{Repository, SessionHandle};

#[cfg(any(test, feature = "test-utils"))]
use mockall::automock;

#[cfg_attr(any(test, feature = "test-utils"), automock)]
#[async_trait]
pub trait PortfolioRepository: Send + Sync {
    async fn find_by_id(&self, id: Uuid) -> DomainResult<Option<Portfolio>>;

    async fn add(&self, portfolio: &mut Portfolio) -> DomainResult<()>;

    async fn save(&self, portfolio: &mut Portfolio) -> DomainResult<()>;

    async fn list(&self) -> DomainResult<Vec<Portfolio>>;
}

/// Concrete implementation of PortfolioRepository
pub struct PortfolioStore {
    session: SessionHandle,
}

impl Repository for PortfolioStore {
    fn from_session(session: SessionHandle) -> Self {
        Self { session }
    }
}

#[async_trait]
impl PortfolioRepository for PortfolioStore {
    async fn find_by_id(&self, id: Uuid) -> DomainResult<Option<Portfolio>> {
        self.session
            .fetch(PORTFOLIOS, &id.to_string())
            .await
            .map_err(|e| translate("Portfolio", e))
    }

    async fn add(&self, portfolio: &mut Portfolio) -> DomainResult<()> {
        self.session
            .insert(PORTFOLIOS, &portfolio.id.to_string(), &*portfolio)
            .await
            .map_err(|e| translate("Portfolio", e))?;
        self.session.collect(portfolio);
        Ok(())
    }

    async fn save(&self, portfolio: &mut Portfolio) -> DomainResult<()> {
        let key = portfolio.id.to_string();
        let exists = self
            .session
            .fetch::<Portfolio>(PORTFOLIOS, &key)
            .await
            .map_err(|e| translate("Portfolio", e))?
            .is_some();
        if !exists {
            return Err(DomainError::not_found(format!("Portfolio {key}")));
        }

        self.session
            .upsert(PORTFOLIOS, &key, &*portfolio)
            .await
            .map_err(|e| translate("Portfolio", e))?;
        self.session.collect(portfolio);
        Ok(())
    }

    async fn list(&self) -> DomainResult<Vec<Portfolio>> {
        self.session
            .scan(PORTFOLIOS)
            .await
            .map_err(|e| translate("Portfolio", e))
    }
}
