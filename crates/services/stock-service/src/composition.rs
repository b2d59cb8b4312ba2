//! Composition root.
//!
//! The only place where concrete types are bound to the contracts the rest
//! of the service resolves. It returns an explicit container instance that
//! startup code threads through; nothing here is global.

use std::sync::Arc;

use once_cell::sync::OnceCell;

use common::{AppError, AppResult};
use container::{
    ContainerError, Lifetime, Scope, ServiceContainer, ServiceDescriptor, VerificationReport,
};

use crate::config::StockServiceConfig;
use crate::handlers::{subscribe_defaults, AuditLog, ListingCache};
use crate::infra::{EventBus, InMemorySession, Session, UnitOfWork};
use crate::repository::{PortfolioRepository, PortfolioStore, StockRepository, StockStore};
use crate::service::{ListingPolicy, StandardListingPolicy, StockManager, StockService};

/// Event-driven read models fed by the root's bus.
struct ReadModels {
    cache: Arc<ListingCache>,
    audit: Arc<AuditLog>,
}

pub struct CompositionRoot {
    config: StockServiceConfig,
    session: Arc<dyn Session>,
    bus: Arc<EventBus>,
    read_models: OnceCell<ReadModels>,
}

impl CompositionRoot {
    /// Defaults to an in-memory session and a fresh event bus.
    pub fn new(config: StockServiceConfig) -> Self {
        Self {
            config,
            session: Arc::new(InMemorySession::new()),
            bus: Arc::new(EventBus::new()),
            read_models: OnceCell::new(),
        }
    }

    /// Use another persistence session
    pub fn with_session(mut self, session: Arc<dyn Session>) -> Self {
        self.session = session;
        self
    }

    /// Use an event bus owned by the caller
    pub fn with_event_bus(mut self, bus: Arc<EventBus>) -> Self {
        self.bus = bus;
        self
    }

    /// Register every service. A sealed container is left untouched.
    pub fn configure(&self, container: &ServiceContainer) -> AppResult<()> {
        if container.is_sealed() {
            tracing::debug!("container already sealed, skipping configuration");
            return Ok(());
        }

        // Process-wide collaborators
        container.register_instance::<dyn Session>(Arc::clone(&self.session))?;
        container.register_instance(Arc::clone(&self.bus))?;
        container.register_instance(Arc::new(self.config.clone()))?;

        // Stateless or internally synchronised services
        container.register_singleton::<dyn ListingPolicy, _>(|_| {
            Ok(Arc::new(StandardListingPolicy::default()) as Arc<dyn ListingPolicy>)
        })?;
        let read_models = self.read_models();
        container.register_instance(Arc::clone(&read_models.cache))?;
        container.register_instance(Arc::clone(&read_models.audit))?;

        // One transaction per operation
        container.register(
            ServiceDescriptor::scoped(|r| {
                Ok(Arc::new(UnitOfWork::new(
                    r.resolve::<dyn Session>()?,
                    r.resolve::<EventBus>()?,
                )))
            })
            .on_dispose(|uow: &Arc<UnitOfWork>| uow.dispose()),
        )?;

        // Repositories bound to the operation's transaction
        container.register_scoped::<dyn StockRepository, _>(|r| {
            let uow = r.resolve::<UnitOfWork>()?;
            let store = uow
                .repository::<StockStore>()
                .map_err(ContainerError::factory_failed::<dyn StockRepository>)?;
            Ok(store as Arc<dyn StockRepository>)
        })?;
        container.register_scoped::<dyn PortfolioRepository, _>(|r| {
            let uow = r.resolve::<UnitOfWork>()?;
            let store = uow
                .repository::<PortfolioStore>()
                .map_err(ContainerError::factory_failed::<dyn PortfolioRepository>)?;
            Ok(store as Arc<dyn PortfolioRepository>)
        })?;

        container.register_scoped::<dyn StockService, _>(|r| {
            Ok(Arc::new(StockManager::new(
                r.resolve::<dyn StockRepository>()?,
                r.resolve::<dyn PortfolioRepository>()?,
                r.resolve::<dyn ListingPolicy>()?,
            )) as Arc<dyn StockService>)
        })?;

        tracing::info!(services = container.keys().len(), "services registered");
        Ok(())
    }

    /// Build, verify and seal a new container.
    ///
    /// Containers built from the same root share its bus and read models.
    pub async fn build(&self) -> AppResult<Arc<ServiceContainer>> {
        let container = Arc::new(ServiceContainer::new());
        self.configure(&container)?;

        if self.config.operation.verify_on_startup {
            Self::verify(&container).await?;
        }

        container.seal();
        Ok(container)
    }

    /// Resolve every registration inside a throwaway scope.
    ///
    /// Repositories need an open transaction, so the scope's unit of work is
    /// begun first and rolled back afterwards. Nothing is written.
    pub async fn verify(container: &Arc<ServiceContainer>) -> AppResult<VerificationReport> {
        if container.lifetime_of::<UnitOfWork>() != Some(Lifetime::Scoped) {
            return Err(AppError::internal("UnitOfWork must be registered as scoped"));
        }

        let scope = Scope::open(container);
        let uow = scope.resolve::<UnitOfWork>()?;
        uow.begin().await?;

        let report = container.verify(&scope);

        if let Err(e) = uow.rollback().await {
            tracing::warn!(error = %e, "verification rollback failed");
        }
        scope.close();

        let report = report?;
        tracing::info!(services = report.len(), "startup verification passed");
        Ok(report)
    }

    /// Created and subscribed to the bus on first use only.
    fn read_models(&self) -> &ReadModels {
        self.read_models.get_or_init(|| {
            let models = ReadModels {
                cache: Arc::new(ListingCache::new()),
                audit: Arc::new(AuditLog::new(self.config.events.audit_capacity)),
            };
            subscribe_defaults(
                &self.bus,
                Arc::clone(&models.cache),
                Arc::clone(&models.audit),
            );
            models
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use container::LifetimeViolationError;
    use futures::FutureExt;

    use crate::operation::OperationRunner;
    use crate::service::NewListing;

    #[tokio::test]
    async fn test_build_verifies_and_seals() {
        let container = CompositionRoot::new(StockServiceConfig::default())
            .build()
            .await
            .unwrap();

        assert!(container.is_sealed());
        assert_eq!(container.lifetime_of::<UnitOfWork>(), Some(Lifetime::Scoped));
        assert_eq!(container.lifetime_of::<dyn Session>(), Some(Lifetime::Singleton));
        assert_eq!(container.lifetime_of::<dyn ListingPolicy>(), Some(Lifetime::Singleton));
        assert_eq!(container.lifetime_of::<dyn StockRepository>(), Some(Lifetime::Scoped));
        assert_eq!(container.lifetime_of::<dyn StockService>(), Some(Lifetime::Scoped));
    }

    #[tokio::test]
    async fn test_configure_is_noop_once_sealed() {
        let root = CompositionRoot::new(StockServiceConfig::default());
        let container = root.build().await.unwrap();
        let before = container.keys().len();

        root.configure(&container).unwrap();

        assert_eq!(container.keys().len(), before);
    }

    #[tokio::test]
    async fn test_repeated_builds_share_one_set_of_handlers() {
        let bus = Arc::new(EventBus::new());
        let root = CompositionRoot::new(StockServiceConfig::default()).with_event_bus(bus.clone());

        let first = root.build().await.unwrap();
        let second = root.build().await.unwrap();

        // Catch-all audit handler plus the cache handler
        assert_eq!(bus.handler_count(domain::constants::EVENT_STOCK_LISTED), 2);
        assert!(Arc::ptr_eq(
            &first.resolve::<ListingCache>().unwrap(),
            &second.resolve::<ListingCache>().unwrap()
        ));

        OperationRunner::new(second, Duration::from_secs(5))
            .execute("list-one", |ctx| {
                async move {
                    let stocks = ctx.resolve::<dyn StockService>()?;
                    stocks
                        .list_stock(NewListing {
                            symbol: "AAPL".into(),
                            name: "Apple Inc.".into(),
                            sector: "Technology".into(),
                        })
                        .await?;
                    Ok::<_, AppError>(())
                }
                .boxed()
            })
            .await
            .unwrap();

        let audit = first.resolve::<AuditLog>().unwrap();
        assert_eq!(audit.len(), 1);
        assert_eq!(first.resolve::<ListingCache>().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_unit_of_work_requires_scope() {
        let container = CompositionRoot::new(StockServiceConfig::default())
            .build()
            .await
            .unwrap();

        let err = container.resolve::<UnitOfWork>().unwrap_err();
        assert!(matches!(
            err,
            ContainerError::LifetimeViolation(LifetimeViolationError::MissingScope { .. })
        ));
    }

    #[tokio::test]
    async fn test_verification_leaves_no_transaction_open() {
        let session = Arc::new(InMemorySession::new());
        CompositionRoot::new(StockServiceConfig::default())
            .with_session(session.clone())
            .build()
            .await
            .unwrap();

        assert_eq!(session.open_transactions(), 0);
    }

    #[tokio::test]
    async fn test_misconfiguration_fails_verification() {
        let container = Arc::new(ServiceContainer::new());
        CompositionRoot::new(StockServiceConfig::default())
            .configure(&container)
            .unwrap();
        // Replace the policy with one whose construction fails.
        container
            .register_singleton::<dyn ListingPolicy, _>(|_| {
                Err(ContainerError::factory_failed::<dyn ListingPolicy>(
                    "policy file missing",
                ))
            })
            .unwrap();

        let err = CompositionRoot::verify(&container).await.unwrap_err();
        assert_eq!(err.code(), "CONFIGURATION_ERROR");
    }
}
