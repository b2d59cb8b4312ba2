//! Unit of work scenarios run end to end through the operation runner.

use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use futures::FutureExt;
use parking_lot::Mutex;
use serde_json::Value;

use common::{AppError, InfraResult, InfrastructureError, TransactionError};
use domain::{DomainError, DomainEvent};
use stock_service_lib::composition::CompositionRoot;
use stock_service_lib::config::StockServiceConfig;
use stock_service_lib::infra::{EventBus, InMemorySession, Session, TxHandle, UnitOfWork};
use stock_service_lib::operation::OperationRunner;
use stock_service_lib::repository::{tables, StockRepository};
use stock_service_lib::service::{NewListing, StockService};

enum CommitBehavior {
    Refuse,
    Stall(Duration),
}

/// In-memory session with a scripted commit.
struct ScriptedCommit {
    inner: InMemorySession,
    commit: CommitBehavior,
}

impl ScriptedCommit {
    fn new(commit: CommitBehavior) -> Self {
        Self {
            inner: InMemorySession::new(),
            commit,
        }
    }
}

#[async_trait]
impl Session for ScriptedCommit {
    async fn begin(&self) -> InfraResult<TxHandle> {
        self.inner.begin().await
    }

    async fn commit(&self, tx: &TxHandle) -> InfraResult<()> {
        match self.commit {
            CommitBehavior::Refuse => {
                self.inner.release(tx);
                Err(InfrastructureError::Unavailable("commit refused".into()))
            }
            CommitBehavior::Stall(delay) => {
                tokio::time::sleep(delay).await;
                self.inner.commit(tx).await
            }
        }
    }

    async fn rollback(&self, tx: &TxHandle) -> InfraResult<()> {
        self.inner.rollback(tx).await
    }

    fn release(&self, tx: &TxHandle) {
        self.inner.release(tx)
    }

    async fn fetch(&self, tx: &TxHandle, table: &str, key: &str) -> InfraResult<Option<Value>> {
        self.inner.fetch(tx, table, key).await
    }

    async fn insert(&self, tx: &TxHandle, table: &str, key: &str, row: Value) -> InfraResult<()> {
        self.inner.insert(tx, table, key, row).await
    }

    async fn upsert(&self, tx: &TxHandle, table: &str, key: &str, row: Value) -> InfraResult<()> {
        self.inner.upsert(tx, table, key, row).await
    }

    async fn remove(&self, tx: &TxHandle, table: &str, key: &str) -> InfraResult<()> {
        self.inner.remove(tx, table, key).await
    }

    async fn scan(&self, tx: &TxHandle, table: &str) -> InfraResult<Vec<Value>> {
        self.inner.scan(tx, table).await
    }
}

struct Harness {
    runner: OperationRunner,
    delivered: Arc<Mutex<Vec<(String, String)>>>,
}

async fn harness(session: Arc<dyn Session>, timeout: Duration) -> Harness {
    let bus = Arc::new(EventBus::new());
    let delivered = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&delivered);
    bus.subscribe_all(move |event: &DomainEvent| {
        sink.lock()
            .push((event.event_type().to_string(), event.aggregate_id().to_string()));
        Ok(())
    });

    let container = CompositionRoot::new(StockServiceConfig::default())
        .with_session(session)
        .with_event_bus(bus)
        .build()
        .await
        .unwrap();

    Harness {
        runner: OperationRunner::new(container, timeout),
        delivered,
    }
}

fn listing(symbol: &str) -> NewListing {
    NewListing {
        symbol: symbol.to_string(),
        name: format!("{symbol} Holdings"),
        sector: "Technology".to_string(),
    }
}

#[tokio::test]
async fn test_commit_success_publishes_in_raise_order() {
    let session = Arc::new(InMemorySession::new());
    let h = harness(session.clone(), Duration::from_secs(5)).await;

    h.runner
        .execute("list-two", |ctx| {
            async move {
                let stocks = ctx.resolve::<dyn StockService>()?;
                stocks.list_stock(listing("AAPL")).await?;
                stocks.list_stock(listing("MSFT")).await?;
                Ok::<_, AppError>(())
            }
            .boxed()
        })
        .await
        .unwrap();

    assert!(session.committed_row(tables::STOCKS, "AAPL").is_some());
    assert!(session.committed_row(tables::STOCKS, "MSFT").is_some());
    assert_eq!(
        *h.delivered.lock(),
        vec![
            ("stock.listed".to_string(), "AAPL".to_string()),
            ("stock.listed".to_string(), "MSFT".to_string()),
        ]
    );
}

#[tokio::test]
async fn test_commit_failure_persists_nothing_and_publishes_nothing() {
    let session = Arc::new(ScriptedCommit::new(CommitBehavior::Refuse));
    let h = harness(session.clone(), Duration::from_secs(5)).await;

    let err = h
        .runner
        .execute("list-two", |ctx| {
            async move {
                let stocks = ctx.resolve::<dyn StockService>()?;
                stocks.list_stock(listing("AAPL")).await?;
                stocks.list_stock(listing("MSFT")).await?;
                Ok::<_, AppError>(())
            }
            .boxed()
        })
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        AppError::Transaction(TransactionError::Commit(InfrastructureError::Unavailable(_)))
    ));
    assert!(session.inner.committed_rows(tables::STOCKS).is_empty());
    assert_eq!(session.inner.open_transactions(), 0);
    assert!(h.delivered.lock().is_empty());
}

#[tokio::test]
async fn test_domain_error_rolls_back_and_passes_through() {
    let session = Arc::new(InMemorySession::new());
    let h = harness(session.clone(), Duration::from_secs(5)).await;

    let err = h
        .runner
        .execute("write-then-fail", |ctx| {
            async move {
                let stocks = ctx.resolve::<dyn StockService>()?;
                stocks.list_stock(listing("AAPL")).await?;
                Err::<(), AppError>(DomainError::invalid_state("trading halted").into())
            }
            .boxed()
        })
        .await
        .unwrap_err();

    assert_eq!(err.as_domain(), Some(&DomainError::invalid_state("trading halted")));
    assert!(session.committed_rows(tables::STOCKS).is_empty());
    assert_eq!(session.open_transactions(), 0);
    assert!(h.delivered.lock().is_empty());
}

#[tokio::test]
async fn test_timeout_rolls_back() {
    let session = Arc::new(InMemorySession::new());
    let h = harness(session.clone(), Duration::from_millis(50)).await;

    let err = h
        .runner
        .execute("slow", |ctx| {
            async move {
                let stocks = ctx.resolve::<dyn StockService>()?;
                stocks.list_stock(listing("AAPL")).await?;
                tokio::time::sleep(Duration::from_secs(10)).await;
                Ok::<_, AppError>(())
            }
            .boxed()
        })
        .await
        .unwrap_err();

    assert!(matches!(err, AppError::Transaction(TransactionError::TimedOut(_))));
    assert!(session.committed_rows(tables::STOCKS).is_empty());
    assert_eq!(session.open_transactions(), 0);
    assert!(h.delivered.lock().is_empty());
}

#[tokio::test]
async fn test_deadline_covers_stalled_commit() {
    let session = Arc::new(ScriptedCommit::new(CommitBehavior::Stall(Duration::from_secs(3))));
    let h = harness(session.clone(), Duration::from_millis(100)).await;

    let started = Instant::now();
    let err = h
        .runner
        .execute("list-one", |ctx| {
            async move {
                let stocks = ctx.resolve::<dyn StockService>()?;
                stocks.list_stock(listing("AAPL")).await?;
                Ok::<_, AppError>(())
            }
            .boxed()
        })
        .await
        .unwrap_err();

    assert!(started.elapsed() < Duration::from_secs(1));
    assert!(matches!(err, AppError::Transaction(TransactionError::TimedOut(_))));
    assert_eq!(session.inner.open_transactions(), 0);
    assert!(session.inner.committed_rows(tables::STOCKS).is_empty());
    assert!(h.delivered.lock().is_empty());
}

#[tokio::test]
async fn test_cancelled_operation_releases_transaction() {
    let session = Arc::new(InMemorySession::new());
    let h = harness(session.clone(), Duration::from_secs(30)).await;

    let cancelled = tokio::time::timeout(
        Duration::from_millis(50),
        h.runner.execute("abandoned", |ctx| {
            async move {
                let stocks = ctx.resolve::<dyn StockService>()?;
                stocks.list_stock(listing("AAPL")).await?;
                tokio::time::sleep(Duration::from_secs(10)).await;
                Ok::<_, AppError>(())
            }
            .boxed()
        }),
    )
    .await;

    assert!(cancelled.is_err());
    assert_eq!(session.open_transactions(), 0);
    assert!(session.committed_rows(tables::STOCKS).is_empty());
    assert!(h.delivered.lock().is_empty());
}

#[tokio::test]
async fn test_scoped_services_share_one_unit_of_work() {
    let session = Arc::new(InMemorySession::new());
    let h = harness(session, Duration::from_secs(5)).await;

    h.runner
        .execute("inspect", |ctx| {
            async move {
                let uow = ctx.resolve::<UnitOfWork>()?;
                assert!(std::ptr::eq(uow.as_ref(), ctx.uow()));

                let first = ctx.resolve::<dyn StockRepository>()?;
                let second = ctx.resolve::<dyn StockRepository>()?;
                assert!(Arc::ptr_eq(&first, &second));

                let service = ctx.resolve::<dyn StockService>()?;
                let again = ctx.resolve::<dyn StockService>()?;
                assert!(Arc::ptr_eq(&service, &again));
                Ok::<_, AppError>(())
            }
            .boxed()
        })
        .await
        .unwrap();
}

#[tokio::test]
async fn test_concurrent_operations_are_isolated() {
    let session = Arc::new(InMemorySession::new());
    let h = harness(session.clone(), Duration::from_secs(5)).await;
    let runner = Arc::new(h.runner);

    let symbols = ["AAPL", "MSFT", "NVDA", "TSLA", "AMZN", "GOOG", "META", "INTC"];
    let mut tasks = Vec::new();
    for symbol in symbols {
        let runner = Arc::clone(&runner);
        tasks.push(tokio::spawn(async move {
            runner
                .execute("list-one", move |ctx| {
                    async move {
                        let stocks = ctx.resolve::<dyn StockService>()?;
                        stocks.list_stock(listing(symbol)).await?;
                        tokio::task::yield_now().await;
                        Ok::<_, AppError>(ctx.uow().id())
                    }
                    .boxed()
                })
                .await
        }));
    }

    let mut uow_ids = Vec::new();
    for task in tasks {
        uow_ids.push(task.await.unwrap().unwrap());
    }
    uow_ids.sort();
    uow_ids.dedup();

    assert_eq!(uow_ids.len(), symbols.len());
    assert_eq!(session.committed_rows(tables::STOCKS).len(), symbols.len());
    assert_eq!(h.delivered.lock().len(), symbols.len());
    assert_eq!(session.open_transactions(), 0);
}

#[tokio::test]
async fn test_conflicting_listings_fail_cleanly() {
    let session = Arc::new(InMemorySession::new());
    let h = harness(session.clone(), Duration::from_secs(5)).await;

    let list_aapl = || {
        h.runner.execute("list-aapl", |ctx| {
            async move {
                let stocks = ctx.resolve::<dyn StockService>()?;
                stocks.list_stock(listing("AAPL")).await?;
                Ok::<_, AppError>(())
            }
            .boxed()
        })
    };

    list_aapl().await.unwrap();
    let err = list_aapl().await.unwrap_err();

    assert!(matches!(err, AppError::Domain(DomainError::Conflict(_))));
    assert_eq!(h.delivered.lock().len(), 1);
}
