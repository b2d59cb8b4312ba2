//! Bootstrap and demo tests.

use container::Lifetime;
use stock_service_lib::config::StockServiceConfig;
use stock_service_lib::App;

#[tokio::test]
async fn test_bootstrap_verifies_every_registration() {
    let app = App::bootstrap(StockServiceConfig::default()).await.unwrap();

    let report = app.verify().await.unwrap();

    assert_eq!(report.len(), 10);
    assert_eq!(report.len(), app.container().keys().len());
    let scoped = report
        .services
        .iter()
        .filter(|(_, lifetime)| *lifetime == Lifetime::Scoped)
        .count();
    // Unit of work, two repositories and the stock service
    assert_eq!(scoped, 4);
}

#[tokio::test]
async fn test_bootstrap_without_verification() {
    let mut config = StockServiceConfig::default();
    config.operation.verify_on_startup = false;

    let app = App::bootstrap(config).await.unwrap();

    assert!(app.container().is_sealed());
    assert!(app.audit_log().unwrap().is_empty());
}

#[tokio::test]
async fn test_demo_rolls_back_failed_operation() {
    let app = App::bootstrap(StockServiceConfig::default()).await.unwrap();

    let steps = app.run_demo().await.unwrap();

    assert_eq!(steps.len(), 5);
    let failed: Vec<_> = steps.iter().filter(|s| s.outcome.is_err()).collect();
    assert_eq!(failed.len(), 1);
    assert_eq!(failed[0].name, "list NVDA and buy unknown stock");
    assert!(failed[0]
        .outcome
        .as_ref()
        .unwrap_err()
        .starts_with("[DOMAIN_ERROR]"));

    // MSFT was delisted, NVDA never committed.
    let cache = app.listing_cache().unwrap();
    assert_eq!(cache.symbols(), vec!["AAPL".to_string()]);

    let events: Vec<_> = app
        .audit_log()
        .unwrap()
        .entries()
        .into_iter()
        .map(|e| (e.event_type, e.aggregate_id))
        .collect();
    assert_eq!(events.len(), 6);
    assert!(events.iter().all(|(_, aggregate)| aggregate != "NVDA"));
    assert_eq!(events[0], ("stock.listed".to_string(), "AAPL".to_string()));
    assert_eq!(events[5], ("stock.delisted".to_string(), "MSFT".to_string()));
}
