//! Stock service configuration.

use std::env;
use std::time::Duration;

use common::{EventConfig, OperationConfig, ServiceConfig};

/// Stock service configuration.
#[derive(Debug, Clone, Default)]
pub struct StockServiceConfig {
    pub service: ServiceConfig,
    pub operation: OperationConfig,
    pub events: EventConfig,
}

impl StockServiceConfig {
    /// Load configuration from `.env` and environment variables.
    ///
    /// Unset or unparsable values fall back to the defaults.
    pub fn from_env() -> Self {
        dotenvy::dotenv().ok();

        let defaults = Self::default();
        Self {
            service: ServiceConfig {
                service_name: env::var("STOCK_SERVICE_NAME")
                    .unwrap_or_else(|_| "stock-service".to_string()),
                log_level: env::var("STOCK_SERVICE_LOG_LEVEL")
                    .or_else(|_| env::var("LOG_LEVEL"))
                    .unwrap_or(defaults.service.log_level),
            },
            operation: OperationConfig {
                timeout_ms: parse_var("STOCK_SERVICE_OPERATION_TIMEOUT_MS")
                    .unwrap_or(defaults.operation.timeout_ms),
                verify_on_startup: parse_var("STOCK_SERVICE_VERIFY_ON_STARTUP")
                    .unwrap_or(defaults.operation.verify_on_startup),
            },
            events: EventConfig {
                audit_capacity: parse_var("STOCK_SERVICE_AUDIT_CAPACITY")
                    .unwrap_or(defaults.events.audit_capacity),
            },
        }
    }

    /// Upper bound for a single operation
    pub fn operation_timeout(&self) -> Duration {
        Duration::from_millis(self.operation.timeout_ms)
    }
}

fn parse_var<T: std::str::FromStr>(name: &str) -> Option<T> {
    env::var(name).ok().and_then(|v| v.trim().parse().ok())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = StockServiceConfig::default();
        assert_eq!(config.operation_timeout(), Duration::from_secs(30));
        assert!(config.operation.verify_on_startup);
        assert_eq!(config.events.audit_capacity, 256);
    }

    #[test]
    fn test_parse_var_ignores_garbage() {
        env::set_var("STOCK_SERVICE_TEST_GARBAGE", "not-a-number");
        assert_eq!(parse_var::<u64>("STOCK_SERVICE_TEST_GARBAGE"), None);
        env::set_var("STOCK_SERVICE_TEST_NUMBER", " 1500 ");
        assert_eq!(parse_var::<u64>("STOCK_SERVICE_TEST_NUMBER"), Some(1500));
    }
}
