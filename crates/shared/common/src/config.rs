//! Shared configuration structures.

use serde::{Deserialize, Serialize};

/// Base service configuration shared by all services.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ServiceConfig {
    /// Service name, attached to log output
    pub service_name: String,
    /// Log level
    pub log_level: String,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            service_name: "service".to_string(),
            log_level: "info".to_string(),
        }
    }
}

/// Per-operation execution settings.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct OperationConfig {
    /// Upper bound for one operation, in milliseconds; exceeding it rolls back
    pub timeout_ms: u64,
    /// Resolve every registration inside a throwaway scope at startup
    pub verify_on_startup: bool,
}

impl Default for OperationConfig {
    fn default() -> Self {
        Self {
            timeout_ms: 30_000,
            verify_on_startup: true,
        }
    }
}

/// In-process event delivery settings.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct EventConfig {
    /// Number of published events kept by the audit log
    pub audit_capacity: usize,
}

impl Default for EventConfig {
    fn default() -> Self {
        Self { audit_capacity: 256 }
    }
}
