//! Cross-cutting event subscribers.
//!
//! Both are singletons shared by every operation, so their state sits behind
//! locks. They only ever see events of committed transactions.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::{Mutex, RwLock};
use serde::Serialize;
use uuid::Uuid;

use domain::{DomainEvent, StockDelisted, StockListed, StockRenamed};

use crate::infra::EventBus;

/// Read model of listed stocks, kept current by stock events.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ListingEntry {
    pub name: String,
    pub sector: String,
}

#[derive(Debug, Default)]
pub struct ListingCache {
    entries: RwLock<HashMap<String, ListingEntry>>,
}

impl ListingCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, symbol: &str) -> Option<ListingEntry> {
        self.entries.read().get(symbol).cloned()
    }

    /// Cached symbols, sorted
    pub fn symbols(&self) -> Vec<String> {
        let mut symbols: Vec<_> = self.entries.read().keys().cloned().collect();
        symbols.sort();
        symbols
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }

    fn on_listed(&self, event: &StockListed) {
        self.entries.write().insert(
            event.symbol.clone(),
            ListingEntry {
                name: event.name.clone(),
                sector: event.sector.clone(),
            },
        );
    }

    fn on_renamed(&self, event: &StockRenamed) {
        if let Some(entry) = self.entries.write().get_mut(&event.symbol) {
            entry.name = event.name.clone();
        }
    }

    fn on_delisted(&self, event: &StockDelisted) {
        self.entries.write().remove(&event.symbol);
    }
}

/// One published event, as remembered by the audit log.
#[derive(Debug, Clone, Serialize)]
pub struct AuditEntry {
    pub event_id: Uuid,
    pub sequence: u64,
    pub event_type: String,
    pub aggregate_id: String,
    pub occurred_at: DateTime<Utc>,
}

impl From<&DomainEvent> for AuditEntry {
    fn from(event: &DomainEvent) -> Self {
        Self {
            event_id: event.id(),
            sequence: event.sequence(),
            event_type: event.event_type().to_string(),
            aggregate_id: event.aggregate_id().to_string(),
            occurred_at: event.occurred_at(),
        }
    }
}

/// Bounded log of the most recent events; the oldest entries are evicted.
#[derive(Debug)]
pub struct AuditLog {
    capacity: usize,
    entries: Mutex<VecDeque<AuditEntry>>,
}

impl AuditLog {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            entries: Mutex::new(VecDeque::new()),
        }
    }

    pub fn record(&self, event: &DomainEvent) {
        tracing::info!(
            event_id = %event.id(),
            event_type = event.event_type(),
            aggregate = event.aggregate_id(),
            "domain event"
        );

        let mut entries = self.entries.lock();
        if entries.len() == self.capacity {
            entries.pop_front();
        }
        entries.push_back(AuditEntry::from(event));
    }

    /// Entries from oldest to newest
    pub fn entries(&self) -> Vec<AuditEntry> {
        self.entries.lock().iter().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }
}

/// Subscribe the default handlers. Call once at startup, before any
/// operation runs.
pub fn subscribe_defaults(bus: &EventBus, cache: Arc<ListingCache>, audit: Arc<AuditLog>) {
    bus.subscribe_all(move |event: &DomainEvent| {
        audit.record(event);
        Ok(())
    });

    let listed = Arc::clone(&cache);
    bus.subscribe_to::<StockListed, _>(move |event, _| {
        listed.on_listed(event);
        Ok(())
    });

    let renamed = Arc::clone(&cache);
    bus.subscribe_to::<StockRenamed, _>(move |event, _| {
        renamed.on_renamed(event);
        Ok(())
    });

    bus.subscribe_to::<StockDelisted, _>(move |event, _| {
        cache.on_delisted(event);
        Ok(())
    });
}
