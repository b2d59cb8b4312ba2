//! In-process event bus.
//!
//! Handlers run synchronously on the publishing task, in registration order.
//! Nothing is persisted or retried: an event published here is delivered to
//! the handlers subscribed at that moment and then dropped.

use std::sync::Arc;

use parking_lot::RwLock;

use common::{HandlerFailure, PublishError};
use domain::{DomainEvent, EventPayload};

/// Callback invoked for every matching event.
pub type EventHandler = Arc<dyn Fn(&DomainEvent) -> anyhow::Result<()> + Send + Sync>;

struct Subscription {
    /// `None` matches every event type
    event_type: Option<String>,
    handler: EventHandler,
}

impl Subscription {
    fn matches(&self, event_type: &str) -> bool {
        self.event_type.as_deref().map_or(true, |t| t == event_type)
    }
}

#[derive(Default)]
pub struct EventBus {
    subscriptions: RwLock<Vec<Subscription>>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a handler for one event type.
    pub fn subscribe<H>(&self, event_type: impl Into<String>, handler: H)
    where
        H: Fn(&DomainEvent) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        let event_type = event_type.into();
        tracing::debug!(event_type = %event_type, "handler subscribed");
        self.subscriptions.write().push(Subscription {
            event_type: Some(event_type),
            handler: Arc::new(handler),
        });
    }

    /// Register a handler receiving the decoded payload of `E`.
    pub fn subscribe_to<E, H>(&self, handler: H)
    where
        E: EventPayload,
        H: Fn(&E, &DomainEvent) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        self.subscribe(E::EVENT_TYPE, move |event: &DomainEvent| {
            let payload = event.payload_as::<E>()?;
            handler(&payload, event)
        });
    }

    /// Register a handler for every event type.
    pub fn subscribe_all<H>(&self, handler: H)
    where
        H: Fn(&DomainEvent) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        tracing::debug!("catch-all handler subscribed");
        self.subscriptions.write().push(Subscription {
            event_type: None,
            handler: Arc::new(handler),
        });
    }

    /// Number of handlers an event of this type would reach
    pub fn handler_count(&self, event_type: &str) -> usize {
        self.subscriptions
            .read()
            .iter()
            .filter(|s| s.matches(event_type))
            .count()
    }

    pub fn publish(&self, event: DomainEvent) -> Result<(), PublishError> {
        self.publish_batch(vec![event])
    }

    /// Deliver `events` in order. Every handler of every event runs; failures
    /// are collected and reported together once the batch is done.
    pub fn publish_batch(&self, events: Vec<DomainEvent>) -> Result<(), PublishError> {
        let mut failures = Vec::new();

        for event in events {
            // Handlers may subscribe further handlers; never call them under the lock.
            let handlers: Vec<EventHandler> = self
                .subscriptions
                .read()
                .iter()
                .filter(|s| s.matches(event.event_type()))
                .map(|s| Arc::clone(&s.handler))
                .collect();

            tracing::debug!(
                event_id = %event.id(),
                event_type = event.event_type(),
                handlers = handlers.len(),
                "publishing event"
            );

            for (position, handler) in handlers.iter().enumerate() {
                if let Err(error) = handler(&event) {
                    tracing::warn!(
                        event_id = %event.id(),
                        event_type = event.event_type(),
                        handler = position,
                        error = %error,
                        "event handler failed"
                    );
                    failures.push(HandlerFailure {
                        event_id: event.id(),
                        event_type: event.event_type().to_string(),
                        handler: position,
                        error,
                    });
                }
            }
        }

        if failures.is_empty() {
            Ok(())
        } else {
            Err(PublishError { failures })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;
    use serde_json::Value;

    use domain::StockDelisted;

    fn recorder() -> (Arc<Mutex<Vec<String>>>, impl Fn(&str) -> EventHandler) {
        let log = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&log);
        let make = move |label: &str| {
            let sink = Arc::clone(&sink);
            let label = label.to_string();
            Arc::new(move |event: &DomainEvent| {
                sink.lock().push(format!("{label}:{}", event.event_type()));
                Ok(())
            }) as EventHandler
        };
        (log, make)
    }

    #[test]
    fn test_handlers_run_in_registration_order() {
        let bus = EventBus::new();
        let (log, make) = recorder();
        let (first, second, all) = (make("first"), make("second"), make("all"));

        bus.subscribe("a", move |e: &DomainEvent| first(e));
        bus.subscribe_all(move |e: &DomainEvent| all(e));
        bus.subscribe("a", move |e: &DomainEvent| second(e));

        bus.publish_batch(vec![
            DomainEvent::new("a", "1", Value::Null),
            DomainEvent::new("b", "1", Value::Null),
        ])
        .unwrap();

        assert_eq!(*log.lock(), vec!["first:a", "all:a", "second:a", "all:b"]);
        assert_eq!(bus.handler_count("a"), 3);
        assert_eq!(bus.handler_count("b"), 1);
    }

    #[test]
    fn test_failure_does_not_stop_other_handlers() {
        let bus = EventBus::new();
        let (log, make) = recorder();
        let after = make("after");

        bus.subscribe("a", |_: &DomainEvent| Err(anyhow::anyhow!("boom")));
        bus.subscribe_all(move |e: &DomainEvent| after(e));

        let err = bus
            .publish_batch(vec![
                DomainEvent::new("a", "1", Value::Null),
                DomainEvent::new("b", "1", Value::Null),
            ])
            .unwrap_err();

        assert_eq!(err.failures.len(), 1);
        assert_eq!(err.failures[0].event_type, "a");
        assert_eq!(err.failures[0].handler, 0);
        assert_eq!(*log.lock(), vec!["after:a", "after:b"]);
    }

    #[test]
    fn test_typed_subscription() {
        let bus = EventBus::new();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        bus.subscribe_to::<StockDelisted, _>(move |payload, _| {
            sink.lock().push(payload.symbol.clone());
            Ok(())
        });

        let event = DomainEvent::record("AAPL", &StockDelisted { symbol: "AAPL".into() }).unwrap();
        bus.publish(event).unwrap();

        // A mismatched payload is reported, not silently skipped.
        let broken = DomainEvent::new(StockDelisted::EVENT_TYPE, "X", Value::Null);
        assert!(bus.publish(broken).is_err());

        assert_eq!(*seen.lock(), vec!["AAPL".to_string()]);
    }

    #[test]
    fn test_publish_without_handlers() {
        let bus = EventBus::new();
        assert!(bus.publish(DomainEvent::new("nobody.listens", "1", Value::Null)).is_ok());
        assert_eq!(bus.handler_count("nobody.listens"), 0);
    }
}
