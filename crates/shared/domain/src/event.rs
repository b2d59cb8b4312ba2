//! Domain events.
//!
//! A [`DomainEvent`] is an immutable record of something that happened as a
//! side effect of a state change. Aggregates raise them, the unit of work
//! collects them and the event bus receives them after commit. The type is
//! intentionally not `Clone`: ownership moves from aggregate to session to
//! bus, so the same event cannot be handed out twice.

use std::sync::atomic::{AtomicU64, Ordering};

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::Serialize;
use uuid::Uuid;

use crate::error::{DomainError, DomainResult};

/// Process-wide raise counter; orders events across aggregates.
static NEXT_SEQUENCE: AtomicU64 = AtomicU64::new(1);

/// Typed payload of a domain event.
pub trait EventPayload: Serialize + DeserializeOwned + Send + Sync + 'static {
    /// Stable type tag used to route the event to its handlers
    const EVENT_TYPE: &'static str;
}

/// Immutable domain event envelope
#[derive(Debug, Serialize)]
pub struct DomainEvent {
    id: Uuid,
    sequence: u64,
    occurred_at: DateTime<Utc>,
    event_type: String,
    aggregate_id: String,
    payload: serde_json::Value,
}

impl DomainEvent {
    /// Create an event from a raw payload.
    pub fn new(
        event_type: impl Into<String>,
        aggregate_id: impl Into<String>,
        payload: serde_json::Value,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            sequence: NEXT_SEQUENCE.fetch_add(1, Ordering::Relaxed),
            occurred_at: Utc::now(),
            event_type: event_type.into(),
            aggregate_id: aggregate_id.into(),
            payload,
        }
    }

    /// Record a typed event raised by the given aggregate.
    pub fn record<E: EventPayload>(
        aggregate_id: impl Into<String>,
        event: &E,
    ) -> DomainResult<Self> {
        let payload = serde_json::to_value(event).map_err(|e| {
            DomainError::internal(format!("cannot encode {} payload: {e}", E::EVENT_TYPE))
        })?;
        Ok(Self::new(E::EVENT_TYPE, aggregate_id, payload))
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    /// Position in raise order (monotonic within the process)
    pub fn sequence(&self) -> u64 {
        self.sequence
    }

    pub fn occurred_at(&self) -> DateTime<Utc> {
        self.occurred_at
    }

    pub fn event_type(&self) -> &str {
        &self.event_type
    }

    pub fn aggregate_id(&self) -> &str {
        &self.aggregate_id
    }

    pub fn payload(&self) -> &serde_json::Value {
        &self.payload
    }

    /// Decode the payload as a typed event.
    ///
    /// Fails if the event carries a different type tag or the payload does
    /// not match the expected shape.
    pub fn payload_as<E: EventPayload>(&self) -> DomainResult<E> {
        if self.event_type != E::EVENT_TYPE {
            return Err(DomainError::internal(format!(
                "event {} is a {}, not a {}",
                self.id,
                self.event_type,
                E::EVENT_TYPE
            )));
        }
        serde_json::from_value(self.payload.clone()).map_err(|e| {
            DomainError::internal(format!("cannot decode {} payload: {e}", E::EVENT_TYPE))
        })
    }
}
