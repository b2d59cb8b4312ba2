//! Aggregate capability.
//!
//! Aggregates do not inherit from a base type; they own an [`EventQueue`]
//! and implement [`Aggregate`] to expose it.

use crate::error::DomainResult;
use crate::event::{DomainEvent, EventPayload};

/// Pending events raised by one aggregate instance.
#[derive(Debug, Default)]
pub struct EventQueue {
    pending: Vec<DomainEvent>,
}

impl EventQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, event: DomainEvent) {
        self.pending.push(event);
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &DomainEvent> {
        self.pending.iter()
    }

    /// Return every pending event and leave the queue empty.
    pub fn drain(&mut self) -> Vec<DomainEvent> {
        std::mem::take(&mut self.pending)
    }
}

/// A business object that accumulates domain events.
pub trait Aggregate: Send + Sync {
    /// Identifier used as the `aggregate_id` of raised events
    fn aggregate_id(&self) -> String;

    fn event_queue(&self) -> &EventQueue;

    fn event_queue_mut(&mut self) -> &mut EventQueue;

    /// Record a typed event on this aggregate.
    fn raise<E: EventPayload>(&mut self, event: &E) -> DomainResult<()>
    where
        Self: Sized,
    {
        let event = DomainEvent::record(self.aggregate_id(), event)?;
        self.event_queue_mut().push(event);
        Ok(())
    }

    /// Number of events raised and not yet drained
    fn pending_events(&self) -> usize {
        self.event_queue().len()
    }

    /// Hand over every pending event exactly once.
    fn drain_events(&mut self) -> Vec<DomainEvent> {
        self.event_queue_mut().drain()
    }
}
