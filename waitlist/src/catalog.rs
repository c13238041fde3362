//! Event metadata collaborator.
//!
//! The admission engine never writes event metadata. It only needs the ticket
//! pool size, the owner and the cancellation flag, read at every decision.

use crate::types::{EventId, EventRecord};
use std::collections::HashMap;
use std::sync::{PoisonError, RwLock};

/// Read accessor for event metadata
///
/// Called from inside reducers, so it is synchronous and must not block.
pub trait EventCatalog: Send + Sync {
    /// Look up an event
    fn event(&self, event_id: &EventId) -> Option<EventRecord>;
}

/// In-memory catalog for the demo and tests
#[derive(Debug, Default)]
pub struct InMemoryEventCatalog {
    events: RwLock<HashMap<EventId, EventRecord>>,
}

impl InMemoryEventCatalog {
    /// Creates an empty catalog
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace an event
    pub fn insert(&self, record: EventRecord) {
        self.events
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(record.event_id, record);
    }

    /// Flag an event as cancelled. Returns false if unknown.
    pub fn cancel(&self, event_id: &EventId) -> bool {
        self.events
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .get_mut(event_id)
            .map(|record| record.is_cancelled = true)
            .is_some()
    }
}

impl EventCatalog for InMemoryEventCatalog {
    fn event(&self, event_id: &EventId) -> Option<EventRecord> {
        self.events
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(event_id)
            .cloned()
    }
}
