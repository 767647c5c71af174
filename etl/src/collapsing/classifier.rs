use std::fmt;

use crate::types::{ChangeEvent, EntityKey};

/// Whether an event creates a property or changes an existing one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventClassification {
    Insert,
    Update,
}

impl EventClassification {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventClassification::Insert => "insert",
            EventClassification::Update => "update",
        }
    }
}

impl fmt::Display for EventClassification {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Classifies an event by the producer convention.
///
/// An event is an insert iff its created and modified timestamps are exactly equal, which
/// includes both being absent. Existence of prior state is never consulted.
pub fn classify(event: &ChangeEvent) -> EventClassification {
    if event.created_at == event.modified_at {
        EventClassification::Insert
    } else {
        EventClassification::Update
    }
}

/// An event paired with its classification.
#[derive(Debug, Clone, PartialEq)]
pub struct ClassifiedEvent {
    pub classification: EventClassification,
    pub event: ChangeEvent,
}

impl ClassifiedEvent {
    pub fn key(&self) -> &EntityKey {
        &self.event.key
    }

    pub fn is_update(&self) -> bool {
        self.classification == EventClassification::Update
    }
}

/// Classifies a batch, keeping delivery order.
pub fn classify_events(events: Vec<ChangeEvent>) -> Vec<ClassifiedEvent> {
    events
        .into_iter()
        .map(|event| ClassifiedEvent {
            classification: classify(&event),
            event,
        })
        .collect()
}
