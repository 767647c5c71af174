use std::collections::HashMap;

use metrics::counter;
use tracing::warn;

use crate::collapsing::{ClassifiedEvent, EventClassification, ResolvedState};
use crate::metrics::{
    CLASSIFICATION_LABEL, ETL_COLLAPSE_EVENTS_TOTAL, ETL_COLLAPSE_FALLBACK_INSERTS_TOTAL,
};
use crate::types::{ChangeEvent, CollapsingRow, EntityKey};

/// Rows emitted for a single event.
#[derive(Debug, Clone, PartialEq)]
pub enum Emission {
    /// A new property: one `+1` row.
    Insert(CollapsingRow),
    /// An update of a known row: the `-1` copy of the prior row, then the new `+1` row.
    Replace {
        cancel: CollapsingRow,
        state: CollapsingRow,
    },
    /// An update with no discoverable predecessor: one `+1` row and no cancellation.
    FallbackInsert(CollapsingRow),
}

impl Emission {
    /// Returns the `+1` row that becomes the live state of the key.
    pub fn state_row(&self) -> &CollapsingRow {
        match self {
            Emission::Insert(state)
            | Emission::FallbackInsert(state)
            | Emission::Replace { state, .. } => state,
        }
    }

    pub fn len(&self) -> usize {
        match self {
            Emission::Insert(_) | Emission::FallbackInsert(_) => 1,
            Emission::Replace { .. } => 2,
        }
    }

    pub fn is_empty(&self) -> bool {
        false
    }

    /// Returns the rows in append order.
    pub fn into_rows(self) -> Vec<CollapsingRow> {
        match self {
            Emission::Insert(state) | Emission::FallbackInsert(state) => vec![state],
            Emission::Replace { cancel, state } => vec![cancel, state],
        }
    }
}

/// Encodes one event against the prior live row of its key.
///
/// `prior` is only consulted for updates: an insert always yields a single `+1` row.
pub fn encode_event(
    classification: EventClassification,
    event: &ChangeEvent,
    prior: Option<&CollapsingRow>,
) -> Emission {
    let state = CollapsingRow::state_of(event);

    match (classification, prior) {
        (EventClassification::Insert, _) => Emission::Insert(state),
        (EventClassification::Update, Some(prior)) => Emission::Replace {
            cancel: prior.cancellation(),
            state,
        },
        (EventClassification::Update, None) => Emission::FallbackInsert(state),
    }
}

/// Counters describing what a window produced.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CollapseStats {
    pub inserts: u64,
    /// Updates that cancelled a prior `+1` row, persisted or emitted earlier in the window.
    pub updates: u64,
    /// Updates that found no prior state and were written as plain inserts.
    pub fallback_inserts: u64,
    /// Payloads that failed to parse and were skipped.
    pub dropped_events: u64,
    pub rows_emitted: u64,
}

/// Per-window encoder chaining successive events of the same key.
///
/// The working state starts from the resolved persisted rows and is replaced by every
/// emitted `+1` row, so the next event for that key cancels the row just emitted rather than
/// the stale persisted one. An encoder must not outlive the window it was created for.
#[derive(Debug, Default)]
pub struct CollapsingEncoder {
    current: HashMap<EntityKey, CollapsingRow>,
    rows: Vec<CollapsingRow>,
    stats: CollapseStats,
}

impl CollapsingEncoder {
    pub fn new(resolved: ResolvedState) -> Self {
        Self {
            current: resolved.into_rows(),
            rows: Vec::new(),
            stats: CollapseStats::default(),
        }
    }

    /// Encodes `classified` and records the emitted `+1` row as the key's working state.
    pub fn push(&mut self, classified: &ClassifiedEvent) {
        let ClassifiedEvent {
            classification,
            event,
        } = classified;

        let emission = encode_event(*classification, event, self.current.get(&event.key));

        counter!(ETL_COLLAPSE_EVENTS_TOTAL, CLASSIFICATION_LABEL => classification.as_str())
            .increment(1);

        match &emission {
            Emission::Insert(_) => self.stats.inserts += 1,
            Emission::Replace { .. } => self.stats.updates += 1,
            Emission::FallbackInsert(_) => {
                self.stats.fallback_inserts += 1;
                counter!(ETL_COLLAPSE_FALLBACK_INSERTS_TOTAL).increment(1);
                warn!(
                    key = %event.key,
                    version = event.version,
                    "update has no prior state, writing it as an insert without cancellation"
                );
            }
        }

        self.current
            .insert(event.key.clone(), emission.state_row().clone());
        self.stats.rows_emitted += emission.len() as u64;
        self.rows.extend(emission.into_rows());
    }

    /// Encodes every event in delivery order.
    pub fn extend<'a, I>(&mut self, events: I)
    where
        I: IntoIterator<Item = &'a ClassifiedEvent>,
    {
        for classified in events {
            self.push(classified);
        }
    }

    /// Returns the working `+1` row of `key`.
    pub fn current_state(&self, key: &EntityKey) -> Option<&CollapsingRow> {
        self.current.get(key)
    }

    pub fn stats(&self) -> CollapseStats {
        self.stats
    }

    /// Consumes the encoder, returning the rows in append order.
    pub fn finish(self) -> (Vec<CollapsingRow>, CollapseStats) {
        (self.rows, self.stats)
    }
}
