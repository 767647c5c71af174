//! Conversion of change events into sign-collapsing rows.
//!
//! Events are classified as inserts or updates, the live rows of updated keys are resolved in
//! one lookup, and the encoder emits the cancellation and state rows in delivery order.

mod classifier;
mod encoder;
mod resolver;

pub use classifier::{ClassifiedEvent, EventClassification, classify, classify_events};
pub use encoder::{CollapseStats, CollapsingEncoder, Emission, encode_event};
pub use resolver::{ResolvedState, StateResolver};
