//! Windowed collapsing ETL for versioned property change events.
//!
//! Raw change payloads of a time window are parsed, classified as inserts or updates, and
//! encoded as `+1`/`-1` rows for a sign-collapsing row store. Each window executes at most once
//! per pipeline, guarded by a fingerprinted processing state record.

pub mod collapsing;
pub mod conversions;
pub mod destination;
pub mod error;
#[cfg(feature = "failpoints")]
pub mod failpoints;
mod macros;
pub mod metrics;
pub mod pipeline;
pub mod policy;
pub mod refresh;
pub mod source;
pub mod state;
pub mod store;
#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;
pub mod types;
