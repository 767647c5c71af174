//! Downstream trigger recomputing sign-summed aggregates after a window wrote rows.

mod base;
pub mod memory;

pub use base::AggregateRefresher;
