//! Row store seams: the latest-state lookup and the append-only batch writer.

mod base;
pub mod memory;

pub use base::{BatchWriter, LatestStateReader};
