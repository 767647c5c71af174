//! Staging log seam supplying the raw payloads of a window.

mod base;
pub mod memory;

pub use base::EventSource;
