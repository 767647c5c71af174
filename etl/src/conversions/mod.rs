//! Conversions from staging log payloads into typed events.

pub mod event;
