//! Utilities for testing collapsing pipelines without external services.
//!
//! - [`event`] builds raw staging payloads and parsed events.
//! - [`faults`] wraps collaborators to inject lookup, write, state and refresh failures.
//! - [`failpoints`] configures fail points for the duration of a test.
//! - [`pipeline`] assembles pipelines over the in-memory collaborators.
pub mod event;
pub mod failpoints;
pub mod faults;
pub mod pipeline;
