//! Core data types flowing through the collapsing pipeline.

mod event;
mod row;
mod window;

pub use event::{ChangeEvent, EntityKey, PropertyAttributes};
pub use row::{CollapsingRow, Sign};
pub use window::{Window, WindowFingerprint};
