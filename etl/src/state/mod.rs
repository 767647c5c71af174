//! Window bookkeeping: the processing state record and the coordinator guarding it.

mod coordinator;
mod window;

pub use coordinator::{WindowBegin, WindowCoordinator};
pub use window::{ProcessingWindowState, WindowStatus};
