//! Configuration types and loading for the property collapsing pipeline.
//!
//! Configuration is layered: `configuration/base.*`, then `configuration/{environment}.*`,
//! then `APP_`-prefixed environment variables.

mod environment;
mod load;
pub mod shared;

pub use environment::Environment;
pub use load::{Config, LoadConfigError, load_config, load_config_from};
