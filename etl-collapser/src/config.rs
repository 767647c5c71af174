use etl_config::load_config;
use etl_config::shared::CollapserConfig;

use crate::error::{CollapserError, CollapserResult};

/// Loads and validates the collapser configuration.
///
/// Uses the standard configuration loading mechanism from [`etl_config`] and
/// validates the resulting [`CollapserConfig`] before returning it.
pub fn load_collapser_config() -> CollapserResult<CollapserConfig> {
    let config = load_config::<CollapserConfig>().map_err(CollapserError::config)?;
    config.validate().map_err(CollapserError::config)?;

    Ok(config)
}
