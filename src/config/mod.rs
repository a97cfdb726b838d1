//! Configuration loading and types.

pub mod env;
pub mod types;
pub mod validate;

pub use types::*;

use crate::common::ConfigError;

/// Load configuration from the environment and validate it.
pub fn load_and_validate() -> Result<Config, ConfigError> {
    let config = env::load_from_env()?;
    validate::validate_config(&config)?;
    Ok(config)
}
