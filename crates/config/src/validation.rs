//! Configuration validation
//!
//! Validates value ranges:
//! - Builder capacities are non-zero
//! - Builder capacities do not exceed the 2 GiB buffer limit

use crate::Config;
use crate::error::{ConfigError, Result};

/// Largest buffer either builder can produce (2 GiB)
pub const MAX_CAPACITY: usize = 1 << 31;

/// Validate the entire configuration
pub fn validate_config(config: &Config) -> Result<()> {
    validate_capacity("builder", config.builder.initial_capacity)?;
    validate_capacity("flex", config.flex.initial_capacity)?;
    Ok(())
}

fn validate_capacity(section: &'static str, capacity: usize) -> Result<()> {
    if capacity == 0 {
        return Err(ConfigError::invalid_value(
            section,
            "initial_capacity",
            "must be greater than 0",
        ));
    }
    if capacity > MAX_CAPACITY {
        return Err(ConfigError::invalid_value(
            section,
            "initial_capacity",
            format!("{} exceeds the maximum of {} bytes", capacity, MAX_CAPACITY),
        ));
    }
    Ok(())
}
