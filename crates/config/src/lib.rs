//! flatwire configuration
//!
//! TOML-based configuration for the flatwire builders, with sensible
//! defaults. An empty file is a valid configuration.
//!
//! # Parsing
//!
//! Use the `FromStr` trait to parse configuration:
//!
//! ```
//! use flatwire_config::Config;
//! use std::str::FromStr;
//!
//! let config = Config::from_str("[builder]\ninitial_capacity = 64").unwrap();
//! assert_eq!(config.builder.initial_capacity, 64);
//! ```
//!
//! # Example Full Config
//!
//! ```toml
//! [builder]
//! initial_capacity = 1024
//! force_defaults = false
//!
//! [flex]
//! initial_capacity = 2048
//! dedup_strings = true
//! dedup_keys = true
//! dedup_key_vectors = true
//! ```

mod builder;
mod error;
mod flex;
mod validation;

use std::fs;
use std::path::Path;
use std::str::FromStr;

pub use builder::{BuilderConfig, DEFAULT_BUILDER_CAPACITY};
pub use error::{ConfigError, Result};
pub use flex::{DEFAULT_FLEX_CAPACITY, FlexConfig};
pub use validation::MAX_CAPACITY;

use serde::Deserialize;

/// Main configuration structure
///
/// All sections are optional with sensible defaults.
#[derive(Debug, Clone, Default, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct Config {
    /// Classic builder settings
    pub builder: BuilderConfig,

    /// FlexBuffers builder settings
    pub flex: FlexConfig,
}

impl Config {
    /// Load configuration from a TOML file
    ///
    /// # Errors
    ///
    /// Returns error if file cannot be read, contains invalid TOML, or
    /// fails validation.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let contents = fs::read_to_string(path).map_err(|e| ConfigError::IoError {
            path: path.display().to_string(),
            source: e,
        })?;

        Self::from_str(&contents)
    }

    /// Parse configuration from a TOML string
    ///
    /// Prefer using the `FromStr` trait implementation.
    fn parse(s: &str) -> Result<Self> {
        let config: Config = toml::from_str(s).map_err(ConfigError::ParseError)?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        validation::validate_config(self)
    }
}

impl FromStr for Config {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}
