//! Classic builder configuration
//!
//! Settings consumed by `Builder::from_config`.

use serde::Deserialize;

/// Default initial capacity of a classic builder in bytes
pub const DEFAULT_BUILDER_CAPACITY: usize = 1024;

/// Classic builder configuration
///
/// # Example
///
/// ```toml
/// [builder]
/// initial_capacity = 1024
/// force_defaults = false
/// ```
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct BuilderConfig {
    /// Initial buffer capacity; the buffer doubles as needed
    /// Default: 1024
    pub initial_capacity: usize,

    /// Write scalar fields even when they equal their default
    /// Default: false
    pub force_defaults: bool,
}

impl Default for BuilderConfig {
    fn default() -> Self {
        Self {
            initial_capacity: DEFAULT_BUILDER_CAPACITY,
            force_defaults: false,
        }
    }
}
