//! FlexBuffers builder configuration
//!
//! Settings consumed by `FlexBuilder::from_config`. All three dedup
//! switches are on by default; turning one off trades output size for
//! fewer lookups while building.

use serde::Deserialize;

/// Default initial capacity of a FlexBuffers builder in bytes
pub const DEFAULT_FLEX_CAPACITY: usize = 2048;

/// FlexBuffers builder configuration
///
/// # Example
///
/// ```toml
/// [flex]
/// initial_capacity = 2048
/// dedup_strings = true
/// dedup_keys = true
/// dedup_key_vectors = true
/// ```
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct FlexConfig {
    /// Initial buffer capacity
    /// Default: 2048
    pub initial_capacity: usize,

    /// Write each distinct string value once
    /// Default: true
    pub dedup_strings: bool,

    /// Write each distinct map key once
    /// Default: true
    pub dedup_keys: bool,

    /// Share one keys vector between maps with the same keys
    /// Default: true
    pub dedup_key_vectors: bool,
}

impl Default for FlexConfig {
    fn default() -> Self {
        Self {
            initial_capacity: DEFAULT_FLEX_CAPACITY,
            dedup_strings: true,
            dedup_keys: true,
            dedup_key_vectors: true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = FlexConfig::default();
        assert_eq!(config.initial_capacity, 2048);
        assert!(config.dedup_strings);
        assert!(config.dedup_keys);
        assert!(config.dedup_key_vectors);
    }

    #[test]
    fn test_deserialize_partial() {
        let config: FlexConfig = toml::from_str("dedup_keys = false").unwrap();
        assert_eq!(config.initial_capacity, 2048);
        assert!(config.dedup_strings);
        assert!(!config.dedup_keys);
        assert!(config.dedup_key_vectors);
    }
}
