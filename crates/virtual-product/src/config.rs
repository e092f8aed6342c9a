//! Configuration for loading virtual products.

use cube_common::TimeGrouping;
use serde::{Deserialize, Serialize};

/// Settings applied when resolving recipes and streaming loads.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoadConfig {
    /// Number of time steps fetched per `fetch_data` call.
    pub slice_size: usize,

    /// Grouping used by products whose recipe does not name one.
    pub default_group_by: TimeGrouping,

    /// Resampling used by products whose recipe does not name one.
    pub default_resampling: Option<String>,
}

impl Default for LoadConfig {
    fn default() -> Self {
        Self {
            slice_size: 1,
            default_group_by: TimeGrouping::Time,
            default_resampling: Some("nearest".to_string()),
        }
    }
}

impl LoadConfig {
    /// Load configuration from environment variables.
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Ok(val) = std::env::var("CUBE_SLICE_SIZE") {
            if let Ok(size) = val.parse() {
                config.slice_size = size;
            }
        }

        if let Ok(val) = std::env::var("CUBE_DEFAULT_GROUP_BY") {
            if let Ok(group_by) = val.parse() {
                config.default_group_by = group_by;
            }
        }

        if let Ok(val) = std::env::var("CUBE_DEFAULT_RESAMPLING") {
            config.default_resampling = match val.trim() {
                "" | "none" => None,
                method => Some(method.to_string()),
            };
        }

        config
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), String> {
        if self.slice_size == 0 {
            return Err("slice_size must be > 0".to_string());
        }

        if let Some(method) = &self.default_resampling {
            if method.trim().is_empty() {
                return Err("default_resampling must not be blank".to_string());
            }
        }

        Ok(())
    }
}
