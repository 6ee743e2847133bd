//! Driver configuration
//!
//! Loaded from YAML; every field has a default so an empty file (or no file)
//! yields a driver with no backends.

use crate::backends::GenericBackendConfig;
use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Default stage-in look-ahead: ten hours
pub const DEFAULT_STAGE_IN_HORIZON_SECS: u64 = 10 * 60 * 60;

/// Configuration for the burst buffer driver
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DriverConfig {
    /// Comma-separated backend list, e.g. `burst_buffer/generic`
    pub burst_buffer_type: String,
    /// Jobs expected to start later than this are not staged yet
    pub stage_in_horizon_secs: u64,
    /// Parameters for the `generic` backend
    pub generic: GenericBackendConfig,
}

impl Default for DriverConfig {
    fn default() -> Self {
        Self {
            burst_buffer_type: String::new(),
            stage_in_horizon_secs: DEFAULT_STAGE_IN_HORIZON_SECS,
            generic: GenericBackendConfig::default(),
        }
    }
}

impl DriverConfig {
    /// Configuration with the given backend list and defaults elsewhere
    pub fn with_backends(burst_buffer_type: impl Into<String>) -> Self {
        Self {
            burst_buffer_type: burst_buffer_type.into(),
            ..Default::default()
        }
    }

    /// Parse a YAML document
    pub fn from_yaml_str(text: &str) -> Result<Self> {
        if text.trim().is_empty() {
            return Ok(Self::default());
        }
        let config: Self = serde_yaml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    /// Load a YAML file
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let text = std::fs::read_to_string(path.as_ref())?;
        Self::from_yaml_str(&text)
    }

    /// Reject settings no backend could work with
    pub fn validate(&self) -> Result<()> {
        if self.stage_in_horizon_secs == 0 {
            return Err(Error::Configuration(
                "stage_in_horizon_secs must be greater than zero".into(),
            ));
        }
        Ok(())
    }

    /// Stage-in look-ahead as a chrono duration
    pub fn stage_in_horizon(&self) -> chrono::Duration {
        let max_secs = (i64::MAX / 1000) as u64;
        chrono::Duration::seconds(self.stage_in_horizon_secs.min(max_secs) as i64)
    }
}
