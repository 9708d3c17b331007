//! Data-driven facility configuration from JSON.
//!
//! Feature-gated behind `data-loader`. Parses a [`FacilityConfig`] and runs
//! the activation-time cardinality validation early, so a bad file fails at
//! load rather than at facility entry.

use crate::config::{ConfigError, FacilityConfig};

/// Errors that can occur during config loading.
#[derive(Debug, thiserror::Error)]
pub enum DataLoadError {
    #[error("JSON parse error: {0}")]
    JsonParse(#[from] serde_json::Error),
    #[error("config error: {0}")]
    Config(#[from] ConfigError),
}

/// Load a facility configuration from a JSON string.
pub fn config_from_json(json: &str) -> Result<FacilityConfig, DataLoadError> {
    let config: FacilityConfig = serde_json::from_str(json)?;
    config.validate()?;
    Ok(config)
}
