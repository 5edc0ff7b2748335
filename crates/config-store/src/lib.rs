//! Configuration Store
//!
//! Thread-safe key/value parameters read by the pipeline every cycle and
//! mutated by the operator API at any time. No restart is required for a
//! change to take effect.

mod defaults;
mod store;

pub use defaults::{keys, seed_defaults, DEFAULT_CONFIG_PATH};
pub use store::ConfigStore;

use thiserror::Error;

/// Configuration errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to load configuration: {0}")]
    Load(String),

    #[error("Failed to persist configuration to {path}: {reason}")]
    Persist { path: String, reason: String },

    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl From<config::ConfigError> for ConfigError {
    fn from(err: config::ConfigError) -> Self {
        ConfigError::Load(err.to_string())
    }
}
