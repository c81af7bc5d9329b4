//! Engine configuration
//!
//! Every field has a default, so an empty JSON object is a valid
//! configuration:
//!
//! ```json
//! { "max_call_depth": 4096, "max_host_nesting": 64, "instruction_budget": null, "completion": "promise" }
//! ```

use serde::Deserialize;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// What a low-level promising call returns when it finishes without
/// suspending
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Completion {
    /// Always a promise, settled with the result
    #[default]
    Promise,
    /// The result itself, or a synchronous error
    Eager,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct EngineConfig {
    /// Maximum number of wasm frames across all executions on the host stack
    pub max_call_depth: usize,
    /// Maximum nesting of wasm -> host -> wasm re-entry
    pub max_host_nesting: usize,
    /// Instructions one execution may run before it traps
    pub instruction_budget: Option<u64>,
    /// Default completion mode of low-level promising wrappers
    pub completion: Completion,
}

impl Default for EngineConfig {
    fn default() -> Self {
        EngineConfig {
            max_call_depth: 4096,
            max_host_nesting: 64,
            instruction_budget: None,
            completion: Completion::Promise,
        }
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid configuration: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("cannot read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid configuration: {0}")]
    Invalid(String),
}

impl EngineConfig {
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        let config: EngineConfig = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_json(&json)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_call_depth == 0 {
            return Err(ConfigError::Invalid("max_call_depth must be at least 1".to_string()));
        }
        if self.max_host_nesting == 0 {
            return Err(ConfigError::Invalid("max_host_nesting must be at least 1".to_string()));
        }
        Ok(())
    }
}
