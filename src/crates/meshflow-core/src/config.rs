//! Executor configuration
//!
//! [`ExecutorConfig`] is plain serde data with defaults for every field, so an
//! empty TOML document is a valid configuration:
//!
//! ```toml
//! # meshflow.toml
//! lowering = "round-robin"
//! verify_transfers = true
//! ```
//!
//! ```rust
//! use meshflow_core::config::{ExecutorConfig, LoweringPolicy};
//!
//! let config = ExecutorConfig::from_toml_str("lowering = \"round-robin\"").unwrap();
//! assert_eq!(config.lowering, LoweringPolicy::RoundRobin);
//! assert!(config.verify_transfers);
//! ```

use crate::error::{PipelineError, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::str::FromStr;

/// Receiver distribution policy for communication edges
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum LoweringPolicy {
    /// Contiguous, evenly balanced slices of the receiver set
    #[default]
    EvenSplit,
    /// Receiver `i` is served by sender `i mod |S|`
    RoundRobin,
}

impl FromStr for LoweringPolicy {
    type Err = PipelineError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "even-split" => Ok(Self::EvenSplit),
            "round-robin" => Ok(Self::RoundRobin),
            other => Err(PipelineError::Configuration(format!(
                "Unknown lowering policy '{}' (expected 'even-split' or 'round-robin')",
                other
            ))),
        }
    }
}

/// Configuration of a [`PipelineExecutor`](crate::executor::PipelineExecutor)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExecutorConfig {
    /// How receivers are distributed among senders
    pub lowering: LoweringPolicy,
    /// Reject received payloads whose metadata differs from the receiver's
    /// placeholder for the same value
    pub verify_transfers: bool,
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            lowering: LoweringPolicy::EvenSplit,
            verify_transfers: true,
        }
    }
}

impl ExecutorConfig {
    pub fn from_toml_str(content: &str) -> Result<Self> {
        Ok(toml::from_str(content)?)
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }

    pub fn with_lowering(mut self, lowering: LoweringPolicy) -> Self {
        self.lowering = lowering;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_toml_is_default() {
        let config = ExecutorConfig::from_toml_str("").unwrap();
        assert_eq!(config, ExecutorConfig::default());
    }

    #[test]
    fn test_unknown_policy_rejected() {
        assert!(ExecutorConfig::from_toml_str("lowering = \"nearest\"").is_err());
        assert!("nearest".parse::<LoweringPolicy>().is_err());
        assert_eq!("even-split".parse::<LoweringPolicy>().unwrap(), LoweringPolicy::EvenSplit);
    }

    #[test]
    fn test_disable_verification() {
        let config = ExecutorConfig::from_toml_str("verify_transfers = false").unwrap();
        assert!(!config.verify_transfers);
        assert_eq!(config.lowering, LoweringPolicy::EvenSplit);
    }
}
