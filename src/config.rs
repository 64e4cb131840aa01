/*!
 * Configuration
 * serde-backed process configuration for the engine
 */

use miette::Diagnostic;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Configuration errors
#[derive(Error, Debug, Diagnostic)]
pub enum ConfigError {
    #[error("Cannot read config file: {0}")]
    #[diagnostic(
        code(config::read_failed),
        help("Check that the path exists and is readable.")
    )]
    Read(#[from] std::io::Error),

    #[error("Cannot parse config file: {0}")]
    #[diagnostic(
        code(config::parse_failed),
        help("The config must be a JSON object; unknown sections are ignored.")
    )]
    Parse(#[from] serde_json::Error),
}

/// Output sink configuration section
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OutputConfig {
    /// Path where to store events. When absent, no events are recorded.
    pub store: Option<PathBuf>,
}

/// Top-level engine configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub output: OutputConfig,
}

impl Config {
    /// Load configuration from a JSON file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let data = fs::read_to_string(path.as_ref())?;
        Ok(serde_json::from_str(&data)?)
    }
}
