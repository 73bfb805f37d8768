//! Configuration loading from TOML.
//!
//! Reads `config.toml` and deserializes into strongly-typed structs. Every
//! field has a default, so a missing file or section is not an error.

use anyhow::{Context, Result};
use serde::Deserialize;
use std::fs;
use std::path::Path;
use tracing::debug;

/// Default config file path.
pub const DEFAULT_CONFIG_FILE: &str = "config.toml";

/// Top-level application configuration.
#[derive(Debug, Deserialize, Clone, Default, PartialEq)]
#[serde(default)]
pub struct AppConfig {
    pub engine: EngineConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Deserialize, Clone, Default, PartialEq)]
#[serde(default)]
pub struct EngineConfig {
    /// Rate table TOML to load instead of the built-in dataset.
    pub rate_table: Option<String>,
    /// Bells of slack allowed per quote when every pattern is ruled out.
    pub max_tolerance: u32,
}

#[derive(Debug, Deserialize, Clone, PartialEq)]
#[serde(default)]
pub struct LoggingConfig {
    /// `EnvFilter` directive used when `RUST_LOG` is unset.
    pub filter: String,
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            filter: "stalk_oracle=info".into(),
            json: false,
        }
    }
}

impl AppConfig {
    /// Load configuration from a TOML file.
    pub fn load(path: &str) -> Result<Self> {
        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {path}"))?;
        let config: AppConfig = toml::from_str(&contents)
            .with_context(|| format!("Failed to parse config file: {path}"))?;
        Ok(config)
    }

    /// Load configuration, falling back to defaults if the file is absent.
    /// A file that exists but does not parse is still an error.
    pub fn load_or_default(path: &str) -> Result<Self> {
        if !Path::new(path).exists() {
            debug!(path, "No config file, using defaults");
            return Ok(Self::default());
        }
        Self::load(path)
    }
}
