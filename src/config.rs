//! Configuration for the report pipeline.
//!
//! Every section has defaults, so a configuration file only needs to name
//! the values it changes.

use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::error::Result;

/// Master configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Disassembly listing behaviour.
    pub listing: ListingOptions,
    /// Limits applied when opening the input file.
    pub io: IoLimits,
    /// Diagnostic output.
    pub logging: LoggingConfig,
}

impl Config {
    /// Parse a configuration from JSON text.
    pub fn from_json_str(text: &str) -> Result<Self> {
        Ok(serde_json::from_str(text)?)
    }

    /// Read and parse a JSON configuration file.
    pub fn from_json_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_json_str(&text)
    }
}

/// Options for the disassembly renderer.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ListingOptions {
    /// Linearly decode bytes the scan did not reach, skipping only zero runs.
    pub exhaustive: bool,
}

/// Resource limits for opening and loading input files.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct IoLimits {
    /// The maximum file size that will be mapped.
    pub max_file_size: u64,
    /// The maximum sum of section minimum allocations an image may declare.
    pub max_image_size: u64,
}

impl Default for IoLimits {
    fn default() -> Self {
        Self {
            max_file_size: 256 * 1024 * 1024, // 256MB
            max_image_size: 256 * 1024 * 1024,
        }
    }
}

/// Logging configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Emit JSON log records instead of plain text.
    pub json: bool,
    /// `EnvFilter` directive used when `RUST_LOG` is unset.
    pub filter: Option<String>,
}
