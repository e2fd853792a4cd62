// SPDX-FileCopyrightText: 2025 Stanislaw Grams <stanislawgrams@gmail.com>
//
// SPDX-License-Identifier: BSD-2-Clause

//! Configuration file support for pana-rs.
//!
//! Supports loading configuration from TOML files with the following search
//! order:
//! 1. Path specified via `--config` CLI argument
//! 2. `./pana-rs.toml` (current directory)
//! 3. `~/.config/pana-rs/pana-rs.toml` (XDG config)
//! 4. `/etc/pana-rs/pana-rs.toml` (system-wide)

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use pana_core::DbRange;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {0}: {1}")]
    ReadError(PathBuf, String),

    #[error("failed to parse config file {0}: {1}")]
    ParseError(PathBuf, String),
}

/// Top-level application configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Run against a synthetic sample source instead of a tuner stream.
    pub testmode: bool,
    /// Tuner frequency correction in ppm.
    pub frequency_correction: i32,
    /// Address of the rigctld-compatible rig control daemon
    /// (empty = localhost:4532).
    pub vfo_host: String,
    /// Snapshot frames per second.
    pub fft_per_second: u32,
    /// Initial dynamic range of the display.
    pub dynamic_range: DynamicRangeConfig,
    /// Log level (trace, debug, info, warn, error).
    pub log_level: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DynamicRangeConfig {
    pub from: f64,
    pub to: f64,
}

impl Default for DynamicRangeConfig {
    fn default() -> Self {
        Self {
            from: -105.0,
            to: 15.0,
        }
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            testmode: false,
            frequency_correction: 0,
            vfo_host: String::new(),
            fft_per_second: 25,
            dynamic_range: DynamicRangeConfig::default(),
            log_level: None,
        }
    }
}

impl AppConfig {
    pub fn db_range(&self) -> DbRange {
        DbRange::new(self.dynamic_range.from, self.dynamic_range.to).normalized()
    }

    /// Load configuration from a specific file path.
    pub fn load_from_file(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::ReadError(path.to_path_buf(), e.to_string()))?;

        toml::from_str(&contents)
            .map_err(|e| ConfigError::ParseError(path.to_path_buf(), e.to_string()))
    }

    /// Load configuration from the default search paths.
    /// Returns default config if no config file is found.
    pub fn load_from_default_paths() -> Result<(Self, Option<PathBuf>), ConfigError> {
        for path in Self::default_search_paths() {
            if path.exists() {
                let config = Self::load_from_file(&path)?;
                return Ok((config, Some(path)));
            }
        }
        Ok((Self::default(), None))
    }

    /// Get the default search paths for config files.
    pub fn default_search_paths() -> Vec<PathBuf> {
        let mut paths = vec![PathBuf::from("pana-rs.toml")];
        if let Some(config_dir) = dirs::config_dir() {
            paths.push(config_dir.join("pana-rs").join("pana-rs.toml"));
        }
        paths.push(PathBuf::from("/etc/pana-rs/pana-rs.toml"));
        paths
    }

    /// Generate an example configuration as a TOML string.
    pub fn example_toml() -> String {
        let example = AppConfig {
            testmode: false,
            frequency_correction: 0,
            vfo_host: "localhost:4532".to_string(),
            fft_per_second: 25,
            dynamic_range: DynamicRangeConfig::default(),
            log_level: Some("info".to_string()),
        };
        toml::to_string_pretty(&example).unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config() {
        let config = AppConfig::default();
        assert!(!config.testmode);
        assert_eq!(config.frequency_correction, 0);
        assert_eq!(config.vfo_host, "");
        assert_eq!(config.fft_per_second, 25);
        assert_eq!(config.db_range(), DbRange::new(-105.0, 15.0));
    }

    #[test]
    fn parse_minimal_toml() {
        let toml_str = r#"
testmode = true
vfo_host = "radio.local:4532"
"#;
        let config: AppConfig = toml::from_str(toml_str).unwrap();
        assert!(config.testmode);
        assert_eq!(config.vfo_host, "radio.local:4532");
        // everything else keeps its default
        assert_eq!(config.fft_per_second, 25);
    }

    #[test]
    fn parse_full_toml() {
        let toml_str = r#"
testmode = false
frequency_correction = -12
vfo_host = "localhost:4532"
fft_per_second = 50
log_level = "debug"

[dynamic_range]
from = -120.0
to = 0.0
"#;
        let config: AppConfig = toml::from_str(toml_str).unwrap();
        assert_eq!(config.frequency_correction, -12);
        assert_eq!(config.fft_per_second, 50);
        assert_eq!(config.log_level.as_deref(), Some("debug"));
        assert_eq!(config.db_range(), DbRange::new(-120.0, 0.0));
    }

    #[test]
    fn reversed_dynamic_range_is_normalized() {
        let toml_str = r#"
[dynamic_range]
from = 15.0
to = -105.0
"#;
        let config: AppConfig = toml::from_str(toml_str).unwrap();
        assert_eq!(config.db_range(), DbRange::new(-105.0, 15.0));
    }

    #[test]
    fn example_toml_parses() {
        let example = AppConfig::example_toml();
        let _config: AppConfig = toml::from_str(&example).unwrap();
    }
}
