//! Configuration loading and config file resolution
//!
//! Config file lookup priority:
//! 1. Command-line argument (highest priority)
//! 2. `BOXTRACK_CONFIG` environment variable
//! 3. User config directory (`~/.config/boxtrack/config.toml` on Linux)
//! 4. Compiled defaults (no file)
//!
//! A missing file never aborts startup: the compiled defaults are used and a
//! warning is logged. A file that exists but does not parse is an error.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{info, warn};

use crate::geo::DESTINATION_TOLERANCE_M;
use crate::insights::{InsightsOptions, DEFAULT_TIMELINE_WINDOW_DAYS, MAX_TIMELINE_WINDOW_DAYS};
use crate::{Error, Result};

/// Environment variable naming the config file
pub const CONFIG_ENV_VAR: &str = "BOXTRACK_CONFIG";

/// Configuration loaded from TOML
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TomlConfig {
    #[serde(default)]
    pub logging: LoggingConfig,

    #[serde(default)]
    pub geo: GeoConfig,

    #[serde(default)]
    pub insights: InsightsConfig,
}

/// Logging configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Log file path (optional, logs to stderr if not specified)
    #[serde(default)]
    pub file: Option<PathBuf>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            file: None,
        }
    }
}

/// Destination proximity settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GeoConfig {
    /// Base tolerance in metres before the scan's accuracy is added
    #[serde(default = "default_tolerance")]
    pub destination_tolerance_m: f64,
}

impl Default for GeoConfig {
    fn default() -> Self {
        Self {
            destination_tolerance_m: default_tolerance(),
        }
    }
}

/// Insights defaults, overridable per invocation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InsightsConfig {
    #[serde(default = "default_window")]
    pub timeline_window_days: i64,

    #[serde(default = "default_grouped")]
    pub grouped: bool,
}

impl Default for InsightsConfig {
    fn default() -> Self {
        Self {
            timeline_window_days: default_window(),
            grouped: default_grouped(),
        }
    }
}

impl InsightsConfig {
    /// Insights options seeded from this config
    pub fn options(&self) -> InsightsOptions {
        InsightsOptions {
            grouped: self.grouped,
            project_filter: None,
            timeline_window_days: self.timeline_window_days,
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_tolerance() -> f64 {
    DESTINATION_TOLERANCE_M
}

fn default_window() -> i64 {
    DEFAULT_TIMELINE_WINDOW_DAYS
}

fn default_grouped() -> bool {
    true
}

impl TomlConfig {
    /// Parse and validate a TOML document
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let config: TomlConfig = toml::from_str(content)
            .map_err(|e| Error::Config(format!("Parse TOML failed: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Load a config file from disk
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("Read {} failed: {}", path.display(), e)))?;
        Self::from_toml_str(&content)
    }

    pub fn validate(&self) -> Result<()> {
        let tolerance = self.geo.destination_tolerance_m;
        if !tolerance.is_finite() || tolerance < 0.0 {
            return Err(Error::Config(format!(
                "geo.destination_tolerance_m must be a non-negative number, got {}",
                tolerance
            )));
        }

        let window = self.insights.timeline_window_days;
        if !(1..=MAX_TIMELINE_WINDOW_DAYS).contains(&window) {
            return Err(Error::Config(format!(
                "insights.timeline_window_days must be between 1 and {}, got {}",
                MAX_TIMELINE_WINDOW_DAYS, window
            )));
        }

        Ok(())
    }
}

/// Resolves which config file (if any) to load
#[derive(Debug, Clone)]
pub struct ConfigResolver {
    cli_path: Option<PathBuf>,
}

impl ConfigResolver {
    pub fn new(cli_path: Option<&Path>) -> Self {
        Self {
            cli_path: cli_path.map(Path::to_path_buf),
        }
    }

    /// Config file path by priority, `None` when only defaults apply
    pub fn resolve_path(&self) -> Option<PathBuf> {
        // Priority 1: Command-line argument
        if let Some(path) = &self.cli_path {
            return Some(path.clone());
        }

        // Priority 2: Environment variable
        if let Ok(path) = std::env::var(CONFIG_ENV_VAR) {
            if !path.trim().is_empty() {
                return Some(PathBuf::from(path));
            }
        }

        // Priority 3: User config directory
        dirs::config_dir()
            .map(|dir| dir.join("boxtrack").join("config.toml"))
            .filter(|path| path.exists())
    }

    /// Load the resolved config, falling back to compiled defaults
    pub fn load(&self) -> Result<TomlConfig> {
        let Some(path) = self.resolve_path() else {
            info!("No config file found, using compiled defaults");
            return Ok(TomlConfig::default());
        };

        if !path.exists() {
            warn!("Config file {} not found, using compiled defaults", path.display());
            return Ok(TomlConfig::default());
        }

        let config = TomlConfig::load(&path)?;
        info!("Loaded config from {}", path.display());
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = TomlConfig::default();
        assert_eq!(config.logging.level, "info");
        assert!(config.logging.file.is_none());
        assert_eq!(config.geo.destination_tolerance_m, 5_000.0);
        assert_eq!(config.insights.timeline_window_days, 182);
        assert!(config.insights.grouped);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_toml_fills_defaults() {
        let config = TomlConfig::from_toml_str("[geo]\ndestination_tolerance_m = 2500.0\n").unwrap();
        assert_eq!(config.geo.destination_tolerance_m, 2_500.0);
        assert_eq!(config.logging.level, "info");
        assert_eq!(config.insights.timeline_window_days, 182);
    }

    #[test]
    fn test_empty_toml_is_default() {
        assert_eq!(TomlConfig::from_toml_str("").unwrap(), TomlConfig::default());
    }

    #[test]
    fn test_rejects_negative_tolerance() {
        let result = TomlConfig::from_toml_str("[geo]\ndestination_tolerance_m = -1.0\n");
        assert!(matches!(result, Err(Error::Config(_))));
    }

    #[test]
    fn test_rejects_zero_window() {
        let result = TomlConfig::from_toml_str("[insights]\ntimeline_window_days = 0\n");
        assert!(matches!(result, Err(Error::Config(_))));
    }

    #[test]
    fn test_rejects_window_above_limit() {
        let result = TomlConfig::from_toml_str("[insights]\ntimeline_window_days = 36501\n");
        assert!(matches!(result, Err(Error::Config(_))));
        assert!(TomlConfig::from_toml_str("[insights]\ntimeline_window_days = 36500\n").is_ok());
    }

    #[test]
    fn test_rejects_malformed_toml() {
        let result = TomlConfig::from_toml_str("[geo\n");
        assert!(matches!(result, Err(Error::Config(_))));
    }

    #[test]
    fn test_insights_options_from_config() {
        let config = InsightsConfig {
            timeline_window_days: 30,
            grouped: false,
        };
        let options = config.options();
        assert_eq!(options.timeline_window_days, 30);
        assert!(!options.grouped);
        assert!(options.project_filter.is_none());
    }

    #[test]
    fn test_cli_path_wins() {
        let resolver = ConfigResolver::new(Some(Path::new("/tmp/boxtrack-cli.toml")));
        assert_eq!(resolver.resolve_path(), Some(PathBuf::from("/tmp/boxtrack-cli.toml")));
    }
}
