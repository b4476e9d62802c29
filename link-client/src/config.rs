//! Configuration loading for the sync engine.
//!
//! Configuration is loaded from a TOML file. Every section and key is
//! optional; missing values fall back to the defaults below.

use serde::Deserialize;
use std::path::PathBuf;
use std::time::Duration;

/// Root configuration for an endpoint.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct EngineConfig {
    /// Sample aggregation configuration.
    #[serde(default)]
    pub aggregator: AggregatorConfig,
    /// Delivery routing configuration.
    #[serde(default)]
    pub router: RouterConfig,
    /// Endpoint façade configuration.
    #[serde(default)]
    pub endpoint: EndpointConfig,
}

/// Sample aggregation configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct AggregatorConfig {
    /// Buffered samples that force an early flush (default: 20).
    #[serde(default = "default_max_batch_size")]
    pub max_batch_size: usize,
    /// Timer flush period in seconds (default: 5).
    #[serde(default = "default_tick_interval_secs")]
    pub tick_interval_secs: u64,
}

/// Delivery routing configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct RouterConfig {
    /// Upper bound on one Immediate send in milliseconds (default: 2000).
    /// A timed-out send counts as a rejection.
    #[serde(default = "default_immediate_timeout_ms")]
    pub immediate_timeout_ms: u64,
}

/// Endpoint façade configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct EndpointConfig {
    /// Capacity of the inbound message stream (default: 64).
    /// Slow subscribers lag and skip rather than block the transport, so keep
    /// this above the companion's `max_batch_size`.
    #[serde(default = "default_inbound_capacity")]
    pub inbound_capacity: usize,
}

// Default value functions
fn default_max_batch_size() -> usize {
    20
}

fn default_tick_interval_secs() -> u64 {
    5
}

fn default_immediate_timeout_ms() -> u64 {
    2000
}

fn default_inbound_capacity() -> usize {
    64
}

impl Default for AggregatorConfig {
    fn default() -> Self {
        Self {
            max_batch_size: default_max_batch_size(),
            tick_interval_secs: default_tick_interval_secs(),
        }
    }
}

impl Default for RouterConfig {
    fn default() -> Self {
        Self {
            immediate_timeout_ms: default_immediate_timeout_ms(),
        }
    }
}

impl Default for EndpointConfig {
    fn default() -> Self {
        Self {
            inbound_capacity: default_inbound_capacity(),
        }
    }
}

impl AggregatorConfig {
    /// Timer flush period.
    pub fn tick_interval(&self) -> Duration {
        Duration::from_secs(self.tick_interval_secs)
    }
}

impl RouterConfig {
    /// Upper bound on one Immediate send.
    pub fn immediate_timeout(&self) -> Duration {
        Duration::from_millis(self.immediate_timeout_ms)
    }
}

impl EngineConfig {
    /// Load configuration from a TOML file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read, parsed, or fails
    /// validation.
    pub fn from_file(path: &std::path::Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadError {
            path: path.to_path_buf(),
            source: e,
        })?;

        let config: Self = toml::from_str(&content).map_err(|e| ConfigError::ParseError {
            path: path.to_path_buf(),
            source: e,
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Reject values the engine cannot run with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.aggregator.max_batch_size == 0 {
            return Err(ConfigError::Invalid(
                "aggregator.max_batch_size must be at least 1".to_string(),
            ));
        }
        if self.aggregator.tick_interval_secs == 0 {
            return Err(ConfigError::Invalid(
                "aggregator.tick_interval_secs must be at least 1".to_string(),
            ));
        }
        if self.router.immediate_timeout_ms == 0 {
            return Err(ConfigError::Invalid(
                "router.immediate_timeout_ms must be at least 1".to_string(),
            ));
        }
        if self.endpoint.inbound_capacity == 0 {
            return Err(ConfigError::Invalid(
                "endpoint.inbound_capacity must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

/// Configuration error types.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Failed to read configuration file.
    #[error("failed to read config file {path}: {source}")]
    ReadError {
        /// Path to the configuration file.
        path: PathBuf,
        /// Underlying I/O error.
        source: std::io::Error,
    },
    /// Failed to parse configuration file.
    #[error("failed to parse config file {path}: {source}")]
    ParseError {
        /// Path to the configuration file.
        path: PathBuf,
        /// Underlying TOML parse error.
        source: toml::de::Error,
    },
    /// Parsed values are out of range.
    #[error("invalid configuration: {0}")]
    Invalid(String),
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn default_config_is_valid() {
        let config = EngineConfig::default();
        assert_eq!(config.aggregator.max_batch_size, 20);
        assert_eq!(config.aggregator.tick_interval(), Duration::from_secs(5));
        assert_eq!(config.router.immediate_timeout(), Duration::from_millis(2000));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn config_from_toml_string() {
        let toml = r#"
[aggregator]
max_batch_size = 50
tick_interval_secs = 30

[router]
immediate_timeout_ms = 500

[endpoint]
inbound_capacity = 8
"#;

        let config: EngineConfig = toml::from_str(toml).unwrap();
        assert_eq!(config.aggregator.max_batch_size, 50);
        assert_eq!(config.aggregator.tick_interval_secs, 30);
        assert_eq!(config.router.immediate_timeout_ms, 500);
        assert_eq!(config.endpoint.inbound_capacity, 8);
    }

    #[test]
    fn config_missing_sections_use_defaults() {
        let config: EngineConfig = toml::from_str("[aggregator]\nmax_batch_size = 7\n").unwrap();
        assert_eq!(config.aggregator.max_batch_size, 7);
        assert_eq!(config.aggregator.tick_interval_secs, 5);
        assert_eq!(config.endpoint.inbound_capacity, 64);
    }

    #[test]
    fn zero_batch_size_is_invalid() {
        let config: EngineConfig = toml::from_str("[aggregator]\nmax_batch_size = 0\n").unwrap();
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn from_file_reads_and_validates() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[aggregator]\ntick_interval_secs = 10").unwrap();

        let config = EngineConfig::from_file(file.path()).unwrap();
        assert_eq!(config.aggregator.tick_interval_secs, 10);
    }

    #[test]
    fn from_file_reports_parse_errors() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[aggregator\nbroken").unwrap();

        let result = EngineConfig::from_file(file.path());
        assert!(matches!(result, Err(ConfigError::ParseError { .. })));
    }

    #[test]
    fn from_file_missing_file() {
        let result = EngineConfig::from_file(std::path::Path::new("/nonexistent/wristlink.toml"));
        assert!(matches!(result, Err(ConfigError::ReadError { .. })));
    }
}
