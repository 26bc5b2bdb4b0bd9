//! Configuration management
//!
//! Handles loading and validating client configuration from TOML files.
//! The signaling endpoint may also come from the environment, which takes
//! precedence over the file.

use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::Path;

/// Environment variable holding the signaling endpoint address
pub const ENDPOINT_ENV: &str = "SIGNALING_WS_URL";

/// Root configuration structure
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub signaling: SignalingConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Signaling server configuration
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SignalingConfig {
    /// Signaling endpoint (ws:// or wss://)
    pub endpoint: Option<String>,
}

impl SignalingConfig {
    /// Configuration pointing at the given endpoint
    pub fn with_endpoint(endpoint: impl Into<String>) -> Self {
        Self {
            endpoint: Some(endpoint.into()),
        }
    }

    /// Get the configured endpoint, treating an empty value as absent
    pub fn endpoint(&self) -> Option<&str> {
        self.endpoint
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
    }

    /// Apply an override value (from the environment or the command line)
    pub fn override_endpoint(&mut self, value: Option<String>) {
        if let Some(value) = value.filter(|v| !v.trim().is_empty()) {
            self.endpoint = Some(value);
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    /// Log level: trace, debug, info, warn, error
    #[serde(default = "default_log_level")]
    pub level: String,
    /// Output format: "json" or "pretty"
    #[serde(default = "default_log_format")]
    pub format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "pretty".to_string()
}

impl Config {
    /// Load configuration from a TOML file, then apply the environment override
    pub fn load(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {:?}", path))?;

        let mut config = Self::parse(&contents)?;
        config
            .signaling
            .override_endpoint(std::env::var(ENDPOINT_ENV).ok());

        config.validate()?;
        Ok(config)
    }

    /// Load from a file if it exists, otherwise start from defaults.
    ///
    /// The environment override is applied either way.
    pub fn load_or_default(path: &Path) -> Result<Self> {
        if path.exists() {
            return Self::load(path);
        }

        let mut config = Self::default();
        config
            .signaling
            .override_endpoint(std::env::var(ENDPOINT_ENV).ok());
        config.validate()?;
        Ok(config)
    }

    /// Parse configuration from TOML text
    pub fn parse(contents: &str) -> Result<Self> {
        toml::from_str(contents).with_context(|| "Failed to parse config file")
    }

    /// Validate configuration values.
    ///
    /// A missing endpoint is not a load error; it surfaces when connecting.
    fn validate(&self) -> Result<()> {
        if let Some(endpoint) = self.signaling.endpoint() {
            if !endpoint.starts_with("ws://") && !endpoint.starts_with("wss://") {
                anyhow::bail!("signaling.endpoint must use ws:// or wss://, got {endpoint}");
            }
        }
        match self.logging.format.as_str() {
            "json" | "pretty" => {}
            other => anyhow::bail!("logging.format must be \"json\" or \"pretty\", got {other}"),
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = Config::parse("").unwrap();
        assert!(config.signaling.endpoint().is_none());
        assert_eq!(config.logging.level, "info");
        assert_eq!(config.logging.format, "pretty");
    }

    #[test]
    fn test_parse_endpoint() {
        let config = Config::parse(
            r#"
            [signaling]
            endpoint = "wss://example.test/signal"

            [logging]
            level = "debug"
            format = "json"
            "#,
        )
        .unwrap();
        assert_eq!(config.signaling.endpoint(), Some("wss://example.test/signal"));
        assert_eq!(config.logging.level, "debug");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_empty_endpoint_is_absent() {
        let config = SignalingConfig {
            endpoint: Some("   ".to_string()),
        };
        assert!(config.endpoint().is_none());
    }

    #[test]
    fn test_override_endpoint() {
        let mut config = SignalingConfig::with_endpoint("ws://file.test/signal");

        config.override_endpoint(None);
        assert_eq!(config.endpoint(), Some("ws://file.test/signal"));

        config.override_endpoint(Some(String::new()));
        assert_eq!(config.endpoint(), Some("ws://file.test/signal"));

        config.override_endpoint(Some("ws://env.test/signal".to_string()));
        assert_eq!(config.endpoint(), Some("ws://env.test/signal"));
    }

    #[test]
    fn test_rejects_non_websocket_scheme() {
        let config = Config::parse(
            r#"
            [signaling]
            endpoint = "http://example.test/signal"
            "#,
        )
        .unwrap();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_load_from_file() {
        use std::io::Write;

        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[signaling]\nendpoint = \"ws://file.test/signal\"").unwrap();

        let config = Config::load(file.path()).unwrap();
        if std::env::var(ENDPOINT_ENV).is_err() {
            assert_eq!(config.signaling.endpoint(), Some("ws://file.test/signal"));
        }
    }

    #[test]
    fn test_load_missing_file() {
        assert!(Config::load(Path::new("/nonexistent/signal-config.toml")).is_err());
    }

    #[test]
    fn test_rejects_unknown_log_format() {
        let config = Config::parse(
            r#"
            [logging]
            format = "xml"
            "#,
        )
        .unwrap();
        assert!(config.validate().is_err());
    }
}
