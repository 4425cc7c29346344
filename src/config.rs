//! Configuration management for greetwatch
//!
//! Parses TOML configuration files and provides typed access to settings.
//! Every field has a default, so an empty file (or no file) is a valid
//! configuration.

use crate::error::{AppError, AppResult};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Root configuration structure
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub observability: ObservabilityConfig,
    #[serde(default)]
    pub greetings: GreetingsConfig,
}

/// Server configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8000
}

/// Observability configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ObservabilityConfig {
    #[serde(default = "default_log_level")]
    pub log_level: String,
    /// First part of every metric name, e.g. `greetwatch` in `greetwatch_api_request_counter`
    #[serde(default = "default_namespace")]
    pub namespace: String,
    #[serde(default = "default_subsystem")]
    pub subsystem: String,
    /// Expose process CPU, memory and fd metrics (Linux only)
    #[serde(default = "default_process_metrics")]
    pub process_metrics: bool,
    /// Latency histogram buckets in seconds; prometheus defaults when unset
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub latency_buckets: Option<Vec<f64>>,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            namespace: default_namespace(),
            subsystem: default_subsystem(),
            process_metrics: default_process_metrics(),
            latency_buckets: None,
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_namespace() -> String {
    "greetwatch".to_string()
}

fn default_subsystem() -> String {
    "api".to_string()
}

fn default_process_metrics() -> bool {
    true
}

/// Simulated work done by the greeting endpoints
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct GreetingsConfig {
    #[serde(default = "default_birthday_delay_ms")]
    pub birthday_delay_ms: u64,
    #[serde(default = "default_greeting_delay_ms")]
    pub greeting_delay_ms: u64,
}

impl GreetingsConfig {
    pub fn birthday_delay(&self) -> Duration {
        Duration::from_millis(self.birthday_delay_ms)
    }

    pub fn greeting_delay(&self) -> Duration {
        Duration::from_millis(self.greeting_delay_ms)
    }
}

impl Default for GreetingsConfig {
    fn default() -> Self {
        Self {
            birthday_delay_ms: default_birthday_delay_ms(),
            greeting_delay_ms: default_greeting_delay_ms(),
        }
    }
}

fn default_birthday_delay_ms() -> u64 {
    20_000
}

fn default_greeting_delay_ms() -> u64 {
    5_000
}

impl Config {
    /// Load and validate configuration from a TOML file
    ///
    /// # Errors
    ///
    /// Returns [`AppError::ConfigFileRead`], [`AppError::ConfigParseFailed`] or
    /// [`AppError::ConfigValidationFailed`] depending on which phase failed.
    pub fn from_file<P: AsRef<Path>>(path: P) -> AppResult<Self> {
        let path_display = path.as_ref().display().to_string();

        let content = std::fs::read_to_string(path.as_ref()).map_err(|source| {
            AppError::ConfigFileRead {
                path: path_display.clone(),
                source,
            }
        })?;

        let config: Self =
            toml::from_str(&content).map_err(|source| AppError::ConfigParseFailed {
                path: path_display.clone(),
                source,
            })?;

        config
            .validate()
            .map_err(|e| AppError::ConfigValidationFailed {
                path: path_display,
                reason: e.to_string(),
            })?;

        Ok(config)
    }

    /// Load `path` if it exists, otherwise fall back to defaults
    ///
    /// # Errors
    ///
    /// Same as [`from_file`](Self::from_file) when the file exists.
    pub fn from_file_or_default<P: AsRef<Path>>(path: P) -> AppResult<Self> {
        if path.as_ref().exists() {
            Self::from_file(path)
        } else {
            tracing::debug!(
                path = %path.as_ref().display(),
                "Config file not found, using defaults"
            );
            Ok(Self::default())
        }
    }

    /// Validate settings that serde cannot check on its own
    ///
    /// # Errors
    ///
    /// Returns [`AppError::Config`] describing the first invalid setting.
    pub fn validate(&self) -> AppResult<()> {
        if self.server.port == 0 {
            return Err(AppError::Config(
                "server.port must be between 1 and 65535".to_string(),
            ));
        }

        if self.server.host.trim().is_empty() {
            return Err(AppError::Config("server.host must not be empty".to_string()));
        }

        for (field, value) in [
            ("observability.namespace", &self.observability.namespace),
            ("observability.subsystem", &self.observability.subsystem),
        ] {
            if !value.chars().all(|c| c.is_ascii_alphanumeric() || c == '_')
                || value.starts_with(|c: char| c.is_ascii_digit())
            {
                return Err(AppError::Config(format!(
                    "{} '{}' must contain only ASCII letters, digits and '_' and not start with a digit",
                    field, value
                )));
            }
        }

        if let Some(buckets) = &self.observability.latency_buckets {
            if buckets.is_empty() {
                return Err(AppError::Config(
                    "observability.latency_buckets must not be empty".to_string(),
                ));
            }
            if buckets.iter().any(|b| !b.is_finite()) {
                return Err(AppError::Config(
                    "observability.latency_buckets must be finite numbers".to_string(),
                ));
            }
            if buckets.windows(2).any(|w| w[0] >= w[1]) {
                return Err(AppError::Config(format!(
                    "observability.latency_buckets must be strictly increasing, got {:?}",
                    buckets
                )));
            }
        }

        Ok(())
    }

    /// Socket address string for the listener
    pub fn listen_address(&self) -> String {
        format!("{}:{}", self.server.host, self.server.port)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_empty_config_uses_defaults() {
        let config: Config = toml::from_str("").unwrap();
        assert_eq!(config.server.host, "0.0.0.0");
        assert_eq!(config.server.port, 8000);
        assert_eq!(config.observability.log_level, "info");
        assert_eq!(config.observability.namespace, "greetwatch");
        assert_eq!(config.observability.subsystem, "api");
        assert!(config.observability.process_metrics);
        assert!(config.observability.latency_buckets.is_none());
        assert_eq!(config.greetings.birthday_delay(), Duration::from_secs(20));
        assert_eq!(config.greetings.greeting_delay(), Duration::from_secs(5));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_sections_fill_defaults() {
        let config: Config = toml::from_str(
            r#"
            [server]
            port = 9000

            [greetings]
            greeting_delay_ms = 10
            "#,
        )
        .unwrap();
        assert_eq!(config.server.host, "0.0.0.0");
        assert_eq!(config.server.port, 9000);
        assert_eq!(config.greetings.greeting_delay(), Duration::from_millis(10));
        assert_eq!(config.greetings.birthday_delay(), Duration::from_secs(20));
        assert_eq!(config.listen_address(), "0.0.0.0:9000");
    }

    #[test]
    fn test_rejects_port_zero() {
        let mut config = Config::default();
        config.server.port = 0;
        assert!(matches!(config.validate(), Err(AppError::Config(_))));
    }

    #[test]
    fn test_rejects_invalid_namespace() {
        let mut config = Config::default();
        config.observability.namespace = "greet-watch".to_string();
        assert!(config.validate().is_err());

        config.observability.namespace = "9lives".to_string();
        assert!(config.validate().is_err());

        config.observability.namespace = String::new();
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_rejects_unsorted_buckets() {
        let mut config = Config::default();
        config.observability.latency_buckets = Some(vec![1.0, 0.5]);
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("strictly increasing"));

        config.observability.latency_buckets = Some(vec![]);
        assert!(config.validate().is_err());

        config.observability.latency_buckets = Some(vec![0.1, f64::INFINITY]);
        assert!(config.validate().is_err());

        config.observability.latency_buckets = Some(vec![0.1, 1.0, 30.0]);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_from_file_reads_and_validates() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            "[server]\nhost = \"127.0.0.1\"\nport = 8081\n\n[observability]\nlog_level = \"debug\""
        )
        .unwrap();

        let config = Config::from_file(file.path()).unwrap();
        assert_eq!(config.listen_address(), "127.0.0.1:8081");
        assert_eq!(config.observability.log_level, "debug");
    }

    #[test]
    fn test_from_file_missing_file() {
        let err = Config::from_file("/nonexistent/greetwatch.toml").unwrap_err();
        assert!(matches!(err, AppError::ConfigFileRead { .. }));
    }

    #[test]
    fn test_from_file_parse_error() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[server]\nport = \"not a number\"").unwrap();

        let err = Config::from_file(file.path()).unwrap_err();
        assert!(matches!(err, AppError::ConfigParseFailed { .. }));
    }

    #[test]
    fn test_from_file_validation_error_names_path() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[server]\nport = 0").unwrap();

        let err = Config::from_file(file.path()).unwrap_err();
        match err {
            AppError::ConfigValidationFailed { path, reason } => {
                assert_eq!(path, file.path().display().to_string());
                assert!(reason.contains("server.port"));
            }
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[test]
    fn test_from_file_or_default_without_file() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config::from_file_or_default(dir.path().join("missing.toml")).unwrap();
        assert_eq!(config.server.port, 8000);
    }
}
