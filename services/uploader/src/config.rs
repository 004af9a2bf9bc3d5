//! Configuration management for the photo uploader.
//!
//! Values come from an optional config file and environment variables.
//! Command-line flags are applied on top by the binary.

use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;
use std::path::Path;
use std::time::Duration;

/// Highest number of uploads kept in flight at once
pub const MAX_CONCURRENCY: usize = 4;

/// Main configuration for the uploader.
#[derive(Debug, Clone, Deserialize)]
pub struct UploaderConfig {
    /// Gallery server connection
    #[serde(default)]
    pub server: ServerConfig,

    /// Compression and batching
    #[serde(default)]
    pub compression: CompressionConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Gallery server connection configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    /// Base URL of the gallery service (e.g., "http://localhost:3000")
    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// Admin username used to open a session
    #[serde(default)]
    pub username: String,

    /// Admin password
    #[serde(default)]
    pub password: String,

    /// Per-request timeout in seconds; unset means no timeout
    #[serde(default)]
    pub request_timeout_secs: Option<u64>,
}

/// Compression configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct CompressionConfig {
    /// JPEG quality (1-100)
    #[serde(default = "default_quality")]
    pub quality: u8,

    /// Uploads in flight at once (1 = strictly sequential)
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,
}

/// Logging configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Output format (json, pretty)
    #[serde(default = "default_log_format")]
    pub format: String,
}

// Default value functions
fn default_base_url() -> String {
    "http://localhost:3000".to_string()
}
fn default_quality() -> u8 {
    80
}
fn default_concurrency() -> usize {
    1
}
fn default_log_level() -> String {
    "warn".to_string()
}
fn default_log_format() -> String {
    "pretty".to_string()
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            username: String::new(),
            password: String::new(),
            request_timeout_secs: None,
        }
    }
}

impl Default for CompressionConfig {
    fn default() -> Self {
        Self {
            quality: default_quality(),
            concurrency: default_concurrency(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
        }
    }
}

impl UploaderConfig {
    /// Load configuration from file and environment variables.
    ///
    /// Sources, later overriding earlier:
    /// 1. `config/uploader` (optional)
    /// 2. `explicit`, when given (required)
    /// 3. Environment variables (prefixed with UPLOADER_)
    pub fn load(explicit: Option<&Path>) -> Result<Self, ConfigError> {
        let mut builder =
            Config::builder().add_source(File::with_name("config/uploader").required(false));

        if let Some(path) = explicit {
            builder = builder.add_source(File::from(path).required(true));
        }

        let config = builder
            // e.g. UPLOADER__SERVER__BASE_URL
            .add_source(
                Environment::with_prefix("UPLOADER")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        config.try_deserialize()
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), ConfigValidationError> {
        if self.server.base_url.is_empty() {
            return Err(ConfigValidationError::MissingField(
                "server.base_url".to_string(),
            ));
        }
        if !self.server.base_url.starts_with("http://")
            && !self.server.base_url.starts_with("https://")
        {
            return Err(ConfigValidationError::InvalidValue {
                field: "server.base_url".to_string(),
                message: "URL must start with http:// or https://".to_string(),
            });
        }

        if self.server.username.is_empty() || self.server.password.is_empty() {
            return Err(ConfigValidationError::MissingField(
                "server.username/password".to_string(),
            ));
        }

        if !(1..=100).contains(&self.compression.quality) {
            return Err(ConfigValidationError::InvalidValue {
                field: "compression.quality".to_string(),
                message: "Quality must be between 1 and 100".to_string(),
            });
        }

        if !(1..=MAX_CONCURRENCY).contains(&self.compression.concurrency) {
            return Err(ConfigValidationError::InvalidValue {
                field: "compression.concurrency".to_string(),
                message: format!("Concurrency must be between 1 and {MAX_CONCURRENCY}"),
            });
        }

        Ok(())
    }
}

impl ServerConfig {
    /// Get request timeout as Duration, if one is configured.
    pub fn request_timeout(&self) -> Option<Duration> {
        self.request_timeout_secs.map(Duration::from_secs)
    }
}

/// Configuration validation errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigValidationError {
    #[error("Missing required field: {0}")]
    MissingField(String),

    #[error("Invalid value for {field}: {message}")]
    InvalidValue { field: String, message: String },
}
