use serde::Deserialize;
use std::path::PathBuf;
use std::time::Duration;

/// Main configuration for the gallery service
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    /// Service configuration
    #[serde(default)]
    pub service: ServiceConfig,
    /// Database configuration
    pub database: DatabaseConfig,
    /// Blob storage configuration
    #[serde(default)]
    pub storage: StorageConfig,
    /// API configuration
    #[serde(default)]
    pub api: ApiConfig,
    /// Admin authentication configuration
    pub auth: AuthConfig,
}

/// Service-level configuration
#[derive(Debug, Clone, Deserialize)]
pub struct ServiceConfig {
    /// Service name for logging/metrics
    #[serde(default = "default_service_name")]
    pub name: String,
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub log_level: String,
    /// Log output format (json, pretty)
    #[serde(default = "default_log_format")]
    pub log_format: String,
    /// Metrics port
    #[serde(default = "default_metrics_port")]
    pub metrics_port: u16,
}

/// Database configuration
#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    /// PostgreSQL connection URL
    pub url: String,
    /// Maximum number of connections in the pool
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
    /// Minimum number of connections in the pool
    #[serde(default = "default_min_connections")]
    pub min_connections: u32,
    /// Connection timeout in seconds
    #[serde(default = "default_connect_timeout_secs")]
    pub connect_timeout_secs: u64,
    /// Idle connection timeout in seconds
    #[serde(default = "default_idle_timeout_secs")]
    pub idle_timeout_secs: u64,
    /// Run migrations on startup
    #[serde(default = "default_true")]
    pub run_migrations: bool,
}

/// Local blob storage configuration
#[derive(Debug, Clone, Deserialize)]
pub struct StorageConfig {
    /// Public root served as static files
    #[serde(default = "default_public_dir")]
    pub public_dir: PathBuf,
    /// Directory under the public root holding uploaded photos
    #[serde(default = "default_uploads_subdir")]
    pub uploads_subdir: String,
    /// Extension used when an upload has none
    #[serde(default = "default_extension")]
    pub default_extension: String,
    /// Maximum accepted multipart body size in bytes
    #[serde(default = "default_max_upload_bytes")]
    pub max_upload_bytes: usize,
    /// Age after which a pending photo is reclaimed at startup
    #[serde(default = "default_pending_grace_secs")]
    pub pending_grace_secs: u64,
}

/// API configuration
#[derive(Debug, Clone, Deserialize)]
pub struct ApiConfig {
    /// API listen address
    #[serde(default = "default_api_host")]
    pub host: String,
    /// API listen port
    #[serde(default = "default_api_port")]
    pub port: u16,
    /// Enable CORS
    #[serde(default = "default_true")]
    pub cors_enabled: bool,
    /// Allowed CORS origins
    #[serde(default)]
    pub cors_origins: Vec<String>,
}

/// Admin account and session token configuration
#[derive(Debug, Clone, Deserialize)]
pub struct AuthConfig {
    /// HMAC secret for session tokens
    pub jwt_secret: String,
    /// Admin login name
    #[serde(default = "default_admin_username")]
    pub admin_username: String,
    /// Admin password
    pub admin_password: String,
    /// Session lifetime in days
    #[serde(default = "default_token_ttl_days")]
    pub token_ttl_days: u32,
    /// Name of the session cookie
    #[serde(default = "default_cookie_name")]
    pub cookie_name: String,
}

// Default value functions
fn default_service_name() -> String {
    "gallery-service".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "json".to_string()
}

fn default_metrics_port() -> u16 {
    9090
}

fn default_max_connections() -> u32 {
    10
}

fn default_min_connections() -> u32 {
    1
}

fn default_connect_timeout_secs() -> u64 {
    30
}

fn default_idle_timeout_secs() -> u64 {
    600
}

fn default_true() -> bool {
    true
}

fn default_public_dir() -> PathBuf {
    PathBuf::from("public")
}

fn default_uploads_subdir() -> String {
    "uploads".to_string()
}

fn default_extension() -> String {
    "jpg".to_string()
}

fn default_max_upload_bytes() -> usize {
    20 * 1024 * 1024 // 20MB
}

fn default_pending_grace_secs() -> u64 {
    300
}

fn default_api_host() -> String {
    "0.0.0.0".to_string()
}

fn default_api_port() -> u16 {
    3000
}

fn default_admin_username() -> String {
    "admin".to_string()
}

fn default_token_ttl_days() -> u32 {
    7
}

fn default_cookie_name() -> String {
    "auth-token".to_string()
}

impl Config {
    /// Load configuration from environment and config files
    pub fn load() -> anyhow::Result<Self> {
        let config = config::Config::builder()
            // Add config file if present
            .add_source(config::File::with_name("config/gallery").required(false))
            .add_source(config::File::with_name("/etc/gallery/gallery").required(false))
            // Override with environment variables
            // GALLERY__DATABASE__URL -> database.url
            .add_source(
                config::Environment::with_prefix("GALLERY")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        config.try_deserialize().map_err(Into::into)
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), ConfigValidationError> {
        if self.database.url.is_empty() {
            return Err(ConfigValidationError::MissingField("database.url".to_string()));
        }

        if self.auth.jwt_secret.is_empty() {
            return Err(ConfigValidationError::MissingField("auth.jwt_secret".to_string()));
        }

        if self.auth.admin_username.is_empty() || self.auth.admin_password.is_empty() {
            return Err(ConfigValidationError::MissingField(
                "auth.admin_username/admin_password".to_string(),
            ));
        }

        if self.auth.token_ttl_days == 0 {
            return Err(ConfigValidationError::InvalidValue {
                field: "auth.token_ttl_days".to_string(),
                message: "Token lifetime must be at least one day".to_string(),
            });
        }

        let ext = &self.storage.default_extension;
        if ext.is_empty() || !ext.chars().all(|c| c.is_ascii_alphanumeric()) {
            return Err(ConfigValidationError::InvalidValue {
                field: "storage.default_extension".to_string(),
                message: "Extension must be non-empty and alphanumeric".to_string(),
            });
        }

        Ok(())
    }

    /// Get pending photo grace period as Duration
    pub fn pending_grace(&self) -> Duration {
        Duration::from_secs(self.storage.pending_grace_secs)
    }
}

impl StorageConfig {
    /// Directory where uploaded blobs are written
    pub fn uploads_dir(&self) -> PathBuf {
        self.public_dir.join(&self.uploads_subdir)
    }
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            name: default_service_name(),
            log_level: default_log_level(),
            log_format: default_log_format(),
            metrics_port: default_metrics_port(),
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            public_dir: default_public_dir(),
            uploads_subdir: default_uploads_subdir(),
            default_extension: default_extension(),
            max_upload_bytes: default_max_upload_bytes(),
            pending_grace_secs: default_pending_grace_secs(),
        }
    }
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            host: default_api_host(),
            port: default_api_port(),
            cors_enabled: true,
            cors_origins: Vec::new(),
        }
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
