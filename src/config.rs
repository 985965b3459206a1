/// Configuration management for the upload service
use crate::error::{UploadError, UploadResult};
use serde::{Deserialize, Serialize};
use std::env;
use std::fmt;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

/// Main server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub service: ServiceConfig,
    pub storage: StorageConfig,
    pub authentication: AuthConfig,
    pub logging: LoggingConfig,
}

/// Service-level configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceConfig {
    pub hostname: String,
    pub port: u16,
}

/// Storage configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Root directory every stored object lives under
    pub data_root: PathBuf,
    /// Largest declared upload accepted, in bytes (None = unlimited)
    pub max_upload_size: Option<u64>,
}

/// Authentication configuration
#[derive(Clone, Serialize, Deserialize)]
pub struct AuthConfig {
    /// Secret shared with the upload slot allocator
    pub secret_key: String,
}

impl fmt::Debug for AuthConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AuthConfig")
            .field("secret_key", &"<redacted>")
            .finish()
    }
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// `EnvFilter` directives, e.g. `info` or `xmpp_http_upload=debug`
    pub level: String,
    /// Emit one JSON object per event instead of human-readable lines
    pub json: bool,
}

impl LoggingConfig {
    /// Filter for the subscriber; unparsable directives fall back to `info`
    pub fn env_filter(&self) -> EnvFilter {
        EnvFilter::try_new(&self.level).unwrap_or_else(|e| {
            eprintln!("Invalid log filter {:?} ({}), using \"info\"", self.level, e);
            EnvFilter::new("info")
        })
    }
}

impl ServerConfig {
    /// Build a configuration with defaults for everything but the storage
    /// root and the secret key
    pub fn new(data_root: impl Into<PathBuf>, secret_key: impl Into<String>) -> Self {
        Self {
            service: ServiceConfig {
                hostname: "localhost".to_string(),
                port: 5000,
            },
            storage: StorageConfig {
                data_root: data_root.into(),
                max_upload_size: None,
            },
            authentication: AuthConfig {
                secret_key: secret_key.into(),
            },
            logging: LoggingConfig {
                level: "info".to_string(),
                json: false,
            },
        }
    }

    /// Load configuration from environment variables
    pub fn from_env() -> UploadResult<Self> {
        dotenv::dotenv().ok();

        let hostname = env::var("UPLOAD_HOSTNAME").unwrap_or_else(|_| "localhost".to_string());
        let port = env::var("UPLOAD_PORT")
            .unwrap_or_else(|_| "5000".to_string())
            .parse()
            .map_err(|_| UploadError::Validation("Invalid port number".to_string()))?;

        let data_root: PathBuf = env::var("UPLOAD_DATA_ROOT")
            .unwrap_or_else(|_| "./data".to_string())
            .into();
        let max_upload_size = match env::var("UPLOAD_MAX_SIZE") {
            Ok(value) if !value.trim().is_empty() => Some(value.trim().parse().map_err(|_| {
                UploadError::Validation(format!("Invalid UPLOAD_MAX_SIZE: {}", value))
            })?),
            _ => None,
        };

        let secret_key = env::var("UPLOAD_SECRET_KEY")
            .map_err(|_| UploadError::Validation("Secret key required".to_string()))?;

        let log_level = env::var("RUST_LOG").unwrap_or_else(|_| "info".to_string());
        let log_json = matches!(
            env::var("UPLOAD_LOG_JSON").as_deref().map(str::trim),
            Ok("1" | "true")
        );

        Ok(ServerConfig {
            service: ServiceConfig { hostname, port },
            storage: StorageConfig {
                data_root,
                max_upload_size,
            },
            authentication: AuthConfig { secret_key },
            logging: LoggingConfig {
                level: log_level,
                json: log_json,
            },
        })
    }

    /// Validate configuration
    pub fn validate(&self) -> UploadResult<()> {
        if self.service.hostname.is_empty() {
            return Err(UploadError::Validation("Hostname cannot be empty".to_string()));
        }

        if self.authentication.secret_key.is_empty() {
            return Err(UploadError::Validation(
                "Secret key cannot be empty".to_string(),
            ));
        }

        Ok(())
    }

    /// Address the listener binds to
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.service.hostname, self.service.port)
    }
}
