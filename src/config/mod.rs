use crate::core::{AppError, Result};
use std::env;

pub mod database;
pub mod fiscal;
pub mod server;

pub use database::DatabaseConfig;
pub use fiscal::{AfipEnvironment, FiscalConfig, SigningMaterial, StoredFiscalConfig};
pub use server::ServerConfig;

/// Main application configuration
#[derive(Debug, Clone)]
pub struct Config {
    pub app: AppConfig,
    pub database: DatabaseConfig,
    pub server: ServerConfig,
    pub fiscal: FiscalConfig,
    pub security: SecurityConfig,
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub env: String,
    pub log_level: String,
    /// `pretty` or `json`
    pub log_format: String,
}

#[derive(Debug, Clone)]
pub struct SecurityConfig {
    /// Shared secret of the upstream identity provider; `None` disables identity checks
    pub identity_secret: Option<String>,
    pub rate_limit_per_minute: u32,
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self> {
        // Load .env file if present
        dotenvy::dotenv().ok();

        let config = Config {
            app: AppConfig {
                env: env::var("APP_ENV").unwrap_or_else(|_| "development".to_string()),
                log_level: env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string()),
                log_format: env::var("LOG_FORMAT").unwrap_or_else(|_| "pretty".to_string()),
            },
            database: DatabaseConfig::from_env()?,
            server: ServerConfig::from_env()?,
            fiscal: FiscalConfig::from_env()?,
            security: SecurityConfig {
                identity_secret: env::var("IDENTITY_SHARED_SECRET")
                    .ok()
                    .filter(|s| !s.trim().is_empty()),
                rate_limit_per_minute: env::var("RATE_LIMIT_PER_MINUTE")
                    .unwrap_or_else(|_| "600".to_string())
                    .parse()
                    .map_err(|_| {
                        AppError::Configuration("Invalid RATE_LIMIT_PER_MINUTE".to_string())
                    })?,
            },
        };

        Ok(config)
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        if self.security.rate_limit_per_minute == 0 {
            return Err(AppError::Configuration(
                "Rate limit must be greater than 0".to_string(),
            ));
        }

        if self.app.env == "production" && self.security.identity_secret.is_none() {
            return Err(AppError::Configuration(
                "IDENTITY_SHARED_SECRET is required in production".to_string(),
            ));
        }

        self.database.validate()?;
        self.fiscal.validate()
    }

    pub fn json_logs(&self) -> bool {
        self.app.log_format.eq_ignore_ascii_case("json")
    }
}
