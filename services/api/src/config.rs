//! services/api/src/config.rs
//!
//! Defines the application's configuration structure and loading logic.
//!
//! All configuration is loaded from environment variables at startup. The `.env`
//! file is used for local development.

use std::net::SocketAddr;
use tracing::Level;

/// A custom error type for configuration loading failures.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing the environment variable {0}")]
    MissingVar(String),
    #[error("Invalid value for the environment variable {0}: {1}")]
    InvalidValue(String, String),
}

/// Settings for the license-check API. Payment enforcement is active only
/// when this section is configured.
#[derive(Clone, Debug)]
pub struct PurchaseConfig {
    pub api_url: String,
    pub product_id: String,
}

/// Holds all configuration loaded from the environment at startup.
#[derive(Clone, Debug)]
pub struct Config {
    pub bind_address: SocketAddr,
    pub log_level: Level,
    pub cookie_secret: String,
    pub bridge_url: String,
    pub directory_api_url: String,
    pub allowed_origin: String,
    pub session_capacity: usize,
    pub purchase: Option<PurchaseConfig>,
}

impl Config {
    /// Loads configuration from environment variables.
    ///
    /// It will look for a `.env` file in the current directory for development,
    /// but this is skipped in test environments to ensure tests are hermetic.
    pub fn from_env() -> Result<Self, ConfigError> {
        // Only load from .env in non-test mode to avoid contamination.
        if !cfg!(test) {
            dotenvy::dotenv().ok();
        }

        // --- Load Server Settings ---
        let bind_address_str =
            std::env::var("BIND_ADDRESS").unwrap_or_else(|_| "0.0.0.0:3000".to_string());
        let bind_address = bind_address_str.parse::<SocketAddr>().map_err(|e| {
            ConfigError::InvalidValue("BIND_ADDRESS".to_string(), e.to_string())
        })?;

        let log_level_str = std::env::var("RUST_LOG").unwrap_or_else(|_| "INFO".to_string());
        let log_level = log_level_str.parse::<Level>().map_err(|_| {
            ConfigError::InvalidValue(
                "RUST_LOG".to_string(),
                format!("'{}' is not a valid log level", log_level_str),
            )
        })?;

        let cookie_secret = std::env::var("COOKIE_SECRET")
            .map_err(|_| ConfigError::MissingVar("COOKIE_SECRET".to_string()))?;

        // --- Load External Service Settings ---
        let bridge_url = std::env::var("BRIDGE_URL")
            .map_err(|_| ConfigError::MissingVar("BRIDGE_URL".to_string()))?;

        let directory_api_url = std::env::var("DIRECTORY_API_URL")
            .map_err(|_| ConfigError::MissingVar("DIRECTORY_API_URL".to_string()))?;

        let allowed_origin = std::env::var("ALLOWED_ORIGIN")
            .unwrap_or_else(|_| "http://localhost:3000".to_string());

        let session_capacity_str =
            std::env::var("SESSION_CAPACITY").unwrap_or_else(|_| "512".to_string());
        let session_capacity = session_capacity_str.parse::<usize>().map_err(|e| {
            ConfigError::InvalidValue("SESSION_CAPACITY".to_string(), e.to_string())
        })?;

        // --- Load Purchase Enforcement Settings (optional as a pair) ---
        let purchase = match std::env::var("PURCHASE_API_URL").ok() {
            Some(api_url) => {
                let product_id = std::env::var("PURCHASE_PRODUCT_ID")
                    .map_err(|_| ConfigError::MissingVar("PURCHASE_PRODUCT_ID".to_string()))?;
                Some(PurchaseConfig {
                    api_url,
                    product_id,
                })
            }
            None => None,
        };

        Ok(Self {
            bind_address,
            log_level,
            cookie_secret,
            bridge_url,
            directory_api_url,
            allowed_origin,
            session_capacity,
            purchase,
        })
    }

    /// Whether a purchase check gates job creation.
    pub fn purchase_enforced(&self) -> bool {
        self.purchase.is_some()
    }
}
