//! Sync configuration loaded from environment variables.
//!
//! # Environment Variables
//!
//! ## Required
//! - `DATABASE_URL` - `PostgreSQL` connection string
//!
//! ## Optional
//! - `SHOPIFY_API_VERSION` - Admin REST API version (default: 2025-01)
//! - `SYNC_MAX_CONCURRENT_SHOPS` - Shops synced in parallel per account (default: 8)
//! - `SYNC_SHOP_TIMEOUT_SECS` - Per-shop deadline in seconds (default: 1800)
//! - `SYNC_BATCH_TIMEOUT_SECS` - Per-batch write timeout in seconds (default: 300)
//! - `LOG_FORMAT` - `text` or `json` (default: text)
//! - `SENTRY_DSN` - Sentry error tracking DSN
//! - `SENTRY_ENVIRONMENT` - Sentry environment name

use std::time::Duration;

use secrecy::SecretString;
use thiserror::Error;

const DEFAULT_API_VERSION: &str = "2025-01";

/// Configuration errors that can occur during loading.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Missing environment variable: {0}")]
    MissingEnvVar(String),
    #[error("Invalid environment variable {0}: {1}")]
    InvalidEnvVar(String, String),
}

/// Log output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    /// Human readable text.
    #[default]
    Text,
    /// One JSON object per event.
    Json,
}

/// Top-level configuration for the sync binary.
#[derive(Debug, Clone)]
pub struct SyncConfig {
    /// `PostgreSQL` database connection URL (contains password)
    pub database_url: SecretString,
    /// Shopify API configuration
    pub shopify: ShopifyConfig,
    /// Engine tuning
    pub settings: SyncSettings,
    /// Log output format
    pub log_format: LogFormat,
    /// Sentry DSN for error tracking
    pub sentry_dsn: Option<String>,
    /// Sentry environment (e.g., "development", "production")
    pub sentry_environment: Option<String>,
}

/// Shopify Admin API configuration.
#[derive(Debug, Clone)]
pub struct ShopifyConfig {
    /// Shopify API version (e.g., 2025-01)
    pub api_version: String,
}

impl Default for ShopifyConfig {
    fn default() -> Self {
        Self {
            api_version: DEFAULT_API_VERSION.to_string(),
        }
    }
}

/// Pacing bounds for the per-shop rate governor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GovernorSettings {
    /// Interval a fresh governor starts at.
    pub initial_interval: Duration,
    /// Fastest allowed interval.
    pub min_interval: Duration,
    /// Slowest allowed interval.
    pub max_interval: Duration,
    /// Amount the interval shrinks by after each successful request.
    pub speedup_step: Duration,
}

impl Default for GovernorSettings {
    fn default() -> Self {
        Self {
            initial_interval: Duration::from_millis(200),
            min_interval: Duration::from_millis(100),
            max_interval: Duration::from_millis(1000),
            speedup_step: Duration::from_millis(50),
        }
    }
}

/// Engine constants.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncSettings {
    /// Orders requested per page and written per batch.
    pub batch_size: usize,
    /// Rate governor bounds.
    pub governor: GovernorSettings,
    /// Retries allowed for throttled requests before giving up on a shop.
    pub max_retries: u32,
    /// First backoff after a throttled request; doubles up to the governor ceiling.
    pub initial_backoff: Duration,
    /// Deadline for one shop's sync run.
    pub shop_timeout: Duration,
    /// Timeout for one batch write.
    pub batch_timeout: Duration,
    /// Shops synced in parallel for one account.
    pub max_concurrent_shops: usize,
}

impl Default for SyncSettings {
    fn default() -> Self {
        Self {
            batch_size: 250,
            governor: GovernorSettings::default(),
            max_retries: 5,
            initial_backoff: Duration::from_secs(1),
            shop_timeout: Duration::from_secs(30 * 60),
            batch_timeout: Duration::from_secs(5 * 60),
            max_concurrent_shops: 8,
        }
    }
}

impl SyncSettings {
    fn from_env() -> Result<Self, ConfigError> {
        let defaults = Self::default();

        let max_concurrent_shops = get_parsed_env(
            "SYNC_MAX_CONCURRENT_SHOPS",
            defaults.max_concurrent_shops,
        )?;
        if max_concurrent_shops == 0 {
            return Err(ConfigError::InvalidEnvVar(
                "SYNC_MAX_CONCURRENT_SHOPS".to_string(),
                "must be at least 1".to_string(),
            ));
        }

        let shop_timeout = Duration::from_secs(get_parsed_env(
            "SYNC_SHOP_TIMEOUT_SECS",
            defaults.shop_timeout.as_secs(),
        )?);
        let batch_timeout = Duration::from_secs(get_parsed_env(
            "SYNC_BATCH_TIMEOUT_SECS",
            defaults.batch_timeout.as_secs(),
        )?);

        Ok(Self {
            shop_timeout,
            batch_timeout,
            max_concurrent_shops,
            ..defaults
        })
    }
}

impl SyncConfig {
    /// Load configuration from environment variables.
    ///
    /// Calls `dotenvy::dotenv()` to load from `.env` file if present.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if required variables are missing or invalid.
    pub fn from_env() -> Result<Self, ConfigError> {
        // Load .env file if present (ignore errors if not found)
        let _ = dotenvy::dotenv();

        let database_url = get_required_secret("DATABASE_URL")?;
        let shopify = ShopifyConfig {
            api_version: get_env_or_default("SHOPIFY_API_VERSION", DEFAULT_API_VERSION),
        };
        let settings = SyncSettings::from_env()?;
        let log_format = match get_env_or_default("LOG_FORMAT", "text").as_str() {
            "text" => LogFormat::Text,
            "json" => LogFormat::Json,
            other => {
                return Err(ConfigError::InvalidEnvVar(
                    "LOG_FORMAT".to_string(),
                    format!("expected 'text' or 'json', got '{other}'"),
                ));
            }
        };

        Ok(Self {
            database_url,
            shopify,
            settings,
            log_format,
            sentry_dsn: get_optional_env("SENTRY_DSN"),
            sentry_environment: get_optional_env("SENTRY_ENVIRONMENT"),
        })
    }
}

// =============================================================================
// Helper Functions
// =============================================================================

/// Get a required environment variable.
fn get_required_env(key: &str) -> Result<String, ConfigError> {
    std::env::var(key).map_err(|_| ConfigError::MissingEnvVar(key.to_string()))
}

/// Get a required environment variable as a secret.
fn get_required_secret(key: &str) -> Result<SecretString, ConfigError> {
    let value = get_required_env(key)?;
    Ok(SecretString::from(value))
}

/// Get an optional environment variable.
fn get_optional_env(key: &str) -> Option<String> {
    std::env::var(key).ok()
}

/// Get an environment variable with a default value.
fn get_env_or_default(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

/// Parse an optional environment variable, falling back to `default` when unset.
fn get_parsed_env<T>(key: &str, default: T) -> Result<T, ConfigError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    get_optional_env(key).map_or(Ok(default), |raw| parse_value(key, &raw))
}

fn parse_value<T>(key: &str, raw: &str) -> Result<T, ConfigError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    raw.trim()
        .parse::<T>()
        .map_err(|e| ConfigError::InvalidEnvVar(key.to_string(), e.to_string()))
}
