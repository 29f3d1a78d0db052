use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;
use std::env;
use std::path::Path;
use std::time::Duration;
use thiserror::Error;
use tracing::{error, info};
use validator::{Validate, ValidationError};

use crate::errors::ServiceError;

/// Default values for configuration
const DEFAULT_LOG_LEVEL: &str = "info";
const DEFAULT_ENV: &str = "development";
const DEFAULT_PORT: u16 = 8080;
const CONFIG_DIR: &str = "config";
const DEFAULT_CURRENCY: &str = "ils";
const DEFAULT_STRIPE_API_BASE: &str = "https://api.stripe.com";
const DEFAULT_TELEGRAM_API_BASE: &str = "https://api.telegram.org";
const DEFAULT_FIRESTORE_API_BASE: &str = "https://firestore.googleapis.com/v1";
const DEFAULT_STRIPE_MAX_NETWORK_RETRIES: u32 = 2;
const MAX_STRIPE_NETWORK_RETRIES: u32 = 5;
const DEFAULT_HTTP_TIMEOUT_SECS: u64 = 15;
const DEFAULT_COD_PROCESSING_DELAY_MS: u64 = 1500;
const DEFAULT_SYNC_INTERVAL_SECS: u64 = 60;

/// Application configuration structure with validation
#[derive(Clone, Debug, Deserialize, Validate)]
#[serde(deny_unknown_fields)]
pub struct AppConfig {
    /// Server host address
    pub host: String,

    /// Server port
    #[serde(default = "default_port")]
    #[validate(range(min = 1))]
    pub port: u16,

    /// Application environment
    pub environment: String,

    /// Logging level
    #[serde(default = "default_log_level")]
    #[validate(custom = "validate_log_level")]
    pub log_level: String,

    /// Log in JSON format (structured logging)
    #[serde(default)]
    pub log_json: bool,

    /// CORS: comma-separated list of allowed origins
    #[serde(default)]
    pub cors_allowed_origins: Option<String>,

    /// Payment processor secret key
    #[serde(default)]
    pub stripe_secret_key: Option<String>,

    #[serde(default = "default_stripe_api_base")]
    pub stripe_api_base: String,

    /// Retries for transient network failures only, never for declines
    #[serde(default = "default_stripe_max_network_retries")]
    #[validate(custom = "validate_network_retries")]
    pub stripe_max_network_retries: u32,

    /// Currency used when a request does not name one
    #[serde(default = "default_currency")]
    #[validate(custom = "validate_currency_code")]
    pub default_currency: String,

    /// Timeout for every outbound HTTP call
    #[serde(default = "default_http_timeout_secs")]
    #[validate(range(min = 1, max = 120))]
    pub http_timeout_secs: u64,

    #[serde(default)]
    pub telegram_bot_token: Option<String>,

    /// Channel receiving order notifications
    #[serde(default)]
    pub telegram_orders_chat_id: Option<String>,

    /// Channel receiving contact and ticket messages
    #[serde(default)]
    pub telegram_support_chat_id: Option<String>,

    /// Comma-separated chats allowed to issue bot commands
    #[serde(default)]
    pub telegram_admin_chat_ids: Option<String>,

    /// Secret token the bot platform echoes on every webhook call
    #[serde(default)]
    pub telegram_webhook_secret: Option<String>,

    #[serde(default = "default_telegram_api_base")]
    pub telegram_api_base: String,

    #[serde(default)]
    pub firestore_project_id: Option<String>,

    #[serde(default)]
    pub firestore_api_key: Option<String>,

    #[serde(default = "default_firestore_api_base")]
    pub firestore_api_base: String,

    /// Simulated processing delay of the cash-on-delivery path
    #[serde(default = "default_cod_processing_delay_ms")]
    pub cod_processing_delay_ms: u64,

    /// Bearer key for the CSV download endpoints; open when unset
    #[serde(default)]
    pub export_api_key: Option<String>,

    /// Period of the background sync of pending local records; 0 disables it
    #[serde(default = "default_sync_interval_secs")]
    pub sync_interval_secs: u64,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: default_port(),
            environment: DEFAULT_ENV.to_string(),
            log_level: default_log_level(),
            log_json: false,
            cors_allowed_origins: None,
            stripe_secret_key: None,
            stripe_api_base: default_stripe_api_base(),
            stripe_max_network_retries: default_stripe_max_network_retries(),
            default_currency: default_currency(),
            http_timeout_secs: default_http_timeout_secs(),
            telegram_bot_token: None,
            telegram_orders_chat_id: None,
            telegram_support_chat_id: None,
            telegram_admin_chat_ids: None,
            telegram_webhook_secret: None,
            telegram_api_base: default_telegram_api_base(),
            firestore_project_id: None,
            firestore_api_key: None,
            firestore_api_base: default_firestore_api_base(),
            cod_processing_delay_ms: default_cod_processing_delay_ms(),
            export_api_key: None,
            sync_interval_secs: default_sync_interval_secs(),
        }
    }
}

impl AppConfig {
    pub fn is_development(&self) -> bool {
        self.environment.eq_ignore_ascii_case("development")
    }

    pub fn http_timeout(&self) -> Duration {
        Duration::from_secs(self.http_timeout_secs)
    }

    pub fn sync_interval(&self) -> Option<Duration> {
        (self.sync_interval_secs > 0).then(|| Duration::from_secs(self.sync_interval_secs))
    }

    pub fn cod_processing_delay(&self) -> Duration {
        Duration::from_millis(self.cod_processing_delay_ms)
    }

    /// Processor secret, or `NOT_CONFIGURED` before any network call is attempted.
    pub fn require_stripe_secret(&self) -> Result<&str, ServiceError> {
        non_blank(&self.stripe_secret_key)
            .ok_or_else(|| ServiceError::not_configured("stripe_secret_key is not set"))
    }

    pub fn require_telegram_token(&self) -> Result<&str, ServiceError> {
        non_blank(&self.telegram_bot_token)
            .ok_or_else(|| ServiceError::not_configured("telegram_bot_token is not set"))
    }

    pub fn require_firestore_project(&self) -> Result<&str, ServiceError> {
        non_blank(&self.firestore_project_id)
            .ok_or_else(|| ServiceError::not_configured("firestore_project_id is not set"))
    }

    /// Chats allowed to run bot commands; the orders chat is always included.
    pub fn admin_chat_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self
            .telegram_admin_chat_ids
            .as_deref()
            .unwrap_or_default()
            .split(',')
            .map(str::trim)
            .filter(|id| !id.is_empty())
            .map(str::to_string)
            .collect();
        if let Some(orders) = non_blank(&self.telegram_orders_chat_id) {
            if !ids.iter().any(|id| id == orders) {
                ids.push(orders.to_string());
            }
        }
        ids
    }

    pub fn export_key(&self) -> Option<&str> {
        non_blank(&self.export_api_key)
    }

    pub fn cors_origins(&self) -> Vec<String> {
        self.cors_allowed_origins
            .as_deref()
            .unwrap_or_default()
            .split(',')
            .map(str::trim)
            .filter(|o| !o.is_empty())
            .map(str::to_string)
            .collect()
    }
}

fn non_blank(value: &Option<String>) -> Option<&str> {
    value.as_deref().map(str::trim).filter(|v| !v.is_empty())
}

/// Configuration loading errors
#[derive(Debug, Error)]
pub enum AppConfigError {
    #[error("Configuration loading failed: {0}")]
    Load(#[from] ConfigError),

    #[error("Configuration validation failed: {0}")]
    Validation(#[from] validator::ValidationErrors),
}

fn default_log_level() -> String {
    DEFAULT_LOG_LEVEL.to_string()
}

fn default_port() -> u16 {
    DEFAULT_PORT
}

fn default_currency() -> String {
    DEFAULT_CURRENCY.to_string()
}

fn default_stripe_api_base() -> String {
    DEFAULT_STRIPE_API_BASE.to_string()
}

fn default_telegram_api_base() -> String {
    DEFAULT_TELEGRAM_API_BASE.to_string()
}

fn default_firestore_api_base() -> String {
    DEFAULT_FIRESTORE_API_BASE.to_string()
}

fn default_stripe_max_network_retries() -> u32 {
    DEFAULT_STRIPE_MAX_NETWORK_RETRIES
}

fn default_http_timeout_secs() -> u64 {
    DEFAULT_HTTP_TIMEOUT_SECS
}

fn default_cod_processing_delay_ms() -> u64 {
    DEFAULT_COD_PROCESSING_DELAY_MS
}

fn default_sync_interval_secs() -> u64 {
    DEFAULT_SYNC_INTERVAL_SECS
}

fn validate_log_level(level: &str) -> Result<(), ValidationError> {
    let valid_levels = ["trace", "debug", "info", "warn", "error"];
    if valid_levels.contains(&level.to_lowercase().as_str()) {
        Ok(())
    } else {
        let mut err = ValidationError::new("log_level");
        err.message = Some("Must be one of: trace, debug, info, warn, error".into());
        Err(err)
    }
}

fn validate_network_retries(retries: u32) -> Result<(), ValidationError> {
    if retries > MAX_STRIPE_NETWORK_RETRIES {
        let mut err = ValidationError::new("stripe_max_network_retries");
        err.message = Some("stripe_max_network_retries must be 5 or less".into());
        return Err(err);
    }
    Ok(())
}

fn validate_currency_code(code: &str) -> Result<(), ValidationError> {
    if code.len() != 3 || !code.chars().all(|c| c.is_ascii_alphabetic()) {
        let mut err = ValidationError::new("default_currency");
        err.message = Some("Currency must be a 3 letter ISO 4217 code".into());
        return Err(err);
    }
    Ok(())
}

/// Initializes tracing using the provided log level as the default filter
pub fn init_tracing(level: &str, json: bool) {
    use tracing_subscriber::{fmt, EnvFilter};

    let default_directive = format!("mx_storefront={},tower_http=info", level);
    let filter_directive = env::var("RUST_LOG")
        .ok()
        .filter(|s| !s.trim().is_empty())
        .unwrap_or(default_directive);

    if json {
        let _ = fmt()
            .with_env_filter(EnvFilter::new(filter_directive))
            .json()
            .try_init();
    } else {
        let _ = fmt()
            .with_env_filter(EnvFilter::new(filter_directive))
            .try_init();
    }
}

/// Loads application configuration
///
/// Layers configuration sources in this order:
/// 1. Built-in defaults
/// 2. Default config (config/default.toml)
/// 3. Environment-specific config (config/{env}.toml)
/// 4. Environment variables (APP__*)
pub fn load_config() -> Result<AppConfig, AppConfigError> {
    let run_env = env::var("RUN_ENV")
        .or_else(|_| env::var("APP_ENV"))
        .unwrap_or_else(|_| DEFAULT_ENV.to_string());
    info!("Loading configuration for environment: {}", run_env);

    if !Path::new(CONFIG_DIR).exists() {
        info!(
            "Config directory '{}' not found; relying on built-in defaults and environment variables",
            CONFIG_DIR
        );
    }

    let config = Config::builder()
        .set_default("host", "0.0.0.0")?
        .set_default("port", i64::from(DEFAULT_PORT))?
        .set_default("environment", run_env.as_str())?
        .set_default("log_level", DEFAULT_LOG_LEVEL)?
        .set_default("log_json", false)?
        .add_source(File::with_name(&format!("{}/default", CONFIG_DIR)).required(false))
        .add_source(File::with_name(&format!("{}/{}", CONFIG_DIR, run_env)).required(false))
        .add_source(Environment::with_prefix("APP").separator("__"))
        .build()?;

    let app_config: AppConfig = config.try_deserialize()?;

    app_config.validate().map_err(|e| {
        error!("Configuration validation failed: {:?}", e);
        AppConfigError::Validation(e)
    })?;

    if app_config.stripe_secret_key.is_none() {
        info!("stripe_secret_key not set; payment intent creation will answer NOT_CONFIGURED");
    }
    if app_config.telegram_bot_token.is_none() {
        info!("telegram_bot_token not set; bot notifications are disabled");
    }
    if app_config.firestore_project_id.is_none() {
        info!("firestore_project_id not set; orders are kept in the local tier only");
    }

    info!("Configuration loaded successfully");
    Ok(app_config)
}
