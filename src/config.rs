use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;
use validator::Validate;

const DEFAULT_ENV: &str = "development";
const DEFAULT_LOG_LEVEL: &str = "info";
const DEFAULT_PORT: u16 = 8080;
const CONFIG_DIR: &str = "config";

/// VNPay merchant configuration shared by URL signing and callback
/// verification. `hash_secret` is the HMAC-SHA512 key; both sides must sign
/// the identically sorted, identically encoded parameter string.
#[derive(Clone, Debug, Deserialize, Validate)]
pub struct VnpayConfig {
    /// Merchant terminal code issued by the gateway
    #[validate(length(min = 1))]
    pub tmn_code: String,
    /// Shared HMAC secret
    #[validate(length(min = 16))]
    pub hash_secret: String,
    /// Gateway payment page, e.g. https://sandbox.vnpayment.vn/paymentv2/vpcpay.html
    #[validate(url)]
    pub pay_url: String,
    /// Where the gateway redirects the shopper after payment
    #[validate(url)]
    pub return_url: String,
    /// Locale code passed as vnp_Locale
    #[serde(default = "default_locale")]
    pub locale: String,
}

fn default_locale() -> String {
    "vn".to_string()
}

/// Transactional email provider settings (HTTP JSON API).
#[derive(Clone, Debug, Deserialize, Validate)]
pub struct EmailConfig {
    /// Provider send endpoint
    #[validate(url)]
    pub endpoint: String,
    pub api_key: String,
    #[validate(email)]
    pub from_address: String,
    #[serde(default = "default_from_name")]
    pub from_name: String,
}

fn default_from_name() -> String {
    "Storefront".to_string()
}

/// Application configuration, layered from `config/default.toml`, an
/// environment-specific file, and `APP_*` environment variables.
#[derive(Clone, Debug, Deserialize, Validate)]
pub struct AppConfig {
    /// Database connection URL
    pub database_url: String,

    /// JWT secret used to verify bearer tokens issued by the auth service
    #[validate(length(min = 32))]
    pub jwt_secret: String,

    /// Server host address
    pub host: String,

    /// Server port
    #[serde(default = "default_port")]
    pub port: u16,

    /// Application environment
    #[serde(default = "default_env")]
    pub environment: String,

    /// Logging level filter
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Log in JSON format (structured logging)
    #[serde(default)]
    pub log_json: bool,

    /// Run database migrations on startup
    #[serde(default)]
    pub auto_migrate: bool,

    #[validate]
    pub vnpay: VnpayConfig,

    #[validate]
    pub email: EmailConfig,
}

fn default_port() -> u16 {
    DEFAULT_PORT
}

fn default_env() -> String {
    DEFAULT_ENV.to_string()
}

fn default_log_level() -> String {
    DEFAULT_LOG_LEVEL.to_string()
}

impl AppConfig {
    /// Loads configuration from files and environment.
    ///
    /// Precedence, lowest to highest: `config/default.toml`,
    /// `config/{environment}.toml`, `APP_*` environment variables
    /// (`APP_VNPAY__HASH_SECRET` style for nested keys).
    pub fn load() -> Result<Self, ConfigError> {
        let environment =
            std::env::var("ENVIRONMENT").unwrap_or_else(|_| DEFAULT_ENV.to_string());

        let config = Config::builder()
            .add_source(File::with_name(&format!("{CONFIG_DIR}/default")).required(false))
            .add_source(File::with_name(&format!("{CONFIG_DIR}/{environment}")).required(false))
            .add_source(Environment::with_prefix("APP").separator("__"))
            .build()?;

        let app_config: AppConfig = config.try_deserialize()?;
        app_config
            .validate()
            .map_err(|e| ConfigError::Message(format!("invalid configuration: {e}")))?;

        Ok(app_config)
    }

    /// Socket address string for the HTTP listener.
    pub fn server_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn is_production(&self) -> bool {
        self.environment == "production"
    }
}
