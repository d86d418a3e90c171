//! Application configuration module
//! Handles environment variable loading, configuration validation, and
//! platform credentials selection.

use std::env;

use crate::gateway::signature::SignAlgorithm;

/// Main application configuration
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub logging: LoggingConfig,
    pub platform: PlatformConfig,
}

/// Server configuration
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

/// Database configuration
#[derive(Debug, Clone)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
    pub min_connections: u32,
    pub connection_timeout: u64, // seconds
}

/// Logging configuration
#[derive(Debug, Clone)]
pub struct LoggingConfig {
    pub level: String,
    pub format: LogFormat,
}

/// Log format options
#[derive(Debug, Clone)]
pub enum LogFormat {
    Json,
    Plain,
}

/// Context mode selecting which shop certificate signs requests.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CtxMode {
    Test,
    Production,
}

impl CtxMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            CtxMode::Test => "TEST",
            CtxMode::Production => "PRODUCTION",
        }
    }
}

/// How the platform sends the customer's browser back to the shop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReturnMode {
    Get,
    Post,
}

impl ReturnMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReturnMode::Get => "GET",
            ReturnMode::Post => "POST",
        }
    }
}

/// Payment-platform configuration: credentials, signing, checkout defaults and
/// the shop pages inbound callbacks redirect to.
#[derive(Debug, Clone)]
pub struct PlatformConfig {
    pub site_id: String,
    pub key_test: String,
    pub key_production: String,
    pub ctx_mode: CtxMode,
    pub sign_algorithm: SignAlgorithm,
    pub platform_url: String,
    pub capture_delay: u32,
    /// "0" automatic capture, "1" manual merchant validation, "" platform default.
    pub validation_mode: String,
    pub payment_cards: Vec<String>,
    pub return_mode: ReturnMode,
    pub language: String,
    pub url_return: String,
    pub url_success: String,
    pub url_checkout: String,
    pub url_cart: String,
    pub session_ttl_secs: u64,
}

impl PlatformConfig {
    /// Shop secret for the active context mode. Never logged.
    pub fn secret(&self) -> &str {
        match self.ctx_mode {
            CtxMode::Test => &self.key_test,
            CtxMode::Production => &self.key_production,
        }
    }
}

impl AppConfig {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self, ConfigError> {
        // Load .env file if it exists
        let _ = dotenv::dotenv().ok();

        Ok(AppConfig {
            server: ServerConfig::from_env()?,
            database: DatabaseConfig::from_env()?,
            logging: LoggingConfig::from_env()?,
            platform: PlatformConfig::from_env()?,
        })
    }

    /// Validate the entire configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.server.validate()?;
        self.database.validate()?;
        self.logging.validate()?;
        self.platform.validate()?;
        Ok(())
    }
}

impl ServerConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Ok(ServerConfig {
            host: env::var("SERVER_HOST").unwrap_or_else(|_| "127.0.0.1".to_string()),
            port: env::var("SERVER_PORT")
                .unwrap_or_else(|_| "8000".to_string())
                .parse()
                .map_err(|_| ConfigError::InvalidValue("SERVER_PORT".to_string()))?,
        })
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.port == 0 {
            return Err(ConfigError::InvalidValue(
                "SERVER_PORT cannot be 0".to_string(),
            ));
        }
        if self.host.is_empty() {
            return Err(ConfigError::InvalidValue(
                "SERVER_HOST cannot be empty".to_string(),
            ));
        }
        Ok(())
    }
}

impl DatabaseConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Ok(DatabaseConfig {
            url: env::var("DATABASE_URL")
                .map_err(|_| ConfigError::MissingVariable("DATABASE_URL".to_string()))?,
            max_connections: env::var("DB_MAX_CONNECTIONS")
                .unwrap_or_else(|_| "20".to_string())
                .parse()
                .map_err(|_| ConfigError::InvalidValue("DB_MAX_CONNECTIONS".to_string()))?,
            min_connections: env::var("DB_MIN_CONNECTIONS")
                .unwrap_or_else(|_| "5".to_string())
                .parse()
                .map_err(|_| ConfigError::InvalidValue("DB_MIN_CONNECTIONS".to_string()))?,
            connection_timeout: env::var("DB_CONNECTION_TIMEOUT")
                .unwrap_or_else(|_| "30".to_string())
                .parse()
                .map_err(|_| ConfigError::InvalidValue("DB_CONNECTION_TIMEOUT".to_string()))?,
        })
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.url.is_empty() {
            return Err(ConfigError::InvalidValue("DATABASE_URL".to_string()));
        }
        if self.max_connections == 0 {
            return Err(ConfigError::InvalidValue("DB_MAX_CONNECTIONS".to_string()));
        }
        if self.min_connections > self.max_connections {
            return Err(ConfigError::InvalidValue(
                "DB_MIN_CONNECTIONS must be <= DB_MAX_CONNECTIONS".to_string(),
            ));
        }
        Ok(())
    }
}

impl LoggingConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Ok(LoggingConfig {
            level: env::var("LOG_LEVEL").unwrap_or_else(|_| "INFO".to_string()),
            format: match env::var("LOG_FORMAT")
                .unwrap_or_else(|_| "plain".to_string())
                .as_str()
            {
                "json" => LogFormat::Json,
                _ => LogFormat::Plain,
            },
        })
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let valid_levels = ["TRACE", "DEBUG", "INFO", "WARN", "ERROR"];
        if !valid_levels.contains(&self.level.to_uppercase().as_str()) {
            return Err(ConfigError::InvalidValue("LOG_LEVEL".to_string()));
        }
        Ok(())
    }
}

impl PlatformConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        let ctx_mode = match env::var("PAYZEN_CTX_MODE")
            .unwrap_or_else(|_| "TEST".to_string())
            .as_str()
        {
            "TEST" => CtxMode::Test,
            "PRODUCTION" => CtxMode::Production,
            _ => return Err(ConfigError::InvalidValue("PAYZEN_CTX_MODE".to_string())),
        };

        let sign_algorithm = match env::var("PAYZEN_SIGN_ALGO")
            .unwrap_or_else(|_| "HMAC-SHA-256".to_string())
            .as_str()
        {
            "SHA-1" => SignAlgorithm::Sha1,
            "HMAC-SHA-256" => SignAlgorithm::HmacSha256,
            _ => return Err(ConfigError::InvalidValue("PAYZEN_SIGN_ALGO".to_string())),
        };

        let return_mode = match env::var("PAYZEN_RETURN_MODE")
            .unwrap_or_else(|_| "GET".to_string())
            .as_str()
        {
            "GET" => ReturnMode::Get,
            "POST" => ReturnMode::Post,
            _ => return Err(ConfigError::InvalidValue("PAYZEN_RETURN_MODE".to_string())),
        };

        Ok(PlatformConfig {
            site_id: env::var("PAYZEN_SITE_ID")
                .map_err(|_| ConfigError::MissingVariable("PAYZEN_SITE_ID".to_string()))?,
            key_test: env::var("PAYZEN_KEY_TEST").unwrap_or_default(),
            key_production: env::var("PAYZEN_KEY_PRODUCTION").unwrap_or_default(),
            ctx_mode,
            sign_algorithm,
            platform_url: env::var("PAYZEN_PLATFORM_URL")
                .unwrap_or_else(|_| "https://secure.payzen.eu/vads-payment/".to_string()),
            capture_delay: env::var("PAYZEN_CAPTURE_DELAY")
                .unwrap_or_else(|_| "0".to_string())
                .parse()
                .map_err(|_| ConfigError::InvalidValue("PAYZEN_CAPTURE_DELAY".to_string()))?,
            validation_mode: env::var("PAYZEN_VALIDATION_MODE")
                .unwrap_or_else(|_| "0".to_string()),
            payment_cards: env::var("PAYZEN_PAYMENT_CARDS")
                .unwrap_or_default()
                .split(';')
                .filter(|s| !s.is_empty())
                .map(|s| s.trim().to_string())
                .collect(),
            return_mode,
            language: env::var("PAYZEN_LANGUAGE").unwrap_or_else(|_| "fr".to_string()),
            url_return: env::var("PAYZEN_URL_RETURN")
                .map_err(|_| ConfigError::MissingVariable("PAYZEN_URL_RETURN".to_string()))?,
            url_success: env::var("SHOP_URL_SUCCESS")
                .unwrap_or_else(|_| "/order-received".to_string()),
            url_checkout: env::var("SHOP_URL_CHECKOUT").unwrap_or_else(|_| "/checkout".to_string()),
            url_cart: env::var("SHOP_URL_CART").unwrap_or_else(|_| "/cart".to_string()),
            session_ttl_secs: env::var("CHECKOUT_SESSION_TTL")
                .unwrap_or_else(|_| "900".to_string())
                .parse()
                .map_err(|_| ConfigError::InvalidValue("CHECKOUT_SESSION_TTL".to_string()))?,
        })
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.site_id.len() != 8 || !self.site_id.chars().all(|c| c.is_ascii_digit()) {
            return Err(ConfigError::InvalidValue(
                "PAYZEN_SITE_ID must be 8 digits".to_string(),
            ));
        }
        match self.ctx_mode {
            CtxMode::Test if self.key_test.is_empty() => {
                return Err(ConfigError::MissingVariable("PAYZEN_KEY_TEST".to_string()));
            }
            CtxMode::Production if self.key_production.is_empty() => {
                return Err(ConfigError::MissingVariable(
                    "PAYZEN_KEY_PRODUCTION".to_string(),
                ));
            }
            _ => {}
        }
        if !self.platform_url.starts_with("https://") {
            return Err(ConfigError::InvalidValue(
                "PAYZEN_PLATFORM_URL must be https".to_string(),
            ));
        }
        if self.capture_delay > 365 {
            return Err(ConfigError::InvalidValue(
                "PAYZEN_CAPTURE_DELAY must be <= 365".to_string(),
            ));
        }
        if !matches!(self.validation_mode.as_str(), "" | "0" | "1") {
            return Err(ConfigError::InvalidValue(
                "PAYZEN_VALIDATION_MODE must be '', '0' or '1'".to_string(),
            ));
        }
        if self.language.len() != 2 {
            return Err(ConfigError::InvalidValue(
                "PAYZEN_LANGUAGE must be a 2-letter code".to_string(),
            ));
        }
        if self.session_ttl_secs == 0 {
            return Err(ConfigError::InvalidValue(
                "CHECKOUT_SESSION_TTL cannot be 0".to_string(),
            ));
        }
        Ok(())
    }
}

/// Configuration error types
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing environment variable: {0}")]
    MissingVariable(String),

    #[error("Invalid value for configuration: {0}")]
    InvalidValue(String),
}
