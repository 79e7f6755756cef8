//! Configuration loading
//!
//! Resolution order (highest priority first):
//! 1. Command-line arguments (applied by the binary)
//! 2. Environment variables (`PROMOBOT_*`)
//! 3. TOML config file
//! 4. Built-in defaults

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// Environment variable naming an explicit config file
pub const CONFIG_PATH_ENV: &str = "PROMOBOT_CONFIG";

/// Complete configuration file layout
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct TomlConfig {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub logging: LoggingConfig,
    pub gateway: GatewayConfig,
    pub affiliate: AffiliateConfig,
    pub quality: QualityConfig,
    pub fetcher: FetcherConfig,
    pub robot: RobotSettings,
}

/// HTTP listener settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 5780,
        }
    }
}

/// SQLite database location
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    pub path: PathBuf,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: default_data_dir().join("promobot.db"),
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

/// Messaging gateway (Evolution API) connection
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GatewayConfig {
    pub base_url: Option<String>,
    pub api_key: Option<String>,
    pub instance: String,
    pub timeout_secs: u64,
    /// Outbound message pacing enforced by the client
    pub messages_per_minute: u32,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            base_url: None,
            api_key: None,
            instance: "promobot".to_string(),
            timeout_secs: 30,
            messages_per_minute: 20,
        }
    }
}

/// Per-platform affiliate tracking identifiers
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AffiliateConfig {
    pub amazon_tag: Option<String>,
    pub mercadolivre_id: Option<String>,
    pub shopee_id: Option<String>,
    pub aliexpress_id: Option<String>,
    pub magalu_id: Option<String>,
}

/// Quality gate thresholds applied while enriching listings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct QualityConfig {
    pub min_price: f64,
    pub min_commission: f64,
    pub min_title_length: usize,
}

impl Default for QualityConfig {
    fn default() -> Self {
        Self {
            min_price: 10.0,
            min_commission: 2.0,
            min_title_length: 10,
        }
    }
}

/// Source fetcher politeness and endpoints
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FetcherConfig {
    pub min_interval_ms: u64,
    pub max_requests_per_minute: usize,
    pub cooldown_secs: u64,
    pub timeout_secs: u64,
    pub user_agent: String,
    pub mercadolivre_api_url: String,
    pub amazon_url: String,
}

impl Default for FetcherConfig {
    fn default() -> Self {
        Self {
            min_interval_ms: 1500,
            max_requests_per_minute: 30,
            cooldown_secs: 60,
            timeout_secs: 20,
            user_agent: "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0 Safari/537.36".to_string(),
            mercadolivre_api_url: "https://api.mercadolibre.com".to_string(),
            amazon_url: "https://www.amazon.com.br".to_string(),
        }
    }
}

/// Robot run settings as written in the config file
///
/// Category, platform and quality names are validated by the service crate.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RobotSettings {
    pub categories: Vec<String>,
    pub platforms: Vec<String>,
    pub quality_allow_list: Vec<String>,
    pub products_per_fetch: usize,
    pub max_products_per_run: usize,
    pub send_delay_ms: u64,
    pub max_send_attempts: u32,
    pub retry_base_delay_ms: u64,
    pub stop_grace_ms: u64,
    pub history_capacity: usize,
}

impl Default for RobotSettings {
    fn default() -> Self {
        Self {
            categories: vec!["electronics".to_string(), "home".to_string()],
            platforms: vec!["mercadolivre".to_string(), "amazon".to_string()],
            quality_allow_list: vec!["excellent".to_string(), "good".to_string()],
            products_per_fetch: 20,
            max_products_per_run: 10,
            send_delay_ms: 5000,
            max_send_attempts: 3,
            retry_base_delay_ms: 2000,
            stop_grace_ms: 1000,
            history_capacity: 50,
        }
    }
}

impl TomlConfig {
    /// Load configuration from an explicit path, the default location, or defaults
    ///
    /// An explicit path that cannot be read or parsed is an error. A missing
    /// default file is not: built-in defaults are used with a warning.
    pub fn load(explicit: Option<&Path>) -> Result<Self> {
        if let Some(path) = explicit {
            return Self::from_file(path);
        }

        match default_config_path() {
            Some(path) if path.exists() => Self::from_file(&path),
            _ => {
                warn!("No config file found, using built-in defaults");
                Ok(Self::default())
            }
        }
    }

    /// Parse a TOML config file
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("Read {} failed: {}", path.display(), e)))?;
        let config: TomlConfig = toml::from_str(&content)
            .map_err(|e| Error::Config(format!("Parse {} failed: {}", path.display(), e)))?;
        info!("Loaded config from {}", path.display());
        Ok(config)
    }

    /// Apply `PROMOBOT_*` environment variable overrides
    pub fn apply_env_overrides(&mut self) {
        self.apply_overrides_from(|key| std::env::var(key).ok());
    }

    /// Apply overrides from an arbitrary key lookup
    pub fn apply_overrides_from<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let non_empty = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(path) = non_empty("PROMOBOT_DATABASE") {
            self.database.path = PathBuf::from(path);
        }
        if let Some(port) = non_empty("PROMOBOT_PORT") {
            match port.parse() {
                Ok(port) => self.server.port = port,
                Err(_) => warn!("Ignoring invalid PROMOBOT_PORT value '{}'", port),
            }
        }
        if let Some(url) = non_empty("PROMOBOT_GATEWAY_URL") {
            self.gateway.base_url = Some(url);
        }
        if let Some(key) = non_empty("PROMOBOT_GATEWAY_API_KEY") {
            self.gateway.api_key = Some(key);
        }
        if let Some(instance) = non_empty("PROMOBOT_GATEWAY_INSTANCE") {
            self.gateway.instance = instance;
        }
        if let Some(tag) = non_empty("PROMOBOT_AMAZON_TAG") {
            self.affiliate.amazon_tag = Some(tag);
        }
        if let Some(id) = non_empty("PROMOBOT_MERCADOLIVRE_ID") {
            self.affiliate.mercadolivre_id = Some(id);
        }
    }

    /// Reject configurations the service cannot start with
    pub fn validate(&self) -> Result<()> {
        let base_url = self.gateway.base_url.as_deref().unwrap_or("").trim();
        if base_url.is_empty() {
            return Err(Error::Config(
                "Messaging gateway URL not configured. Set [gateway] base_url or PROMOBOT_GATEWAY_URL".to_string(),
            ));
        }
        if !(base_url.starts_with("http://") || base_url.starts_with("https://")) {
            return Err(Error::Config(format!(
                "Messaging gateway URL must be http(s): {}",
                base_url
            )));
        }
        if self.gateway.api_key.as_deref().unwrap_or("").trim().is_empty() {
            return Err(Error::Config(
                "Messaging gateway API key not configured. Set [gateway] api_key or PROMOBOT_GATEWAY_API_KEY".to_string(),
            ));
        }
        if self.gateway.instance.trim().is_empty() {
            return Err(Error::Config("Gateway instance name is empty".to_string()));
        }
        if self.quality.min_price < 0.0 || self.quality.min_commission < 0.0 {
            return Err(Error::Config("Quality thresholds must be non-negative".to_string()));
        }
        if self.fetcher.max_requests_per_minute == 0 {
            return Err(Error::Config("fetcher.max_requests_per_minute must be at least 1".to_string()));
        }
        if self.robot.max_send_attempts == 0 {
            return Err(Error::Config("robot.max_send_attempts must be at least 1".to_string()));
        }
        if self.robot.history_capacity == 0 {
            return Err(Error::Config("robot.history_capacity must be at least 1".to_string()));
        }
        Ok(())
    }
}

/// Default config file: `<user config dir>/promobot/promobot.toml`
pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join("promobot").join("promobot.toml"))
}

/// OS-dependent data directory used for the default database location
fn default_data_dir() -> PathBuf {
    dirs::data_local_dir()
        .map(|d| d.join("promobot"))
        .unwrap_or_else(|| PathBuf::from("./promobot_data"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn configured() -> TomlConfig {
        let mut config = TomlConfig::default();
        config.gateway.base_url = Some("http://localhost:8080".to_string());
        config.gateway.api_key = Some("secret".to_string());
        config
    }

    #[test]
    fn test_defaults_match_documented_thresholds() {
        let config = TomlConfig::default();
        assert_eq!(config.quality.min_price, 10.0);
        assert_eq!(config.quality.min_commission, 2.0);
        assert_eq!(config.fetcher.min_interval_ms, 1500);
        assert_eq!(config.robot.max_send_attempts, 3);
        assert_eq!(config.robot.history_capacity, 50);
    }

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let config: TomlConfig = toml::from_str(
            r#"
            [server]
            port = 9000

            [quality]
            min_price = 25.0
            "#,
        )
        .unwrap();

        assert_eq!(config.server.port, 9000);
        assert_eq!(config.server.host, "127.0.0.1");
        assert_eq!(config.quality.min_price, 25.0);
        assert_eq!(config.quality.min_commission, 2.0);
    }

    #[test]
    fn test_missing_gateway_is_fatal() {
        let err = TomlConfig::default().validate().unwrap_err();
        assert!(matches!(err, Error::Config(_)));

        let mut config = configured();
        config.gateway.api_key = Some("  ".to_string());
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_valid_config_passes() {
        assert!(configured().validate().is_ok());
    }

    #[test]
    fn test_non_http_gateway_rejected() {
        let mut config = configured();
        config.gateway.base_url = Some("ftp://gateway".to_string());
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_overrides_from_lookup() {
        let vars: HashMap<&str, &str> = [
            ("PROMOBOT_PORT", "6001"),
            ("PROMOBOT_GATEWAY_URL", "http://gw:8080"),
            ("PROMOBOT_AMAZON_TAG", "promo-20"),
            ("PROMOBOT_GATEWAY_API_KEY", ""),
        ]
        .into_iter()
        .collect();

        let mut config = TomlConfig::default();
        config.apply_overrides_from(|k| vars.get(k).map(|v| v.to_string()));

        assert_eq!(config.server.port, 6001);
        assert_eq!(config.gateway.base_url.as_deref(), Some("http://gw:8080"));
        assert_eq!(config.affiliate.amazon_tag.as_deref(), Some("promo-20"));
        // Empty values do not override
        assert!(config.gateway.api_key.is_none());
    }

    #[test]
    fn test_invalid_port_override_ignored() {
        let mut config = TomlConfig::default();
        config.apply_overrides_from(|k| (k == "PROMOBOT_PORT").then(|| "not-a-port".to_string()));
        assert_eq!(config.server.port, 5780);
    }
}
