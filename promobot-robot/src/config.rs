//! Configuration resolution for promobot-robot
//!
//! Layering: CLI → ENV → TOML → defaults. The `[robot]` section is parsed
//! into typed [`RobotConfig`], which the API can later replace at runtime.

use promobot_common::config::{RobotSettings, TomlConfig};
use promobot_common::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::info;

use crate::models::{Category, CommissionQuality, Platform};
use crate::services::RetryPolicy;

/// Command-line overrides applied on top of ENV and TOML
#[derive(Debug, Clone, Default)]
pub struct CliOverrides {
    pub port: Option<u16>,
    pub database: Option<PathBuf>,
}

/// Load, layer and validate the service configuration
///
/// Missing gateway credentials refuse startup.
pub fn resolve_config(explicit: Option<&Path>, cli: &CliOverrides) -> Result<TomlConfig> {
    let mut config = TomlConfig::load(explicit)?;
    config.apply_env_overrides();

    if let Some(port) = cli.port {
        config.server.port = port;
    }
    if let Some(path) = &cli.database {
        config.database.path = path.clone();
    }

    config.validate()?;
    RobotConfig::try_from(&config.robot)?;

    info!(
        port = config.server.port,
        database = %config.database.path.display(),
        gateway_instance = %config.gateway.instance,
        "Configuration resolved"
    );
    Ok(config)
}

/// Runtime robot settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RobotConfig {
    pub categories: Vec<Category>,
    pub platforms: Vec<Platform>,
    pub quality_allow_list: Vec<CommissionQuality>,
    pub products_per_fetch: usize,
    pub max_products_per_run: usize,
    pub send_delay_ms: u64,
    /// Total attempts per message, first one included
    pub max_send_attempts: u32,
    pub retry_base_delay_ms: u64,
}

impl RobotConfig {
    pub fn validate(&self) -> std::result::Result<(), String> {
        if self.categories.is_empty() {
            return Err("categories must not be empty".to_string());
        }
        if self.platforms.is_empty() {
            return Err("platforms must not be empty".to_string());
        }
        if self.quality_allow_list.is_empty() {
            return Err("qualityAllowList must not be empty".to_string());
        }
        if self.products_per_fetch == 0 {
            return Err("productsPerFetch must be at least 1".to_string());
        }
        if self.max_send_attempts == 0 {
            return Err("maxSendAttempts must be at least 1".to_string());
        }
        Ok(())
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.max_send_attempts,
            base_delay: Duration::from_millis(self.retry_base_delay_ms),
        }
    }

    pub fn send_delay(&self) -> Duration {
        Duration::from_millis(self.send_delay_ms)
    }
}

impl Default for RobotConfig {
    fn default() -> Self {
        // Defaults of the settings struct always parse
        RobotConfig::try_from(&RobotSettings::default()).unwrap_or(RobotConfig {
            categories: vec![Category::Electronics],
            platforms: vec![Platform::MercadoLivre],
            quality_allow_list: vec![CommissionQuality::Excellent, CommissionQuality::Good],
            products_per_fetch: 20,
            max_products_per_run: 10,
            send_delay_ms: 5000,
            max_send_attempts: 3,
            retry_base_delay_ms: 2000,
        })
    }
}

fn parse_names<T>(names: &[String]) -> Result<Vec<T>>
where
    T: std::str::FromStr<Err = crate::models::UnknownVariant> + PartialEq,
{
    let mut parsed = Vec::with_capacity(names.len());
    for name in names {
        let value: T = name.parse().map_err(|e| Error::Config(format!("[robot] {}", e)))?;
        if !parsed.contains(&value) {
            parsed.push(value);
        }
    }
    Ok(parsed)
}

impl TryFrom<&RobotSettings> for RobotConfig {
    type Error = Error;

    fn try_from(settings: &RobotSettings) -> Result<Self> {
        let config = RobotConfig {
            categories: parse_names(&settings.categories)?,
            platforms: parse_names(&settings.platforms)?,
            quality_allow_list: parse_names(&settings.quality_allow_list)?,
            products_per_fetch: settings.products_per_fetch,
            max_products_per_run: settings.max_products_per_run,
            send_delay_ms: settings.send_delay_ms,
            max_send_attempts: settings.max_send_attempts,
            retry_base_delay_ms: settings.retry_base_delay_ms,
        };
        config.validate().map_err(|e| Error::Config(format!("[robot] {}", e)))?;
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_settings_parse() {
        let config = RobotConfig::try_from(&RobotSettings::default()).unwrap();
        assert_eq!(config.categories, vec![Category::Electronics, Category::Home]);
        assert_eq!(config.platforms, vec![Platform::MercadoLivre, Platform::Amazon]);
        assert_eq!(
            config.quality_allow_list,
            vec![CommissionQuality::Excellent, CommissionQuality::Good]
        );
        assert_eq!(config.retry_policy().max_attempts, 3);
        assert_eq!(config.retry_policy().base_delay, Duration::from_secs(2));
    }

    #[test]
    fn test_unknown_platform_rejected() {
        let settings = RobotSettings {
            platforms: vec!["ebay".to_string()],
            ..Default::default()
        };
        let err = RobotConfig::try_from(&settings).unwrap_err();
        assert!(err.to_string().contains("ebay"));
    }

    #[test]
    fn test_duplicates_collapsed() {
        let settings = RobotSettings {
            categories: vec!["home".to_string(), "HOME".to_string()],
            ..Default::default()
        };
        assert_eq!(RobotConfig::try_from(&settings).unwrap().categories, vec![Category::Home]);
    }

    #[test]
    fn test_empty_allow_list_rejected() {
        let settings = RobotSettings {
            quality_allow_list: Vec::new(),
            ..Default::default()
        };
        assert!(RobotConfig::try_from(&settings).is_err());
    }

    #[test]
    fn test_missing_gateway_refuses_start() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("promobot.toml");
        std::fs::write(&path, "[server]\nport = 6000\n").unwrap();
        let err = resolve_config(Some(&path), &CliOverrides::default()).unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }
}
