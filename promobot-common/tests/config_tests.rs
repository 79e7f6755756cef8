//! Integration tests for configuration file loading and environment overrides
//!
//! Tests that manipulate PROMOBOT_* variables are marked #[serial] so they do
//! not race each other.

use promobot_common::config::TomlConfig;
use promobot_common::Error;
use serial_test::serial;
use std::env;
use std::io::Write;

fn write_config(content: &str) -> tempfile::NamedTempFile {
    let mut file = tempfile::NamedTempFile::new().expect("temp file");
    file.write_all(content.as_bytes()).expect("write config");
    file
}

#[test]
fn test_load_explicit_file() {
    let file = write_config(
        r#"
        [server]
        port = 6100

        [gateway]
        base_url = "http://localhost:8080"
        api_key = "abc"
        instance = "loja"

        [affiliate]
        amazon_tag = "promo-20"

        [robot]
        categories = ["electronics", "books"]
        quality_allow_list = ["excellent"]
        "#,
    );

    let config = TomlConfig::load(Some(file.path())).unwrap();
    assert_eq!(config.server.port, 6100);
    assert_eq!(config.gateway.instance, "loja");
    assert_eq!(config.affiliate.amazon_tag.as_deref(), Some("promo-20"));
    assert_eq!(config.robot.categories, vec!["electronics", "books"]);
    assert_eq!(config.robot.quality_allow_list, vec!["excellent"]);
    // Untouched sections keep defaults
    assert_eq!(config.robot.max_send_attempts, 3);
    assert!(config.validate().is_ok());
}

#[test]
fn test_explicit_missing_file_is_error() {
    let result = TomlConfig::load(Some(std::path::Path::new("/nonexistent/promobot.toml")));
    assert!(matches!(result, Err(Error::Config(_))));
}

#[test]
fn test_malformed_file_is_error() {
    let file = write_config("[server\nport = ");
    assert!(matches!(TomlConfig::from_file(file.path()), Err(Error::Config(_))));
}

#[test]
#[serial]
fn test_env_overrides_file_values() {
    let file = write_config(
        r#"
        [gateway]
        base_url = "http://from-file:8080"
        api_key = "file-key"
        "#,
    );

    env::set_var("PROMOBOT_GATEWAY_URL", "http://from-env:9090");
    env::set_var("PROMOBOT_DATABASE", "/tmp/promobot-env-test.db");

    let mut config = TomlConfig::load(Some(file.path())).unwrap();
    config.apply_env_overrides();

    env::remove_var("PROMOBOT_GATEWAY_URL");
    env::remove_var("PROMOBOT_DATABASE");

    assert_eq!(config.gateway.base_url.as_deref(), Some("http://from-env:9090"));
    assert_eq!(config.gateway.api_key.as_deref(), Some("file-key"));
    assert_eq!(
        config.database.path,
        std::path::PathBuf::from("/tmp/promobot-env-test.db")
    );
}

#[test]
#[serial]
fn test_env_without_overrides_changes_nothing() {
    env::remove_var("PROMOBOT_PORT");
    env::remove_var("PROMOBOT_GATEWAY_URL");

    let mut config = TomlConfig::default();
    config.apply_env_overrides();
    assert_eq!(config.server.port, 5780);
    assert!(config.gateway.base_url.is_none());
}
