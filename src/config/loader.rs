//! Configuration loading from disk.

use std::fs;
use std::path::Path;
use thiserror::Error;

use crate::config::schema::GatewayConfig;
use crate::config::validation::{validate_config, ValidationError};

/// Error type for configuration loading.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("parse error: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("validation failed: {}", format_errors(.0))]
    Validation(Vec<ValidationError>),
}

fn format_errors(errors: &[ValidationError]) -> String {
    errors
        .iter()
        .map(|e| e.to_string())
        .collect::<Vec<_>>()
        .join(", ")
}

/// Load and validate configuration from a TOML file.
pub fn load_config(path: &Path) -> Result<GatewayConfig, ConfigError> {
    let content = fs::read_to_string(path)?;
    let config: GatewayConfig = toml::from_str(&content)?;

    validate_config(&config).map_err(ConfigError::Validation)?;

    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_minimal_config() {
        let raw = r#"
            [listener]
            bind_address = "127.0.0.1:8080"

            [discovery]
            endpoints = ["http://127.0.0.1:2379"]

            [[routes]]
            name = "users"
            path_prefix = "/users"
            service = "user-service"
            policy = "round-robin"
        "#;
        let config: GatewayConfig = toml::from_str(raw).unwrap();
        assert_eq!(config.routes.len(), 1);
        assert_eq!(config.routes[0].service, "user-service");
        assert!(validate_config(&config).is_ok());
    }

    #[test]
    fn test_defaults_fill_missing_sections() {
        let raw = r#"
            [[routes]]
            name = "all"
            path_prefix = "/"
            service = "web"
        "#;
        let config: GatewayConfig = toml::from_str(raw).unwrap();
        assert_eq!(config.discovery.prefix, "/services");
        assert_eq!(config.discovery.backoff.base_ms, 200);
        assert_eq!(config.discovery.backoff.max_ms, 30_000);
        assert_eq!(config.timeouts.request_secs, 30);
    }
}
