//! Configuration loading from disk.

use std::fs;
use std::path::Path;

use thiserror::Error;

use crate::config::schema::GateConfig;
use crate::config::validation::{validate_config, ValidationError};

/// Environment variable overriding `auth.jwt_secret`.
pub const ENV_JWT_SECRET: &str = "GATE_JWT_SECRET";
/// Environment variable overriding `store.redis_url`.
pub const ENV_REDIS_URL: &str = "GATE_REDIS_URL";

/// Error type for configuration loading.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Parse error: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Validation failed: {}", join(.0))]
    Validation(Vec<ValidationError>),
}

fn join(errors: &[ValidationError]) -> String {
    errors
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

/// Load and validate configuration from a TOML file.
pub fn load_config(path: &Path) -> Result<GateConfig, ConfigError> {
    let content = fs::read_to_string(path)?;
    parse_config(&content)
}

/// Parse, apply environment overrides, and validate.
pub fn parse_config(content: &str) -> Result<GateConfig, ConfigError> {
    let mut config: GateConfig = toml::from_str(content)?;
    apply_env_overrides(&mut config, |name| std::env::var(name).ok());
    validate_config(&config).map_err(ConfigError::Validation)?;
    Ok(config)
}

/// Secrets may come from the environment instead of the file.
pub fn apply_env_overrides(config: &mut GateConfig, lookup: impl Fn(&str) -> Option<String>) {
    if let Some(secret) = lookup(ENV_JWT_SECRET).filter(|s| !s.is_empty()) {
        config.auth.jwt_secret = secret;
    }
    if let Some(url) = lookup(ENV_REDIS_URL).filter(|s| !s.is_empty()) {
        config.store.redis_url = url;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn env_overrides_secrets() {
        let mut config = GateConfig::default();
        apply_env_overrides(&mut config, |name| match name {
            ENV_JWT_SECRET => Some("from-env-from-env-from-env-from-env".into()),
            ENV_REDIS_URL => Some("redis://cache:6379/1".into()),
            _ => None,
        });
        assert_eq!(config.auth.jwt_secret, "from-env-from-env-from-env-from-env");
        assert_eq!(config.store.redis_url, "redis://cache:6379/1");
    }

    #[test]
    fn reports_every_validation_error() {
        let err = parse_config(
            r#"
            [auth]
            jwt_secret = "short"

            [session]
            ttl_secs = 0
            "#,
        )
        .unwrap_err();

        match err {
            ConfigError::Validation(errors) => {
                assert!(errors.iter().any(|e| e.field == "auth.jwt_secret"));
                assert!(errors.iter().any(|e| e.field == "session.ttl_secs"));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn syntax_errors_surface_as_parse_errors() {
        assert!(matches!(parse_config("[auth"), Err(ConfigError::Parse(_))));
    }
}
