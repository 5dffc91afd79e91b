//! Configuration validation.
//!
//! Semantic checks only (serde handles syntax). All errors are collected,
//! not just the first, and validation runs before the config is accepted.

use std::collections::HashSet;
use std::fmt;
use std::net::SocketAddr;

use crate::auth::Role;
use crate::config::schema::{GateConfig, StoreBackend};
use crate::ratelimit::PolicyName;

/// Minimum HS256 secret length in bytes.
pub const MIN_SECRET_LEN: usize = 32;

/// A single semantic problem in the configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationError {
    pub field: String,
    pub message: String,
}

impl ValidationError {
    fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
        }
    }
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

/// Validate a parsed configuration.
pub fn validate_config(config: &GateConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if config.listener.bind_address.parse::<SocketAddr>().is_err() {
        errors.push(ValidationError::new("listener.bind_address", "not a socket address"));
    }
    if config.listener.max_connections == 0 {
        errors.push(ValidationError::new("listener.max_connections", "must be positive"));
    }
    if config.timeouts.request_secs == 0 {
        errors.push(ValidationError::new("timeouts.request_secs", "must be positive"));
    }
    if config.timeouts.store_ms == 0 {
        errors.push(ValidationError::new("timeouts.store_ms", "must be positive"));
    }
    if config.timeouts.principal_lookup_ms == 0 {
        errors.push(ValidationError::new("timeouts.principal_lookup_ms", "must be positive"));
    }

    validate_auth(config, &mut errors);

    if config.session.ttl_secs == 0 {
        errors.push(ValidationError::new("session.ttl_secs", "must be positive"));
    }
    if config.session.key_prefix.is_empty() {
        errors.push(ValidationError::new("session.key_prefix", "must not be empty"));
    }

    if config.store.backend == StoreBackend::Redis {
        match url::Url::parse(&config.store.redis_url) {
            Ok(url) if matches!(url.scheme(), "redis" | "rediss") => {}
            Ok(url) => errors.push(ValidationError::new(
                "store.redis_url",
                format!("unsupported scheme '{}'", url.scheme()),
            )),
            Err(e) => errors.push(ValidationError::new("store.redis_url", e.to_string())),
        }
    }
    if config.store.sweep_interval_secs == 0 {
        errors.push(ValidationError::new("store.sweep_interval_secs", "must be positive"));
    }

    validate_rate_limits(config, &mut errors);
    validate_permissions(config, &mut errors);

    if config.activity.channel_capacity == 0 {
        errors.push(ValidationError::new("activity.channel_capacity", "must be positive"));
    }
    if config.observability.metrics_enabled
        && config.observability.metrics_address.parse::<SocketAddr>().is_err()
    {
        errors.push(ValidationError::new("observability.metrics_address", "not a socket address"));
    }
    if config.security.max_body_size == 0 {
        errors.push(ValidationError::new("security.max_body_size", "must be positive"));
    }

    let mut seen = HashSet::new();
    for (i, principal) in config.principals.iter().enumerate() {
        if principal.id.is_empty() {
            errors.push(ValidationError::new(format!("principals[{i}].id"), "must not be empty"));
        } else if !seen.insert(principal.id.as_str()) {
            errors.push(ValidationError::new(
                format!("principals[{i}].id"),
                format!("duplicate id '{}'", principal.id),
            ));
        }
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

fn validate_auth(config: &GateConfig, errors: &mut Vec<ValidationError>) {
    let auth = &config.auth;
    if auth.jwt_secret.len() < MIN_SECRET_LEN {
        errors.push(ValidationError::new(
            "auth.jwt_secret",
            format!("must be at least {MIN_SECRET_LEN} bytes"),
        ));
    }
    if auth.issuer.is_empty() {
        errors.push(ValidationError::new("auth.issuer", "must not be empty"));
    }
    if auth.audience.is_empty() {
        errors.push(ValidationError::new("auth.audience", "must not be empty"));
    }
    if auth.token_ttl_secs == 0 {
        errors.push(ValidationError::new("auth.token_ttl_secs", "must be positive"));
    }
    for (i, key) in auth.api_keys.iter().enumerate() {
        if key.name.is_empty() {
            errors.push(ValidationError::new(format!("auth.api_keys[{i}].name"), "must not be empty"));
        }
        let digest_ok = key.key_sha256.len() == 64
            && key.key_sha256.chars().all(|c| c.is_ascii_hexdigit() && !c.is_ascii_uppercase());
        if !digest_ok {
            errors.push(ValidationError::new(
                format!("auth.api_keys[{i}].key_sha256"),
                "must be 64 lowercase hex characters",
            ));
        }
    }
}

fn validate_rate_limits(config: &GateConfig, errors: &mut Vec<ValidationError>) {
    let limits = &config.rate_limit;
    if limits.key_prefix.is_empty() {
        errors.push(ValidationError::new("rate_limit.key_prefix", "must not be empty"));
    }
    for (name, policy) in &limits.policies {
        let field = format!("rate_limit.policies.{name}");
        if name.parse::<PolicyName>().is_err() {
            errors.push(ValidationError::new(field, "unknown policy"));
            continue;
        }
        if policy.window_secs == Some(0) {
            errors.push(ValidationError::new(format!("{field}.window_secs"), "must be positive"));
        }
        if policy.max == Some(0) {
            errors.push(ValidationError::new(format!("{field}.max"), "must be positive"));
        }
    }
    let adaptive = &limits.adaptive;
    for (tier, value) in [
        ("anonymous", adaptive.anonymous),
        ("viewer", adaptive.viewer),
        ("editor", adaptive.editor),
        ("admin", adaptive.admin),
        ("api", adaptive.api),
    ] {
        if value == 0 {
            errors.push(ValidationError::new(format!("rate_limit.adaptive.{tier}"), "must be positive"));
        }
    }
}

fn validate_permissions(config: &GateConfig, errors: &mut Vec<ValidationError>) {
    for (role, actions) in &config.authz.permissions {
        let field = format!("authz.permissions.{role}");
        match role.parse::<Role>() {
            Ok(Role::Admin) => {
                errors.push(ValidationError::new(field, "admin is implicitly allowed everything"));
                continue;
            }
            Ok(_) => {}
            Err(_) => {
                errors.push(ValidationError::new(field, "unknown role"));
                continue;
            }
        }
        for action in actions {
            let well_formed = action
                .split_once(':')
                .is_some_and(|(verb, object)| !verb.is_empty() && !object.is_empty());
            if !well_formed {
                errors.push(ValidationError::new(
                    field.clone(),
                    format!("action '{action}' is not of the form verb:object"),
                ));
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::schema::{ApiKeyConfig, PolicyOverride, SeedPrincipal};

    fn valid() -> GateConfig {
        let mut config = GateConfig::default();
        config.auth.jwt_secret = "x".repeat(MIN_SECRET_LEN);
        config
    }

    #[test]
    fn defaults_with_secret_are_valid() {
        assert_eq!(validate_config(&valid()), Ok(()));
    }

    #[test]
    fn rejects_unknown_policy_and_zero_limits() {
        let mut config = valid();
        config.rate_limit.policies.insert("bogus".into(), PolicyOverride::default());
        config.rate_limit.policies.insert(
            "search".into(),
            PolicyOverride {
                window_secs: Some(0),
                max: Some(0),
                message: None,
            },
        );
        let errors = validate_config(&config).unwrap_err();
        let fields: Vec<_> = errors.iter().map(|e| e.field.as_str()).collect();
        assert!(fields.contains(&"rate_limit.policies.bogus"));
        assert!(fields.contains(&"rate_limit.policies.search.window_secs"));
        assert!(fields.contains(&"rate_limit.policies.search.max"));
    }

    #[test]
    fn rejects_bad_redis_url_and_key_digest() {
        let mut config = valid();
        config.store.backend = StoreBackend::Redis;
        config.store.redis_url = "http://cache".into();
        config.auth.api_keys.push(ApiKeyConfig {
            name: "importer".into(),
            key_sha256: "ABC".into(),
        });
        let errors = validate_config(&config).unwrap_err();
        assert!(errors.iter().any(|e| e.field == "store.redis_url"));
        assert!(errors.iter().any(|e| e.field == "auth.api_keys[0].key_sha256"));
    }

    #[test]
    fn rejects_admin_permission_override_and_duplicate_principals() {
        let mut config = valid();
        config.authz.permissions.insert("admin".into(), vec!["read:products".into()]);
        config.authz.permissions.insert("viewer".into(), vec!["products".into()]);
        for _ in 0..2 {
            config.principals.push(SeedPrincipal {
                id: "7".into(),
                email: "a@example.com".into(),
                role: Role::Viewer,
                active: true,
            });
        }
        let errors = validate_config(&config).unwrap_err();
        assert!(errors.iter().any(|e| e.field == "authz.permissions.admin"));
        assert!(errors.iter().any(|e| e.message.contains("verb:object")));
        assert!(errors.iter().any(|e| e.field == "principals[1].id"));
    }
}
