//! Counter subject derivation.

use std::net::IpAddr;

use super::KeyStrategy;
use crate::auth::Principal;

/// What is known about a request when a policy is evaluated.
#[derive(Debug, Clone, Copy)]
pub struct SubjectSource<'a> {
    pub address: IpAddr,
    pub principal: Option<&'a Principal>,
    pub body: Option<&'a serde_json::Value>,
}

impl<'a> SubjectSource<'a> {
    pub fn anonymous(address: IpAddr) -> Self {
        Self {
            address,
            principal: None,
            body: None,
        }
    }
}

/// Counter subject for `strategy`.
///
/// Strategies that can fall back to the address prefix both forms, so a field
/// value can never share a counter with an address.
pub fn subject_for(strategy: &KeyStrategy, source: &SubjectSource<'_>) -> String {
    match strategy {
        KeyStrategy::ByAddress => source.address.to_string(),
        KeyStrategy::ByIdentity => match source.principal {
            Some(principal) => format!("{}:{}", principal.role, principal.id),
            None => format!("ip:{}", source.address),
        },
        KeyStrategy::ByField { field } => source
            .body
            .and_then(|body| body.get(field))
            .and_then(|value| value.as_str())
            .map(|value| value.trim().to_lowercase())
            .filter(|value| !value.is_empty())
            .map(|value| format!("{field}:{value}"))
            .unwrap_or_else(|| format!("ip:{}", source.address)),
    }
}
