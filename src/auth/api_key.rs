//! Service API keys (`X-API-Key`).
//!
//! Keys are configured as SHA-256 digests. A presented key is hashed and
//! compared against every configured digest in constant time.

use sha2::{Digest, Sha256};
use subtle::ConstantTimeEq;

use super::{AuthError, Principal, Role};
use crate::config::ApiKeyConfig;

#[derive(Debug, Clone)]
struct ServiceKey {
    name: String,
    digest: [u8; 32],
}

/// Authenticates service callers as fixed `api` principals.
#[derive(Debug, Clone, Default)]
pub struct ApiKeyAuthenticator {
    keys: Vec<ServiceKey>,
}

impl ApiKeyAuthenticator {
    pub fn new(configured: &[ApiKeyConfig]) -> Self {
        let keys = configured
            .iter()
            .filter_map(|entry| {
                let mut digest = [0u8; 32];
                match hex::decode_to_slice(&entry.key_sha256, &mut digest) {
                    Ok(()) => Some(ServiceKey {
                        name: entry.name.clone(),
                        digest,
                    }),
                    Err(e) => {
                        tracing::warn!(service = %entry.name, error = %e, "Ignoring malformed API key digest");
                        None
                    }
                }
            })
            .collect();
        Self { keys }
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    /// Resolve a presented key to its service principal.
    pub fn authenticate(&self, presented: &str) -> Result<Principal, AuthError> {
        let digest: [u8; 32] = Sha256::digest(presented.as_bytes()).into();

        let mut matched = None;
        for key in &self.keys {
            if bool::from(key.digest.ct_eq(&digest)) {
                matched = Some(key);
            }
        }

        matched
            .map(|key| service_principal(&key.name))
            .ok_or(AuthError::InvalidApiKey)
    }
}

/// The fixed principal a service key authenticates as.
pub fn service_principal(name: &str) -> Principal {
    Principal::new(format!("service:{name}"), format!("{name}@service.local"), Role::Api)
}

/// Lowercase hex SHA-256 of a key, as stored in config.
pub fn hash_key(key: &str) -> String {
    hex::encode(Sha256::digest(key.as_bytes()))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn authenticator() -> ApiKeyAuthenticator {
        ApiKeyAuthenticator::new(&[
            ApiKeyConfig {
                name: "importer".into(),
                key_sha256: hash_key("imp_0123456789"),
            },
            ApiKeyConfig {
                name: "broken".into(),
                key_sha256: "zz".into(),
            },
        ])
    }

    #[test]
    fn known_key_maps_to_api_principal() {
        let principal = authenticator().authenticate("imp_0123456789").unwrap();
        assert_eq!(principal.id.as_str(), "service:importer");
        assert_eq!(principal.role, Role::Api);
        assert!(principal.is_active);
    }

    #[test]
    fn unknown_key_is_rejected() {
        assert!(matches!(
            authenticator().authenticate("imp_wrong"),
            Err(AuthError::InvalidApiKey)
        ));
    }

    #[test]
    fn malformed_digests_are_skipped() {
        assert_eq!(authenticator().keys.len(), 1);
    }

    #[test]
    fn hash_is_lowercase_hex() {
        let digest = hash_key("abc");
        assert_eq!(digest.len(), 64);
        assert_eq!(
            digest,
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }
}
