//! Bearer token verification.
//!
//! A token proves identity only. The embedded `role` and `email` claims are
//! informational; authorization always uses the principal re-resolved from the
//! store.

use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use jsonwebtoken::errors::ErrorKind as JwtErrorKind;
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};

use super::{AuthError, Principal, PrincipalId, Role};
use crate::config::AuthConfig;

const BEARER_PREFIX: &str = "Bearer ";

/// Claims carried by a bearer token.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Claims {
    /// Principal id.
    pub sub: String,
    pub email: String,
    pub role: Role,
    pub iat: u64,
    pub exp: u64,
    pub iss: String,
    pub aud: String,
}

/// Verifies HS256 bearer tokens against a single shared secret.
#[derive(Clone)]
pub struct TokenVerifier {
    issuer: Arc<str>,
    audience: Arc<str>,
    ttl: Duration,
    encoding_key: Arc<EncodingKey>,
    decoding_key: Arc<DecodingKey>,
    validation: Arc<Validation>,
}

impl TokenVerifier {
    pub fn new(config: &AuthConfig) -> Self {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.leeway = 0;
        validation.set_issuer(&[&config.issuer]);
        validation.set_audience(&[&config.audience]);
        validation.set_required_spec_claims(&["exp", "sub", "iss", "aud"]);

        Self {
            issuer: Arc::from(config.issuer.as_str()),
            audience: Arc::from(config.audience.as_str()),
            ttl: Duration::from_secs(config.token_ttl_secs),
            encoding_key: Arc::new(EncodingKey::from_secret(config.jwt_secret.as_bytes())),
            decoding_key: Arc::new(DecodingKey::from_secret(config.jwt_secret.as_bytes())),
            validation: Arc::new(validation),
        }
    }

    /// Validate an `Authorization` header value and return the principal id it names.
    pub fn verify(&self, header: Option<&str>) -> Result<PrincipalId, AuthError> {
        let token = bearer_token(header).ok_or(AuthError::NoToken)?;
        let claims = self.decode(token)?;
        Ok(PrincipalId::new(claims.sub))
    }

    /// Decode and validate a raw token.
    pub fn decode(&self, token: &str) -> Result<Claims, AuthError> {
        decode::<Claims>(token, &self.decoding_key, &self.validation)
            .map(|data| data.claims)
            .map_err(|e| match e.kind() {
                JwtErrorKind::ExpiredSignature => AuthError::TokenExpired,
                other => {
                    tracing::debug!(reason = ?other, "Rejected bearer token");
                    AuthError::InvalidToken
                }
            })
    }

    /// Sign a token for `principal` valid for the configured lifetime.
    pub fn issue(&self, principal: &Principal) -> Result<String, AuthError> {
        let now = unix_now();
        self.issue_until(principal, now + self.ttl.as_secs())
    }

    /// Sign a token for `principal` expiring at `exp` (unix seconds).
    pub fn issue_until(&self, principal: &Principal, exp: u64) -> Result<String, AuthError> {
        let claims = Claims {
            sub: principal.id.to_string(),
            email: principal.email.clone(),
            role: principal.role,
            iat: unix_now(),
            exp,
            iss: self.issuer.to_string(),
            aud: self.audience.to_string(),
        };
        self.sign(&claims)
    }

    /// Sign arbitrary claims with the shared secret.
    pub fn sign(&self, claims: &Claims) -> Result<String, AuthError> {
        encode(&Header::new(Algorithm::HS256), claims, &self.encoding_key)
            .map_err(|e| AuthError::Signing(e.to_string()))
    }
}

impl std::fmt::Debug for TokenVerifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenVerifier")
            .field("issuer", &self.issuer)
            .field("audience", &self.audience)
            .field("ttl", &self.ttl)
            .finish()
    }
}

/// Extract the token from a `Bearer <token>` header value.
pub fn bearer_token(header: Option<&str>) -> Option<&str> {
    header?
        .strip_prefix(BEARER_PREFIX)
        .map(str::trim)
        .filter(|token| !token.is_empty())
}

pub(crate) fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> AuthConfig {
        AuthConfig {
            jwt_secret: "test-secret-key-that-is-long-enough-for-testing".into(),
            ..AuthConfig::default()
        }
    }

    fn viewer() -> Principal {
        Principal::new("42", "viewer@example.com", Role::Viewer)
    }

    #[test]
    fn verifies_issued_token() {
        let verifier = TokenVerifier::new(&config());
        let token = verifier.issue(&viewer()).unwrap();
        let header = format!("Bearer {token}");
        assert_eq!(verifier.verify(Some(&header)).unwrap(), PrincipalId::from("42"));
    }

    #[test]
    fn missing_or_foreign_scheme_is_no_token() {
        let verifier = TokenVerifier::new(&config());
        assert!(matches!(verifier.verify(None), Err(AuthError::NoToken)));
        assert!(matches!(verifier.verify(Some("Basic abc")), Err(AuthError::NoToken)));
        assert!(matches!(verifier.verify(Some("Bearer   ")), Err(AuthError::NoToken)));
    }

    #[test]
    fn expired_one_second_ago_is_rejected() {
        let verifier = TokenVerifier::new(&config());
        let token = verifier.issue_until(&viewer(), unix_now() - 1).unwrap();
        let header = format!("Bearer {token}");
        assert!(matches!(verifier.verify(Some(&header)), Err(AuthError::TokenExpired)));
    }

    #[test]
    fn foreign_secret_issuer_or_audience_is_invalid() {
        let verifier = TokenVerifier::new(&config());

        let other_secret = TokenVerifier::new(&AuthConfig {
            jwt_secret: "another-secret-key-that-is-long-enough-too".into(),
            ..AuthConfig::default()
        });
        let other_issuer = TokenVerifier::new(&AuthConfig {
            issuer: "someone-else".into(),
            ..config()
        });
        let other_audience = TokenVerifier::new(&AuthConfig {
            audience: "another-api".into(),
            ..config()
        });

        for foreign in [other_secret, other_issuer, other_audience] {
            let token = foreign.issue(&viewer()).unwrap();
            assert!(matches!(verifier.decode(&token), Err(AuthError::InvalidToken)));
        }
        assert!(matches!(verifier.decode("not.a.jwt"), Err(AuthError::InvalidToken)));
    }

    #[test]
    fn role_claim_is_carried_but_only_id_is_returned() {
        let verifier = TokenVerifier::new(&config());
        let forged = Principal::new("42", "viewer@example.com", Role::Admin);
        let token = verifier.issue(&forged).unwrap();
        assert_eq!(verifier.decode(&token).unwrap().role, Role::Admin);
        assert_eq!(
            verifier.verify(Some(&format!("Bearer {token}"))).unwrap(),
            PrincipalId::from("42")
        );
    }
}
