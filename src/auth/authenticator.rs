//! Request authentication: credentials in, live principal out.

use super::{ApiKeyAuthenticator, AuthError, Principal, SessionCache, TokenVerifier};
use crate::observability::metrics;

/// How a principal was authenticated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthMethod {
    Bearer,
    ApiKey,
}

impl AuthMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            AuthMethod::Bearer => "bearer",
            AuthMethod::ApiKey => "api_key",
        }
    }
}

/// A principal resolved for the current request.
#[derive(Debug, Clone)]
pub struct Authenticated {
    pub principal: Principal,
    pub method: AuthMethod,
}

/// Combines token verification, API keys and the session cache.
#[derive(Clone)]
pub struct Authenticator {
    tokens: TokenVerifier,
    api_keys: ApiKeyAuthenticator,
    sessions: SessionCache,
}

impl Authenticator {
    pub fn new(tokens: TokenVerifier, api_keys: ApiKeyAuthenticator, sessions: SessionCache) -> Self {
        Self {
            tokens,
            api_keys,
            sessions,
        }
    }

    pub fn tokens(&self) -> &TokenVerifier {
        &self.tokens
    }

    pub fn sessions(&self) -> &SessionCache {
        &self.sessions
    }

    /// Authenticate from the raw `Authorization` and `X-API-Key` header values.
    ///
    /// A present API key takes the service path; otherwise a bearer token is
    /// required.
    pub async fn authenticate(
        &self,
        authorization: Option<&str>,
        api_key: Option<&str>,
    ) -> Result<Authenticated, AuthError> {
        let result = match api_key {
            Some(key) => self.api_keys.authenticate(key).map(|principal| Authenticated {
                principal,
                method: AuthMethod::ApiKey,
            }),
            None => self.authenticate_bearer(authorization).await,
        };

        if let Err(e) = &result {
            metrics::record_auth_failure(e.kind().as_str());
        }
        result
    }

    async fn authenticate_bearer(&self, authorization: Option<&str>) -> Result<Authenticated, AuthError> {
        let id = self.tokens.verify(authorization)?;
        let principal = self.sessions.resolve(&id).await?;
        Ok(Authenticated {
            principal,
            method: AuthMethod::Bearer,
        })
    }
}

/// Whether the request carries any credential at all.
pub fn has_credentials(authorization: Option<&str>, api_key: Option<&str>) -> bool {
    authorization.is_some() || api_key.is_some()
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::auth::{hash_key, InMemoryPrincipalStore, Role};
    use crate::config::{ApiKeyConfig, AuthConfig, SessionConfig, TimeoutConfig};
    use crate::store::MemoryStore;

    fn authenticator(principals: Arc<InMemoryPrincipalStore>) -> Authenticator {
        let auth = AuthConfig {
            jwt_secret: "authenticator-test-secret-long-enough-000".into(),
            api_keys: vec![ApiKeyConfig {
                name: "importer".into(),
                key_sha256: hash_key("imp_key"),
            }],
            ..AuthConfig::default()
        };
        let sessions = SessionCache::new(
            Arc::new(MemoryStore::new()),
            principals,
            &SessionConfig::default(),
            &TimeoutConfig::default(),
        );
        Authenticator::new(TokenVerifier::new(&auth), ApiKeyAuthenticator::new(&auth.api_keys), sessions)
    }

    #[tokio::test]
    async fn bearer_resolves_store_role_not_token_role() {
        let principals = Arc::new(InMemoryPrincipalStore::new());
        principals.insert(Principal::new("7", "v@example.com", Role::Viewer));
        let auth = authenticator(principals);

        let forged = Principal::new("7", "v@example.com", Role::Admin);
        let token = auth.tokens().issue(&forged).unwrap();
        let resolved = auth
            .authenticate(Some(&format!("Bearer {token}")), None)
            .await
            .unwrap();
        assert_eq!(resolved.principal.role, Role::Viewer);
        assert_eq!(resolved.method, AuthMethod::Bearer);
    }

    #[tokio::test]
    async fn api_key_takes_service_path() {
        let auth = authenticator(Arc::new(InMemoryPrincipalStore::new()));
        let resolved = auth.authenticate(None, Some("imp_key")).await.unwrap();
        assert_eq!(resolved.principal.role, Role::Api);
        assert_eq!(resolved.method, AuthMethod::ApiKey);

        assert!(matches!(
            auth.authenticate(None, Some("nope")).await,
            Err(AuthError::InvalidApiKey)
        ));
    }

    #[test]
    fn any_header_counts_as_credentials() {
        assert!(!has_credentials(None, None));
        assert!(has_credentials(Some("Bearer x"), None));
        assert!(has_credentials(None, Some("imp_key")));
    }

    #[tokio::test]
    async fn deactivated_principal_with_valid_token_is_rejected() {
        let principals = Arc::new(InMemoryPrincipalStore::new());
        let gone = Principal::new("8", "gone@example.com", Role::Editor).deactivated();
        principals.insert(gone.clone());
        let auth = authenticator(principals);

        let token = auth.tokens().issue(&gone).unwrap();
        assert!(matches!(
            auth.authenticate(Some(&format!("Bearer {token}")), None).await,
            Err(AuthError::AccountDeactivated)
        ));
    }
}
