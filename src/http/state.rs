use std::sync::Arc;

use crate::activity::ActivityLogger;
use crate::auth::{ApiKeyAuthenticator, Authenticator, PrincipalStore, SessionCache, TokenVerifier};
use crate::authz::{PermissionTable, RoleAuthorizer};
use crate::config::GateConfig;
use crate::ratelimit::{PolicySet, RateLimiter};
use crate::store::SharedStore;

/// Request-path settings copied out of the config.
#[derive(Debug, Clone)]
pub struct GateSettings {
    pub expose_error_details: bool,
    pub trust_forwarded_for: bool,
    pub max_body_size: usize,
}

/// Everything the gate middleware and admin handlers need, cheap to clone.
#[derive(Clone)]
pub struct GateState {
    pub authenticator: Authenticator,
    pub authorizer: RoleAuthorizer,
    pub limiter: RateLimiter,
    pub policies: PolicySet,
    pub activity: ActivityLogger,
    pub store: Arc<dyn SharedStore>,
    pub settings: Arc<GateSettings>,
}

impl GateState {
    pub fn new(
        config: &GateConfig,
        store: Arc<dyn SharedStore>,
        principals: Arc<dyn PrincipalStore>,
        activity: ActivityLogger,
    ) -> Self {
        let sessions = SessionCache::new(store.clone(), principals, &config.session, &config.timeouts);
        let authenticator = Authenticator::new(
            TokenVerifier::new(&config.auth),
            ApiKeyAuthenticator::new(&config.auth.api_keys),
            sessions,
        );

        Self {
            authenticator,
            authorizer: RoleAuthorizer::new(PermissionTable::from_config(&config.authz)),
            limiter: RateLimiter::new(store.clone(), &config.rate_limit, &config.timeouts, activity.clone()),
            policies: PolicySet::from_config(&config.rate_limit),
            activity,
            store,
            settings: Arc::new(GateSettings {
                expose_error_details: config.security.expose_error_details,
                trust_forwarded_for: config.security.trust_forwarded_for,
                max_body_size: config.security.max_body_size,
            }),
        }
    }

    pub fn sessions(&self) -> &SessionCache {
        self.authenticator.sessions()
    }

    pub fn principals(&self) -> &Arc<dyn PrincipalStore> {
        self.sessions().principals()
    }
}
