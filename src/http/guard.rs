//! Per-route-group gate: rate limits, authentication and authorization.
//!
//! A [`Guard`] runs its steps in a fixed order regardless of how the builder
//! was called:
//!
//! ```text
//! address / body-field policies
//!     → authenticate (bearer or X-API-Key)
//!     → requirements (role rank or permission)
//!     → identity policies (role:id, ip:addr when anonymous)
//!     → handler
//! ```
//!
//! A guard with identity policies but no authentication requirement still
//! authenticates callers that present credentials; callers without any stay
//! anonymous. The first failing step short-circuits with its error.

use std::sync::Arc;

use axum::body::Body;
use axum::extract::{Request, State};
use axum::http::header::AUTHORIZATION;
use axum::http::request::Parts;
use axum::middleware::{self, Next};
use axum::response::{IntoResponse, Response};
use axum::Router;

use super::request::{client_ip, request_id};
use super::response::{apply_rate_headers, RATELIMIT_LIMIT};
use super::state::GateState;
use crate::activity::{ActivityEvent, Origin, Outcome};
use crate::auth::{has_credentials, Principal, Role};
use crate::authz::Requirement;
use crate::error::{ApiError, ErrorKind};
use crate::ratelimit::{subject_for, Decision, KeyStrategy, Policy, PolicyName, SubjectSource};

/// Service API key header.
pub const X_API_KEY: &str = "x-api-key";

#[derive(Debug, Default)]
struct GuardPlan {
    before_auth: Vec<Arc<Policy>>,
    authenticate: bool,
    /// Authenticate when credentials are present, without requiring them.
    identify: bool,
    requirements: Vec<Requirement>,
    after_auth: Vec<Arc<Policy>>,
    needs_body: bool,
}

/// Composes the gate steps for a group of routes.
pub struct GuardBuilder {
    state: GateState,
    policies: Vec<PolicyName>,
    authenticate: bool,
    requirements: Vec<Requirement>,
}

impl GuardBuilder {
    pub fn new(state: GateState) -> Self {
        Self {
            state,
            policies: Vec::new(),
            authenticate: false,
            requirements: Vec::new(),
        }
    }

    /// `public` limit only.
    pub fn public(state: GateState) -> Self {
        Self::new(state).limit(PolicyName::Public)
    }

    /// `api` limit, any authenticated principal, `adaptive` limit.
    pub fn authenticated(state: GateState) -> Self {
        Self::new(state)
            .limit(PolicyName::Api)
            .authenticate()
            .limit(PolicyName::Adaptive)
    }

    /// As [`authenticated`](Self::authenticated), admins only.
    pub fn admin(state: GateState) -> Self {
        Self::authenticated(state).require_role(Role::Admin)
    }

    pub fn limit(mut self, policy: PolicyName) -> Self {
        if !self.policies.contains(&policy) {
            self.policies.push(policy);
        }
        self
    }

    pub fn authenticate(mut self) -> Self {
        self.authenticate = true;
        self
    }

    /// Require a minimum role. Implies authentication.
    pub fn require_role(self, role: Role) -> Self {
        self.require(Requirement::Role(role))
    }

    /// Require a permission-table action. Implies authentication.
    pub fn require_permission(self, action: impl Into<String>) -> Self {
        self.require(Requirement::permission(action))
    }

    pub fn require(mut self, requirement: Requirement) -> Self {
        self.authenticate = true;
        self.requirements.push(requirement);
        self
    }

    pub fn build(self) -> Guard {
        let mut plan = GuardPlan {
            authenticate: self.authenticate,
            requirements: self.requirements,
            ..GuardPlan::default()
        };

        for name in self.policies {
            let policy = self.state.policies.get(name);
            if policy.key.needs_identity() {
                plan.after_auth.push(policy);
            } else {
                plan.needs_body |= matches!(policy.key, KeyStrategy::ByField { .. });
                plan.before_auth.push(policy);
            }
        }
        plan.identify = !plan.authenticate && !plan.after_auth.is_empty();

        Guard {
            state: self.state,
            plan: Arc::new(plan),
        }
    }
}

/// A built guard, applied to a router as a route layer.
#[derive(Clone)]
pub struct Guard {
    state: GateState,
    plan: Arc<GuardPlan>,
}

impl Guard {
    /// Guard every route currently in `router`.
    pub fn apply<S>(self, router: Router<S>) -> Router<S>
    where
        S: Clone + Send + Sync + 'static,
    {
        router.route_layer(middleware::from_fn_with_state(self, run_guard))
    }

    async fn limit(
        &self,
        policy: &Policy,
        source: &SubjectSource<'_>,
        origin: &Origin,
        tightest: &mut Option<Decision>,
    ) -> Result<(), ApiError> {
        let subject = subject_for(&policy.key, source);
        let limit = policy.limit_for(source.principal.map(|p| p.role));
        let decision = self
            .state
            .limiter
            .check_for(&subject, policy, limit, origin)
            .await?;
        *tightest = Some(match tightest.take() {
            Some(current) => current.tighter(decision),
            None => decision,
        });
        Ok(())
    }

    async fn authenticate(&self, parts: &Parts, origin: &mut Origin) -> Result<Principal, ApiError> {
        let (authorization, api_key) = credentials(parts);
        match self.state.authenticator.authenticate(authorization, api_key).await {
            Ok(authenticated) => {
                origin.principal_id = Some(authenticated.principal.id.clone());
                self.state.activity.record(
                    ActivityEvent::new(format!("authenticate:{}", authenticated.method.as_str()), Outcome::Allowed)
                        .with_origin(origin),
                );
                Ok(authenticated.principal)
            }
            Err(e) => {
                self.state.activity.record(
                    ActivityEvent::new("authenticate", Outcome::Denied(e.kind())).with_origin(origin),
                );
                Err(e.into())
            }
        }
    }

    fn authorize(&self, principal: Option<&Principal>, origin: &Origin) -> Result<(), ApiError> {
        if self.plan.requirements.is_empty() {
            return Ok(());
        }
        let Some(principal) = principal else {
            return Err(ApiError::new(ErrorKind::NoToken));
        };

        for requirement in &self.plan.requirements {
            if let Err(e) = self.state.authorizer.authorize(principal, requirement) {
                self.state.activity.record(
                    ActivityEvent::new(format!("authorize:{requirement}"), Outcome::Denied(e.kind()))
                        .with_origin(origin),
                );
                return Err(e.into());
            }
        }

        self.state
            .activity
            .record(ActivityEvent::new("authorize", Outcome::Allowed).with_origin(origin));
        Ok(())
    }
}

fn credentials(parts: &Parts) -> (Option<&str>, Option<&str>) {
    (
        parts.headers.get(AUTHORIZATION).and_then(|v| v.to_str().ok()),
        parts.headers.get(X_API_KEY).and_then(|v| v.to_str().ok()),
    )
}

fn reject(error: ApiError, tightest: Option<Decision>) -> Response {
    let mut response = error.into_response();
    if let Some(decision) = tightest {
        if !response.headers().contains_key(RATELIMIT_LIMIT) {
            apply_rate_headers(response.headers_mut(), &decision);
        }
    }
    response
}

async fn run_guard(State(guard): State<Guard>, request: Request, next: Next) -> Response {
    let (mut parts, body) = request.into_parts();
    let settings = guard.state.settings.clone();

    let address = client_ip(&parts.extensions, &parts.headers, settings.trust_forwarded_for);
    let mut origin = Origin {
        request_id: request_id(&parts.extensions, &parts.headers),
        principal_id: None,
    };
    let mut tightest = None;

    let (body, json) = if guard.plan.needs_body {
        match axum::body::to_bytes(body, settings.max_body_size).await {
            Ok(bytes) => {
                let json = serde_json::from_slice::<serde_json::Value>(&bytes).ok();
                (Body::from(bytes), json)
            }
            Err(e) => {
                return ApiError::bad_request("Request body could not be read.")
                    .with_detail(e.to_string())
                    .into_response();
            }
        }
    } else {
        (body, None)
    };

    let anonymous = SubjectSource {
        address,
        principal: None,
        body: json.as_ref(),
    };
    for policy in &guard.plan.before_auth {
        if let Err(e) = guard.limit(policy, &anonymous, &origin, &mut tightest).await {
            return reject(e, tightest);
        }
    }

    let (authorization, api_key) = credentials(&parts);
    let identify = guard.plan.identify && has_credentials(authorization, api_key);
    let principal = if guard.plan.authenticate || identify {
        match guard.authenticate(&parts, &mut origin).await {
            Ok(principal) => Some(principal),
            Err(e) => return reject(e, tightest),
        }
    } else {
        None
    };

    if let Err(e) = guard.authorize(principal.as_ref(), &origin) {
        return reject(e, tightest);
    }

    let identified = SubjectSource {
        address,
        principal: principal.as_ref(),
        body: json.as_ref(),
    };
    for policy in &guard.plan.after_auth {
        if let Err(e) = guard.limit(policy, &identified, &origin, &mut tightest).await {
            return reject(e, tightest);
        }
    }

    if let Some(principal) = principal {
        parts.extensions.insert(principal);
    }

    let mut response = next.run(Request::from_parts(parts, body)).await;
    if let Some(decision) = tightest {
        apply_rate_headers(response.headers_mut(), &decision);
    }
    response
}
