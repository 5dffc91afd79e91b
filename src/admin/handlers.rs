use std::time::Duration;

use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, State};
use axum::Json;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::activity::{ActivityEvent, Origin, Outcome};
use crate::auth::{Principal, PrincipalId, Role};
use crate::authz::{guard_self_target, SelfTargetAction};
use crate::error::{ApiError, ErrorKind};
use crate::http::handlers::Envelope;
use crate::http::{CurrentPrincipal, GateState, RequestOrigin};
use crate::ratelimit::PolicyName;
use crate::store::with_deadline;

const STATUS_PING_DEADLINE: Duration = Duration::from_millis(500);

#[derive(Serialize)]
pub struct SystemStatus {
    pub version: &'static str,
    pub status: &'static str,
    pub store: &'static str,
    pub store_reachable: bool,
    pub policies: Vec<PolicyStatus>,
}

#[derive(Serialize)]
pub struct PolicyStatus {
    pub name: &'static str,
    pub window_secs: u64,
    pub max: u64,
}

#[derive(Debug, Deserialize)]
pub struct RoleChange {
    pub role: Role,
}

pub async fn get_status(State(state): State<GateState>) -> Json<Envelope<SystemStatus>> {
    let store_reachable = with_deadline("ping", STATUS_PING_DEADLINE, state.store.ping())
        .await
        .is_ok();
    let policies = state
        .policies
        .iter()
        .map(|policy| PolicyStatus {
            name: policy.name.as_str(),
            window_secs: policy.window.as_secs(),
            max: policy.max,
        })
        .collect();

    Envelope::ok(SystemStatus {
        version: env!("CARGO_PKG_VERSION"),
        status: if store_reachable { "operational" } else { "degraded" },
        store: state.store.backend(),
        store_reachable,
        policies,
    })
}

pub async fn get_user(
    State(state): State<GateState>,
    Path(id): Path<String>,
) -> Result<Json<Envelope<Principal>>, ApiError> {
    let principal = state
        .principals()
        .find_by_id(&PrincipalId::new(id))
        .await?
        .ok_or_else(user_not_found)?;
    Ok(Envelope::ok(principal))
}

pub async fn change_role(
    State(state): State<GateState>,
    CurrentPrincipal(actor): CurrentPrincipal,
    RequestOrigin(origin): RequestOrigin,
    Path(id): Path<String>,
    body: Result<Json<RoleChange>, JsonRejection>,
) -> Result<Json<Envelope<Principal>>, ApiError> {
    let Json(change) = body.map_err(|e| {
        ApiError::bad_request("Expected a JSON body with a valid role.").with_detail(e.body_text())
    })?;
    let target = PrincipalId::new(id);
    guard(&state, &actor, &target, SelfTargetAction::ChangeRole(change.role), &origin)?;

    let updated = state
        .principals()
        .update_role(&target, change.role)
        .await?
        .ok_or_else(user_not_found)?;
    finish_mutation(&state, &target, "change_role", &origin).await?;

    tracing::info!(actor = %actor.id, target_id = %target, role = %change.role, "Role changed");
    Ok(Envelope::ok(updated))
}

pub async fn deactivate_user(
    State(state): State<GateState>,
    CurrentPrincipal(actor): CurrentPrincipal,
    RequestOrigin(origin): RequestOrigin,
    Path(id): Path<String>,
) -> Result<Json<Envelope<Principal>>, ApiError> {
    let target = PrincipalId::new(id);
    guard(&state, &actor, &target, SelfTargetAction::Deactivate, &origin)?;

    let updated = state
        .principals()
        .set_active(&target, false)
        .await?
        .ok_or_else(user_not_found)?;
    finish_mutation(&state, &target, "deactivate", &origin).await?;

    tracing::info!(actor = %actor.id, target_id = %target, "User deactivated");
    Ok(Envelope::ok(updated))
}

pub async fn activate_user(
    State(state): State<GateState>,
    CurrentPrincipal(actor): CurrentPrincipal,
    RequestOrigin(origin): RequestOrigin,
    Path(id): Path<String>,
) -> Result<Json<Envelope<Principal>>, ApiError> {
    let target = PrincipalId::new(id);
    let updated = state
        .principals()
        .set_active(&target, true)
        .await?
        .ok_or_else(user_not_found)?;
    finish_mutation(&state, &target, "activate", &origin).await?;

    tracing::info!(actor = %actor.id, target_id = %target, "User activated");
    Ok(Envelope::ok(updated))
}

pub async fn delete_user(
    State(state): State<GateState>,
    CurrentPrincipal(actor): CurrentPrincipal,
    RequestOrigin(origin): RequestOrigin,
    Path(id): Path<String>,
) -> Result<Json<Value>, ApiError> {
    let target = PrincipalId::new(id);
    guard(&state, &actor, &target, SelfTargetAction::Delete, &origin)?;

    if !state.principals().delete(&target).await? {
        return Err(user_not_found());
    }
    finish_mutation(&state, &target, "delete", &origin).await?;

    tracing::info!(actor = %actor.id, target_id = %target, "User deleted");
    Ok(Json(json!({ "success": true, "message": "User deleted." })))
}

pub async fn invalidate_session(
    State(state): State<GateState>,
    RequestOrigin(origin): RequestOrigin,
    Path(id): Path<String>,
) -> Result<Json<Value>, ApiError> {
    let target = PrincipalId::new(id);
    let removed = state.sessions().invalidate(&target).await?;
    state.activity.record(
        ActivityEvent::new("admin:invalidate_session", Outcome::Allowed)
            .with_origin(&origin)
            .with_key(target.to_string()),
    );
    Ok(Json(json!({ "success": true, "removed": removed })))
}

pub async fn reset_rate_limit(
    State(state): State<GateState>,
    RequestOrigin(origin): RequestOrigin,
    Path((policy, subject)): Path<(String, String)>,
) -> Result<Json<Value>, ApiError> {
    let policy = policy
        .parse::<PolicyName>()
        .map_err(|e| ApiError::bad_request(format!("Unknown rate limit policy '{policy}'.")).with_detail(e))?;

    let removed = state.limiter.reset(policy, &subject).await?;
    state.activity.record(
        ActivityEvent::new("admin:reset_rate_limit", Outcome::Allowed)
            .with_origin(&origin)
            .with_key(state.limiter.counter_key(policy, &subject)),
    );
    Ok(Json(json!({ "success": true, "removed": removed })))
}

fn user_not_found() -> ApiError {
    ApiError::not_found("User not found.")
}

fn guard(
    state: &GateState,
    actor: &Principal,
    target: &PrincipalId,
    action: SelfTargetAction,
    origin: &Origin,
) -> Result<(), ApiError> {
    guard_self_target(actor, target, action).map_err(|e| {
        state.activity.record(
            ActivityEvent::new("admin:self_guard", Outcome::Denied(ErrorKind::InvalidSelfOperation))
                .with_origin(origin)
                .with_key(target.to_string()),
        );
        ApiError::from(e)
    })
}

/// Every mutation drops the target's cached session so the change applies on its next request.
async fn finish_mutation(
    state: &GateState,
    target: &PrincipalId,
    action: &str,
    origin: &Origin,
) -> Result<(), ApiError> {
    if let Err(e) = state.sessions().invalidate(target).await {
        tracing::error!(target_id = %target, error = %e, "Mutation applied but session invalidation failed");
        return Err(e.into());
    }
    state.activity.record(
        ActivityEvent::new(format!("admin:{action}"), Outcome::Allowed)
            .with_origin(origin)
            .with_key(target.to_string()),
    );
    Ok(())
}
