//! Bundled non-admin routes.

use std::time::Duration;

use axum::extract::State;
use axum::Json;
use serde::Serialize;
use serde_json::{json, Value};

use super::extract::{CurrentPrincipal, RequestOrigin};
use super::state::GateState;
use crate::activity::{ActivityEvent, Outcome};
use crate::auth::Principal;
use crate::error::ApiError;
use crate::store::with_deadline;

const HEALTH_PING_DEADLINE: Duration = Duration::from_millis(500);

#[derive(Serialize)]
pub struct Health {
    pub status: &'static str,
    pub version: &'static str,
    pub store: &'static str,
    pub store_reachable: bool,
}

/// Liveness plus a store probe. The gate stays up when the store is down.
pub async fn health(State(state): State<GateState>) -> Json<Health> {
    let store_reachable = with_deadline("ping", HEALTH_PING_DEADLINE, state.store.ping())
        .await
        .is_ok();
    Json(Health {
        status: if store_reachable { "ok" } else { "degraded" },
        version: env!("CARGO_PKG_VERSION"),
        store: state.store.backend(),
        store_reachable,
    })
}

#[derive(Serialize)]
pub struct Envelope<T> {
    pub success: bool,
    pub data: T,
}

impl<T> Envelope<T> {
    pub fn ok(data: T) -> Json<Self> {
        Json(Self { success: true, data })
    }
}

pub async fn me(CurrentPrincipal(principal): CurrentPrincipal) -> Json<Envelope<Principal>> {
    Envelope::ok(principal)
}

/// Drop the caller's cached session.
pub async fn logout(
    State(state): State<GateState>,
    CurrentPrincipal(principal): CurrentPrincipal,
    RequestOrigin(origin): RequestOrigin,
) -> Result<Json<Value>, ApiError> {
    state.sessions().invalidate(&principal.id).await?;
    state
        .activity
        .record(ActivityEvent::new("logout", Outcome::Allowed).with_origin(&origin));
    tracing::info!(principal_id = %principal.id, "Logged out");
    Ok(Json(json!({ "success": true, "message": "Logged out successfully." })))
}

pub async fn not_found() -> ApiError {
    ApiError::not_found("Route not found.")
}
