//! Admin surface: user role/active/delete changes, session invalidation,
//! counter resets and status. Every route is admin-only.

pub mod handlers;

use axum::routing::{delete, get, patch, post};
use axum::Router;

use self::handlers::*;
use crate::http::{GateState, GuardBuilder};

pub fn router(state: GateState) -> Router<GateState> {
    GuardBuilder::admin(state).build().apply(
        Router::new()
            .route("/admin/status", get(get_status))
            .route("/admin/users/{id}", get(get_user).delete(delete_user))
            .route("/admin/users/{id}/role", patch(change_role))
            .route("/admin/users/{id}/deactivate", post(deactivate_user))
            .route("/admin/users/{id}/activate", post(activate_user))
            .route("/admin/sessions/{id}", delete(invalidate_session))
            .route("/admin/rate-limits/{policy}/{subject}", delete(reset_rate_limit)),
    )
}
