//! Final rendering of error envelopes.

use std::sync::Arc;

use axum::extract::{Request, State};
use axum::http::header::{CONTENT_LENGTH, CONTENT_TYPE};
use axum::middleware::Next;
use axum::response::Response;

use crate::error::ApiError;
use crate::http::request::request_id;
use crate::http::state::GateSettings;

/// Re-render any [`ApiError`] response with the request id and configured
/// detail exposure, keeping headers set further in (rate limit headers).
pub async fn render_errors(State(settings): State<Arc<GateSettings>>, request: Request, next: Next) -> Response {
    let request_id = request_id(request.extensions(), request.headers());
    let response = next.run(request).await;

    let Some(error) = response.extensions().get::<ApiError>().cloned() else {
        return response;
    };

    let mut rendered = error.render(request_id.as_deref(), settings.expose_error_details);
    for (name, value) in response.headers() {
        if name == CONTENT_TYPE || name == CONTENT_LENGTH || rendered.headers().contains_key(name) {
            continue;
        }
        rendered.headers_mut().insert(name.clone(), value.clone());
    }
    rendered
}
