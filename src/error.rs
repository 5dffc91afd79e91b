//! HTTP-facing errors.
//!
//! Module errors (`AuthError`, `AuthzError`, `RateLimitError`, `StoreError`)
//! convert into [`ApiError`], which renders the JSON envelope:
//!
//! ```json
//! {"success": false, "error": {"kind": "TokenExpired", "message": "Token expired."}, "request_id": "..."}
//! ```
//!
//! `IntoResponse` renders a safe body on its own and stashes the error in the
//! response extensions; the `render_errors` middleware re-renders it with the
//! request id and, when enabled, the internal detail.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;

use crate::auth::AuthError;
use crate::authz::AuthzError;
use crate::http::response::apply_rate_headers;
use crate::ratelimit::{Decision, RateLimitError};
use crate::store::StoreError;

/// Client-facing error classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ErrorKind {
    NoToken,
    InvalidToken,
    TokenExpired,
    UserNotFound,
    AccountDeactivated,
    AdminRequired,
    EditorRequired,
    PermissionDenied,
    OwnershipRequired,
    InvalidSelfOperation,
    RateLimitExceeded,
    BadRequest,
    NotFound,
    ServiceUnavailable,
    InternalError,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::NoToken => "NoToken",
            ErrorKind::InvalidToken => "InvalidToken",
            ErrorKind::TokenExpired => "TokenExpired",
            ErrorKind::UserNotFound => "UserNotFound",
            ErrorKind::AccountDeactivated => "AccountDeactivated",
            ErrorKind::AdminRequired => "AdminRequired",
            ErrorKind::EditorRequired => "EditorRequired",
            ErrorKind::PermissionDenied => "PermissionDenied",
            ErrorKind::OwnershipRequired => "OwnershipRequired",
            ErrorKind::InvalidSelfOperation => "InvalidSelfOperation",
            ErrorKind::RateLimitExceeded => "RateLimitExceeded",
            ErrorKind::BadRequest => "BadRequest",
            ErrorKind::NotFound => "NotFound",
            ErrorKind::ServiceUnavailable => "ServiceUnavailable",
            ErrorKind::InternalError => "InternalError",
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            ErrorKind::NoToken
            | ErrorKind::InvalidToken
            | ErrorKind::TokenExpired
            | ErrorKind::UserNotFound
            | ErrorKind::AccountDeactivated => StatusCode::UNAUTHORIZED,
            ErrorKind::AdminRequired
            | ErrorKind::EditorRequired
            | ErrorKind::PermissionDenied
            | ErrorKind::OwnershipRequired
            | ErrorKind::InvalidSelfOperation => StatusCode::FORBIDDEN,
            ErrorKind::RateLimitExceeded => StatusCode::TOO_MANY_REQUESTS,
            ErrorKind::BadRequest => StatusCode::BAD_REQUEST,
            ErrorKind::NotFound => StatusCode::NOT_FOUND,
            ErrorKind::ServiceUnavailable => StatusCode::SERVICE_UNAVAILABLE,
            ErrorKind::InternalError => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn default_message(&self) -> &'static str {
        match self {
            ErrorKind::NoToken => "Access denied. No token provided.",
            ErrorKind::InvalidToken => "Invalid token.",
            ErrorKind::TokenExpired => "Token expired.",
            ErrorKind::UserNotFound => "User not found.",
            ErrorKind::AccountDeactivated => "Account is deactivated.",
            ErrorKind::AdminRequired => "Admin access required.",
            ErrorKind::EditorRequired => "Editor access required.",
            ErrorKind::PermissionDenied => "Insufficient permissions.",
            ErrorKind::OwnershipRequired => "You can only modify your own resources.",
            ErrorKind::InvalidSelfOperation => "This operation cannot target your own account.",
            ErrorKind::RateLimitExceeded => "Too many requests, please try again later.",
            ErrorKind::BadRequest => "Bad request.",
            ErrorKind::NotFound => "Not found.",
            ErrorKind::ServiceUnavailable => "Service temporarily unavailable.",
            ErrorKind::InternalError => "Internal server error.",
        }
    }

    /// Kinds whose cause is ours, not the caller's.
    pub fn is_server_error(&self) -> bool {
        matches!(self, ErrorKind::ServiceUnavailable | ErrorKind::InternalError)
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An error on its way to the client.
#[derive(Debug, Clone)]
pub struct ApiError {
    kind: ErrorKind,
    message: String,
    detail: Option<String>,
    policy: Option<&'static str>,
    decision: Option<Decision>,
}

impl ApiError {
    pub fn new(kind: ErrorKind) -> Self {
        Self {
            kind,
            message: kind.default_message().to_string(),
            detail: None,
            policy: None,
            decision: None,
        }
    }

    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = message.into();
        self
    }

    pub fn with_detail(mut self, detail: impl Into<String>) -> Self {
        self.detail = Some(detail.into());
        self
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::BadRequest).with_message(message)
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::NotFound).with_message(message)
    }

    pub fn internal(detail: impl Into<String>) -> Self {
        Self::new(ErrorKind::InternalError).with_detail(detail)
    }

    pub fn unavailable(detail: impl Into<String>) -> Self {
        Self::new(ErrorKind::ServiceUnavailable).with_detail(detail)
    }

    pub fn kind(&self) -> ErrorKind {
        self.kind
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn detail(&self) -> Option<&str> {
        self.detail.as_deref()
    }

    pub fn policy(&self) -> Option<&'static str> {
        self.policy
    }

    /// Log and render the envelope.
    ///
    /// Internal detail is included only when `expose_detail` is set; server
    /// errors never carry it.
    pub fn render(&self, request_id: Option<&str>, expose_detail: bool) -> Response {
        if self.kind.is_server_error() {
            tracing::error!(
                kind = self.kind.as_str(),
                detail = self.detail.as_deref().unwrap_or_default(),
                request_id = request_id.unwrap_or_default(),
                "Server error occurred"
            );
        } else {
            tracing::debug!(
                kind = self.kind.as_str(),
                status = %self.kind.status(),
                request_id = request_id.unwrap_or_default(),
                "Client error occurred"
            );
        }
        self.build(request_id, expose_detail)
    }

    fn build(&self, request_id: Option<&str>, expose_detail: bool) -> Response {
        let detail = if expose_detail && !self.kind.is_server_error() {
            self.detail.clone()
        } else {
            None
        };

        let body = ErrorEnvelope {
            success: false,
            error: ErrorBody {
                kind: self.kind,
                message: &self.message,
                detail,
                policy: self.policy,
            },
            request_id,
        };

        let mut response = (self.kind.status(), Json(body)).into_response();
        if let Some(decision) = &self.decision {
            apply_rate_headers(response.headers_mut(), decision);
        }
        response.extensions_mut().insert(self.clone());
        response
    }
}

impl std::fmt::Display for ApiError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.kind, self.message)
    }
}

impl std::error::Error for ApiError {}

#[derive(Serialize)]
struct ErrorEnvelope<'a> {
    success: bool,
    error: ErrorBody<'a>,
    request_id: Option<&'a str>,
}

#[derive(Serialize)]
struct ErrorBody<'a> {
    kind: ErrorKind,
    message: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    detail: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    policy: Option<&'static str>,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        self.build(None, false)
    }
}

impl From<AuthError> for ApiError {
    fn from(e: AuthError) -> Self {
        ApiError::new(e.kind()).with_detail(e.to_string())
    }
}

impl From<AuthzError> for ApiError {
    fn from(e: AuthzError) -> Self {
        let api = ApiError::new(e.kind());
        let api = match &e {
            AuthzError::InvalidSelfOperation(verb) => {
                api.with_message(format!("You cannot {verb} your own account."))
            }
            _ => api,
        };
        match e.detail() {
            Some(detail) => api.with_detail(detail),
            None => api,
        }
    }
}

impl From<RateLimitError> for ApiError {
    fn from(e: RateLimitError) -> Self {
        match e {
            RateLimitError::Exceeded {
                policy,
                message,
                decision,
            } => ApiError {
                kind: ErrorKind::RateLimitExceeded,
                message,
                detail: None,
                policy: Some(policy.as_str()),
                decision: Some(decision),
            },
        }
    }
}

impl From<StoreError> for ApiError {
    fn from(e: StoreError) -> Self {
        ApiError::unavailable(e.to_string())
    }
}
