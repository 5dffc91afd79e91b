//! Extractors for guarded handlers.

use std::convert::Infallible;

use axum::extract::FromRequestParts;
use axum::http::request::Parts;

use super::request::request_id;
use crate::activity::Origin;
use crate::auth::Principal;
use crate::error::{ApiError, ErrorKind};

/// The principal attached by an authenticating guard.
#[derive(Debug, Clone)]
pub struct CurrentPrincipal(pub Principal);

impl<S> FromRequestParts<S> for CurrentPrincipal
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<Principal>()
            .cloned()
            .map(CurrentPrincipal)
            .ok_or_else(|| ApiError::new(ErrorKind::NoToken))
    }
}

/// Request id and principal for activity events.
#[derive(Debug, Clone)]
pub struct RequestOrigin(pub Origin);

impl<S> FromRequestParts<S> for RequestOrigin
where
    S: Send + Sync,
{
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        Ok(RequestOrigin(Origin {
            request_id: request_id(&parts.extensions, &parts.headers),
            principal_id: parts.extensions.get::<Principal>().map(|p| p.id.clone()),
        }))
    }
}
