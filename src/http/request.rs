//! Request identification.
//!
//! # Responsibilities
//! - Honour an incoming `X-Request-Id` or generate a UUID v4
//! - Resolve the client address (peer or first `X-Forwarded-For` hop)
//!
//! # Design Decisions
//! - Request ID added as early as possible for tracing
//! - Forwarded headers are ignored unless explicitly trusted

use std::net::{IpAddr, Ipv4Addr, SocketAddr};

use axum::extract::ConnectInfo;
use axum::http::{Extensions, HeaderMap, HeaderName, HeaderValue, Request};
use tower_http::request_id::{MakeRequestId, RequestId};
use uuid::Uuid;

/// Request ID header name.
pub const X_REQUEST_ID: HeaderName = HeaderName::from_static("x-request-id");

const X_FORWARDED_FOR: &str = "x-forwarded-for";

/// Generates UUID v4 request ids.
#[derive(Debug, Clone, Copy, Default)]
pub struct UuidRequestId;

impl MakeRequestId for UuidRequestId {
    fn make_request_id<B>(&mut self, _request: &Request<B>) -> Option<RequestId> {
        HeaderValue::from_str(&Uuid::new_v4().to_string())
            .ok()
            .map(RequestId::new)
    }
}

/// The request id assigned by `SetRequestIdLayer`, falling back to the raw header.
pub fn request_id(extensions: &Extensions, headers: &HeaderMap) -> Option<String> {
    extensions
        .get::<RequestId>()
        .map(RequestId::header_value)
        .or_else(|| headers.get(X_REQUEST_ID))
        .and_then(|value| value.to_str().ok())
        .map(str::to_owned)
}

/// Address used for address-keyed rate limits.
pub fn client_ip(extensions: &Extensions, headers: &HeaderMap, trust_forwarded_for: bool) -> IpAddr {
    if trust_forwarded_for {
        let forwarded = headers
            .get(X_FORWARDED_FOR)
            .and_then(|value| value.to_str().ok())
            .and_then(|value| value.split(',').next())
            .and_then(|hop| hop.trim().parse::<IpAddr>().ok());
        if let Some(ip) = forwarded {
            return ip;
        }
    }

    extensions
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| addr.ip())
        .unwrap_or(IpAddr::V4(Ipv4Addr::UNSPECIFIED))
}
