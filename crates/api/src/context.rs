//! Request extractors for the caller's identity and address.

use std::net::{IpAddr, SocketAddr};

use axum::extract::{ConnectInfo, FromRequestParts};
use axum::http::HeaderMap;
use axum::http::request::Parts;
use domain::ChangeContext;

use crate::auth::Claims;
use crate::error::ApiError;

/// Width of the `changed_by` history column.
const MAX_CHANGED_BY_CHARS: usize = 255;

/// The authenticated caller. Rejects with 401 when no valid token was sent.
pub struct Authenticated(pub Claims);

impl<S> FromRequestParts<S> for Authenticated
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<Claims>()
            .cloned()
            .map(Authenticated)
            .ok_or_else(|| {
                ApiError::Unauthorized("Authentication credentials were not provided.".to_string())
            })
    }
}

/// Who is calling and from where, for status history rows.
pub struct RequestContext(pub ChangeContext);

impl<S> FromRequestParts<S> for RequestContext
where
    S: Send + Sync,
{
    type Rejection = std::convert::Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let changed_by = parts
            .extensions
            .get::<Claims>()
            .map(|c| c.sub.chars().take(MAX_CHANGED_BY_CHARS).collect());
        let remote = parts
            .extensions
            .get::<ConnectInfo<SocketAddr>>()
            .map(|ConnectInfo(addr)| *addr);
        let ip = client_ip(&parts.headers, remote);
        Ok(RequestContext(ChangeContext::api(changed_by, ip)))
    }
}

/// First address in `X-Forwarded-For`, else the peer address. A first entry
/// that is not an IP address is ignored.
pub fn client_ip(headers: &HeaderMap, remote: Option<SocketAddr>) -> Option<String> {
    headers
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(',').next())
        .and_then(|ip| ip.trim().parse::<IpAddr>().ok())
        .or_else(|| remote.map(|addr| addr.ip()))
        .map(|ip| ip.to_string())
}
