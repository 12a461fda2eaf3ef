//! Caller identity extraction.
//!
//! Authentication proper happens upstream (gateway or sidecar); this layer
//! trusts the `x-ferry-user` header it forwards and only refuses requests
//! that arrive without one.

use crate::error::ApiError;
use axum::extract::Request;
use axum::middleware::Next;
use axum::response::Response;

/// Header carrying the authenticated caller, set by the upstream gateway.
pub const IDENTITY_HEADER: &str = "x-ferry-user";

/// Opaque caller identity attached to authenticated requests.
#[derive(Clone, Debug)]
pub struct CallerIdentity(pub String);

/// Middleware requiring a caller identity on every request it wraps.
pub async fn require_identity(mut request: Request, next: Next) -> Result<Response, ApiError> {
    let caller = request
        .headers()
        .get(IDENTITY_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_owned);

    match caller {
        Some(owner) => {
            request.extensions_mut().insert(CallerIdentity(owner));
            Ok(next.run(request).await)
        }
        None => Err(ApiError::Unauthorized(format!(
            "missing {IDENTITY_HEADER} header"
        ))),
    }
}
