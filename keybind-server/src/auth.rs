//! Operator authentication for the admin routes.

use crate::error::ApiError;
use crate::AppState;
use axum::{
    extract::{Request, State},
    http::{header::AUTHORIZATION, HeaderMap},
    middleware::Next,
    response::Response,
};
use subtle::ConstantTimeEq;
use tracing::warn;

fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(AUTHORIZATION)?
        .to_str()
        .ok()?
        .strip_prefix("Bearer ")
        .map(str::trim)
}

/// Token comparison does not short-circuit on the first differing byte.
fn token_matches(provided: Option<&str>, expected: &str) -> bool {
    provided.is_some_and(|p| bool::from(p.as_bytes().ct_eq(expected.as_bytes())))
}

/// Rejects admin requests that lack the configured operator token.
///
/// With no token configured every request passes; access control is then
/// up to whatever fronts the service.
pub async fn require_operator(
    State(state): State<AppState>,
    request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    if let Some(expected) = state.admin_token.as_deref()
        && !token_matches(bearer_token(request.headers()), expected)
    {
        warn!(path = %request.uri().path(), "rejected admin request without valid token");
        return Err(ApiError::Unauthorized);
    }
    Ok(next.run(request).await)
}
