//! Bearer token authentication middleware.

use std::sync::Arc;

use axum::{
    extract::{Request, State},
    http::header::AUTHORIZATION,
    middleware::Next,
    response::Response,
};
use tracing::warn;

use super::error::ApiError;
use crate::persistence::token_repo::hash_secret;
use crate::state::AppState;

/// Extract the secret from an `Authorization: Bearer <secret>` header value.
#[must_use]
pub fn bearer_secret(header: &str) -> Option<&str> {
    let (scheme, secret) = header.split_once(' ')?;
    (scheme == "Bearer" && !secret.is_empty()).then_some(secret)
}

/// Resolve the bearer token and attach it to the request.
///
/// The authenticated [`crate::models::token::Token`] is inserted into the
/// request extensions for handlers to extract.
///
/// # Errors
///
/// Returns `ApiError::Unauthorized` for a missing, malformed or unknown
/// token, or `ApiError::Internal` if the lookup fails.
pub async fn require_token(
    State(state): State<Arc<AppState>>,
    mut request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let Some(secret) = request
        .headers()
        .get(AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(bearer_secret)
    else {
        return Err(ApiError::Unauthorized);
    };

    let Some(token) = state.tokens().authenticate(&hash_secret(secret)).await? else {
        warn!(path = %request.uri().path(), "rejected unknown api token");
        return Err(ApiError::Unauthorized);
    };

    request.extensions_mut().insert(token);
    Ok(next.run(request).await)
}
