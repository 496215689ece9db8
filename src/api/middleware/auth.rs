use axum::{
    extract::{Request, State},
    middleware::Next,
    response::Response,
};
use subtle::ConstantTimeEq;

use crate::{api::state::AppState, error::AppError};

pub const API_KEY_HEADER: &str = "X-Api-Key";

/// Lets the request through only when it carries the configured admin key.
/// Without a configured key every request is refused.
pub async fn require_api_key(
    State(state): State<AppState>,
    request: Request,
    next: Next,
) -> Result<Response, AppError> {
    let expected = state
        .settings
        .admin
        .api_key
        .as_deref()
        .filter(|k| !k.is_empty())
        .ok_or(AppError::Unauthorized)?;

    let presented = request
        .headers()
        .get(API_KEY_HEADER)
        .and_then(|v| v.to_str().ok())
        .ok_or(AppError::Unauthorized)?;

    if !bool::from(expected.as_bytes().ct_eq(presented.as_bytes())) {
        tracing::warn!(path = %request.uri().path(), "Rejected request with a wrong API key");
        return Err(AppError::Unauthorized);
    }

    Ok(next.run(request).await)
}
