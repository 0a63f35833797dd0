use axum::extract::Request;
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};

use crate::error::ApiError;

pub const API_KEY_HEADER: &str = "x-api-key";

/// Shared secret injected as a request extension. An empty key disables the
/// check.
#[derive(Clone, Default)]
pub struct ApiKey(pub String);

/// Reject requests whose `X-API-Key` header does not match the configured
/// key. Runs before the handler, so a rejected request never reaches storage.
pub async fn require_api_key(request: Request, next: Next) -> Response {
    let expected = request
        .extensions()
        .get::<ApiKey>()
        .map(|key| key.0.clone())
        .unwrap_or_default();

    if expected.is_empty() {
        return next.run(request).await;
    }

    let presented = request
        .headers()
        .get(API_KEY_HEADER)
        .and_then(|value| value.to_str().ok())
        .unwrap_or("");

    if constant_time_eq(presented.as_bytes(), expected.as_bytes()) {
        return next.run(request).await;
    }

    tracing::debug!(path = %request.uri().path(), "rejected request without a valid api key");
    ApiError::Unauthorized.into_response()
}

fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    let mut diff = 0u8;
    for (x, y) in a.iter().zip(b.iter()) {
        diff |= x ^ y;
    }
    diff == 0
}
