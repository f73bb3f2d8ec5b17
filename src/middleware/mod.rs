//! Transport-layer middleware.
//!
//! Request signature verification and wallet authentication are explicitly
//! out of scope for the core (SPEC_FULL.md §1): this is a bearer-token
//! stand-in, not a real auth scheme, kept only to demonstrate where the
//! Transport would plug one in. Compare
//! `control-plane/src/middleware/auth.rs`, which does the full JWT/API-key
//! validation this service's Transport deliberately does not own.

pub mod rate_limit;

use axum::{extract::Request, http::StatusCode, middleware::Next, response::Response};

pub async fn require_bearer_token(request: Request, next: Next) -> Result<Response, StatusCode> {
    let has_auth = request
        .headers()
        .get(axum::http::header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .map(|v| v.starts_with("Bearer "))
        .unwrap_or(false);

    if !has_auth {
        return Err(StatusCode::UNAUTHORIZED);
    }

    Ok(next.run(request).await)
}
