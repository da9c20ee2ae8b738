//! Bearer-token guard for the session control routes.
//!
//! Anyone who can reach `/session/*` can pair a phone number or send
//! messages as it, so deployments outside localhost set the env var named
//! by `server.api_token_env` (default `CB_API_TOKEN`). It is read once in
//! `bootstrap` and only its SHA-256 digest is kept in `AppState`. With no
//! token configured every request passes; `GET /` is never guarded.

use axum::body::Body;
use axum::extract::State;
use axum::http::{header, HeaderMap, HeaderValue, Request, StatusCode};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use sha2::{Digest, Sha256};
use subtle::ConstantTimeEq;

use crate::state::AppState;

pub fn hash_token(token: &str) -> Vec<u8> {
    Sha256::digest(token.as_bytes()).to_vec()
}

/// Token from `Authorization: Bearer <token>`. The scheme is matched
/// case-insensitively.
fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    let value = headers.get(header::AUTHORIZATION)?.to_str().ok()?;
    let (scheme, token) = value.split_once(' ')?;
    if !scheme.eq_ignore_ascii_case("bearer") {
        return None;
    }
    Some(token.trim()).filter(|t| !t.is_empty())
}

fn token_matches(expected_hash: &[u8], provided: &str) -> bool {
    bool::from(Sha256::digest(provided.as_bytes()).ct_eq(expected_hash))
}

pub async fn require_api_token(
    State(state): State<AppState>,
    req: Request<Body>,
    next: Next,
) -> Response {
    let Some(expected_hash) = &state.api_token_hash else {
        return next.run(req).await;
    };

    let authorized = bearer_token(req.headers())
        .is_some_and(|token| token_matches(expected_hash, token));
    if authorized {
        return next.run(req).await;
    }

    tracing::debug!(path = %req.uri().path(), "rejected session request without valid token");
    (
        StatusCode::UNAUTHORIZED,
        [(header::WWW_AUTHENTICATE, HeaderValue::from_static("Bearer"))],
        axum::Json(serde_json::json!({ "error": "invalid or missing API token" })),
    )
        .into_response()
}
