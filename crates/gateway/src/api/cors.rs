//! Cross-origin policy.
//!
//! `[server.cors].allowed_origins` entries are exact origins
//! (`https://app.example.com`), wildcard-port patterns (`http://localhost:*`)
//! or a lone `"*"`. The same compiled policy backs both the [`CorsLayer`]
//! (browser preflights and response headers) and [`require_allowed_origin`],
//! which refuses requests from any other origin with 403 before they reach a
//! handler. Requests without an `Origin` header (curl, server-to-server) pass.

use axum::body::Body;
use axum::extract::State;
use axum::http::{header, HeaderValue, Method, Request, StatusCode};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use axum::Json;
use std::sync::Arc;
use tower_http::cors::{AllowOrigin, CorsLayer};

use cb_domain::config::CorsConfig;

use crate::state::AppState;

#[derive(Debug, Clone, Default)]
pub struct OriginPolicy {
    any: bool,
    exact: Vec<HeaderValue>,
    /// `scheme://host:` prefixes from `:*` patterns.
    wildcard_prefixes: Vec<String>,
}

impl OriginPolicy {
    pub fn from_config(cors: &CorsConfig) -> Self {
        // Special case: if the only entry is "*", allow every origin.
        if cors.allowed_origins.len() == 1 && cors.allowed_origins[0] == "*" {
            tracing::warn!("CORS configured with wildcard \"*\", all origins allowed");
            return Self {
                any: true,
                ..Self::default()
            };
        }

        let mut policy = Self::default();
        for origin in &cors.allowed_origins {
            if origin.ends_with(":*") {
                policy
                    .wildcard_prefixes
                    .push(origin.trim_end_matches('*').to_owned());
            } else if let Ok(hv) = origin.parse::<HeaderValue>() {
                policy.exact.push(hv);
            } else {
                tracing::warn!(origin = %origin, "invalid CORS origin, skipping");
            }
        }
        policy
    }

    pub fn allows_any(&self) -> bool {
        self.any
    }

    pub fn allows(&self, origin: &HeaderValue) -> bool {
        if self.any {
            return true;
        }
        if self.exact.iter().any(|e| e.as_bytes() == origin.as_bytes()) {
            return true;
        }
        let origin_str = origin.to_str().unwrap_or("");
        self.wildcard_prefixes.iter().any(|prefix| {
            origin_str
                .strip_prefix(prefix.as_str())
                .map(|port| !port.is_empty() && port.chars().all(|c| c.is_ascii_digit()))
                .unwrap_or(false)
        })
    }
}

/// Build the [`CorsLayer`] for `policy`.
pub fn cors_layer(policy: Arc<OriginPolicy>) -> CorsLayer {
    let methods = [Method::GET, Method::POST, Method::DELETE, Method::OPTIONS];
    let headers = [header::CONTENT_TYPE, header::AUTHORIZATION];

    // allow_credentials is incompatible with wildcard origins.
    if policy.allows_any() {
        return CorsLayer::new()
            .allow_origin(tower_http::cors::Any)
            .allow_methods(methods)
            .allow_headers(headers);
    }

    CorsLayer::new()
        .allow_origin(AllowOrigin::predicate(move |origin, _| policy.allows(origin)))
        .allow_methods(methods)
        .allow_headers(headers)
        .allow_credentials(true)
}

/// Reject requests whose `Origin` is not on the allow-list.
pub async fn require_allowed_origin(
    State(state): State<AppState>,
    req: Request<Body>,
    next: Next,
) -> Response {
    if let Some(origin) = req.headers().get(header::ORIGIN) {
        if !state.origins.allows(origin) {
            tracing::warn!(origin = ?origin, path = %req.uri().path(), "origin not allowed");
            return (
                StatusCode::FORBIDDEN,
                Json(serde_json::json!({ "error": "origin not allowed" })),
            )
                .into_response();
        }
    }
    next.run(req).await
}
