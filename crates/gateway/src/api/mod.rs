pub mod auth;
pub mod cors;
pub mod error;
pub mod health;
pub mod sessions;

use std::sync::Arc;

use axum::middleware;
use axum::routing::{delete, get, post};
use axum::Router;
use tower_http::trace::TraceLayer;

use crate::state::AppState;

/// Build the API router.
///
/// Routes are split into **public** (no auth required) and **protected**
/// (gated behind the bearer-token middleware when `CB_API_TOKEN` is set).
///
/// `state` is needed to wire up the auth middleware at build time.
pub fn router(state: AppState) -> Router<AppState> {
    let public = Router::new().route("/", get(health::root));

    let protected = Router::new()
        .route("/sessions", get(sessions::list_sessions))
        .route("/session/create", post(sessions::create_session))
        .route("/session/:id", delete(sessions::delete_session))
        .route("/session/:id/qr", get(sessions::get_qr))
        .route("/session/:id/send", post(sessions::send_message))
        .route("/session/:id/status", get(sessions::session_status))
        .route_layer(middleware::from_fn_with_state(
            state,
            auth::require_api_token,
        ));

    public.merge(protected)
}

/// The complete service: routes, origin guard, CORS, request tracing and
/// the concurrency limit. Rate limiting is added by the binary because it
/// needs the peer address from `into_make_service_with_connect_info`.
pub fn app(state: AppState) -> Router {
    let cors = cors::cors_layer(Arc::clone(&state.origins));
    let max_concurrent = state.config.server.max_concurrent_requests;

    router(state.clone())
        .layer(middleware::from_fn_with_state(
            state.clone(),
            cors::require_allowed_origin,
        ))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .layer(tower::limit::ConcurrencyLimitLayer::new(max_concurrent))
        .with_state(state)
}
