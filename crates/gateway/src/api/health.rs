use axum::extract::State;
use axum::response::{IntoResponse, Json};

use crate::state::AppState;

/// GET /: liveness probe (public, no auth).
pub async fn root(State(state): State<AppState>) -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "ChatBridge is running",
        "version": env!("CARGO_PKG_VERSION"),
        "sessions": state.sessions.registry().len(),
    }))
}
