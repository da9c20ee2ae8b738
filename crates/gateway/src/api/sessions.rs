//! Session control endpoints.
//!
//! - `POST   /session/create[?wait=true]` : start a session
//! - `GET    /session/:id/qr[?wait_ms=N]` : pairing code (poll or wait)
//! - `POST   /session/:id/send`           : send a text message
//! - `GET    /session/:id/status`         : lifecycle state
//! - `DELETE /session/:id`                : tear the session down
//! - `GET    /sessions`                   : list registered sessions

use std::time::Duration;

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Json, Response};
use serde::Deserialize;
use serde_json::json;

use cb_domain::SessionId;
use cb_sessions::SessionError;

use super::error::ApiError;
use crate::state::AppState;

fn parse_id(raw: String) -> Result<SessionId, ApiError> {
    SessionId::parse(raw).map_err(|e| ApiError(e.into()))
}

/// 404 body for a missing pairing code, listing the ids that do have one.
fn qr_not_found(state: &AppState, session_id: &SessionId) -> Response {
    (
        StatusCode::NOT_FOUND,
        Json(json!({
            "error": "QR code not found",
            "sessionId": session_id,
            "availableSessions": state.sessions.available_artifacts(),
        })),
    )
        .into_response()
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// POST /session/create
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Default, Deserialize)]
pub struct CreateQuery {
    /// Block until the pairing code is available (overrides
    /// `pairing.block_on_create`).
    #[serde(default)]
    pub wait: Option<bool>,
}

pub async fn create_session(
    State(state): State<AppState>,
    Query(query): Query<CreateQuery>,
) -> Result<Response, ApiError> {
    let session_id = state.sessions.create().await?;
    tracing::info!(session_id = %session_id, "session created");

    let wait = query.wait.unwrap_or(state.config.pairing.block_on_create);
    if !wait {
        return Ok(Json(json!({ "sessionId": session_id })).into_response());
    }

    let timeout = Duration::from_millis(state.config.pairing.wait_timeout_ms);
    let artifact = state.sessions.wait_for_pairing(&session_id, timeout).await?;
    Ok(Json(json!({
        "sessionId": session_id,
        "qr": artifact.payload,
    }))
    .into_response())
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// GET /session/:id/qr
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Default, Deserialize)]
pub struct QrQuery {
    /// Wait up to this many milliseconds for a pairing code.
    #[serde(default)]
    pub wait_ms: Option<u64>,
}

pub async fn get_qr(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Query(query): Query<QrQuery>,
) -> Result<Response, ApiError> {
    let session_id = parse_id(id)?;

    let artifact = match query.wait_ms.filter(|ms| *ms > 0) {
        Some(ms) => {
            match state
                .sessions
                .wait_for_pairing(&session_id, Duration::from_millis(ms))
                .await
            {
                Ok(artifact) => artifact,
                Err(SessionError::SessionNotFound(_)) => {
                    return Ok(qr_not_found(&state, &session_id))
                }
                Err(e) => return Err(e.into()),
            }
        }
        None => match state.sessions.pairing_artifact(&session_id) {
            Some(artifact) => artifact,
            None => return Ok(qr_not_found(&state, &session_id)),
        },
    };

    Ok(Json(json!({ "qr": artifact.payload })).into_response())
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// POST /session/:id/send
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Deserialize)]
pub struct SendRequest {
    #[serde(default)]
    pub number: String,
    #[serde(default)]
    pub message: String,
}

pub async fn send_message(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(body): Json<SendRequest>,
) -> Result<Response, ApiError> {
    let session_id = parse_id(id)?;
    state
        .sessions
        .send(&session_id, &body.number, &body.message)
        .await?;
    Ok(Json(json!({ "success": true })).into_response())
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// GET /session/:id/status, DELETE /session/:id, GET /sessions
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

pub async fn session_status(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Response, ApiError> {
    let session_id = parse_id(id)?;
    let session_state = state.sessions.status(&session_id)?;
    Ok(Json(json!({
        "sessionId": session_id,
        "state": session_state,
    }))
    .into_response())
}

pub async fn delete_session(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Response, ApiError> {
    let session_id = parse_id(id)?;
    state.sessions.teardown(&session_id)?;
    tracing::info!(session_id = %session_id, "session torn down via API");
    Ok(Json(json!({ "success": true })).into_response())
}

pub async fn list_sessions(State(state): State<AppState>) -> impl IntoResponse {
    let sessions = state.sessions.list();
    Json(json!({
        "sessions": sessions,
        "count": sessions.len(),
    }))
}
