//! `SessionError` → HTTP response mapping.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;

use cb_sessions::SessionError;

/// Handler error: a [`SessionError`] rendered as a JSON body.
#[derive(Debug)]
pub struct ApiError(pub SessionError);

impl From<SessionError> for ApiError {
    fn from(err: SessionError) -> Self {
        Self(err)
    }
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match &self.0 {
            SessionError::SessionNotFound(_) => StatusCode::NOT_FOUND,
            SessionError::PairingTimeout(_) => StatusCode::GATEWAY_TIMEOUT,
            SessionError::PairingWaitInProgress(_) => StatusCode::CONFLICT,
            SessionError::SessionClosed(_) => StatusCode::GONE,
            SessionError::InvalidSessionId(_) | SessionError::InvalidRecipient(_) => {
                StatusCode::BAD_REQUEST
            }
            SessionError::TerminalLogout(_)
            | SessionError::EngineConnectFailure(_)
            | SessionError::EngineSendFailure(_)
            | SessionError::Credentials(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let body = match &self.0 {
            SessionError::SessionNotFound(id) => json!({
                "error": "Session not found",
                "sessionId": id,
            }),
            SessionError::PairingTimeout(id) => json!({
                "error": "QR code not generated in time",
                "sessionId": id,
            }),
            SessionError::PairingWaitInProgress(id) => json!({
                "error": "Another request is already waiting for this QR code",
                "sessionId": id,
            }),
            SessionError::SessionClosed(id) | SessionError::TerminalLogout(id) => json!({
                "error": "Session closed",
                "sessionId": id,
            }),
            SessionError::InvalidSessionId(raw) => json!({
                "error": "Invalid session id",
                "sessionId": raw,
            }),
            SessionError::InvalidRecipient(_) => json!({ "error": "number is required" }),
            SessionError::EngineConnectFailure(details) => json!({
                "error": "Failed to create session",
                "details": details,
            }),
            SessionError::EngineSendFailure(details) => json!({
                "error": "Failed to send message",
                "details": details,
            }),
            SessionError::Credentials(details) => json!({
                "error": "Credential store error",
                "details": details,
            }),
        };

        if status.is_server_error() {
            tracing::error!(status = status.as_u16(), error = %self.0, "request failed");
        } else {
            tracing::debug!(status = status.as_u16(), error = %self.0, "request rejected");
        }

        (status, Json(body)).into_response()
    }
}
