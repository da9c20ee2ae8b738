use cb_domain::SessionId;
use cb_engine::EngineError;

/// Errors surfaced by session operations.
#[derive(thiserror::Error, Debug)]
pub enum SessionError {
    #[error("session not found: {0}")]
    SessionNotFound(SessionId),

    #[error("no pairing code for session {0} before the deadline")]
    PairingTimeout(SessionId),

    #[error("another request is already waiting for the pairing code of session {0}")]
    PairingWaitInProgress(SessionId),

    #[error("session {0} was closed")]
    SessionClosed(SessionId),

    #[error("session {0} was logged out by the remote service")]
    TerminalLogout(SessionId),

    #[error("engine connect failed: {0}")]
    EngineConnectFailure(String),

    #[error("engine send failed: {0}")]
    EngineSendFailure(String),

    #[error("credentials: {0}")]
    Credentials(String),

    #[error("invalid session id: {0:?}")]
    InvalidSessionId(String),

    #[error("invalid recipient: {0:?}")]
    InvalidRecipient(String),
}

impl SessionError {
    pub(crate) fn connect(err: EngineError) -> Self {
        Self::EngineConnectFailure(err.to_string())
    }

    pub(crate) fn send(err: EngineError) -> Self {
        Self::EngineSendFailure(err.to_string())
    }
}

impl From<cb_domain::Error> for SessionError {
    fn from(err: cb_domain::Error) -> Self {
        match err {
            cb_domain::Error::InvalidSessionId(raw) => Self::InvalidSessionId(raw),
            other => Self::Credentials(other.to_string()),
        }
    }
}
