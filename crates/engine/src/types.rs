//! Engine contract: events, errors, and the two traits the session manager
//! programs against.

use std::sync::Arc;

use cb_domain::{CredentialBlob, DisconnectReason, SessionId};
use tokio::sync::mpsc;

/// Lifecycle event emitted by an engine connection, in wire order.
#[derive(Debug, Clone, PartialEq)]
pub enum EngineEvent {
    /// A pairing token is ready to be rendered for the user.
    PairingToken(String),
    /// The connection authenticated and is live.
    Opened,
    /// The connection ended; the stream yields nothing afterwards.
    Closed(DisconnectReason),
    /// Credentials changed and must be persisted.
    CredentialsChanged(CredentialBlob),
}

/// A freshly opened connection: the handle for outbound calls plus the
/// receiving end of its event stream.
pub struct EngineConnection {
    pub handle: Arc<dyn EngineHandle>,
    pub events: mpsc::Receiver<EngineEvent>,
}

/// Errors an engine can return.
#[derive(thiserror::Error, Debug, Clone)]
pub enum EngineError {
    #[error("connect: {0}")]
    Connect(String),
    #[error("handshake: {0}")]
    Handshake(String),
    #[error("send: {0}")]
    Send(String),
    #[error("connection closed")]
    Closed,
    #[error("timeout: {0}")]
    Timeout(String),
}

/// Opens protocol sessions.
#[async_trait::async_trait]
pub trait ProtocolEngine: Send + Sync + 'static {
    /// Open a connection for `session_id` authenticated with `credentials`.
    ///
    /// Returns once the engine accepted the session; pairing and
    /// authentication progress arrive later on the event stream.
    async fn open(
        &self,
        session_id: &SessionId,
        credentials: CredentialBlob,
    ) -> Result<EngineConnection, EngineError>;
}

/// Live connection handle.
#[async_trait::async_trait]
pub trait EngineHandle: Send + Sync + 'static {
    /// Deliver `text` to `address` (already in the engine's address form).
    async fn send_text(&self, address: &str, text: &str) -> Result<(), EngineError>;

    /// Tear the connection down.  Idempotent; no further events are emitted.
    fn close(&self);

    fn is_closed(&self) -> bool;
}
