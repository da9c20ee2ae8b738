//! In-process engine whose event stream is driven by the caller.
//!
//! Every `open` is recorded together with the credentials it received, and
//! the newest connection of each session can be fed events via
//! [`MemoryEngine::emit`].  Sends are captured instead of delivered.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use cb_domain::{CredentialBlob, SessionId};
use parking_lot::Mutex;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::types::{EngineConnection, EngineError, EngineEvent, EngineHandle, ProtocolEngine};

/// A message captured by [`MemoryEngine`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SentMessage {
    pub session_id: SessionId,
    pub to: String,
    pub text: String,
}

struct OpenedConnection {
    credentials: CredentialBlob,
    events: mpsc::Sender<EngineEvent>,
    closed: CancellationToken,
}

#[derive(Default)]
struct MemoryInner {
    connections: Mutex<HashMap<SessionId, Vec<OpenedConnection>>>,
    sent: Mutex<Vec<SentMessage>>,
    open_failures: AtomicU32,
    send_failure: Mutex<Option<String>>,
}

/// Scriptable in-process [`ProtocolEngine`].
#[derive(Clone, Default)]
pub struct MemoryEngine {
    inner: Arc<MemoryInner>,
}

impl MemoryEngine {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make the next `n` calls to `open` fail with [`EngineError::Connect`].
    pub fn fail_next_opens(&self, n: u32) {
        self.inner.open_failures.store(n, Ordering::SeqCst);
    }

    /// Make every send fail with the given message (`None` restores success).
    pub fn fail_sends(&self, message: Option<String>) {
        *self.inner.send_failure.lock() = message;
    }

    /// Push an event onto the newest connection of `session_id`.
    ///
    /// Returns `false` when the session has no open connection.
    pub async fn emit(&self, session_id: &SessionId, event: EngineEvent) -> bool {
        let tx = {
            let connections = self.inner.connections.lock();
            connections
                .get(session_id)
                .and_then(|c| c.last())
                .filter(|c| !c.closed.is_cancelled())
                .map(|c| c.events.clone())
        };
        match tx {
            Some(tx) => tx.send(event).await.is_ok(),
            None => false,
        }
    }

    /// How many times `open` succeeded for `session_id`.
    pub fn open_count(&self, session_id: &SessionId) -> usize {
        self.inner
            .connections
            .lock()
            .get(session_id)
            .map_or(0, |c| c.len())
    }

    /// Credentials passed to the `n`-th successful open (0-indexed).
    pub fn opened_with(&self, session_id: &SessionId, n: usize) -> Option<CredentialBlob> {
        self.inner
            .connections
            .lock()
            .get(session_id)
            .and_then(|c| c.get(n))
            .map(|c| c.credentials.clone())
    }

    /// Whether the `n`-th connection of `session_id` has been closed.
    pub fn is_closed(&self, session_id: &SessionId, n: usize) -> bool {
        self.inner
            .connections
            .lock()
            .get(session_id)
            .and_then(|c| c.get(n))
            .is_some_and(|c| c.closed.is_cancelled())
    }

    /// Every message sent so far, in order.
    pub fn sent(&self) -> Vec<SentMessage> {
        self.inner.sent.lock().clone()
    }

    /// Poll until `session_id` has been opened at least `n` times.
    pub async fn wait_for_opens(&self, session_id: &SessionId, n: usize, timeout: Duration) -> bool {
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            if self.open_count(session_id) >= n {
                return true;
            }
            if tokio::time::Instant::now() >= deadline {
                return false;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    }
}

#[async_trait::async_trait]
impl ProtocolEngine for MemoryEngine {
    async fn open(
        &self,
        session_id: &SessionId,
        credentials: CredentialBlob,
    ) -> Result<EngineConnection, EngineError> {
        let failing = self
            .inner
            .open_failures
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if failing {
            return Err(EngineError::Connect("scripted open failure".into()));
        }

        let (tx, rx) = mpsc::channel(64);
        let closed = CancellationToken::new();
        self.inner
            .connections
            .lock()
            .entry(session_id.clone())
            .or_default()
            .push(OpenedConnection {
                credentials,
                events: tx,
                closed: closed.clone(),
            });

        let handle = MemoryHandle {
            session_id: session_id.clone(),
            inner: self.inner.clone(),
            closed,
        };
        Ok(EngineConnection {
            handle: Arc::new(handle),
            events: rx,
        })
    }
}

struct MemoryHandle {
    session_id: SessionId,
    inner: Arc<MemoryInner>,
    closed: CancellationToken,
}

#[async_trait::async_trait]
impl EngineHandle for MemoryHandle {
    async fn send_text(&self, address: &str, text: &str) -> Result<(), EngineError> {
        if self.closed.is_cancelled() {
            return Err(EngineError::Closed);
        }
        if let Some(message) = self.inner.send_failure.lock().clone() {
            return Err(EngineError::Send(message));
        }
        self.inner.sent.lock().push(SentMessage {
            session_id: self.session_id.clone(),
            to: address.to_owned(),
            text: text.to_owned(),
        });
        Ok(())
    }

    fn close(&self) {
        self.closed.cancel();
    }

    fn is_closed(&self) -> bool {
        self.closed.is_cancelled()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sid(s: &str) -> SessionId {
        SessionId::parse(s).unwrap()
    }

    #[tokio::test]
    async fn emitted_events_arrive_in_order() {
        let engine = MemoryEngine::new();
        let mut conn = engine.open(&sid("s1"), CredentialBlob::unregistered()).await.unwrap();

        assert!(engine.emit(&sid("s1"), EngineEvent::PairingToken("tok".into())).await);
        assert!(engine.emit(&sid("s1"), EngineEvent::Opened).await);

        assert_eq!(conn.events.recv().await, Some(EngineEvent::PairingToken("tok".into())));
        assert_eq!(conn.events.recv().await, Some(EngineEvent::Opened));
    }

    #[tokio::test]
    async fn emit_without_connection_returns_false() {
        let engine = MemoryEngine::new();
        assert!(!engine.emit(&sid("nobody"), EngineEvent::Opened).await);
    }

    #[tokio::test]
    async fn scripted_open_failures_are_consumed() {
        let engine = MemoryEngine::new();
        engine.fail_next_opens(1);
        assert!(engine.open(&sid("s1"), CredentialBlob::unregistered()).await.is_err());
        assert!(engine.open(&sid("s1"), CredentialBlob::unregistered()).await.is_ok());
        assert_eq!(engine.open_count(&sid("s1")), 1);
    }

    #[tokio::test]
    async fn sends_are_captured_until_closed() {
        let engine = MemoryEngine::new();
        let conn = engine.open(&sid("s1"), CredentialBlob::unregistered()).await.unwrap();

        conn.handle.send_text("1@s.whatsapp.net", "hi").await.unwrap();
        assert_eq!(engine.sent().len(), 1);
        assert_eq!(engine.sent()[0].to, "1@s.whatsapp.net");

        conn.handle.close();
        assert!(engine.is_closed(&sid("s1"), 0));
        assert!(matches!(
            conn.handle.send_text("1@s.whatsapp.net", "again").await,
            Err(EngineError::Closed)
        ));
    }

    #[tokio::test]
    async fn scripted_send_failure() {
        let engine = MemoryEngine::new();
        let conn = engine.open(&sid("s1"), CredentialBlob::unregistered()).await.unwrap();
        engine.fail_sends(Some("not on network".into()));
        let err = conn.handle.send_text("x", "y").await.unwrap_err();
        assert!(matches!(err, EngineError::Send(m) if m == "not on network"));
    }
}
