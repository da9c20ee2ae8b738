//! Pairing artifact hand-off.
//!
//! The engine produces pairing tokens on its own schedule while HTTP callers
//! want the rendered artifact synchronously. Each session id gets a slot
//! holding the latest artifact plus at most one parked waiter; publishing
//! fills the slot and wakes the waiter.

use std::time::Duration;

use cb_domain::{PairingArtifact, SessionId};
use dashmap::DashMap;
use tokio::sync::oneshot;

/// Why a pairing wait ended without an artifact.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum PairingError {
    #[error("pairing code not produced before the deadline")]
    Timeout,
    #[error("another request is already waiting for this pairing code")]
    WaitInProgress,
    #[error("session closed while waiting for the pairing code")]
    SessionClosed,
}

#[derive(Default)]
struct PairingSlot {
    artifact: Option<PairingArtifact>,
    waiter: Option<oneshot::Sender<PairingArtifact>>,
}

impl PairingSlot {
    fn has_live_waiter(&self) -> bool {
        self.waiter.as_ref().is_some_and(|w| !w.is_closed())
    }

    fn is_empty(&self) -> bool {
        self.artifact.is_none() && !self.has_live_waiter()
    }
}

/// Per-session pairing artifact cache with deadline waits.
#[derive(Default)]
pub struct PairingCoordinator {
    slots: DashMap<SessionId, PairingSlot>,
}

impl PairingCoordinator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wait up to `timeout` for the artifact of `session_id`.
    ///
    /// A cached artifact is returned immediately. A zero timeout never
    /// suspends. Only the calling task is parked; other sessions are not
    /// affected.
    pub async fn await_artifact(
        &self,
        session_id: &SessionId,
        timeout: Duration,
    ) -> Result<PairingArtifact, PairingError> {
        if let Some(artifact) = self.peek(session_id) {
            return Ok(artifact);
        }
        if timeout.is_zero() {
            return Err(PairingError::Timeout);
        }

        // The map guard must be released before awaiting.
        let rx = {
            let mut slot = self.slots.entry(session_id.clone()).or_default();
            if let Some(artifact) = &slot.artifact {
                return Ok(artifact.clone());
            }
            if slot.has_live_waiter() {
                return Err(PairingError::WaitInProgress);
            }
            let (tx, rx) = oneshot::channel();
            slot.waiter = Some(tx);
            rx
        };

        match tokio::time::timeout(timeout, rx).await {
            Ok(Ok(artifact)) => Ok(artifact),
            Ok(Err(_)) => Err(PairingError::SessionClosed),
            Err(_) => {
                self.prune(session_id);
                Err(PairingError::Timeout)
            }
        }
    }

    /// Cache `artifact` and wake the outstanding waiter, if any.
    pub fn publish(&self, artifact: PairingArtifact) {
        let mut slot = self.slots.entry(artifact.session_id.clone()).or_default();
        if let Some(waiter) = slot.waiter.take() {
            let _ = waiter.send(artifact.clone());
        }
        slot.artifact = Some(artifact);
    }

    /// Polling form: the cached artifact, if any.
    pub fn peek(&self, session_id: &SessionId) -> Option<PairingArtifact> {
        self.slots.get(session_id).and_then(|s| s.artifact.clone())
    }

    /// Drop the cached artifact. A parked waiter keeps waiting for the next
    /// publish.
    pub fn clear(&self, session_id: &SessionId) {
        if let Some(mut slot) = self.slots.get_mut(session_id) {
            slot.artifact = None;
        }
        self.prune(session_id);
    }

    /// Forget the session entirely. A parked waiter observes
    /// [`PairingError::SessionClosed`].
    pub fn abandon(&self, session_id: &SessionId) {
        self.slots.remove(session_id);
    }

    /// Ids that currently have a cached artifact, sorted.
    pub fn available(&self) -> Vec<SessionId> {
        let mut ids: Vec<SessionId> = self
            .slots
            .iter()
            .filter(|s| s.artifact.is_some())
            .map(|s| s.key().clone())
            .collect();
        ids.sort();
        ids
    }

    pub fn is_waiting(&self, session_id: &SessionId) -> bool {
        self.slots
            .get(session_id)
            .is_some_and(|s| s.has_live_waiter())
    }

    fn prune(&self, session_id: &SessionId) {
        self.slots.remove_if(session_id, |_, slot| slot.is_empty());
    }
}
