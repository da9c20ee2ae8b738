//! Session lifecycle manager.
//!
//! Owns the registry, the pairing coordinator and one driver task per
//! session. A driver consumes its connection's event stream strictly in
//! order, feeds each event through [`SessionMachine`] and runs the resulting
//! effects one at a time. Transient closes loop back into a reconnect of the
//! same session id; a logout ends the driver.

use std::sync::Arc;
use std::time::{Duration, Instant};

use cb_domain::config::{ArtifactPolicy, Config};
use cb_domain::trace::TraceEvent;
use cb_domain::{CredentialBlob, DisconnectReason, PairingArtifact, SessionId, SessionState};
use cb_engine::{EngineEvent, EngineHandle, ProtocolEngine};
use cb_protocol::{normalize_address, DEFAULT_ADDRESS_SUFFIX};
use dashmap::DashMap;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::credentials::CredentialStore;
use crate::error::SessionError;
use crate::id::SessionIdGenerator;
use crate::lifecycle::{Effect, SessionMachine};
use crate::pairing::{PairingCoordinator, PairingError};
use crate::reconnect::ReconnectBackoff;
use crate::registry::{SessionInfo, SessionRegistry};
use crate::render::{PairingRenderer, QrSvgRenderer};

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Builder
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Fluent builder for [`SessionManager`].
pub struct SessionManagerBuilder {
    engine: Arc<dyn ProtocolEngine>,
    store: Arc<dyn CredentialStore>,
    renderer: Arc<dyn PairingRenderer>,
    artifact_policy: ArtifactPolicy,
    backoff: ReconnectBackoff,
    address_suffix: String,
}

impl SessionManagerBuilder {
    pub fn new(engine: Arc<dyn ProtocolEngine>, store: Arc<dyn CredentialStore>) -> Self {
        Self {
            engine,
            store,
            renderer: Arc::new(QrSvgRenderer::default()),
            artifact_policy: ArtifactPolicy::default(),
            backoff: ReconnectBackoff::default(),
            address_suffix: DEFAULT_ADDRESS_SUFFIX.to_owned(),
        }
    }

    /// Apply the `[sessions]`, `[pairing]` and `[engine]` settings.
    pub fn config(self, config: &Config) -> Self {
        self.renderer(crate::render::renderer_for(config.pairing.format))
            .artifact_policy(config.sessions.artifact_policy)
            .reconnect(ReconnectBackoff::from(&config.sessions.reconnect))
            .address_suffix(config.engine.address_suffix.clone())
    }

    pub fn renderer(mut self, renderer: Arc<dyn PairingRenderer>) -> Self {
        self.renderer = renderer;
        self
    }

    pub fn artifact_policy(mut self, policy: ArtifactPolicy) -> Self {
        self.artifact_policy = policy;
        self
    }

    pub fn reconnect(mut self, backoff: ReconnectBackoff) -> Self {
        self.backoff = backoff;
        self
    }

    pub fn address_suffix(mut self, suffix: impl Into<String>) -> Self {
        self.address_suffix = suffix.into();
        self
    }

    pub fn build(self) -> Arc<SessionManager> {
        Arc::new(SessionManager {
            engine: self.engine,
            store: self.store,
            renderer: self.renderer,
            artifact_policy: self.artifact_policy,
            backoff: self.backoff,
            address_suffix: self.address_suffix,
            registry: SessionRegistry::new(),
            pairing: PairingCoordinator::new(),
            ids: SessionIdGenerator::new(),
            drivers: DashMap::new(),
            shutdown: CancellationToken::new(),
        })
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Manager
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

pub struct SessionManager {
    engine: Arc<dyn ProtocolEngine>,
    store: Arc<dyn CredentialStore>,
    renderer: Arc<dyn PairingRenderer>,
    artifact_policy: ArtifactPolicy,
    backoff: ReconnectBackoff,
    address_suffix: String,
    registry: SessionRegistry,
    pairing: PairingCoordinator,
    ids: SessionIdGenerator,
    /// Cancellation token of every running driver.
    drivers: DashMap<SessionId, CancellationToken>,
    shutdown: CancellationToken,
}

/// How a connection's event loop ended.
enum Outcome {
    Reconnect(DisconnectReason),
    Terminate(DisconnectReason),
    Cancelled,
}

impl SessionManager {
    pub fn builder(
        engine: Arc<dyn ProtocolEngine>,
        store: Arc<dyn CredentialStore>,
    ) -> SessionManagerBuilder {
        SessionManagerBuilder::new(engine, store)
    }

    pub fn registry(&self) -> &SessionRegistry {
        &self.registry
    }

    // ── Create / resume ──────────────────────────────────────────────

    /// Create a new session and start connecting it.
    ///
    /// Returns as soon as the engine accepted the connection; pairing
    /// progress is observable through [`wait_for_pairing`](Self::wait_for_pairing).
    pub async fn create(self: &Arc<Self>) -> Result<SessionId, SessionError> {
        let session_id = self.ids.next_id();
        self.start(session_id.clone(), false).await?;
        Ok(session_id)
    }

    /// Reopen every session that has credentials on disk. Sessions that
    /// are already running are skipped. Returns how many were started.
    pub async fn resume_all(self: &Arc<Self>) -> Result<usize, SessionError> {
        let ids = self.store.list().await?;
        let mut started = 0;
        for session_id in ids {
            self.ids.observe(&session_id);
            if self.drivers.contains_key(&session_id) {
                continue;
            }
            match self.start(session_id.clone(), true).await {
                Ok(()) => started += 1,
                Err(e) => {
                    tracing::warn!(session_id = %session_id, error = %e, "failed to resume session");
                }
            }
        }
        tracing::info!(resumed = started, "session resume complete");
        Ok(started)
    }

    async fn start(self: &Arc<Self>, session_id: SessionId, resumed: bool) -> Result<(), SessionError> {
        self.store.ensure_exists(&session_id).await?;
        let credentials = self.store.load(&session_id).await?;
        let conn = self
            .engine
            .open(&session_id, credentials.clone())
            .await
            .map_err(SessionError::connect)?;

        let cancel = self.shutdown.child_token();
        self.drivers.insert(session_id.clone(), cancel.clone());
        if let Some(old) = self.registry.put(session_id.clone(), conn.handle.clone()) {
            old.close();
        }

        TraceEvent::SessionCreated {
            session_id: session_id.to_string(),
            resumed,
        }
        .emit();

        let manager = Arc::clone(self);
        tokio::spawn(manager.drive(session_id, conn.handle, conn.events, credentials, cancel));
        Ok(())
    }

    // ── Driver ───────────────────────────────────────────────────────

    async fn drive(
        self: Arc<Self>,
        session_id: SessionId,
        mut handle: Arc<dyn EngineHandle>,
        mut events: mpsc::Receiver<EngineEvent>,
        credentials: CredentialBlob,
        cancel: CancellationToken,
    ) {
        let mut machine = SessionMachine::new(credentials, self.artifact_policy);
        // Consecutive failed opens; any successful open resets it.
        let mut attempt: u32 = 0;

        loop {
            let outcome = self
                .run_connection(&session_id, &mut machine, &mut events, &cancel)
                .await;

            let reason = match outcome {
                Outcome::Cancelled => {
                    handle.close();
                    return;
                }
                Outcome::Terminate(reason) => {
                    tracing::warn!(
                        session_id = %session_id,
                        error = %SessionError::TerminalLogout(session_id.clone()),
                        "session ended by remote logout, credentials kept"
                    );
                    self.finish(&session_id, &reason.to_string());
                    handle.close();
                    return;
                }
                Outcome::Reconnect(reason) => reason,
            };

            // The superseded handle goes away before the replacement opens.
            handle.close();
            self.registry.remove(&session_id);

            match self.reconnect(&session_id, &reason, &cancel, &mut attempt).await {
                Some((new_handle, new_events, credentials)) => {
                    handle = new_handle;
                    events = new_events;
                    machine = SessionMachine::new(credentials, self.artifact_policy);
                }
                None => return,
            }
        }
    }

    /// Consume one connection's events until it closes or the driver is
    /// cancelled.
    async fn run_connection(
        &self,
        session_id: &SessionId,
        machine: &mut SessionMachine,
        events: &mut mpsc::Receiver<EngineEvent>,
        cancel: &CancellationToken,
    ) -> Outcome {
        loop {
            let event = tokio::select! {
                biased;
                _ = cancel.cancelled() => return Outcome::Cancelled,
                event = events.recv() => event,
            };
            // Torn down while the event was in flight.
            if cancel.is_cancelled() {
                return Outcome::Cancelled;
            }
            // A stream that ends without a close event is a lost connection.
            let event = event.unwrap_or(EngineEvent::Closed(DisconnectReason::ConnectionLost));
            let before = machine.state();

            let mut outcome = None;
            for effect in machine.apply(event) {
                match effect {
                    Effect::PublishPairingToken(token) => {
                        self.publish_token(session_id, &token, cancel)
                    }
                    Effect::PersistCredentials(blob) => {
                        if let Err(e) = self.store.save(session_id, &blob).await {
                            tracing::error!(
                                session_id = %session_id,
                                error = %SessionError::from(e),
                                "failed to persist credentials"
                            );
                        }
                    }
                    Effect::ClearArtifact => self.pairing.clear(session_id),
                    Effect::Reconnect(reason) => outcome = Some(Outcome::Reconnect(reason)),
                    Effect::Terminate(reason) => outcome = Some(Outcome::Terminate(reason)),
                }
            }

            let after = machine.state();
            if self.registry.set_state(session_id, after)
                && before != SessionState::Open
                && after == SessionState::Open
            {
                TraceEvent::SessionOpened {
                    session_id: session_id.to_string(),
                }
                .emit();
            }

            if let Some(outcome) = outcome {
                return outcome;
            }
        }
    }

    fn publish_token(&self, session_id: &SessionId, token: &str, cancel: &CancellationToken) {
        match self.renderer.render(token) {
            Ok(payload) => {
                TraceEvent::PairingArtifactPublished {
                    session_id: session_id.to_string(),
                    payload_chars: payload.len(),
                }
                .emit();
                self.pairing
                    .publish(PairingArtifact::new(session_id.clone(), payload));
                // `finish` cancels before it abandons, so either it runs after
                // this publish or the token is already cancelled here.
                if cancel.is_cancelled() {
                    self.pairing.abandon(session_id);
                }
            }
            Err(e) => {
                tracing::warn!(session_id = %session_id, error = %e, "dropping unrenderable pairing token");
            }
        }
    }

    /// Reopen `session_id` from its persisted credentials, backing off
    /// between failed attempts. `attempt` counts consecutive failed opens
    /// and is reset once an open succeeds, so a session that reconnects
    /// fine but keeps closing before pairing is never delayed or given up
    /// on. `None` means the driver must stop.
    async fn reconnect(
        &self,
        session_id: &SessionId,
        reason: &DisconnectReason,
        cancel: &CancellationToken,
        attempt: &mut u32,
    ) -> Option<(Arc<dyn EngineHandle>, mpsc::Receiver<EngineEvent>, CredentialBlob)> {
        loop {
            if self.backoff.should_give_up(*attempt) {
                tracing::error!(
                    session_id = %session_id,
                    attempts = *attempt,
                    "giving up on reconnect"
                );
                self.finish(session_id, "reconnect attempts exhausted");
                return None;
            }

            let delay = self.backoff.delay_for_attempt(*attempt);
            TraceEvent::SessionReconnecting {
                session_id: session_id.to_string(),
                reason: reason.to_string(),
                attempt: *attempt + 1,
                delay_ms: delay.as_millis() as u64,
            }
            .emit();
            *attempt += 1;

            if !delay.is_zero() {
                tokio::select! {
                    _ = tokio::time::sleep(delay) => {}
                    _ = cancel.cancelled() => return None,
                }
            }
            if cancel.is_cancelled() {
                return None;
            }

            let credentials = match self.store.load(session_id).await {
                Ok(c) => c,
                Err(e) => {
                    tracing::warn!(session_id = %session_id, error = %e, "reconnect: failed to load credentials");
                    continue;
                }
            };
            let conn = match self.engine.open(session_id, credentials.clone()).await {
                Ok(conn) => conn,
                Err(e) => {
                    tracing::warn!(
                        session_id = %session_id,
                        error = %SessionError::connect(e),
                        "reconnect attempt failed"
                    );
                    continue;
                }
            };

            if let Some(old) = self.registry.put(session_id.clone(), conn.handle.clone()) {
                old.close();
            }
            // A teardown that raced the open must not leave the new handle behind.
            if cancel.is_cancelled() {
                self.registry.remove(session_id);
                conn.handle.close();
                return None;
            }

            tracing::info!(session_id = %session_id, attempts = *attempt, "session reconnected");
            *attempt = 0;
            return Some((conn.handle, conn.events, credentials));
        }
    }

    /// Drop every trace of a session except its credentials.
    fn finish(&self, session_id: &SessionId, reason: &str) {
        if let Some((_, cancel)) = self.drivers.remove(session_id) {
            cancel.cancel();
        }
        if let Some(handle) = self.registry.remove(session_id) {
            handle.close();
        }
        self.pairing.abandon(session_id);

        TraceEvent::SessionClosed {
            session_id: session_id.to_string(),
            reason: reason.to_owned(),
        }
        .emit();
    }

    // ── Queries ──────────────────────────────────────────────────────

    /// Whether the session is registered or has a running driver.
    pub fn contains(&self, session_id: &SessionId) -> bool {
        self.registry.get(session_id).is_some() || self.drivers.contains_key(session_id)
    }

    /// Current state. A session between connections reports `Connecting`.
    pub fn status(&self, session_id: &SessionId) -> Result<SessionState, SessionError> {
        if let Some(state) = self.registry.state(session_id) {
            return Ok(state);
        }
        if self.drivers.contains_key(session_id) {
            return Ok(SessionState::Connecting);
        }
        Err(SessionError::SessionNotFound(session_id.clone()))
    }

    /// Registered sessions, ordered by id.
    pub fn list(&self) -> Vec<SessionInfo> {
        self.registry.list()
    }

    /// Polling form of the pairing artifact.
    pub fn pairing_artifact(&self, session_id: &SessionId) -> Option<PairingArtifact> {
        self.pairing.peek(session_id)
    }

    /// Ids with a cached pairing artifact.
    pub fn available_artifacts(&self) -> Vec<SessionId> {
        self.pairing.available()
    }

    /// Wait up to `timeout` for the pairing artifact of a known session.
    pub async fn wait_for_pairing(
        &self,
        session_id: &SessionId,
        timeout: Duration,
    ) -> Result<PairingArtifact, SessionError> {
        if self.pairing.peek(session_id).is_none() && !self.contains(session_id) {
            return Err(SessionError::SessionNotFound(session_id.clone()));
        }
        self.pairing
            .await_artifact(session_id, timeout)
            .await
            .map_err(|e| match e {
                PairingError::Timeout => SessionError::PairingTimeout(session_id.clone()),
                PairingError::WaitInProgress => {
                    SessionError::PairingWaitInProgress(session_id.clone())
                }
                PairingError::SessionClosed => SessionError::SessionClosed(session_id.clone()),
            })
    }

    // ── Commands ─────────────────────────────────────────────────────

    /// Send `text` to `recipient` through the session's live connection.
    pub async fn send(
        &self,
        session_id: &SessionId,
        recipient: &str,
        text: &str,
    ) -> Result<(), SessionError> {
        let handle = self
            .registry
            .get(session_id)
            .ok_or_else(|| SessionError::SessionNotFound(session_id.clone()))?;

        let recipient = recipient.trim();
        if recipient.is_empty() {
            return Err(SessionError::InvalidRecipient(recipient.to_owned()));
        }
        let address = normalize_address(recipient, &self.address_suffix);

        let started = Instant::now();
        handle
            .send_text(&address, text)
            .await
            .map_err(SessionError::send)?;

        TraceEvent::MessageSent {
            session_id: session_id.to_string(),
            duration_ms: started.elapsed().as_millis() as u64,
        }
        .emit();
        Ok(())
    }

    /// Stop the session's driver and close its connection. Credentials stay
    /// on disk, so the session can be resumed later.
    pub fn teardown(&self, session_id: &SessionId) -> Result<(), SessionError> {
        if !self.contains(session_id) {
            return Err(SessionError::SessionNotFound(session_id.clone()));
        }
        self.finish(session_id, "torn down");
        Ok(())
    }

    /// Stop every driver and close every connection.
    pub fn shutdown(&self) {
        self.shutdown.cancel();
        let ids: Vec<SessionId> = self
            .drivers
            .iter()
            .map(|d| d.key().clone())
            .chain(self.registry.ids())
            .collect();
        for session_id in ids {
            self.drivers.remove(&session_id);
            if let Some(handle) = self.registry.remove(&session_id) {
                handle.close();
            }
            self.pairing.abandon(&session_id);
        }
        tracing::info!("session manager stopped");
    }
}
