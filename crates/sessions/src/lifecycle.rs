//! Per-connection session state machine.
//!
//! `apply` is a pure transition over `(state, event)`: it updates the state
//! and returns the side effects the driver must run, in order. Nothing here
//! touches the network, the disk or the registry, so reconnect and logout
//! handling can be tested without a live engine.

use cb_domain::config::ArtifactPolicy;
use cb_domain::{CredentialBlob, DisconnectReason, SessionState};
use cb_engine::EngineEvent;

/// Side effect requested by a transition.
#[derive(Debug, Clone, PartialEq)]
pub enum Effect {
    /// Render the token and publish it as the session's pairing artifact.
    PublishPairingToken(String),
    /// Write the blob to the credential store before handling anything else.
    PersistCredentials(CredentialBlob),
    /// Drop the cached pairing artifact.
    ClearArtifact,
    /// Transient close: reopen the same session from persisted credentials.
    Reconnect(DisconnectReason),
    /// Terminal close: tear the session down, keep its credentials.
    Terminate(DisconnectReason),
}

#[derive(Debug, Clone)]
pub struct SessionMachine {
    state: SessionState,
    credentials: CredentialBlob,
    policy: ArtifactPolicy,
}

impl SessionMachine {
    pub fn new(credentials: CredentialBlob, policy: ArtifactPolicy) -> Self {
        Self {
            state: SessionState::Connecting,
            credentials,
            policy,
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn credentials(&self) -> &CredentialBlob {
        &self.credentials
    }

    pub fn apply(&mut self, event: EngineEvent) -> Vec<Effect> {
        if self.state == SessionState::Closed {
            return Vec::new();
        }

        match event {
            EngineEvent::PairingToken(token) => {
                if self.state == SessionState::Open {
                    return Vec::new();
                }
                self.state = SessionState::AwaitingPairing;
                vec![Effect::PublishPairingToken(token)]
            }

            EngineEvent::Opened => {
                self.state = SessionState::Open;
                vec![
                    Effect::PersistCredentials(self.credentials.clone()),
                    Effect::ClearArtifact,
                ]
            }

            EngineEvent::CredentialsChanged(blob) => {
                self.credentials = blob.normalized();
                vec![Effect::PersistCredentials(self.credentials.clone())]
            }

            EngineEvent::Closed(reason) if reason.is_terminal() => {
                self.state = SessionState::Closed;
                vec![Effect::ClearArtifact, Effect::Terminate(reason)]
            }

            EngineEvent::Closed(reason) => {
                self.state = SessionState::Connecting;
                match self.policy {
                    ArtifactPolicy::ClearOnOpen => vec![Effect::Reconnect(reason)],
                    ArtifactPolicy::ClearOnReconnect => {
                        vec![Effect::ClearArtifact, Effect::Reconnect(reason)]
                    }
                }
            }
        }
    }
}
