use serde::Serialize;

/// Structured trace events emitted across all ChatBridge crates.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "event")]
pub enum TraceEvent {
    SessionCreated {
        session_id: String,
        resumed: bool,
    },
    PairingArtifactPublished {
        session_id: String,
        payload_chars: usize,
    },
    SessionOpened {
        session_id: String,
    },
    CredentialsPersisted {
        session_id: String,
        registered: bool,
    },
    SessionReconnecting {
        session_id: String,
        reason: String,
        attempt: u32,
        delay_ms: u64,
    },
    SessionClosed {
        session_id: String,
        reason: String,
    },
    MessageSent {
        session_id: String,
        duration_ms: u64,
    },
}

impl TraceEvent {
    pub fn emit(&self) {
        let json = serde_json::to_string(self).unwrap_or_default();
        tracing::info!(trace_event = %json, "cb_event");
    }
}
