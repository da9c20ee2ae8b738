//! Session identity, lifecycle state and the values that flow between the
//! protocol engine and the session manager.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Session id
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Maximum accepted length of a session id.
pub const MAX_SESSION_ID_LEN: usize = 128;

/// Opaque, unique session identifier.
///
/// Ids double as directory names in the credential store, so only ASCII
/// alphanumerics, `-` and `_` are accepted.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionId(String);

impl SessionId {
    /// Validate and wrap a raw id.
    pub fn parse(raw: impl Into<String>) -> Result<Self> {
        let raw = raw.into();
        let valid = !raw.is_empty()
            && raw.len() <= MAX_SESSION_ID_LEN
            && raw
                .bytes()
                .all(|b| b.is_ascii_alphanumeric() || b == b'-' || b == b'_');
        if valid {
            Ok(Self(raw))
        } else {
            Err(Error::InvalidSessionId(raw))
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for SessionId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Lifecycle state
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Where a session is in its connect → pair → open lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    Connecting,
    AwaitingPairing,
    Open,
    Closed,
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Connecting => "connecting",
            Self::AwaitingPairing => "awaiting_pairing",
            Self::Open => "open",
            Self::Closed => "closed",
        };
        f.write_str(s)
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Credentials
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Opaque persisted authentication state for one session.
///
/// The manager never interprets the contents beyond guaranteeing the
/// minimal structure the engine expects on first connect.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CredentialBlob(serde_json::Value);

impl CredentialBlob {
    pub fn new(value: serde_json::Value) -> Self {
        Self(value).normalized()
    }

    /// The blob handed to the engine for a session that has never paired.
    pub fn unregistered() -> Self {
        Self(serde_json::json!({
            "registered": false,
            "me": { "id": "", "name": "" },
        }))
    }

    /// Fill in `registered` and `me` when missing so an empty or partial
    /// blob is still structurally valid. Non-object values are replaced.
    pub fn normalized(self) -> Self {
        let mut value = match self.0 {
            serde_json::Value::Object(map) => map,
            _ => return Self::unregistered(),
        };
        value
            .entry("registered")
            .or_insert(serde_json::Value::Bool(false));
        value
            .entry("me")
            .or_insert_with(|| serde_json::json!({ "id": "", "name": "" }));
        Self(serde_json::Value::Object(value))
    }

    pub fn is_registered(&self) -> bool {
        self.0
            .get("registered")
            .and_then(|v| v.as_bool())
            .unwrap_or(false)
    }

    pub fn as_value(&self) -> &serde_json::Value {
        &self.0
    }

    pub fn into_value(self) -> serde_json::Value {
        self.0
    }
}

impl Default for CredentialBlob {
    fn default() -> Self {
        Self::unregistered()
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Pairing artifact
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// A rendered pairing code tied to one session. Single-use: dropped once the
/// session opens.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PairingArtifact {
    pub session_id: SessionId,
    pub payload: String,
    pub produced_at: DateTime<Utc>,
}

impl PairingArtifact {
    pub fn new(session_id: SessionId, payload: impl Into<String>) -> Self {
        Self {
            session_id,
            payload: payload.into(),
            produced_at: Utc::now(),
        }
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Disconnect classification
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Why the engine closed a connection.
///
/// Status codes follow the remote service's close codes; only
/// [`DisconnectReason::LoggedOut`] is terminal.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "reason", rename_all = "snake_case")]
pub enum DisconnectReason {
    /// Authorization revoked by the remote service (401).
    LoggedOut,
    /// Closed by the remote end (428).
    ConnectionClosed,
    /// Transport dropped (408), or the event stream ended without a close.
    ConnectionLost,
    /// Another client took over this session (440).
    ConnectionReplaced,
    /// Keep-alive or query timeout.
    TimedOut,
    /// Session state on the remote end is unusable (500).
    BadSession,
    /// The remote service asked for a fresh connection (515).
    RestartRequired,
    Other {
        code: Option<u16>,
        message: Option<String>,
    },
}

impl DisconnectReason {
    /// Classify a close status code as reported by the engine.
    pub fn from_status_code(code: Option<u16>, message: Option<String>) -> Self {
        match code {
            Some(401) => Self::LoggedOut,
            Some(428) => Self::ConnectionClosed,
            Some(408) => {
                let timed_out = message
                    .as_deref()
                    .is_some_and(|m| m.to_ascii_lowercase().contains("timed out"));
                if timed_out {
                    Self::TimedOut
                } else {
                    Self::ConnectionLost
                }
            }
            Some(440) => Self::ConnectionReplaced,
            Some(500) => Self::BadSession,
            Some(515) => Self::RestartRequired,
            code => Self::Other { code, message },
        }
    }

    /// A terminal close means the session must not be reconnected.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::LoggedOut)
    }
}

impl fmt::Display for DisconnectReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::LoggedOut => f.write_str("logged out"),
            Self::ConnectionClosed => f.write_str("connection closed"),
            Self::ConnectionLost => f.write_str("connection lost"),
            Self::ConnectionReplaced => f.write_str("connection replaced"),
            Self::TimedOut => f.write_str("timed out"),
            Self::BadSession => f.write_str("bad session"),
            Self::RestartRequired => f.write_str("restart required"),
            Self::Other { code, message } => {
                write!(f, "closed")?;
                if let Some(code) = code {
                    write!(f, " ({code})")?;
                }
                if let Some(message) = message {
                    write!(f, ": {message}")?;
                }
                Ok(())
            }
        }
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Tests
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
