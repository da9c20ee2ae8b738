//! Bridge protocol: WebSocket message types exchanged with the external
//! protocol bridge, plus the recipient address form the bridge expects.
//!
//! One WebSocket carries exactly one session.  The gateway opens it with
//! `open`, the bridge answers `ready`, and from then on the bridge streams
//! lifecycle frames (`qr`, `connection_open`, `connection_close`,
//! `creds_update`) while the gateway pushes `send_text` requests.

use cb_domain::CredentialBlob;
use serde::{Deserialize, Serialize};

/// Bumped on any breaking change to [`BridgeMessage`].
pub const PROTOCOL_VERSION: u32 = 1;

/// Inbound frames larger than this are dropped before parsing.
pub const MAX_FRAME_BYTES: usize = 1024 * 1024;

/// Default suffix of a user address on the remote service.
pub const DEFAULT_ADDRESS_SUFFIX: &str = "@s.whatsapp.net";

/// WebSocket message envelope.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum BridgeMessage {
    /// Gateway → Bridge: start a protocol session with these credentials.
    Open {
        protocol_version: u32,
        session_id: String,
        credentials: CredentialBlob,
    },

    /// Bridge → Gateway: `open` accepted, lifecycle frames follow.
    Ready { bridge_version: String },

    /// Bridge → Gateway: a fresh pairing token is available.
    Qr { token: String },

    /// Bridge → Gateway: the protocol session is authenticated and live.
    ConnectionOpen,

    /// Bridge → Gateway: the protocol session ended.
    ConnectionClose {
        #[serde(default)]
        status_code: Option<u16>,
        #[serde(default)]
        message: Option<String>,
    },

    /// Bridge → Gateway: credentials changed and must be persisted.
    CredsUpdate { credentials: CredentialBlob },

    /// Gateway → Bridge: deliver a text message.
    SendText {
        request_id: String,
        to: String,
        text: String,
    },

    /// Bridge → Gateway: outcome of a `send_text`.
    SendResult {
        request_id: String,
        ok: bool,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        error: Option<String>,
    },

    /// Gateway → Bridge: tear the protocol session down.
    Close,

    /// Bidirectional: heartbeat.
    Ping { timestamp: i64 },

    /// Bidirectional: heartbeat response.
    Pong { timestamp: i64 },
}

/// Normalize a recipient into the remote service's address form.
///
/// A recipient that already carries `suffix` is returned unchanged;
/// anything else gets the suffix appended.
pub fn normalize_address(recipient: &str, suffix: &str) -> String {
    let recipient = recipient.trim();
    if recipient.contains(suffix) {
        recipient.to_owned()
    } else {
        format!("{recipient}{suffix}")
    }
}
