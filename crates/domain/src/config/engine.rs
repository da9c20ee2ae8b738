use serde::{Deserialize, Serialize};

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Protocol engine (bridge)
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Connection settings for the external protocol bridge.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// WebSocket endpoint of the protocol bridge. One connection is opened
    /// per session with `?session_id=<id>` appended.
    #[serde(default = "d_bridge_url")]
    pub bridge_url: String,
    /// Seconds to wait for `ready` after sending `open`.
    #[serde(default = "d_10")]
    pub handshake_timeout_secs: u64,
    /// Seconds to wait for a `send_result`.
    #[serde(default = "d_30")]
    pub send_timeout_secs: u64,
    /// Heartbeat ping interval.
    #[serde(default = "d_30")]
    pub heartbeat_secs: u64,
    /// Suffix marking a recipient already in the engine's address form.
    #[serde(default = "d_address_suffix")]
    pub address_suffix: String,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            bridge_url: d_bridge_url(),
            handshake_timeout_secs: d_10(),
            send_timeout_secs: d_30(),
            heartbeat_secs: d_30(),
            address_suffix: d_address_suffix(),
        }
    }
}

fn d_bridge_url() -> String {
    "ws://127.0.0.1:8085/sessions".into()
}
fn d_10() -> u64 {
    10
}
fn d_30() -> u64 {
    30
}
fn d_address_suffix() -> String {
    "@s.whatsapp.net".into()
}
