use serde::{Deserialize, Serialize};

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Pairing
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PairingConfig {
    /// How long a blocking create (or `?wait=true`) waits for the first
    /// pairing code.
    #[serde(default = "d_wait_timeout_ms")]
    pub wait_timeout_ms: u64,

    /// Make `POST /session/create` block for the pairing code by default.
    #[serde(default)]
    pub block_on_create: bool,

    /// How pairing tokens are rendered for clients.
    #[serde(default)]
    pub format: ArtifactFormat,
}

impl Default for PairingConfig {
    fn default() -> Self {
        Self {
            wait_timeout_ms: d_wait_timeout_ms(),
            block_on_create: false,
            format: ArtifactFormat::default(),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ArtifactFormat {
    /// QR code as an `image/svg+xml` base64 data URL.
    #[default]
    SvgDataUrl,
    /// The raw token, for clients that render their own QR code.
    Text,
}

fn d_wait_timeout_ms() -> u64 {
    30_000
}
