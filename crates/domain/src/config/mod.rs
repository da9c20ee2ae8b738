mod engine;
mod observability;
mod pairing;
mod server;
mod sessions;

pub use engine::*;
pub use observability::*;
pub use pairing::*;
pub use server::*;
pub use sessions::*;

use serde::{Deserialize, Serialize};
use std::fmt;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Top-level config
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub sessions: SessionsConfig,
    #[serde(default)]
    pub pairing: PairingConfig,
    #[serde(default)]
    pub engine: EngineConfig,
    #[serde(default)]
    pub observability: ObservabilityConfig,
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Config validation
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Severity level for a configuration issue.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigSeverity {
    Error,
    Warning,
}

/// A single configuration validation issue.
#[derive(Debug, Clone)]
pub struct ConfigError {
    pub severity: ConfigSeverity,
    pub field: String,
    pub message: String,
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let tag = match self.severity {
            ConfigSeverity::Error => "ERROR",
            ConfigSeverity::Warning => "WARN",
        };
        write!(f, "[{tag}] {}: {}", self.field, self.message)
    }
}

impl Config {
    /// Validate the configuration and return a list of issues.
    ///
    /// Returns an empty vec when everything looks good.
    pub fn validate(&self) -> Vec<ConfigError> {
        let mut errors = Vec::new();

        // Server port must be non-zero.
        if self.server.port == 0 {
            errors.push(ConfigError {
                severity: ConfigSeverity::Error,
                field: "server.port".into(),
                message: "port must be greater than 0".into(),
            });
        }

        // Server host must not be empty.
        if self.server.host.is_empty() {
            errors.push(ConfigError {
                severity: ConfigSeverity::Error,
                field: "server.host".into(),
                message: "host must not be empty".into(),
            });
        }

        if self.server.max_concurrent_requests == 0 {
            errors.push(ConfigError {
                severity: ConfigSeverity::Error,
                field: "server.max_concurrent_requests".into(),
                message: "must be greater than 0".into(),
            });
        }

        if let Some(rl) = &self.server.rate_limit {
            if rl.requests_per_second == 0 || rl.burst_size == 0 {
                errors.push(ConfigError {
                    severity: ConfigSeverity::Error,
                    field: "server.rate_limit".into(),
                    message: "requests_per_second and burst_size must be > 0".into(),
                });
            }
        }

        // CORS: warn if wildcard is used.
        if self.server.cors.allowed_origins.len() == 1
            && self.server.cors.allowed_origins[0] == "*"
        {
            errors.push(ConfigError {
                severity: ConfigSeverity::Warning,
                field: "server.cors.allowed_origins".into(),
                message: "wildcard \"*\" allows all origins (not recommended for production)".into(),
            });
        }

        if self.sessions.dir.as_os_str().is_empty() {
            errors.push(ConfigError {
                severity: ConfigSeverity::Error,
                field: "sessions.dir".into(),
                message: "sessions directory must not be empty".into(),
            });
        }

        let rc = &self.sessions.reconnect;
        if rc.backoff_factor < 1.0 {
            errors.push(ConfigError {
                severity: ConfigSeverity::Error,
                field: "sessions.reconnect.backoff_factor".into(),
                message: "backoff_factor must be >= 1.0".into(),
            });
        }
        if rc.initial_delay_ms == 0 && rc.max_attempts == 0 {
            errors.push(ConfigError {
                severity: ConfigSeverity::Warning,
                field: "sessions.reconnect".into(),
                message: "sessions reconnect immediately and without limit after every \
                          transient close; set initial_delay_ms or max_attempts if the \
                          remote service rate-limits"
                    .into(),
            });
        }

        if self.pairing.wait_timeout_ms == 0 {
            errors.push(ConfigError {
                severity: ConfigSeverity::Warning,
                field: "pairing.wait_timeout_ms".into(),
                message: "blocking waits for a pairing code will always time out".into(),
            });
        }

        let url = self.engine.bridge_url.as_str();
        if !(url.starts_with("ws://") || url.starts_with("wss://")) {
            errors.push(ConfigError {
                severity: ConfigSeverity::Error,
                field: "engine.bridge_url".into(),
                message: "bridge_url must be a ws:// or wss:// URL".into(),
            });
        }

        if self.engine.address_suffix.is_empty() || !self.engine.address_suffix.starts_with('@') {
            errors.push(ConfigError {
                severity: ConfigSeverity::Error,
                field: "engine.address_suffix".into(),
                message: "address_suffix must start with '@'".into(),
            });
        }

        if !self.observability.sample_rate_is_valid() {
            errors.push(ConfigError {
                severity: ConfigSeverity::Error,
                field: "observability.sample_rate".into(),
                message: "sample_rate must be between 0.0 and 1.0".into(),
            });
        }

        errors
    }
}
