use std::path::PathBuf;

use serde::{Deserialize, Serialize};

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Sessions
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionsConfig {
    /// Root directory holding one credential directory per session.
    #[serde(default = "d_sessions_dir")]
    pub dir: PathBuf,

    /// Reopen every session found under `dir` when the server starts.
    #[serde(default)]
    pub resume_on_start: bool,

    /// When a cached pairing artifact is dropped.
    #[serde(default)]
    pub artifact_policy: ArtifactPolicy,

    #[serde(default)]
    pub reconnect: ReconnectConfig,
}

impl Default for SessionsConfig {
    fn default() -> Self {
        Self {
            dir: d_sessions_dir(),
            resume_on_start: false,
            artifact_policy: ArtifactPolicy::default(),
            reconnect: ReconnectConfig::default(),
        }
    }
}

/// When the cached pairing artifact for a session is invalidated.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ArtifactPolicy {
    /// Drop only once the session opens (or is torn down). A stale code may
    /// be served between a transient close and the next pairing token.
    #[default]
    ClearOnOpen,
    /// Additionally drop on every transient close that triggers a reconnect.
    ClearOnReconnect,
}

/// Reconnect behaviour after a non-terminal close.
///
/// The first attempt after a close waits `initial_delay_ms` (0 = immediate);
/// each consecutive failed attempt waits `retry_delay_ms * backoff_factor^(n-1)`
/// capped at `max_delay_ms`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReconnectConfig {
    #[serde(default)]
    pub initial_delay_ms: u64,
    #[serde(default = "d_retry_delay_ms")]
    pub retry_delay_ms: u64,
    #[serde(default = "d_max_delay_ms")]
    pub max_delay_ms: u64,
    #[serde(default = "d_backoff_factor")]
    pub backoff_factor: f64,
    /// Consecutive failed attempts before the session is torn down.
    /// `0` means unlimited.
    #[serde(default)]
    pub max_attempts: u32,
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        Self {
            initial_delay_ms: 0,
            retry_delay_ms: d_retry_delay_ms(),
            max_delay_ms: d_max_delay_ms(),
            backoff_factor: d_backoff_factor(),
            max_attempts: 0,
        }
    }
}

fn d_sessions_dir() -> PathBuf {
    PathBuf::from("./sessions")
}
fn d_retry_delay_ms() -> u64 {
    1_000
}
fn d_max_delay_ms() -> u64 {
    60_000
}
fn d_backoff_factor() -> f64 {
    2.0
}
