//! AppState construction extracted from `main.rs`.

use std::sync::Arc;

use anyhow::Context;

use cb_domain::config::{Config, ConfigSeverity};
use cb_engine::{BridgeEngine, BridgeSettings, ProtocolEngine};
use cb_sessions::{FsCredentialStore, SessionManager};

use crate::api::auth::hash_token;
use crate::api::cors::OriginPolicy;
use crate::state::AppState;

/// Validate config, wire the bridge engine and return a ready [`AppState`].
pub async fn build_app_state(config: Arc<Config>) -> anyhow::Result<AppState> {
    let engine = BridgeEngine::new(BridgeSettings::from(&config.engine));
    tracing::info!(bridge_url = %config.engine.bridge_url, "protocol bridge engine ready");
    build_app_state_with_engine(config, Arc::new(engine)).await
}

/// Same as [`build_app_state`] with a caller-supplied engine.
pub async fn build_app_state_with_engine(
    config: Arc<Config>,
    engine: Arc<dyn ProtocolEngine>,
) -> anyhow::Result<AppState> {
    // ── Config validation ────────────────────────────────────────────
    let issues = config.validate();
    for issue in &issues {
        match issue.severity {
            ConfigSeverity::Warning => tracing::warn!("config: {issue}"),
            ConfigSeverity::Error => tracing::error!("config: {issue}"),
        }
    }
    if issues.iter().any(|i| i.severity == ConfigSeverity::Error) {
        anyhow::bail!(
            "config validation failed with {} error(s)",
            issues
                .iter()
                .filter(|i| i.severity == ConfigSeverity::Error)
                .count()
        );
    }

    // ── Credential store ─────────────────────────────────────────────
    let store = FsCredentialStore::open(&config.sessions.dir)
        .await
        .with_context(|| format!("opening sessions dir {}", config.sessions.dir.display()))?;
    tracing::info!(path = %config.sessions.dir.display(), "credential store ready");

    // ── Session manager ──────────────────────────────────────────────
    let sessions = SessionManager::builder(engine, Arc::new(store))
        .config(&config)
        .build();

    if config.sessions.resume_on_start {
        let resumed = sessions
            .resume_all()
            .await
            .context("resuming sessions from disk")?;
        tracing::info!(resumed, "resumed persisted sessions");
    }

    // ── API token (read once, hash for constant-time comparison) ─────
    let api_token_hash = {
        let env_var = &config.server.api_token_env;
        match std::env::var(env_var).ok().filter(|t| !t.is_empty()) {
            Some(token) => {
                tracing::info!(source = %format!("env:{env_var}"), "API bearer-token auth enabled");
                Some(hash_token(&token))
            }
            None => {
                tracing::warn!("API bearer-token auth disabled, set the {env_var} env var");
                None
            }
        }
    };

    let origins = Arc::new(OriginPolicy::from_config(&config.server.cors));

    Ok(AppState {
        config,
        sessions,
        origins,
        api_token_hash,
    })
}
