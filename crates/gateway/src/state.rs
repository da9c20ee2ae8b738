use std::sync::Arc;

use cb_domain::config::Config;
use cb_sessions::SessionManager;

use crate::api::cors::OriginPolicy;

/// Shared application state passed to all API handlers.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub sessions: Arc<SessionManager>,
    /// Compiled `[server.cors]` allow-list, shared by the CORS layer and the
    /// origin guard.
    pub origins: Arc<OriginPolicy>,
    /// SHA-256 hash of the API bearer token (read once at startup).
    /// `None` = dev mode (no auth enforced).
    pub api_token_hash: Option<Vec<u8>>,
}
