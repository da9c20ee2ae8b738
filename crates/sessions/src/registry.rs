//! Session id → live engine handle.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use cb_domain::{SessionId, SessionState};
use cb_engine::EngineHandle;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::Serialize;

struct RegistryEntry {
    handle: Arc<dyn EngineHandle>,
    state: SessionState,
    connected_at: DateTime<Utc>,
    generation: u64,
}

/// Snapshot of one registered session.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionInfo {
    pub session_id: SessionId,
    pub state: SessionState,
    pub connected_at: DateTime<Utc>,
    /// Bumped every time the id gets a new handle (i.e. per reconnect).
    pub generation: u64,
}

/// Concurrent registry of live sessions.
///
/// An id maps to at most one handle. Entries are sharded, so lookups for
/// different sessions never contend on a global lock.
#[derive(Default)]
pub struct SessionRegistry {
    entries: DashMap<SessionId, RegistryEntry>,
    generations: AtomicU64,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `handle` for `session_id` in state `Connecting`.
    ///
    /// Returns the superseded handle, if any. The caller owns closing it.
    pub fn put(
        &self,
        session_id: SessionId,
        handle: Arc<dyn EngineHandle>,
    ) -> Option<Arc<dyn EngineHandle>> {
        let generation = self.generations.fetch_add(1, Ordering::Relaxed) + 1;
        tracing::debug!(session_id = %session_id, generation, "session handle registered");
        self.entries
            .insert(
                session_id,
                RegistryEntry {
                    handle,
                    state: SessionState::Connecting,
                    connected_at: Utc::now(),
                    generation,
                },
            )
            .map(|old| old.handle)
    }

    pub fn get(&self, session_id: &SessionId) -> Option<Arc<dyn EngineHandle>> {
        self.entries.get(session_id).map(|e| e.handle.clone())
    }

    pub fn remove(&self, session_id: &SessionId) -> Option<Arc<dyn EngineHandle>> {
        let removed = self.entries.remove(session_id).map(|(_, e)| e.handle);
        if removed.is_some() {
            tracing::debug!(session_id = %session_id, "session handle removed");
        }
        removed
    }

    /// Returns `false` when the session is not registered.
    pub fn set_state(&self, session_id: &SessionId, state: SessionState) -> bool {
        match self.entries.get_mut(session_id) {
            Some(mut entry) => {
                entry.state = state;
                true
            }
            None => false,
        }
    }

    pub fn state(&self, session_id: &SessionId) -> Option<SessionState> {
        self.entries.get(session_id).map(|e| e.state)
    }

    pub fn info(&self, session_id: &SessionId) -> Option<SessionInfo> {
        self.entries.get(session_id).map(|e| SessionInfo {
            session_id: session_id.clone(),
            state: e.state,
            connected_at: e.connected_at,
            generation: e.generation,
        })
    }

    /// All registered sessions, ordered by id.
    pub fn list(&self) -> Vec<SessionInfo> {
        let mut out: Vec<SessionInfo> = self
            .entries
            .iter()
            .map(|e| SessionInfo {
                session_id: e.key().clone(),
                state: e.state,
                connected_at: e.connected_at,
                generation: e.generation,
            })
            .collect();
        out.sort_by(|a, b| a.session_id.cmp(&b.session_id));
        out
    }

    pub fn ids(&self) -> Vec<SessionId> {
        self.entries.iter().map(|e| e.key().clone()).collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
