//! Time-derived session ids.

use std::sync::atomic::{AtomicU64, Ordering};

use cb_domain::SessionId;
use chrono::Utc;

/// Allocates strictly increasing millisecond-timestamp ids.
///
/// Two allocations in the same millisecond (or a clock step backwards) bump
/// the id past the last one handed out, so ids never repeat within a process.
#[derive(Debug, Default)]
pub struct SessionIdGenerator {
    last: AtomicU64,
}

impl SessionIdGenerator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn next_id(&self) -> SessionId {
        let now = Utc::now().timestamp_millis().max(0) as u64;
        let mut prev = self.last.load(Ordering::Relaxed);
        let id = loop {
            let candidate = now.max(prev + 1);
            match self
                .last
                .compare_exchange_weak(prev, candidate, Ordering::SeqCst, Ordering::Relaxed)
            {
                Ok(_) => break candidate,
                Err(actual) => prev = actual,
            }
        };
        // A decimal number always satisfies the id alphabet.
        SessionId::parse(id.to_string()).unwrap_or_else(|_| unreachable!("decimal session id"))
    }

    /// Record an id allocated elsewhere (e.g. found on disk) so later
    /// allocations stay above it. Non-numeric ids are ignored.
    pub fn observe(&self, id: &SessionId) {
        if let Ok(n) = id.as_str().parse::<u64>() {
            self.last.fetch_max(n, Ordering::SeqCst);
        }
    }
}
