//! `cb-engine`: the protocol engine boundary.
//!
//! The session manager never speaks the chat service's wire protocol
//! itself.  It asks a [`ProtocolEngine`] to open a connection from a
//! credential blob and then consumes the ordered [`EngineEvent`] stream that
//! comes back, sending outbound messages through the [`EngineHandle`].
//!
//! # Implementations
//!
//! - [`BridgeEngine`]: one WebSocket per session to an external protocol
//!   bridge process (see `cb-protocol` for the frames).
//! - [`MemoryEngine`]: in-process, scriptable engine used by tests and
//!   local development.
//!
//! ```text
//!   SessionManager ──open(id, creds)──▶ ProtocolEngine
//!        ▲                                   │
//!        │   EngineEvent stream (ordered)    │
//!        └───────────────────────────────────┘
//!   SessionManager ──send_text(addr, text)──▶ EngineHandle
//! ```

pub mod bridge;
pub mod memory;
pub mod types;

pub use bridge::{BridgeEngine, BridgeSettings};
pub use memory::{MemoryEngine, SentMessage};
pub use types::{EngineConnection, EngineError, EngineEvent, EngineHandle, ProtocolEngine};
