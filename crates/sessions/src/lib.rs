//! Session lifecycle management for ChatBridge.
//!
//! Owns everything between the HTTP surface and the protocol engine:
//! credential persistence, the registry of live connections, pairing-code
//! hand-off, the per-session state machine and the driver task that runs
//! it, reconnect policy and id allocation.

pub mod credentials;
pub mod error;
pub mod id;
pub mod lifecycle;
pub mod manager;
pub mod pairing;
pub mod reconnect;
pub mod registry;
pub mod render;

pub use credentials::{CredentialStore, FsCredentialStore};
pub use error::SessionError;
pub use id::SessionIdGenerator;
pub use lifecycle::{Effect, SessionMachine};
pub use manager::{SessionManager, SessionManagerBuilder};
pub use pairing::{PairingCoordinator, PairingError};
pub use reconnect::ReconnectBackoff;
pub use registry::{SessionInfo, SessionRegistry};
pub use render::{renderer_for, PairingRenderer, QrSvgRenderer, TextRenderer};
