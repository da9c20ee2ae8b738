//! Shared domain types for ChatBridge: session identity and state,
//! credential blobs, disconnect classification, configuration, the common
//! error type and structured trace events.

pub mod config;
pub mod error;
pub mod session;
pub mod trace;

pub use error::{Error, Result};
pub use session::{
    CredentialBlob, DisconnectReason, PairingArtifact, SessionId, SessionState,
};
