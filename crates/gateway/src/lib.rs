//! ChatBridge gateway: HTTP control plane for messaging-protocol sessions.

pub mod api;
pub mod bootstrap;
pub mod cli;
pub mod state;
