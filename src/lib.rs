//! AhaSend CLI - live event streaming for webhooks and inbound routes.
//!
//! The `listen` subsystem opens a server-side event stream over WebSocket,
//! prints each event as it arrives and can forward a signed copy of every
//! payload to a local HTTP endpoint for development.
//!
//! # Modules
//!
//! - [`listen`] - Stream initiation, connection, read loop, dispatch and forwarding
//! - [`signing`] - Webhook-style HMAC signatures for forwarded events
//! - [`ws`] - Thin WebSocket client over tokio-tungstenite
//! - [`config`] - Configuration loading/saving
//! - [`commands`] - CLI subcommand implementations

pub mod commands;
pub mod config;
pub mod constants;
pub mod env;
pub mod listen;
pub mod signing;
pub mod ws;

// Re-export commonly used types
pub use config::Config;
pub use listen::{ListenOptions, Session, SessionEnd, StreamKind, StreamTarget};
pub use signing::Signer;
