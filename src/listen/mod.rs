//! Live event streaming for webhooks and inbound routes.
//!
//! A session asks the API for a stream ([`initiator`]), dials its WebSocket
//! ([`connection`]), reads frames on a background task ([`pump`]) and hands
//! each one to the [`dispatch`]er, which prints it and optionally forwards a
//! signed copy to a local endpoint ([`forward`]).
//!
//! # Usage
//!
//! ```ignore
//! use ahasend::listen::{ApiClient, ListenOptions, Session, StreamKind, StreamTarget, TerminalPrompt};
//!
//! let options = ListenOptions::new(StreamKind::Routes, StreamTarget::Recipient("*@example.com".into()));
//! let api = ApiClient::new(&config.api_url, &config.api_key, &config.account_id)?;
//! let end = Session::new(options, &config.api_key)
//!     .run(&api, &TerminalPrompt, std::io::stdout(), cancel)
//!     .await?;
//! ```

pub mod connection;
pub mod dispatch;
pub mod forward;
pub mod initiator;
pub mod prompt;
pub mod pump;
pub mod session;
pub mod types;

#[doc(inline)]
pub use connection::{
    ConflictDecision, ConflictPolicy, ConnectError, Connection, ConnectionLink, ConnectionManager,
    ConnectionState, FixedDecision, ReadError,
};
#[doc(inline)]
pub use dispatch::{DispatchOutcome, EventDispatcher, EventFilter, RenderMode};
#[doc(inline)]
pub use forward::Forwarder;
#[doc(inline)]
pub use initiator::{ApiClient, StreamApi, StreamTarget};
#[doc(inline)]
pub use prompt::TerminalPrompt;
#[doc(inline)]
pub use pump::MessagePump;
#[doc(inline)]
pub use session::{ListenOptions, Session, SessionEnd};
#[doc(inline)]
pub use types::{Envelope, EnvelopeKind, Event, EventPayload, StreamHandle, StreamKind};
