//! Connection lifecycle for one stream WebSocket.
//!
//! # State machine
//!
//! ```text
//!   Disconnected ──connect──► Connecting ──101──► Connected ──close/read error──► Closed
//!        ▲                        │                   │
//!        │ abort                  │ 409               └──close()──► Closing ──► Closed
//!        │                        ▼
//!        └─────────────────── ConflictPending ──force──► Connecting
//! ```
//!
//! The API key travels as the `api_secret_key` query parameter. A `409`
//! handshake reply means another listener holds the stream; the manager
//! asks a [`ConflictPolicy`] whether to reconnect with
//! `force_reconnect=true` (evicting the other listener) or abort. The
//! manager itself never touches the terminal.
//!
//! Server pings are answered immediately. Close frames are logged and end
//! the connection; there is no automatic reconnect.

// Rust guideline compliant 2026-02

use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::Mutex;

use super::types::StreamHandle;
use crate::constants::{self, CLEAN_CLOSE_CODES, WS_API_KEY_PARAM, WS_FORCE_RECONNECT_PARAM};
use crate::ws::{self, WsError, WsMessage, WsReader, WsWriter};

/// Lifecycle state of the stream connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ConnectionState {
    /// No connection attempt in progress.
    Disconnected = 0,
    /// Handshake in flight.
    Connecting = 1,
    /// Server reported another listener; waiting for a decision.
    ConflictPending = 2,
    /// Handshake complete, frames flowing.
    Connected = 3,
    /// Local close frame sent.
    Closing = 4,
    /// Connection finished; reads fail fast.
    Closed = 5,
}

impl ConnectionState {
    fn from_u8(raw: u8) -> Self {
        match raw {
            1 => Self::Connecting,
            2 => Self::ConflictPending,
            3 => Self::Connected,
            4 => Self::Closing,
            5 => Self::Closed,
            _ => Self::Disconnected,
        }
    }

    /// `Closing` or `Closed`.
    #[must_use]
    pub fn is_shutting_down(self) -> bool {
        matches!(self, Self::Closing | Self::Closed)
    }
}

/// Shared atomic holder for [`ConnectionState`].
#[derive(Debug)]
struct StateCell(AtomicU8);

impl StateCell {
    fn new(state: ConnectionState) -> Self {
        Self(AtomicU8::new(state as u8))
    }

    fn get(&self) -> ConnectionState {
        ConnectionState::from_u8(self.0.load(Ordering::SeqCst))
    }

    fn set(&self, state: ConnectionState) {
        self.0.store(state as u8, Ordering::SeqCst);
    }

    /// Move `from → to`; `false` if the current state was not `from`.
    fn transition(&self, from: ConnectionState, to: ConnectionState) -> bool {
        self.0
            .compare_exchange(from as u8, to as u8, Ordering::SeqCst, Ordering::SeqCst)
            .is_ok()
    }
}

/// Failure to establish the stream connection.
#[derive(Debug)]
pub enum ConnectError {
    /// Another connection already owns the stream.
    Conflict {
        /// Contested stream id.
        stream_id: String,
    },
    /// The user declined to take over the stream.
    Aborted,
    /// Stream URL could not be built or parsed.
    InvalidUrl(String),
    /// Handshake refused with a non-conflict status.
    Rejected {
        /// HTTP status of the refusal.
        status: u16,
        /// Response body.
        body: String,
    },
    /// Handshake timed out.
    Timeout(Duration),
    /// Dial, TLS or protocol failure.
    Transport(String),
}

impl std::fmt::Display for ConnectError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Conflict { stream_id } => write!(
                f,
                "Stream {stream_id} is already being listened to by another connection"
            ),
            Self::Aborted => write!(f, "Aborted: stream is in use by another connection"),
            Self::InvalidUrl(msg) => write!(f, "Invalid stream URL: {msg}"),
            Self::Rejected { status, body } if body.is_empty() => {
                write!(f, "Stream connection rejected (HTTP {status})")
            }
            Self::Rejected { status, body } => {
                write!(f, "Stream connection rejected (HTTP {status}): {body}")
            }
            Self::Timeout(after) => {
                write!(f, "Stream connection timed out after {}s", after.as_secs())
            }
            Self::Transport(msg) => write!(f, "Stream connection failed: {msg}"),
        }
    }
}

impl std::error::Error for ConnectError {}

/// Why a read on an established connection ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReadError {
    /// Close frame (or end of stream) from the peer.
    Closed {
        /// WebSocket close code.
        code: u16,
        /// Close reason text.
        reason: String,
    },
    /// Read attempted after the connection already finished.
    AlreadyClosed,
    /// Any other transport failure.
    Transport(String),
}

impl ReadError {
    /// `true` for endings that are a normal end of session.
    #[must_use]
    pub fn is_expected(&self) -> bool {
        match self {
            Self::Closed { code, .. } => CLEAN_CLOSE_CODES.contains(code),
            Self::AlreadyClosed => true,
            Self::Transport(_) => false,
        }
    }
}

impl std::fmt::Display for ReadError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Closed { code, reason } if reason.is_empty() => {
                write!(f, "connection closed (code {code})")
            }
            Self::Closed { code, reason } => write!(f, "connection closed (code {code}): {reason}"),
            Self::AlreadyClosed => write!(f, "repeated read on a closed connection"),
            Self::Transport(msg) => write!(f, "connection lost: {msg}"),
        }
    }
}

impl std::error::Error for ReadError {}

/// Outcome of a [`ConflictPolicy`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConflictDecision {
    /// Reconnect with `force_reconnect=true`, evicting the other listener.
    ForceReconnect,
    /// Give up.
    Abort,
}

/// Decides what to do when a stream is already held elsewhere.
#[async_trait]
pub trait ConflictPolicy: Send + Sync {
    /// Called once per conflict with the contested stream id.
    async fn resolve(&self, stream_id: &str) -> ConflictDecision;
}

/// Policy that always returns the same decision.
#[derive(Debug, Clone, Copy)]
pub struct FixedDecision(pub ConflictDecision);

#[async_trait]
impl ConflictPolicy for FixedDecision {
    async fn resolve(&self, _stream_id: &str) -> ConflictDecision {
        self.0
    }
}

/// Dials stream WebSockets and tracks their state.
#[derive(Debug)]
pub struct ConnectionManager {
    api_key: String,
    user_agent: String,
    handshake_timeout: Duration,
    state: Arc<StateCell>,
}

impl ConnectionManager {
    /// Manager authenticating with `api_key`.
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            user_agent: constants::user_agent(),
            handshake_timeout: constants::WS_HANDSHAKE_TIMEOUT,
            state: Arc::new(StateCell::new(ConnectionState::Disconnected)),
        }
    }

    /// Override the handshake timeout.
    #[must_use]
    pub fn with_handshake_timeout(mut self, timeout: Duration) -> Self {
        self.handshake_timeout = timeout;
        self
    }

    /// Current state of the most recent connection.
    pub fn state(&self) -> ConnectionState {
        self.state.get()
    }

    /// Build the dial URL: `ws(s)` scheme, API key and optional force flag.
    pub fn stream_url(&self, base: &str, force_reconnect: bool) -> Result<String, ConnectError> {
        let mut url = reqwest::Url::parse(&ws::http_to_ws_scheme(base))
            .map_err(|e| ConnectError::InvalidUrl(format!("{base}: {e}")))?;
        if !matches!(url.scheme(), "ws" | "wss") {
            return Err(ConnectError::InvalidUrl(format!(
                "{base}: unsupported scheme {}",
                url.scheme()
            )));
        }
        {
            let mut query = url.query_pairs_mut();
            query.append_pair(WS_API_KEY_PARAM, &self.api_key);
            if force_reconnect {
                query.append_pair(WS_FORCE_RECONNECT_PARAM, "true");
            }
        }
        Ok(url.into())
    }

    /// Perform one handshake.
    ///
    /// A `409` reply leaves the manager in `ConflictPending` and returns
    /// [`ConnectError::Conflict`]; nothing is retried here.
    pub async fn connect(
        &self,
        url: &str,
        stream_id: &str,
        force_reconnect: bool,
        skip_tls_verify: bool,
    ) -> Result<Connection, ConnectError> {
        let dial_url = self.stream_url(url, force_reconnect)?;
        self.state.set(ConnectionState::Connecting);

        log::info!(
            "[Stream] Connecting to {} (stream={}, force_reconnect={})",
            url,
            stream_id,
            force_reconnect
        );

        let options = ws::ConnectOptions {
            headers: vec![("User-Agent".to_string(), self.user_agent.clone())],
            skip_tls_verify,
            handshake_timeout: self.handshake_timeout,
        };

        match ws::connect(&dial_url, &options).await {
            Ok((writer, reader)) => {
                self.state.set(ConnectionState::Connected);
                log::info!("[Stream] WebSocket connected");
                Ok(Connection {
                    reader,
                    link: ConnectionLink {
                        writer: Arc::new(Mutex::new(writer)),
                        state: Arc::clone(&self.state),
                    },
                })
            }
            Err(WsError::Rejected { status: 409, .. }) => {
                self.state.set(ConnectionState::ConflictPending);
                log::warn!("[Stream] Stream {} already has a listener", stream_id);
                Err(ConnectError::Conflict {
                    stream_id: stream_id.to_string(),
                })
            }
            Err(e) => {
                self.state.set(ConnectionState::Disconnected);
                log::warn!("[Stream] Connection failed: {}", e);
                Err(match e {
                    WsError::Rejected { status, body } => ConnectError::Rejected { status, body },
                    WsError::Timeout(after) => ConnectError::Timeout(after),
                    WsError::InvalidRequest(msg) => ConnectError::InvalidUrl(msg),
                    other => ConnectError::Transport(other.to_string()),
                })
            }
        }
    }

    /// Connect to `handle`, consulting `policy` once if the stream is taken.
    ///
    /// When `force_reconnect` is already set the first attempt evicts any
    /// other listener and the policy is never asked.
    pub async fn connect_negotiated(
        &self,
        handle: &StreamHandle,
        force_reconnect: bool,
        skip_tls_verify: bool,
        policy: &dyn ConflictPolicy,
    ) -> Result<Connection, ConnectError> {
        let first = self
            .connect(
                &handle.websocket_url,
                &handle.id,
                force_reconnect,
                skip_tls_verify,
            )
            .await;

        let Err(ConnectError::Conflict { stream_id }) = first else {
            return first;
        };
        if force_reconnect {
            return Err(ConnectError::Conflict { stream_id });
        }

        match policy.resolve(&stream_id).await {
            ConflictDecision::ForceReconnect => {
                log::info!("[Stream] Forcing takeover of stream {}", stream_id);
                self.connect(&handle.websocket_url, &handle.id, true, skip_tls_verify)
                    .await
            }
            ConflictDecision::Abort => {
                self.state.set(ConnectionState::Disconnected);
                Err(ConnectError::Aborted)
            }
        }
    }
}

/// Cloneable write-side handle: pongs, close and state.
#[derive(Debug, Clone)]
pub struct ConnectionLink {
    writer: Arc<Mutex<WsWriter>>,
    state: Arc<StateCell>,
}

impl ConnectionLink {
    /// Current connection state.
    pub fn state(&self) -> ConnectionState {
        self.state.get()
    }

    async fn pong(&self, data: Vec<u8>) -> Result<(), WsError> {
        self.writer.lock().await.send_pong(data).await
    }

    fn mark_closed(&self) {
        self.state.set(ConnectionState::Closed);
    }

    /// Send a close frame and mark the connection closed.
    ///
    /// Idempotent: only the first call on a connected link sends anything.
    pub async fn close(&self) -> Result<(), WsError> {
        if !self
            .state
            .transition(ConnectionState::Connected, ConnectionState::Closing)
        {
            return Ok(());
        }
        log::debug!("[Stream] Closing connection");
        let send = async { self.writer.lock().await.send_close().await };
        let limit = constants::WS_CLOSE_TIMEOUT;
        let result = tokio::time::timeout(limit, send)
            .await
            .unwrap_or_else(|_elapsed| {
                log::debug!("[Stream] Close frame not sent within {:?}", limit);
                Err(WsError::Timeout(limit))
            });
        self.mark_closed();
        match result {
            Err(WsError::Closed) => Ok(()),
            other => other,
        }
    }
}

/// An established stream connection (read half plus [`ConnectionLink`]).
#[derive(Debug)]
pub struct Connection {
    reader: WsReader,
    link: ConnectionLink,
}

impl Connection {
    /// Write-side handle for closing from another task.
    pub fn link(&self) -> ConnectionLink {
        self.link.clone()
    }

    /// Current connection state.
    pub fn state(&self) -> ConnectionState {
        self.link.state()
    }

    /// Read the next text frame.
    ///
    /// Pings are answered inline and never surface. Once the connection is
    /// closed every further call returns [`ReadError::AlreadyClosed`]
    /// without touching the socket.
    pub async fn read(&mut self) -> Result<String, ReadError> {
        if self.link.state() == ConnectionState::Closed {
            return Err(ReadError::AlreadyClosed);
        }

        loop {
            let next = self.reader.recv().await;
            let locally_closed = self.link.state().is_shutting_down();

            match next {
                Some(Ok(WsMessage::Text(text))) => return Ok(text),
                Some(Ok(WsMessage::Ping(data))) => {
                    if let Err(e) = self.link.pong(data).await {
                        log::debug!("[Stream] Failed to answer ping: {}", e);
                    }
                }
                Some(Ok(WsMessage::Pong(_))) => {}
                Some(Ok(WsMessage::Binary(data))) => {
                    log::debug!("[Stream] Ignoring {}-byte binary frame", data.len());
                }
                Some(Ok(WsMessage::Close { code, reason })) => {
                    log::info!(
                        "[Stream] Connection closed by server: code={} reason={:?}",
                        code,
                        reason
                    );
                    self.link.mark_closed();
                    if locally_closed {
                        return Err(ReadError::AlreadyClosed);
                    }
                    return Err(ReadError::Closed { code, reason });
                }
                Some(Err(WsError::Closed)) => {
                    self.link.mark_closed();
                    return Err(ReadError::AlreadyClosed);
                }
                Some(Err(e)) => {
                    self.link.mark_closed();
                    if locally_closed {
                        return Err(ReadError::AlreadyClosed);
                    }
                    return Err(ReadError::Transport(e.to_string()));
                }
                None => {
                    self.link.mark_closed();
                    if locally_closed {
                        return Err(ReadError::AlreadyClosed);
                    }
                    return Err(ReadError::Closed {
                        code: 1006,
                        reason: "stream ended without close frame".to_string(),
                    });
                }
            }
        }
    }
}
