//! WebSocket client transport for the event stream.
//!
//! [`connect`] dials a `ws://` or `wss://` URL with extra request headers,
//! an optional permissive TLS verifier and a hard handshake deadline, then
//! splits the socket into a [`WsWriter`] (control frames the client sends)
//! and a [`WsReader`] (every frame the server sends, as [`WsMessage`]).
//!
//! A refused upgrade keeps its HTTP status in [`WsError::Rejected`]; the
//! stream listener branches on `409 Conflict`.

// Rust guideline compliant 2026-02

use std::sync::Arc;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use tokio_tungstenite::{tungstenite, MaybeTlsStream, WebSocketStream};

type WsStream = WebSocketStream<MaybeTlsStream<tokio::net::TcpStream>>;

/// Frame received from the server.
#[derive(Debug, PartialEq, Eq)]
pub enum WsMessage {
    /// UTF-8 text frame.
    Text(String),
    /// Binary frame.
    Binary(Vec<u8>),
    /// Must be answered with a pong carrying the same payload.
    Ping(Vec<u8>),
    /// Pong frame.
    Pong(Vec<u8>),
    /// Peer-initiated close.
    Close {
        /// 1005 when the peer sent no status.
        code: u16,
        /// Close reason, empty when none was given.
        reason: String,
    },
}

/// Errors produced by the WebSocket transport.
#[derive(Debug)]
pub enum WsError {
    /// URL or header could not be turned into a handshake request.
    InvalidRequest(String),
    /// Server answered the upgrade request with a non-101 status.
    Rejected {
        /// HTTP status code of the handshake response.
        status: u16,
        /// Response body, if the server sent one.
        body: String,
    },
    /// Handshake did not complete within the configured timeout.
    Timeout(Duration),
    /// Connection was already closed (normal shutdown path).
    Closed,
    /// Any other I/O, TLS or protocol failure.
    Transport(String),
}

impl std::fmt::Display for WsError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::InvalidRequest(msg) => write!(f, "Invalid WebSocket request: {msg}"),
            Self::Rejected { status, body } if body.is_empty() => {
                write!(f, "WebSocket handshake rejected with status {status}")
            }
            Self::Rejected { status, body } => write!(
                f,
                "WebSocket handshake rejected with status {status}: {body}"
            ),
            Self::Timeout(after) => {
                write!(f, "WebSocket handshake timed out after {}s", after.as_secs())
            }
            Self::Closed => write!(f, "WebSocket connection closed"),
            Self::Transport(msg) => write!(f, "WebSocket transport error: {msg}"),
        }
    }
}

impl std::error::Error for WsError {}

impl From<tungstenite::Error> for WsError {
    fn from(err: tungstenite::Error) -> Self {
        match err {
            tungstenite::Error::ConnectionClosed | tungstenite::Error::AlreadyClosed => {
                Self::Closed
            }
            tungstenite::Error::Http(response) => {
                let status = response.status().as_u16();
                let body = response
                    .body()
                    .as_deref()
                    .map(|b| String::from_utf8_lossy(b).trim().to_string())
                    .unwrap_or_default();
                Self::Rejected { status, body }
            }
            tungstenite::Error::Url(e) => Self::InvalidRequest(e.to_string()),
            other => Self::Transport(other.to_string()),
        }
    }
}

/// Dial options for [`connect`].
#[derive(Debug, Clone)]
pub struct ConnectOptions {
    /// Extra `(name, value)` headers added to the upgrade request.
    pub headers: Vec<(String, String)>,
    /// Accept any server certificate (local development endpoints).
    pub skip_tls_verify: bool,
    /// Upper bound on TCP connect + TLS + upgrade.
    pub handshake_timeout: Duration,
}

impl Default for ConnectOptions {
    fn default() -> Self {
        Self {
            headers: Vec::new(),
            skip_tls_verify: false,
            handshake_timeout: crate::constants::WS_HANDSHAKE_TIMEOUT,
        }
    }
}

/// Write half of a WebSocket connection.
#[derive(Debug)]
pub struct WsWriter {
    sink: futures_util::stream::SplitSink<WsStream, tungstenite::Message>,
}

impl WsWriter {
    /// Send a pong frame in response to a ping.
    ///
    /// # Errors
    ///
    /// Returns an error if the send fails.
    pub async fn send_pong(&mut self, data: Vec<u8>) -> Result<(), WsError> {
        self.sink
            .send(tungstenite::Message::Pong(data))
            .await
            .map_err(WsError::from)
    }

    /// Send a normal-closure close frame.
    ///
    /// # Errors
    ///
    /// Returns an error if the send fails.
    pub async fn send_close(&mut self) -> Result<(), WsError> {
        use tungstenite::protocol::frame::coding::CloseCode;
        use tungstenite::protocol::CloseFrame;

        let frame = CloseFrame {
            code: CloseCode::Normal,
            reason: "client closing".into(),
        };
        self.sink
            .send(tungstenite::Message::Close(Some(frame)))
            .await
            .map_err(WsError::from)
    }
}

/// Read half of a WebSocket connection.
#[derive(Debug)]
pub struct WsReader {
    stream: futures_util::stream::SplitStream<WsStream>,
}

impl WsReader {
    /// Next frame from the server; `None` once the socket is gone.
    pub async fn recv(&mut self) -> Option<Result<WsMessage, WsError>> {
        while let Some(next) = self.stream.next().await {
            match next {
                Ok(message) => {
                    if let Some(message) = WsMessage::from_wire(message) {
                        return Some(Ok(message));
                    }
                }
                Err(e) => return Some(Err(e.into())),
            }
        }
        None
    }
}

impl WsMessage {
    /// `None` for raw frames, which tungstenite never yields on reads.
    fn from_wire(message: tungstenite::Message) -> Option<Self> {
        use tungstenite::Message as M;

        Some(match message {
            M::Text(text) => Self::Text(text.to_string()),
            M::Binary(data) => Self::Binary(data.to_vec()),
            M::Ping(data) => Self::Ping(data.to_vec()),
            M::Pong(data) => Self::Pong(data.to_vec()),
            // No close frame payload means "no status received".
            M::Close(None) => Self::Close {
                code: 1005,
                reason: String::new(),
            },
            M::Close(Some(frame)) => Self::Close {
                code: frame.code.into(),
                reason: frame.reason.to_string(),
            },
            M::Frame(_) => return None,
        })
    }
}

/// Connect to a WebSocket URL.
///
/// Builds an HTTP request from `url`, inserts each header from `options`,
/// then performs the WebSocket handshake within `options.handshake_timeout`.
/// Returns split (writer, reader) halves for independent use in
/// `tokio::select!` loops.
///
/// # Errors
///
/// Returns [`WsError::InvalidRequest`] if the URL or a header is malformed,
/// [`WsError::Rejected`] if the server refuses the upgrade,
/// [`WsError::Timeout`] if the handshake stalls, and
/// [`WsError::Transport`] for everything else.
pub async fn connect(url: &str, options: &ConnectOptions) -> Result<(WsWriter, WsReader), WsError> {
    use tungstenite::client::IntoClientRequest;

    let mut request = url
        .into_client_request()
        .map_err(|e| WsError::InvalidRequest(format!("{url}: {e}")))?;

    for (name, value) in &options.headers {
        let header_name = tungstenite::http::HeaderName::from_bytes(name.as_bytes())
            .map_err(|e| WsError::InvalidRequest(format!("header name {name}: {e}")))?;
        let header_value = tungstenite::http::HeaderValue::from_str(value)
            .map_err(|e| WsError::InvalidRequest(format!("header value for {name}: {e}")))?;
        request.headers_mut().insert(header_name, header_value);
    }

    let config = Arc::new(tls_config(options.skip_tls_verify));
    let connector = tokio_tungstenite::Connector::Rustls(config);

    let handshake =
        tokio_tungstenite::connect_async_tls_with_config(request, None, false, Some(connector));

    let (ws_stream, _response) = tokio::time::timeout(options.handshake_timeout, handshake)
        .await
        .map_err(|_elapsed| WsError::Timeout(options.handshake_timeout))??;

    let (sink, stream) = ws_stream.split();

    Ok((WsWriter { sink }, WsReader { stream }))
}

/// Convert an HTTP(S) URL to WS(S) scheme.
///
/// Passes `ws://` and `wss://` through unchanged.
#[must_use]
pub fn http_to_ws_scheme(url: &str) -> String {
    if url.starts_with("wss://") || url.starts_with("ws://") {
        url.to_string()
    } else if let Some(rest) = url.strip_prefix("https://") {
        format!("wss://{rest}")
    } else if let Some(rest) = url.strip_prefix("http://") {
        format!("ws://{rest}")
    } else {
        url.to_string()
    }
}

fn install_crypto_provider() {
    // Fails when a provider is already installed, which is fine.
    let _ = rustls::crypto::ring::default_provider().install_default();
}

fn tls_config(skip_verify: bool) -> rustls::ClientConfig {
    install_crypto_provider();

    if skip_verify {
        log::warn!("[Stream] TLS certificate verification disabled");
        return rustls::ClientConfig::builder()
            .dangerous()
            .with_custom_certificate_verifier(Arc::new(InsecureVerifier))
            .with_no_client_auth();
    }

    let root_store =
        rustls::RootCertStore::from_iter(webpki_roots::TLS_SERVER_ROOTS.iter().cloned());
    rustls::ClientConfig::builder()
        .with_root_certificates(root_store)
        .with_no_client_auth()
}

/// Certificate verifier used for `--skip-verify`.
#[derive(Debug)]
struct InsecureVerifier;

impl rustls::client::danger::ServerCertVerifier for InsecureVerifier {
    fn verify_server_cert(
        &self,
        _end_entity: &rustls::pki_types::CertificateDer<'_>,
        _intermediates: &[rustls::pki_types::CertificateDer<'_>],
        _server_name: &rustls::pki_types::ServerName<'_>,
        _ocsp_response: &[u8],
        _now: rustls::pki_types::UnixTime,
    ) -> Result<rustls::client::danger::ServerCertVerified, rustls::Error> {
        Ok(rustls::client::danger::ServerCertVerified::assertion())
    }

    fn verify_tls12_signature(
        &self,
        _message: &[u8],
        _cert: &rustls::pki_types::CertificateDer<'_>,
        _dss: &rustls::DigitallySignedStruct,
    ) -> Result<rustls::client::danger::HandshakeSignatureValid, rustls::Error> {
        Ok(rustls::client::danger::HandshakeSignatureValid::assertion())
    }

    fn verify_tls13_signature(
        &self,
        _message: &[u8],
        _cert: &rustls::pki_types::CertificateDer<'_>,
        _dss: &rustls::DigitallySignedStruct,
    ) -> Result<rustls::client::danger::HandshakeSignatureValid, rustls::Error> {
        Ok(rustls::client::danger::HandshakeSignatureValid::assertion())
    }

    fn supported_verify_schemes(&self) -> Vec<rustls::SignatureScheme> {
        rustls::crypto::CryptoProvider::get_default()
            .map(|p| p.signature_verification_algorithms.supported_schemes())
            .unwrap_or_default()
    }
}
