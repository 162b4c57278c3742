//! Application-wide constants for the ahasend CLI.
//!
//! This module centralizes all magic numbers and configuration constants
//! to improve maintainability and discoverability. Constants are grouped
//! by domain with documentation explaining their purpose.
//!
//! # Categories
//!
//! - **Timeouts**: Network and operation timeouts
//! - **Streaming**: Channel sizes and wire parameters
//! - **Signing**: Webhook secret and header format

use std::time::Duration;

// ============================================================================
// Timeouts
// ============================================================================

/// HTTP client request timeout for API calls.
///
/// Applies to the stream-initiation request against the AhaSend API.
pub const HTTP_REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// Request timeout for events forwarded to the local endpoint.
///
/// Each forward runs on its own task, so a stuck endpoint only ties up
/// that task for this long.
pub const FORWARD_REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// Upper bound on the WebSocket handshake (TCP + TLS + upgrade).
///
/// The established connection has no idle timeout; liveness is left to
/// server pings.
pub const WS_HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(10);

/// How long shutdown waits to hand the close frame to a stalled peer.
pub const WS_CLOSE_TIMEOUT: Duration = Duration::from_secs(2);

// ============================================================================
// Streaming
// ============================================================================

/// Depth of the channel between the WebSocket reader and the dispatcher.
pub const MESSAGE_CHANNEL_CAPACITY: usize = 10;

/// Maximum number of `*` wildcards accepted in a recipient pattern.
pub const MAX_RECIPIENT_WILDCARDS: usize = 2;

/// Query parameter carrying the API key on the WebSocket URL.
pub const WS_API_KEY_PARAM: &str = "api_secret_key";

/// Query parameter asking the server to evict an existing listener.
pub const WS_FORCE_RECONNECT_PARAM: &str = "force_reconnect";

/// WebSocket close codes treated as a clean end of session.
///
/// 1000 normal closure, 1001 going away, 1005 no status received.
pub const CLEAN_CLOSE_CODES: &[u16] = &[1000, 1001, 1005];

// ============================================================================
// Signing
// ============================================================================

/// Prefix of generated forwarding secrets.
pub const SECRET_PREFIX: &str = "aha-whsec-";

/// Number of random alphanumeric characters after [`SECRET_PREFIX`].
pub const SECRET_RANDOM_LENGTH: usize = 64;

/// Version tag prepended to every forwarded signature.
pub const SIGNATURE_VERSION: &str = "v1";

/// Header carrying the forwarded message id.
pub const HEADER_WEBHOOK_ID: &str = "webhook-id";

/// Header carrying the forwarded unix timestamp.
pub const HEADER_WEBHOOK_TIMESTAMP: &str = "webhook-timestamp";

/// Header carrying the forwarded signature.
pub const HEADER_WEBHOOK_SIGNATURE: &str = "webhook-signature";

// ============================================================================
// Identity
// ============================================================================

/// Crate version, reported in the User-Agent and `--version`.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// User-Agent sent on API, WebSocket and forwarded requests.
#[must_use]
pub fn user_agent() -> String {
    format!("ahasend-cli/{VERSION}")
}
