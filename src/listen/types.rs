//! Wire types for the event stream.
//!
//! One [`Envelope`] arrives per WebSocket text frame. Event payloads are kept
//! as raw JSON ([`EventPayload`]) so they can be forwarded verbatim; only a
//! handful of well-known keys are ever read from them.

use std::collections::HashMap;

use serde::Deserialize;
use serde_json::value::RawValue;

/// Which server-side stream family a session listens to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamKind {
    /// Webhook stream; carries many event types.
    Webhooks,
    /// Inbound route stream; one purpose, no event-type filter.
    Routes,
}

impl StreamKind {
    /// Path segment used by the API (`webhooks` / `routes`).
    #[must_use]
    pub fn path_segment(self) -> &'static str {
        match self {
            Self::Webhooks => "webhooks",
            Self::Routes => "routes",
        }
    }

    /// Query parameter naming an existing resource.
    #[must_use]
    pub fn id_param(self) -> &'static str {
        match self {
            Self::Webhooks => "webhook_id",
            Self::Routes => "route_id",
        }
    }

    /// CLI flag naming an existing resource, used in validation messages.
    #[must_use]
    pub fn id_flag(self) -> &'static str {
        match self {
            Self::Webhooks => "--webhook-id",
            Self::Routes => "--route-id",
        }
    }

    /// Whether the stream carries more than one event type.
    #[must_use]
    pub fn supports_event_filter(self) -> bool {
        matches!(self, Self::Webhooks)
    }
}

impl std::fmt::Display for StreamKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Webhooks => write!(f, "webhook"),
            Self::Routes => write!(f, "route"),
        }
    }
}

/// Stream handle returned by the initiation endpoint.
///
/// Immutable for the session. A stream created from a recipient pattern is
/// temporary and torn down by the server after disconnect.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(try_from = "StreamHandleResponse")]
pub struct StreamHandle {
    /// Webhook or route id the stream is bound to.
    pub id: String,
    /// WebSocket URL to dial (without credentials).
    pub websocket_url: String,
}

/// Initiation response body. Routes answer with `route_id`, webhooks with
/// `webhook_id`; a generic `id` may accompany either.
#[derive(Deserialize)]
struct StreamHandleResponse {
    #[serde(default)]
    webhook_id: Option<String>,
    #[serde(default)]
    route_id: Option<String>,
    #[serde(default)]
    id: Option<String>,
    ws_url: String,
}

impl TryFrom<StreamHandleResponse> for StreamHandle {
    type Error = String;

    fn try_from(response: StreamHandleResponse) -> Result<Self, Self::Error> {
        let id = response
            .webhook_id
            .or(response.route_id)
            .or(response.id)
            .filter(|id| !id.is_empty())
            .ok_or_else(|| "stream response has no webhook_id, route_id or id".to_string())?;
        Ok(Self {
            id,
            websocket_url: response.ws_url,
        })
    }
}

/// Envelope `type` discriminator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EnvelopeKind {
    /// Session established; no payload.
    Connected,
    /// Live event.
    Event,
    /// Event re-delivered by the server after a reconnect.
    Replay,
    /// Anything this client does not know about.
    #[serde(other)]
    Other,
}

/// One parsed WebSocket text frame.
#[derive(Debug, Deserialize)]
pub struct Envelope {
    /// Frame type.
    #[serde(rename = "type")]
    pub kind: EnvelopeKind,
    /// Server session id (set on `connected`).
    #[serde(default, alias = "sessionID", alias = "sessionId")]
    pub session_id: Option<String>,
    /// Unix seconds.
    #[serde(default)]
    pub timestamp: i64,
    /// Payload for `event` / `replay`.
    #[serde(default)]
    pub event: Option<Event>,
}

impl Envelope {
    /// Parse one text frame.
    pub fn parse(text: &str) -> serde_json::Result<Self> {
        serde_json::from_str(text)
    }
}

/// Domain event carried by an envelope.
#[derive(Debug, Deserialize)]
pub struct Event {
    /// Event name, e.g. `message.delivered`.
    #[serde(rename = "type", default)]
    pub event_type: String,
    /// Stream the event was published on.
    #[serde(default, alias = "streamID", alias = "streamId")]
    pub stream_id: String,
    /// Owning account.
    #[serde(default, alias = "accountID", alias = "accountId")]
    pub account_id: String,
    /// Opaque payload, forwarded as-is.
    #[serde(default)]
    pub data: EventPayload,
    /// Free-form string metadata.
    #[serde(default)]
    pub metadata: HashMap<String, String>,
    /// Unix seconds.
    #[serde(default)]
    pub timestamp: i64,
}

impl Event {
    /// Type used for filtering and display.
    ///
    /// Prefers the `type` key inside the payload, falling back to the
    /// envelope-level event name.
    #[must_use]
    pub fn display_type(&self) -> String {
        self.data
            .summary()
            .event_type
            .unwrap_or_else(|| self.event_type.clone())
    }
}

/// Raw JSON payload of an event.
///
/// An absent or `null` payload is kept as `None` and forwarded as `null`.
#[derive(Debug, Default, Deserialize)]
#[serde(transparent)]
pub struct EventPayload(Option<Box<RawValue>>);

impl EventPayload {
    /// Wrap an already-serialized JSON value.
    pub fn from_json(json: &str) -> serde_json::Result<Self> {
        RawValue::from_string(json.to_string()).map(|raw| Self(Some(raw)))
    }

    fn raw(&self) -> &str {
        self.0.as_deref().map_or("null", RawValue::get)
    }

    /// Bytes sent as the forwarded request body.
    #[must_use]
    pub fn as_bytes(&self) -> &[u8] {
        self.raw().as_bytes()
    }

    /// The well-known keys used for filtering and slim rendering.
    ///
    /// Only JSON objects are looked into; any other payload yields an empty
    /// summary.
    #[must_use]
    pub fn summary(&self) -> PayloadSummary {
        match serde_json::from_str::<serde_json::Value>(self.raw()) {
            Ok(serde_json::Value::Object(map)) => PayloadSummary::from_object(&map),
            _ => PayloadSummary::default(),
        }
    }

    /// Indented rendering of the whole payload.
    #[must_use]
    pub fn pretty(&self) -> String {
        serde_json::from_str::<serde_json::Value>(self.raw())
            .and_then(|v| serde_json::to_string_pretty(&v))
            .unwrap_or_else(|_| self.raw().to_string())
    }
}

/// Narrow view of an event payload.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct PayloadSummary {
    /// Payload `type`.
    pub event_type: Option<String>,
    /// Sender address.
    pub from: Option<String>,
    /// Recipient address.
    pub to: Option<String>,
    /// Message subject.
    pub subject: Option<String>,
}

impl PayloadSummary {
    fn from_object(map: &serde_json::Map<String, serde_json::Value>) -> Self {
        let field = |key: &str| map.get(key).and_then(lenient_string);
        Self {
            event_type: field("type"),
            from: field("from"),
            to: field("to"),
            subject: field("subject"),
        }
    }
}

/// Strings pass through; other JSON values are shown compactly; null is absent.
fn lenient_string(value: &serde_json::Value) -> Option<String> {
    match value {
        serde_json::Value::Null => None,
        serde_json::Value::String(s) => Some(s.clone()),
        other => Some(other.to_string()),
    }
}
