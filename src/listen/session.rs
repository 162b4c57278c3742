//! One `listen` session from stream initiation to shutdown.
//!
//! ```text
//! initiate ──► connect (ConflictPolicy on 409) ──► MessagePump ──► select loop
//!                                                                   ├─ cancel  → close, Interrupted
//!                                                                   ├─ message → EventDispatcher
//!                                                                   └─ error   → Err
//! ```
//!
//! The loop is the only consumer of the pump, so events are dispatched in
//! wire order. Forward tasks are never awaited; on shutdown they are left
//! to finish or be dropped with the runtime.

use std::io::Write;
use std::time::Duration;

use anyhow::{Context, Result};
use crossterm::style::{style, Stylize};
use tokio_util::sync::CancellationToken;

use super::connection::{ConflictPolicy, ConnectionManager, ReadError};
use super::dispatch::{EventDispatcher, EventFilter, RenderMode};
use super::forward::Forwarder;
use super::initiator::{self, StreamApi, StreamTarget};
use super::pump::MessagePump;
use super::types::{StreamHandle, StreamKind};
use crate::signing::Signer;

/// Everything a session needs besides its collaborators.
#[derive(Debug, Clone)]
pub struct ListenOptions {
    /// Webhook or route stream.
    pub kind: StreamKind,
    /// Existing resource or recipient pattern.
    pub target: StreamTarget,
    /// Local endpoint receiving signed copies of each event.
    pub forward_to: Option<reqwest::Url>,
    /// Signing secret; generated when absent.
    pub secret: Option<String>,
    /// Accept any TLS certificate (stream and forward target).
    pub skip_tls_verify: bool,
    /// Full or slim event rendering.
    pub mode: RenderMode,
    /// Webhook streams only.
    pub event_filter: EventFilter,
    /// Evict any other listener without asking.
    pub force_reconnect: bool,
    /// ANSI styling on the output.
    pub color: bool,
}

impl ListenOptions {
    /// Defaults for `kind` / `target`: full rendering, no filter, no forwarding.
    pub fn new(kind: StreamKind, target: StreamTarget) -> Self {
        Self {
            kind,
            target,
            forward_to: None,
            secret: None,
            skip_tls_verify: false,
            mode: RenderMode::Full,
            event_filter: EventFilter::default(),
            force_reconnect: false,
            color: false,
        }
    }

    /// Checks that do not need the network.
    pub fn validate(&self) -> Result<()> {
        if !self.kind.supports_event_filter() && !self.event_filter.is_empty() {
            anyhow::bail!("event filtering is only supported for webhook streams");
        }
        if let Some(secret) = &self.secret {
            if !secret.starts_with(crate::constants::SECRET_PREFIX) {
                anyhow::bail!(
                    "signing secret must start with {:?}",
                    crate::constants::SECRET_PREFIX
                );
            }
        }
        Ok(())
    }
}

/// How a session ended without error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionEnd {
    /// Cancelled locally (Ctrl+C).
    Interrupted,
    /// The server closed the stream cleanly.
    Closed,
}

enum Step {
    Cancelled,
    Frame(Option<String>),
    Failed(ReadError),
}

/// A configured listen session.
#[derive(Debug)]
pub struct Session {
    options: ListenOptions,
    manager: ConnectionManager,
}

impl Session {
    /// Session authenticating the WebSocket with `api_key`.
    pub fn new(options: ListenOptions, api_key: &str) -> Self {
        Self {
            options,
            manager: ConnectionManager::new(api_key),
        }
    }

    /// Override the WebSocket handshake timeout.
    #[must_use]
    pub fn with_handshake_timeout(mut self, timeout: Duration) -> Self {
        self.manager = self.manager.with_handshake_timeout(timeout);
        self
    }

    /// Run until cancelled, closed by the server, or failed.
    ///
    /// Events and status lines go to `out`.
    pub async fn run<W: Write>(
        &self,
        api: &dyn StreamApi,
        policy: &dyn ConflictPolicy,
        mut out: W,
        cancel: CancellationToken,
    ) -> Result<SessionEnd> {
        let options = &self.options;
        options.validate()?;

        let forwarder = match &options.forward_to {
            Some(url) => {
                let signer = options
                    .secret
                    .as_deref()
                    .map_or_else(Signer::generate, Signer::new);
                Some(Forwarder::new(url.clone(), signer, options.skip_tls_verify)?)
            }
            None => None,
        };

        let handle = tokio::select! {
            () = cancel.cancelled() => return Ok(SessionEnd::Interrupted),
            handle = initiator::initiate(api, options.kind, &options.target) => handle?,
        };

        let connection = tokio::select! {
            () = cancel.cancelled() => return Ok(SessionEnd::Interrupted),
            connection = self.manager.connect_negotiated(
                &handle,
                options.force_reconnect,
                options.skip_tls_verify,
                policy,
            ) => connection.context("failed to connect to stream")?,
        };

        self.write_banner(&mut out, &handle, forwarder.as_ref())
            .context("failed to write output")?;

        let mut dispatcher = EventDispatcher::new(out, options.mode)
            .with_filter(options.event_filter.clone())
            .with_forwarder(forwarder)
            .with_color(options.color);

        let mut pump = MessagePump::start(connection, cancel.child_token());
        let link = pump.link().clone();

        loop {
            let step = tokio::select! {
                biased;
                () = cancel.cancelled() => Step::Cancelled,
                frame = pump.messages.recv() => Step::Frame(frame),
                Some(err) = pump.errors.recv() => Step::Failed(err),
            };

            match step {
                Step::Cancelled => {
                    log::info!("[Stream] Interrupted, closing stream {}", handle.id);
                    if let Err(e) = link.close().await {
                        log::debug!("[Stream] Close failed: {}", e);
                    }
                    return Ok(SessionEnd::Interrupted);
                }
                Step::Frame(Some(text)) => {
                    dispatcher
                        .handle_text(&text)
                        .context("failed to write event output")?;
                }
                Step::Frame(None) => {
                    // Pump finished; it reports at most one error before exiting.
                    if let Ok(err) = pump.errors.try_recv() {
                        return Err(err).context("stream connection lost");
                    }
                    log::info!("[Stream] Stream {} closed", handle.id);
                    return Ok(SessionEnd::Closed);
                }
                Step::Failed(err) => {
                    let _ = link.close().await;
                    return Err(err).context("stream connection lost");
                }
            }
        }
    }

    fn write_banner<W: Write>(
        &self,
        out: &mut W,
        handle: &StreamHandle,
        forwarder: Option<&Forwarder>,
    ) -> std::io::Result<()> {
        let options = &self.options;
        let color = options.color;
        let em = |text: &str| {
            if color {
                style(text).bold().to_string()
            } else {
                text.to_string()
            }
        };

        let id = em(&handle.id);
        writeln!(out, "Listening on {} stream {id}", options.kind)?;
        if let StreamTarget::Recipient(pattern) = &options.target {
            writeln!(
                out,
                "  recipient: {pattern} (temporary stream, removed when you disconnect)"
            )?;
        }
        if !options.event_filter.is_empty() {
            let mut types: Vec<&str> = options.event_filter.iter().collect();
            types.sort_unstable();
            writeln!(out, "  events: {}", types.join(", "))?;
        }
        if let Some(forwarder) = forwarder {
            writeln!(out, "  forwarding to: {}", forwarder.target())?;
            writeln!(out, "  signing secret: {}", em(forwarder.secret()))?;
        }
        writeln!(out, "Ready! Press Ctrl+C to stop")?;
        out.flush()
    }
}
