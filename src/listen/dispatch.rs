//! Envelope handling: filter, render, forward.
//!
//! The dispatcher is driven by the session loop, one text frame at a time,
//! in wire order. Rendering is synchronous into the configured writer;
//! forwarding is spawned and never awaited here.

use std::collections::HashSet;
use std::io::{self, Write};

use chrono::{DateTime, Local};
use crossterm::style::{style, Color, Stylize};
use tokio::task::JoinHandle;

use super::forward::Forwarder;
use super::types::{Envelope, EnvelopeKind, Event};

/// How much of each event is printed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RenderMode {
    /// Type plus the whole pretty-printed payload.
    #[default]
    Full,
    /// Type plus `from`/`to`/`subject` when present.
    Slim,
}

/// Set of event types to let through. Empty means everything passes.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EventFilter(HashSet<String>);

impl EventFilter {
    /// Filter allowing exactly `types`.
    pub fn new<I, S>(types: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self(types.into_iter().map(Into::into).collect())
    }

    /// Parse a comma-separated list, ignoring blanks.
    pub fn parse(list: &str) -> Self {
        Self::new(list.split(',').map(str::trim).filter(|s| !s.is_empty()))
    }

    /// No types configured.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Configured types, unordered.
    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(String::as_str)
    }

    /// Whether an event of `event_type` passes.
    pub fn allows(&self, event_type: &str) -> bool {
        self.0.is_empty() || self.0.contains(event_type)
    }
}

/// What [`EventDispatcher::handle`] did with an envelope.
#[derive(Debug)]
pub enum DispatchOutcome {
    /// Session confirmation printed.
    Connected,
    /// Nothing to do (no event, or unknown envelope type).
    Ignored,
    /// Frame was not valid envelope JSON.
    Malformed,
    /// Dropped by the event-type filter.
    Filtered {
        /// Type that failed the filter.
        event_type: String,
    },
    /// Printed, and forwarded when a target is configured.
    Rendered {
        /// Spawned forward task, if any.
        forward: Option<JoinHandle<()>>,
    },
}

/// Renders envelopes to `out` and hands payloads to an optional forwarder.
pub struct EventDispatcher<W: Write> {
    out: W,
    mode: RenderMode,
    filter: EventFilter,
    forwarder: Option<Forwarder>,
    color: bool,
}

impl<W: Write> std::fmt::Debug for EventDispatcher<W> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventDispatcher")
            .field("mode", &self.mode)
            .field("filter", &self.filter)
            .field("forwarder", &self.forwarder)
            .field("color", &self.color)
            .finish_non_exhaustive()
    }
}

impl<W: Write> EventDispatcher<W> {
    /// Uncoloured dispatcher with no filter and no forwarding.
    pub fn new(out: W, mode: RenderMode) -> Self {
        Self {
            out,
            mode,
            filter: EventFilter::default(),
            forwarder: None,
            color: false,
        }
    }

    /// Only render and forward events passing `filter`.
    #[must_use]
    pub fn with_filter(mut self, filter: EventFilter) -> Self {
        self.filter = filter;
        self
    }

    /// Forward every rendered event's payload.
    #[must_use]
    pub fn with_forwarder(mut self, forwarder: Option<Forwarder>) -> Self {
        self.forwarder = forwarder;
        self
    }

    /// Toggle ANSI styling.
    #[must_use]
    pub fn with_color(mut self, color: bool) -> Self {
        self.color = color;
        self
    }

    /// Give back the writer.
    pub fn into_inner(self) -> W {
        self.out
    }

    /// Parse and handle one text frame.
    ///
    /// Malformed frames are logged and skipped.
    pub fn handle_text(&mut self, text: &str) -> io::Result<DispatchOutcome> {
        match Envelope::parse(text) {
            Ok(envelope) => self.handle(&envelope),
            Err(e) => {
                log::warn!("[Dispatch] Skipping malformed frame: {}", e);
                Ok(DispatchOutcome::Malformed)
            }
        }
    }

    /// Handle one envelope.
    ///
    /// Only write failures on the output are errors.
    pub fn handle(&mut self, envelope: &Envelope) -> io::Result<DispatchOutcome> {
        match envelope.kind {
            EnvelopeKind::Connected => {
                self.render_connected(envelope)?;
                Ok(DispatchOutcome::Connected)
            }
            EnvelopeKind::Event | EnvelopeKind::Replay => {
                let Some(event) = envelope.event.as_ref() else {
                    return Ok(DispatchOutcome::Ignored);
                };

                let event_type = event.display_type();
                if !self.filter.allows(&event_type) {
                    log::debug!("[Dispatch] Filtered out {}", event_type);
                    return Ok(DispatchOutcome::Filtered { event_type });
                }

                let replay = envelope.kind == EnvelopeKind::Replay;
                self.render_event(envelope.timestamp, replay, &event_type, event)?;

                let forward = self
                    .forwarder
                    .as_ref()
                    .map(|f| f.forward(event.data.as_bytes().to_vec()));
                Ok(DispatchOutcome::Rendered { forward })
            }
            EnvelopeKind::Other => {
                log::debug!("[Dispatch] Ignoring unknown envelope type");
                Ok(DispatchOutcome::Ignored)
            }
        }
    }

    fn paint(&self, text: &str, color: Color) -> String {
        if self.color {
            style(text).with(color).to_string()
        } else {
            text.to_string()
        }
    }

    fn render_connected(&mut self, envelope: &Envelope) -> io::Result<()> {
        let check = self.paint("✓", Color::Green);
        match envelope.session_id.as_deref() {
            Some(session) => writeln!(self.out, "{check} Connected (session {session})")?,
            None => writeln!(self.out, "{check} Connected")?,
        }
        self.out.flush()
    }

    fn render_event(
        &mut self,
        timestamp: i64,
        replay: bool,
        event_type: &str,
        event: &Event,
    ) -> io::Result<()> {
        let time = self.paint(&local_time(timestamp), Color::DarkGrey);
        let marker = if replay {
            self.paint("replay", Color::Yellow)
        } else {
            self.paint("event ", Color::Green)
        };
        let kind = if self.color {
            style(event_type).bold().to_string()
        } else {
            event_type.to_string()
        };

        match self.mode {
            RenderMode::Slim => {
                let summary = event.data.summary();
                let mut line = format!("{time}  {marker}  {kind}");
                for (label, value) in [
                    ("from", &summary.from),
                    ("to", &summary.to),
                    ("subject", &summary.subject),
                ] {
                    if let Some(value) = value {
                        line.push_str(&format!("  {label}: {value}"));
                    }
                }
                writeln!(self.out, "{line}")?;
            }
            RenderMode::Full => {
                writeln!(self.out, "{time}  {marker}  {kind}")?;
                writeln!(self.out, "{}", event.data.pretty())?;
            }
        }
        self.out.flush()
    }
}

/// `HH:MM:SS` in local time; falls back to now for a missing timestamp.
fn local_time(timestamp: i64) -> String {
    let at = if timestamp > 0 {
        DateTime::from_timestamp(timestamp, 0).map(|t| t.with_timezone(&Local))
    } else {
        None
    };
    at.unwrap_or_else(Local::now).format("%H:%M:%S").to_string()
}
