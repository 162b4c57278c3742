//! Interactive [`ConflictPolicy`] for terminal sessions.

use std::io::{self, BufRead, Write};

use async_trait::async_trait;
use tokio::sync::oneshot;

use super::connection::{ConflictDecision, ConflictPolicy};

/// Asks on stderr whether to take over a stream held by another listener.
///
/// Without a terminal on stdin nobody can answer, so it aborts.
#[derive(Debug, Default, Clone, Copy)]
pub struct TerminalPrompt;

#[async_trait]
impl ConflictPolicy for TerminalPrompt {
    async fn resolve(&self, stream_id: &str) -> ConflictDecision {
        if !atty::is(atty::Stream::Stdin) {
            log::warn!(
                "[Stream] Stream {} is taken and stdin is not a terminal",
                stream_id
            );
            eprintln!(
                "Stream {stream_id} is already being listened to elsewhere. Re-run with --force-reconnect to take it over."
            );
            return ConflictDecision::Abort;
        }

        let question = format!(
            "Stream {stream_id} is already being listened to elsewhere. Disconnect the other listener and continue? [y/N] "
        );
        ask(&question, io::stderr(), || {
            let mut line = String::new();
            io::stdin().lock().read_line(&mut line)?;
            Ok(line)
        })
        .await
    }
}

/// Write `question` to `out` and wait for one line from `read_line`.
///
/// The read runs on a detached thread. If the caller stops waiting
/// (cancellation), the thread is left blocked and never holds up runtime
/// shutdown, unlike a `spawn_blocking` task.
pub async fn ask<W, F>(question: &str, mut out: W, read_line: F) -> ConflictDecision
where
    W: Write,
    F: FnOnce() -> io::Result<String> + Send + 'static,
{
    if let Err(e) = write!(out, "{question}").and_then(|()| out.flush()) {
        log::warn!("[Stream] Failed to write prompt: {}", e);
        return ConflictDecision::Abort;
    }

    let (tx, rx) = oneshot::channel();
    let spawned = std::thread::Builder::new()
        .name("conflict-prompt".to_string())
        .spawn(move || {
            // The receiver is gone when the session was cancelled.
            let _ = tx.send(read_line());
        });
    if let Err(e) = spawned {
        log::warn!("[Stream] Failed to start prompt thread: {}", e);
        return ConflictDecision::Abort;
    }

    match rx.await {
        Ok(Ok(line)) => parse_answer(&line),
        Ok(Err(e)) => {
            log::warn!("[Stream] Failed to read answer: {}", e);
            ConflictDecision::Abort
        }
        Err(_) => {
            log::warn!("[Stream] Prompt thread exited without an answer");
            ConflictDecision::Abort
        }
    }
}

/// `y` / `yes` (any case) forces; anything else, including EOF, aborts.
pub fn parse_answer(line: &str) -> ConflictDecision {
    match line.trim().to_ascii_lowercase().as_str() {
        "y" | "yes" => ConflictDecision::ForceReconnect,
        _ => ConflictDecision::Abort,
    }
}
