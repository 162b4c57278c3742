//! Background reader for the stream connection.
//!
//! [`MessagePump::start`] moves a [`Connection`] onto its own task and
//! exposes two channels: text frames (bounded, in wire order) and a
//! single-slot error channel. Both channels close when the task ends.
//!
//! The read itself has no deadline; liveness is the transport's job via
//! ping/pong. Clean closures end the task without reporting anything.

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use super::connection::{Connection, ConnectionLink, ReadError};
use crate::constants::MESSAGE_CHANNEL_CAPACITY;

/// Receiving side of a running read loop.
#[derive(Debug)]
pub struct MessagePump {
    /// Text frames in the order they were read.
    pub messages: mpsc::Receiver<String>,
    /// At most one fatal read error.
    pub errors: mpsc::Receiver<ReadError>,
    link: ConnectionLink,
    task: JoinHandle<()>,
}

impl MessagePump {
    /// Spawn the read loop for `connection`.
    ///
    /// Cancelling `cancel` stops the loop even while it waits on a full
    /// message channel.
    pub fn start(connection: Connection, cancel: CancellationToken) -> Self {
        let (message_tx, messages) = mpsc::channel(MESSAGE_CHANNEL_CAPACITY);
        let (error_tx, errors) = mpsc::channel(1);
        let link = connection.link();

        let task = tokio::spawn(read_loop(connection, message_tx, error_tx, cancel));

        Self {
            messages,
            errors,
            link,
            task,
        }
    }

    /// Write-side handle of the pumped connection.
    pub fn link(&self) -> &ConnectionLink {
        &self.link
    }

    /// Whether the read loop has exited.
    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }
}

impl Drop for MessagePump {
    fn drop(&mut self) {
        self.task.abort();
    }
}

async fn read_loop(
    mut connection: Connection,
    message_tx: mpsc::Sender<String>,
    error_tx: mpsc::Sender<ReadError>,
    cancel: CancellationToken,
) {
    loop {
        let frame = tokio::select! {
            () = cancel.cancelled() => {
                log::debug!("[Pump] Cancelled while reading");
                return;
            }
            frame = connection.read() => frame,
        };

        match frame {
            Ok(text) => {
                tokio::select! {
                    () = cancel.cancelled() => {
                        log::debug!("[Pump] Cancelled while enqueueing");
                        return;
                    }
                    sent = message_tx.send(text) => {
                        if sent.is_err() {
                            log::debug!("[Pump] Consumer gone, stopping");
                            return;
                        }
                    }
                }
            }
            Err(err) if err.is_expected() => {
                log::info!("[Pump] Stream ended: {}", err);
                return;
            }
            Err(err) => {
                log::warn!("[Pump] Read failed: {}", err);
                // Single slot, single send: cannot be full.
                let _ = error_tx.try_send(err);
                return;
            }
        }
    }
}
