//! Telemetry bus from the engine to its observers.
//!
//! One bounded channel per consumer, engine side write-only. Lifecycle events
//! (`Started`, `Paused`, `Resumed`, `Complete`, `Error`) are delivered with a
//! blocking send and are never lost; `Progress` samples use `try_send` and
//! may be dropped when the consumer lags. Events for the same download id are
//! delivered in publication order.

use std::path::PathBuf;
use std::time::Duration;

use tokio::sync::mpsc;

/// Telemetry published by the engine. Consumers dispatch with an exhaustive
/// `match`; the set of variants is the bus contract.
#[derive(Debug, Clone)]
pub enum Event {
    /// Download accepted and resolved; sent before the first body byte.
    /// `total` is 0 when the server did not announce a length.
    Started {
        id: String,
        url: String,
        filename: String,
        total: u64,
        dest_path: PathBuf,
    },
    /// Periodic progress sample (at most one per 100 ms). Droppable.
    Progress {
        id: String,
        downloaded: u64,
        total: u64,
        speed_bytes_per_sec: f64,
        active_connections: usize,
    },
    /// Download stopped by its owner with intent to resume later.
    Paused { id: String, downloaded: u64 },
    /// A previously paused download was started again.
    Resumed { id: String },
    /// Terminal success. `total` is the number of bytes on disk.
    Complete {
        id: String,
        filename: String,
        elapsed: Duration,
        total: u64,
    },
    /// Terminal failure. Exactly one of `Complete` / `Error` per id.
    Error { id: String, message: String },
}

/// Engine-side handle to the bus. Clonable; all clones feed one consumer.
#[derive(Debug, Clone)]
pub struct EventSink {
    tx: mpsc::Sender<Event>,
}

/// Creates a bounded bus. `capacity` should leave room for a burst of
/// progress samples; lifecycle events block rather than overflow.
pub fn channel(capacity: usize) -> (EventSink, mpsc::Receiver<Event>) {
    let (tx, rx) = mpsc::channel(capacity.max(1));
    (EventSink { tx }, rx)
}

impl EventSink {
    /// Publish a lifecycle event. Blocks until the bus has room; must be
    /// called from a blocking thread, never from an async task.
    pub fn publish(&self, event: Event) {
        if self.tx.blocking_send(event).is_err() {
            tracing::debug!("event bus closed, dropping lifecycle event");
        }
    }

    /// Publish a progress sample. Never blocks; dropped when the bus is full
    /// or closed.
    pub fn publish_progress(&self, event: Event) {
        let _ = self.tx.try_send(event);
    }
}
