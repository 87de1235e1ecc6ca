//! Shared progress accounting for one download attempt.
//!
//! Byte and connection counters are plain atomics so workers never contend;
//! the speed window is the only locked structure and the lock is held just
//! long enough to push or scan samples, never across I/O.

mod speed;

pub use speed::SpeedWindow;

use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;
use std::time::Duration;

use crate::events::{Event, EventSink};

/// Minimum spacing between published `Progress` events.
pub const PUBLISH_INTERVAL: Duration = Duration::from_millis(100);

/// Aggregate state shared by all workers of one download attempt.
pub struct ProgressState {
    total: u64,
    downloaded: AtomicU64,
    active_connections: AtomicUsize,
    window: Mutex<SpeedWindow>,
}

impl ProgressState {
    /// `total` of 0 means the length is unknown.
    pub fn new(total: u64) -> Self {
        Self {
            total,
            downloaded: AtomicU64::new(0),
            active_connections: AtomicUsize::new(0),
            window: Mutex::new(SpeedWindow::new()),
        }
    }

    pub fn total(&self) -> u64 {
        self.total
    }

    /// Add `n` freshly written bytes to the aggregate counter.
    pub fn record_bytes(&self, n: u64) {
        self.downloaded.fetch_add(n, Ordering::Relaxed);
    }

    pub fn downloaded(&self) -> u64 {
        self.downloaded.load(Ordering::Relaxed)
    }

    /// Discard progress when a strategy restarts from byte zero (single-stream
    /// retry, or fallback after a range protocol violation).
    pub fn reset(&self) {
        self.downloaded.store(0, Ordering::Relaxed);
        self.window.lock().unwrap().clear();
    }

    pub fn active_connections(&self) -> usize {
        self.active_connections.load(Ordering::Relaxed)
    }

    /// Marks one in-flight HTTP request; the gauge drops when the guard does.
    pub fn connection(&self) -> ConnectionGuard<'_> {
        self.active_connections.fetch_add(1, Ordering::Relaxed);
        ConnectionGuard { state: self }
    }

    /// Take a time sample and return `(downloaded, bytes_per_sec)`.
    pub fn snapshot(&self) -> (u64, f64) {
        let downloaded = self.downloaded();
        let speed = {
            let mut w = self.window.lock().unwrap();
            w.push(downloaded);
            w.bytes_per_sec()
        };
        (downloaded, speed)
    }

    /// Seconds until completion at the current rate. `None` when the total or
    /// the rate is unknown.
    pub fn eta_secs(&self) -> Option<f64> {
        if self.total == 0 {
            return None;
        }
        let (downloaded, speed) = {
            let w = self.window.lock().unwrap();
            (self.downloaded(), w.bytes_per_sec())
        };
        if speed <= 0.0 {
            return None;
        }
        Some(self.total.saturating_sub(downloaded) as f64 / speed)
    }
}

/// Decrements the active-connection gauge on drop.
pub struct ConnectionGuard<'a> {
    state: &'a ProgressState,
}

impl Drop for ConnectionGuard<'_> {
    fn drop(&mut self) {
        self.state.active_connections.fetch_sub(1, Ordering::Relaxed);
    }
}

/// Background thread that samples `state` every 100 ms and publishes a
/// `Progress` event per sample. Samples are sent with `try_send`, so a slow
/// consumer only loses intermediate readings.
pub struct ProgressPublisher {
    stop: Arc<AtomicBool>,
    handle: Option<JoinHandle<()>>,
}

impl ProgressPublisher {
    pub fn spawn(id: String, state: Arc<ProgressState>, sink: EventSink) -> Self {
        let stop = Arc::new(AtomicBool::new(false));
        let stop_in_thread = Arc::clone(&stop);
        let handle = std::thread::spawn(move || {
            while !stop_in_thread.load(Ordering::Relaxed) {
                let (downloaded, speed) = state.snapshot();
                sink.publish_progress(Event::Progress {
                    id: id.clone(),
                    downloaded,
                    total: state.total(),
                    speed_bytes_per_sec: speed,
                    active_connections: state.active_connections(),
                });
                std::thread::sleep(PUBLISH_INTERVAL);
            }
        });
        Self {
            stop,
            handle: Some(handle),
        }
    }

    /// Stop sampling and wait for the thread. After this returns, no further
    /// `Progress` event for the id will be published, so the caller may emit
    /// its terminal event.
    pub fn finish(mut self) {
        self.stop.store(true, Ordering::Relaxed);
        if let Some(h) = self.handle.take() {
            let _ = h.join();
        }
    }
}

impl Drop for ProgressPublisher {
    fn drop(&mut self) {
        self.stop.store(true, Ordering::Relaxed);
        if let Some(h) = self.handle.take() {
            let _ = h.join();
        }
    }
}
