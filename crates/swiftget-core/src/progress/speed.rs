//! Throughput over a sliding sample window.

use std::collections::VecDeque;
use std::time::{Duration, Instant};

/// Samples older than this are evicted.
const WINDOW: Duration = Duration::from_secs(10);
/// Below this span the estimate is too noisy to report.
const MIN_SPAN: Duration = Duration::from_millis(250);

/// Time-windowed series of `(instant, cumulative_bytes)` samples.
///
/// The rate is the byte delta across the retained window divided by its time
/// span, which smooths per-chunk burstiness without lagging more than the
/// window length behind a real rate change.
#[derive(Debug)]
pub struct SpeedWindow {
    samples: VecDeque<(Instant, u64)>,
}

impl SpeedWindow {
    pub fn new() -> Self {
        Self {
            samples: VecDeque::new(),
        }
    }

    /// Record the current cumulative byte count.
    pub fn push(&mut self, cumulative_bytes: u64) {
        let now = Instant::now();
        self.samples.push_back((now, cumulative_bytes));
        while let Some(&(t, _)) = self.samples.front() {
            // Keep one sample beyond the window so the span stays >= WINDOW
            // once enough history exists.
            if now.duration_since(t) > WINDOW && self.samples.len() > 2 {
                self.samples.pop_front();
            } else {
                break;
            }
        }
    }

    /// Current rate in bytes/sec; 0.0 with fewer than two samples or a span
    /// under 250 ms.
    pub fn bytes_per_sec(&self) -> f64 {
        let (first, last) = match (self.samples.front(), self.samples.back()) {
            (Some(f), Some(l)) if self.samples.len() >= 2 => (*f, *l),
            _ => return 0.0,
        };
        let span = last.0.duration_since(first.0);
        if span < MIN_SPAN {
            return 0.0;
        }
        let bytes = last.1.saturating_sub(first.1);
        bytes as f64 / span.as_secs_f64()
    }

    pub fn clear(&mut self) {
        self.samples.clear();
    }
}

impl Default for SpeedWindow {
    fn default() -> Self {
        Self::new()
    }
}
