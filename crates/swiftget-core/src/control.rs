//! Cooperative cancellation for downloads.
//!
//! A `CancelToken` is cloned into every worker and checked at each blocking
//! boundary (queue pop, retry sleep, in-flight transfer via the curl progress
//! callback). Cancellation is a request, not an interruption: workers observe
//! the flag and unwind, releasing their connections.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Error surfaced when a download stops because the caller canceled it.
/// Never masks another failure: the director reports it only when the token
/// was actually triggered.
#[derive(Debug)]
pub struct Canceled;

impl std::fmt::Display for Canceled {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "download canceled")
    }
}

impl std::error::Error for Canceled {}

/// Shared cancellation flag. Cloning is cheap; all clones observe the same
/// trigger. Once set it stays set.
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    flag: Arc<AtomicBool>,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    /// Request cancellation. Idempotent.
    pub fn cancel(&self) {
        self.flag.store(true, Ordering::Relaxed);
    }

    pub fn is_canceled(&self) -> bool {
        self.flag.load(Ordering::Relaxed)
    }
}
