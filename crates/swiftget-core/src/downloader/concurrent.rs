//! Parallel ranged downloader: a bounded worker pool over a shared segment
//! queue, writing into one preallocated file.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{mpsc, Arc, Mutex};

use crate::control::CancelToken;
use crate::progress::ProgressState;
use crate::retry::{run_with_retry, RetryPolicy, TransferError};
use crate::segmenter::Segment;
use crate::storage::StorageWriter;

use super::worker;

/// Downloads all `segments` with up to `max_workers` threads.
///
/// Each worker owns a segment for the duration of an attempt; a failed
/// attempt keeps the segment's cursor so the retry resumes mid-range. The
/// first worker to exhaust its retries trips `halt`, which aborts the
/// siblings' in-flight transfers; that first error is what the caller sees.
pub(super) fn download_concurrent(
    url: &str,
    total: u64,
    segments: Vec<Segment>,
    max_workers: usize,
    storage: &StorageWriter,
    state: &Arc<ProgressState>,
    policy: &RetryPolicy,
    cancel: &CancelToken,
) -> Result<(), TransferError> {
    let segment_count = segments.len();
    if segment_count == 0 {
        return Ok(());
    }
    let cursors: Arc<Vec<AtomicU64>> =
        Arc::new((0..segment_count).map(|_| AtomicU64::new(0)).collect());
    let queue: Arc<Mutex<VecDeque<(usize, Segment)>>> =
        Arc::new(Mutex::new(segments.into_iter().enumerate().collect()));
    let halt = CancelToken::new();

    let worker_count = max_workers.max(1).min(segment_count);
    let (tx, rx) = mpsc::channel::<(usize, Result<(), TransferError>)>();
    let mut handles = Vec::with_capacity(worker_count);
    for _ in 0..worker_count {
        let url = url.to_string();
        let queue = Arc::clone(&queue);
        let cursors = Arc::clone(&cursors);
        let storage = storage.clone();
        let state = Arc::clone(state);
        let cancel = cancel.clone();
        let halt = halt.clone();
        let policy = *policy;
        let tx = tx.clone();
        handles.push(std::thread::spawn(move || loop {
            if cancel.is_canceled() || halt.is_canceled() {
                break;
            }
            let (index, segment) = match queue.lock().unwrap().pop_front() {
                Some(item) => item,
                None => break,
            };
            let result = run_with_retry(&policy, &cancel, || {
                worker::download_segment(
                    &url,
                    &segment,
                    total,
                    &cursors[index],
                    &storage,
                    &state,
                    &cancel,
                    &halt,
                )
            });
            let failed = result.is_err();
            if tx.send((index, result)).is_err() || failed {
                break;
            }
        }));
    }
    drop(tx);

    let mut first_error: Option<(usize, TransferError)> = None;
    for (index, result) in rx {
        if let Err(e) = result {
            if first_error.is_none() {
                // Stop the siblings; their in-flight transfers abort from the
                // progress callback and the queue is drained below.
                halt.cancel();
                queue.lock().unwrap().clear();
                first_error = Some((index, e));
            }
        }
    }
    for handle in handles {
        if handle.join().is_err() && first_error.is_none() {
            first_error = Some((
                0,
                TransferError::Storage(std::io::Error::other("segment worker panicked")),
            ));
        }
    }

    if let Some((index, e)) = first_error {
        tracing::debug!(segment = index, "segmented download failed: {}", e);
        return Err(e);
    }

    debug_assert_eq!(
        cursors.iter().map(|c| c.load(Ordering::Relaxed)).sum::<u64>(),
        total,
        "segment cursors must cover the whole resource on success"
    );
    Ok(())
}
