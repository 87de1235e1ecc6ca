//! The download director: probes the origin, picks a strategy, wires up
//! progress telemetry, and owns the job's event lifecycle.
//!
//! Strategy selection: servers that honor byte ranges and announce a length
//! of at least two minimum segments get the parallel segmented path;
//! everything else gets the sequential fallback. A server that advertises
//! ranges but answers a ranged request with 200 demotes the job to the
//! fallback mid-flight.

mod concurrent;
mod single;
mod worker;

use anyhow::{Context, Result};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::checksum;
use crate::control::{CancelToken, Canceled};
use crate::events::{Event, EventSink};
use crate::probe::{self, Metadata, RangeSupport, RangeSupportCache};
use crate::progress::{ProgressPublisher, ProgressState};
use crate::retry::{RetryPolicy, TransferError};
use crate::segmenter::{self, DEFAULT_MIN_SEGMENT_BYTES, DEFAULT_WORKERS};
use crate::storage::{part_path, StorageWriter};
use crate::url_model;

/// Per-download knobs; everything beyond the URL and destination.
#[derive(Debug, Clone)]
pub struct DownloadOptions {
    /// Opaque id threaded through every event for this download.
    pub id: String,
    /// Expected MD5 as hex; verified after completion when set.
    pub expected_md5: Option<String>,
    /// Expected SHA-256 as hex; verified after completion when set.
    pub expected_sha256: Option<String>,
    /// Log strategy decisions at info level.
    pub verbose: bool,
    /// Parallel connections for the segmented path (clamped to 1..=32).
    pub workers: usize,
    /// Smallest worthwhile segment; also gates strategy selection.
    pub min_segment_bytes: u64,
}

impl Default for DownloadOptions {
    fn default() -> Self {
        Self {
            id: String::new(),
            expected_md5: None,
            expected_sha256: None,
            verbose: false,
            workers: DEFAULT_WORKERS,
            min_segment_bytes: DEFAULT_MIN_SEGMENT_BYTES,
        }
    }
}

/// What a finished download looked like.
#[derive(Debug, Clone)]
pub struct DownloadOutcome {
    pub dest_path: PathBuf,
    pub filename: String,
    pub bytes: u64,
    pub elapsed: Duration,
}

/// The resource changed length mid-download: a worker's `Content-Range`
/// total no longer matches the length the segment plan was built from.
/// Callers can downcast to this alongside `Canceled` and
/// `IntegrityMismatch`.
#[derive(Debug)]
pub struct InconsistentResource {
    pub expected: u64,
    pub got: u64,
}

impl std::fmt::Display for InconsistentResource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "resource length changed mid-download: {} became {}",
            self.expected, self.got
        )
    }
}

impl std::error::Error for InconsistentResource {}

/// Runs one download to completion (or failure), publishing its lifecycle on
/// `sink`: `Started` before the first body byte, `Progress` while running,
/// then exactly one of `Complete` / `Error`.
///
/// `dest` may be a directory, in which case the filename comes from
/// `Content-Disposition` or the URL path, de-collided against existing
/// files. On failure or cancel the partial `.part` file stays on disk; an
/// integrity mismatch is the one case where the output is deleted.
pub fn download(
    url: &str,
    dest: &Path,
    opts: &DownloadOptions,
    sink: &EventSink,
    cache: &RangeSupportCache,
    cancel: &CancelToken,
) -> Result<DownloadOutcome> {
    let started_at = Instant::now();

    // One probe pass answers both questions: the metadata and the host's
    // range-support verdict come from the same responses, and the verdict is
    // recorded for later downloads to the same host.
    let (support, metadata) = probe::probe_with_metadata(cache, url);
    let (dest_path, filename) =
        resolve_destination(dest, url, metadata.content_disposition.as_deref());

    let total = metadata.content_length.unwrap_or(0);
    let use_segments = support == RangeSupport::Supported
        && metadata
            .content_length
            .is_some_and(|len| len >= 2 * opts.min_segment_bytes.max(1));
    if opts.verbose {
        tracing::info!(
            url,
            total,
            ?support,
            strategy = if use_segments { "segmented" } else { "single" },
            "dispatching download"
        );
    }

    let temp_path = part_path(&dest_path);
    let storage = match StorageWriter::create(&temp_path, metadata.content_length) {
        Ok(s) => s,
        Err(e) => {
            let err = e.context("preparing destination file");
            publish_error(sink, &opts.id, &err);
            return Err(err);
        }
    };

    sink.publish(Event::Started {
        id: opts.id.clone(),
        url: url.to_string(),
        filename: filename.clone(),
        total,
        dest_path: dest_path.clone(),
    });

    let state = Arc::new(ProgressState::new(total));
    let publisher = ProgressPublisher::spawn(opts.id.clone(), Arc::clone(&state), sink.clone());
    let result = run_strategy(url, opts, &metadata, total, use_segments, &storage, &state, cancel);
    publisher.finish();

    let bytes = match result {
        Ok(bytes) => bytes,
        Err(e) => {
            let err = if cancel.is_canceled() {
                anyhow::Error::new(Canceled)
            } else if let TransferError::LengthChanged { expected, got } = e {
                anyhow::Error::new(InconsistentResource { expected, got })
                    .context(format!("downloading {url}"))
            } else {
                anyhow::Error::new(e).context(format!("downloading {url}"))
            };
            publish_error(sink, &opts.id, &err);
            return Err(err);
        }
    };

    if let Err(e) = storage.sync() {
        tracing::warn!("fsync before finalize failed: {:#}", e);
    }
    if let Err(e) = storage.finalize(&dest_path) {
        publish_error(sink, &opts.id, &e);
        return Err(e);
    }

    if let Err(err) = verify_integrity(&dest_path, opts) {
        publish_error(sink, &opts.id, &err);
        return Err(err);
    }

    let elapsed = started_at.elapsed();
    sink.publish(Event::Complete {
        id: opts.id.clone(),
        filename: filename.clone(),
        elapsed,
        total: bytes,
    });
    tracing::info!(
        id = %opts.id,
        bytes,
        secs = elapsed.as_secs_f64(),
        "download complete: {}",
        dest_path.display()
    );

    Ok(DownloadOutcome {
        dest_path,
        filename,
        bytes,
        elapsed,
    })
}

#[allow(clippy::too_many_arguments)]
fn run_strategy(
    url: &str,
    opts: &DownloadOptions,
    metadata: &Metadata,
    total: u64,
    use_segments: bool,
    storage: &StorageWriter,
    state: &Arc<ProgressState>,
    cancel: &CancelToken,
) -> std::result::Result<u64, TransferError> {
    let policy = RetryPolicy::default();

    if use_segments {
        let plan = segmenter::plan_segments(total, opts.workers, opts.min_segment_bytes);
        match concurrent::download_concurrent(
            url, total, plan, opts.workers, storage, state, &policy, cancel,
        ) {
            Ok(()) => return Ok(total),
            Err(TransferError::RangeNotHonored) => {
                tracing::warn!(url, "server ignored Range mid-download, restarting single-stream");
                state.reset();
                storage.truncate().map_err(TransferError::Storage)?;
            }
            Err(e) => return Err(e),
        }
    }

    single::download_single(url, storage, metadata.content_length, state, &policy, cancel)
}

fn verify_integrity(dest_path: &Path, opts: &DownloadOptions) -> Result<()> {
    if opts.expected_md5.is_none() && opts.expected_sha256.is_none() {
        return Ok(());
    }
    let verdict = checksum::verify(
        dest_path,
        opts.expected_md5.as_deref(),
        opts.expected_sha256.as_deref(),
    )
    .context("reading output for verification")?;
    match verdict {
        Ok(()) => Ok(()),
        Err(mismatch) => {
            if let Err(e) = std::fs::remove_file(dest_path) {
                tracing::warn!("could not remove corrupt output: {:#}", e);
            }
            Err(anyhow::Error::new(mismatch))
        }
    }
}

/// Final path + filename for the download. A directory destination gets a
/// derived, collision-free name; a file destination is taken as given.
fn resolve_destination(dest: &Path, url: &str, content_disposition: Option<&str>) -> (PathBuf, String) {
    let treat_as_dir = dest.is_dir() || dest.as_os_str().to_string_lossy().ends_with('/');
    if treat_as_dir {
        let derived = url_model::derive_filename(url, content_disposition);
        let existing: Vec<String> = std::fs::read_dir(dest)
            .map(|entries| {
                entries
                    .filter_map(|e| e.ok())
                    .filter_map(|e| e.file_name().into_string().ok())
                    .collect()
            })
            .unwrap_or_default();
        let name = url_model::unique_filename_among(&derived, &existing);
        (dest.join(&name), name)
    } else {
        let name = dest
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| url_model::derive_filename(url, content_disposition));
        (dest.to_path_buf(), name)
    }
}

fn publish_error(sink: &EventSink, id: &str, err: &anyhow::Error) {
    sink.publish(Event::Error {
        id: id.to_string(),
        message: format!("{err:#}"),
    });
}
