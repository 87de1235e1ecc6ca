//! End-to-end engine tests against a local range-capable HTTP server.

mod common;

use std::sync::Arc;
use std::time::{Duration, Instant};

use tempfile::tempdir;

use swiftget_core::checksum;
use swiftget_core::control::{CancelToken, Canceled};
use swiftget_core::downloader::{self, DownloadOptions};
use swiftget_core::events::{self, Event};
use swiftget_core::probe::{self, RangeSupportCache};

use common::range_server::{self, ServerOptions};

fn test_body(len: usize) -> Vec<u8> {
    (0u8..=255).cycle().take(len).collect()
}

fn test_opts(id: &str) -> DownloadOptions {
    DownloadOptions {
        id: id.to_string(),
        workers: 8,
        min_segment_bytes: 128 * 1024,
        ..DownloadOptions::default()
    }
}

/// Runs a download on a blocking thread and returns its result plus every
/// event that reached the bus.
async fn run_download(
    url: String,
    dest: std::path::PathBuf,
    opts: DownloadOptions,
    cancel: CancelToken,
) -> (anyhow::Result<downloader::DownloadOutcome>, Vec<Event>) {
    let (sink, mut rx) = events::channel(1024);
    let cache = Arc::new(RangeSupportCache::new());
    let engine = tokio::task::spawn_blocking(move || {
        downloader::download(&url, &dest, &opts, &sink, &cache, &cancel)
    });
    let mut events_seen = Vec::new();
    while let Some(ev) = rx.recv().await {
        events_seen.push(ev);
    }
    let result = engine.await.expect("engine thread panicked");
    (result, events_seen)
}

fn terminal_events(events: &[Event]) -> Vec<&Event> {
    events
        .iter()
        .filter(|e| matches!(e, Event::Complete { .. } | Event::Error { .. }))
        .collect()
}

fn assert_single_terminal_and_quiet_after(events: &[Event]) {
    let terminals = terminal_events(events);
    assert_eq!(terminals.len(), 1, "exactly one terminal event: {events:?}");
    let last_terminal = events
        .iter()
        .rposition(|e| matches!(e, Event::Complete { .. } | Event::Error { .. }))
        .unwrap();
    assert!(
        events[last_terminal + 1..]
            .iter()
            .all(|e| !matches!(e, Event::Progress { .. })),
        "no progress after the terminal event"
    );
}

#[tokio::test]
async fn parallel_download_completes_and_hash_matches() {
    let body = test_body(2 * 1024 * 1024);
    let server = range_server::start(body.clone());
    let dir = tempdir().unwrap();
    let dest = dir.path().join("out.bin");

    let mut opts = test_opts("happy");
    let mut hasher = md5::Context::new();
    hasher.consume(&body);
    opts.expected_md5 = Some(format!("{:x}", hasher.compute()));

    let (result, events) =
        run_download(server.url.clone(), dest.clone(), opts, CancelToken::new()).await;

    let outcome = result.expect("download should succeed");
    assert_eq!(outcome.bytes, body.len() as u64);
    assert_eq!(std::fs::read(&dest).unwrap(), body);
    assert!(!dest.with_extension("bin.part").exists());

    // Multiple workers actually issued ranged requests.
    assert!(
        server
            .stats
            .ranged_data_get
            .load(std::sync::atomic::Ordering::Relaxed)
            >= 2,
        "expected a segmented download"
    );
    // The probe pass is a single HEAD: metadata and the range verdict come
    // from the same response.
    assert_eq!(
        server.stats.head.load(std::sync::atomic::Ordering::Relaxed),
        1,
        "origin must be probed exactly once"
    );

    assert!(matches!(
        events.first(),
        Some(Event::Started { total, .. }) if *total == body.len() as u64
    ));
    assert!(matches!(
        events.last(),
        Some(Event::Complete { total, .. }) if *total == body.len() as u64
    ));
    assert_single_terminal_and_quiet_after(&events);
}

#[tokio::test]
async fn server_without_ranges_or_length_falls_back_to_single_stream() {
    let body = test_body(300 * 1024);
    let server = range_server::start_with_options(
        body.clone(),
        ServerOptions {
            support_ranges: false,
            advertise_ranges: false,
            send_content_length: false,
            ..ServerOptions::default()
        },
    );
    let dir = tempdir().unwrap();
    let dest = dir.path().join("stream.bin");

    let (result, events) = run_download(
        server.url.clone(),
        dest.clone(),
        test_opts("fallback"),
        CancelToken::new(),
    )
    .await;

    let outcome = result.expect("single-stream download should succeed");
    assert_eq!(outcome.bytes, body.len() as u64);
    assert_eq!(std::fs::read(&dest).unwrap(), body);

    // No length was announced, so Started carries 0 and no worker sent a
    // multi-byte ranged request.
    assert!(matches!(events.first(), Some(Event::Started { total: 0, .. })));
    assert_eq!(
        server
            .stats
            .ranged_data_get
            .load(std::sync::atomic::Ordering::Relaxed),
        0
    );
    assert_eq!(
        server.stats.head.load(std::sync::atomic::Ordering::Relaxed),
        1,
        "the range verdict must reuse the metadata pass, not re-probe"
    );
    assert_single_terminal_and_quiet_after(&events);
}

#[tokio::test]
async fn length_change_mid_download_surfaces_inconsistent_resource() {
    let body = test_body(512 * 1024);
    // Probe sees the true length; every worker's Content-Range then reports
    // a different total, as if the resource was replaced under us.
    let server = range_server::start_with_options(
        body.clone(),
        ServerOptions {
            content_range_total_override: Some(999_999_999),
            ..ServerOptions::default()
        },
    );
    let dir = tempdir().unwrap();
    let dest = dir.path().join("changed.bin");

    let (result, events) = run_download(
        server.url.clone(),
        dest.clone(),
        test_opts("changed"),
        CancelToken::new(),
    )
    .await;

    let err = result.expect_err("length change must abort the download");
    let inconsistent = err
        .downcast_ref::<downloader::InconsistentResource>()
        .unwrap_or_else(|| panic!("unexpected error: {err:#}"));
    assert_eq!(inconsistent.expected, body.len() as u64);
    assert_eq!(inconsistent.got, 999_999_999);

    assert!(!dest.exists());
    assert!(
        dir.path().join("changed.bin.part").exists(),
        "partial file must remain"
    );
    assert!(matches!(events.last(), Some(Event::Error { .. })));
    assert_single_terminal_and_quiet_after(&events);
}

#[tokio::test]
async fn range_lie_demotes_to_single_stream_with_correct_output() {
    let body = test_body(512 * 1024);
    // Advertises Accept-Ranges but answers every GET with 200 + full body.
    let server = range_server::start_with_options(
        body.clone(),
        ServerOptions {
            support_ranges: false,
            advertise_ranges: true,
            ..ServerOptions::default()
        },
    );
    let dir = tempdir().unwrap();
    let dest = dir.path().join("liar.bin");

    let (result, events) = run_download(
        server.url.clone(),
        dest.clone(),
        test_opts("liar"),
        CancelToken::new(),
    )
    .await;

    result.expect("fallback after range lie should succeed");
    assert_eq!(std::fs::read(&dest).unwrap(), body);
    assert_single_terminal_and_quiet_after(&events);
}

#[tokio::test]
async fn dropped_segment_connection_is_retried_from_cursor() {
    let body = test_body(1024 * 1024);
    let server = range_server::start_with_options(
        body.clone(),
        ServerOptions {
            fail_first_ranged_gets: 2,
            ..ServerOptions::default()
        },
    );
    let dir = tempdir().unwrap();
    let dest = dir.path().join("retry.bin");

    let (result, events) = run_download(
        server.url.clone(),
        dest.clone(),
        test_opts("retry"),
        CancelToken::new(),
    )
    .await;

    result.expect("retries should recover the dropped segments");
    assert_eq!(std::fs::read(&dest).unwrap(), body);
    assert!(matches!(events.last(), Some(Event::Complete { .. })));
    assert_single_terminal_and_quiet_after(&events);
}

#[tokio::test]
async fn checksum_mismatch_deletes_output_and_errors() {
    let body = test_body(256 * 1024);
    let server = range_server::start(body.clone());
    let dir = tempdir().unwrap();
    let dest = dir.path().join("bad.bin");

    let mut opts = test_opts("mismatch");
    opts.expected_sha256 = Some("0".repeat(64));

    let (result, events) =
        run_download(server.url.clone(), dest.clone(), opts, CancelToken::new()).await;

    let err = result.expect_err("mismatched digest must fail the download");
    assert!(
        err.downcast_ref::<checksum::IntegrityMismatch>().is_some(),
        "unexpected error: {err:#}"
    );
    assert!(!dest.exists(), "corrupt output must be removed");
    assert!(matches!(events.last(), Some(Event::Error { .. })));
    assert_single_terminal_and_quiet_after(&events);
}

#[tokio::test]
async fn cancellation_returns_promptly_and_keeps_partial_file() {
    let body = test_body(2 * 1024 * 1024);
    let server = range_server::start_with_options(
        body.clone(),
        ServerOptions {
            chunk_delay: Some(Duration::from_millis(50)),
            ..ServerOptions::default()
        },
    );
    let dir = tempdir().unwrap();
    let dest = dir.path().join("canceled.bin");
    let part = dir.path().join("canceled.bin.part");

    let cancel = CancelToken::new();
    let trigger = cancel.clone();
    let canceled_at = Arc::new(std::sync::Mutex::new(None::<Instant>));
    let canceled_at_setter = Arc::clone(&canceled_at);
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(400)).await;
        *canceled_at_setter.lock().unwrap() = Some(Instant::now());
        trigger.cancel();
    });

    let mut opts = test_opts("cancel");
    opts.workers = 4;
    let (result, events) = run_download(server.url.clone(), dest.clone(), opts, cancel).await;

    let err = result.expect_err("canceled download must not succeed");
    assert!(err.downcast_ref::<Canceled>().is_some(), "got: {err:#}");

    let since_cancel = canceled_at
        .lock()
        .unwrap()
        .expect("cancel fired")
        .elapsed();
    assert!(
        since_cancel < Duration::from_millis(1500),
        "engine took {since_cancel:?} to unwind after cancel"
    );

    assert!(part.exists(), "partial file must remain for inspection");
    assert!(!dest.exists());
    assert!(matches!(events.last(), Some(Event::Error { .. })));
    assert_single_terminal_and_quiet_after(&events);
}

#[tokio::test]
async fn probe_verdict_is_cached_per_host() {
    let server = range_server::start(test_body(64 * 1024));
    let cache = RangeSupportCache::new();
    let url = server.url.clone();

    let (first, second, requests_between) = tokio::task::spawn_blocking(move || {
        let first = probe::probe_range_support(&cache, &url);
        let after_first = server.total_requests();
        let second = probe::probe_range_support(&cache, &url);
        (first, second, server.total_requests() - after_first)
    })
    .await
    .unwrap();

    assert_eq!(first, probe::RangeSupport::Supported);
    assert_eq!(second, first);
    assert_eq!(requests_between, 0, "cached verdict must not touch the network");
}
