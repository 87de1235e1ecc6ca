//! The `get` command: run one download, rendering engine events.

use anyhow::{Context, Result};
use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;

use swiftget_core::config::EngineConfig;
use swiftget_core::control::CancelToken;
use swiftget_core::downloader::{self, DownloadOptions};
use swiftget_core::events::{self, Event};
use swiftget_core::probe::RangeSupportCache;

use super::human_bytes;

pub async fn run(
    cfg: &EngineConfig,
    url: String,
    output: Option<PathBuf>,
    workers: Option<usize>,
    md5: Option<String>,
    sha256: Option<String>,
    verbose: bool,
) -> Result<()> {
    let dest = match output {
        Some(p) => p,
        None => std::env::current_dir().context("no usable working directory")?,
    };

    let opts = DownloadOptions {
        id: "1".to_string(),
        expected_md5: md5,
        expected_sha256: sha256,
        verbose,
        workers: workers.unwrap_or(cfg.workers),
        min_segment_bytes: cfg.min_segment_bytes,
    };

    let (sink, mut rx) = events::channel(256);
    let cache = Arc::new(RangeSupportCache::new());
    let cancel = CancelToken::new();

    // Ctrl-C cancels cooperatively; the partial file stays for inspection.
    {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                eprintln!("\ninterrupt: canceling download");
                cancel.cancel();
            }
        });
    }

    let engine = tokio::task::spawn_blocking({
        let url = url.clone();
        let cancel = cancel.clone();
        move || downloader::download(&url, &dest, &opts, &sink, &cache, &cancel)
    });

    // The sink lives inside the blocking task; the channel closes when the
    // download returns, ending this loop.
    let mut progress_line_open = false;
    while let Some(event) = rx.recv().await {
        render(event, &mut progress_line_open);
    }
    if progress_line_open {
        println!();
    }

    let outcome = engine.await.context("download task panicked")??;
    tracing::debug!(bytes = outcome.bytes, "get finished: {}", outcome.dest_path.display());
    Ok(())
}

fn render(event: Event, progress_line_open: &mut bool) {
    match event {
        Event::Started { filename, total, .. } => {
            if total > 0 {
                println!("downloading {} ({})", filename, human_bytes(total));
            } else {
                println!("downloading {} (unknown size)", filename);
            }
        }
        Event::Progress {
            downloaded,
            total,
            speed_bytes_per_sec,
            active_connections,
            ..
        } => {
            let position = if total > 0 {
                format!(
                    "{:>5.1}% of {}",
                    downloaded as f64 / total as f64 * 100.0,
                    human_bytes(total)
                )
            } else {
                human_bytes(downloaded)
            };
            print!(
                "\r  {} | {}/s | {} conn   ",
                position,
                human_bytes(speed_bytes_per_sec as u64),
                active_connections
            );
            let _ = std::io::stdout().flush();
            *progress_line_open = true;
        }
        Event::Paused { downloaded, .. } => {
            end_progress_line(progress_line_open);
            println!("paused at {}", human_bytes(downloaded));
        }
        Event::Resumed { .. } => {
            end_progress_line(progress_line_open);
            println!("resumed");
        }
        Event::Complete { filename, elapsed, total, .. } => {
            end_progress_line(progress_line_open);
            println!(
                "{}: {} in {:.1}s",
                filename,
                human_bytes(total),
                elapsed.as_secs_f64()
            );
        }
        Event::Error { message, .. } => {
            end_progress_line(progress_line_open);
            println!("failed: {}", message);
        }
    }
}

fn end_progress_line(progress_line_open: &mut bool) {
    if *progress_line_open {
        println!();
        *progress_line_open = false;
    }
}
