//! Minimal HTTP/1.1 server for integration tests: HEAD and Range GET over a
//! single static body, with switches for the ways real servers misbehave
//! (blocked HEAD, ignored ranges, missing Content-Length, dropped
//! connections, slow bodies).

use std::io::{Read, Write};
use std::net::{Shutdown, TcpListener, TcpStream};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

#[derive(Debug, Clone, Copy)]
pub struct ServerOptions {
    /// When false, HEAD returns 405.
    pub head_allowed: bool,
    /// When false, GET ignores `Range` and sends the full body with 200.
    pub support_ranges: bool,
    /// When false, `Accept-Ranges: bytes` is never sent.
    pub advertise_ranges: bool,
    /// When false, responses omit `Content-Length` (body is EOF-delimited).
    pub send_content_length: bool,
    /// Drop the connection halfway through the first N multi-byte ranged
    /// GETs (after sending complete headers), simulating resets.
    pub fail_first_ranged_gets: usize,
    /// Pause between body chunks, to make downloads last long enough to
    /// cancel.
    pub chunk_delay: Option<Duration>,
    /// Report this total in ranged responses' `Content-Range` instead of the
    /// real body length, simulating a resource that changed mid-download.
    pub content_range_total_override: Option<u64>,
}

impl Default for ServerOptions {
    fn default() -> Self {
        Self {
            head_allowed: true,
            support_ranges: true,
            advertise_ranges: true,
            send_content_length: true,
            fail_first_ranged_gets: 0,
            chunk_delay: None,
            content_range_total_override: None,
        }
    }
}

/// Request counters, for asserting probe caching and strategy choice.
#[derive(Debug, Default)]
pub struct RequestStats {
    pub head: AtomicUsize,
    pub get: AtomicUsize,
    /// GETs carrying a `Range` header spanning more than one byte
    /// (i.e. segment workers, not probes).
    pub ranged_data_get: AtomicUsize,
}

pub struct ServerHandle {
    pub url: String,
    pub stats: Arc<RequestStats>,
}

impl ServerHandle {
    pub fn total_requests(&self) -> usize {
        self.stats.head.load(Ordering::Relaxed) + self.stats.get.load(Ordering::Relaxed)
    }
}

pub fn start(body: Vec<u8>) -> ServerHandle {
    start_with_options(body, ServerOptions::default())
}

/// Serves `body` from a background thread until the process exits.
pub fn start_with_options(body: Vec<u8>, opts: ServerOptions) -> ServerHandle {
    let listener = TcpListener::bind("127.0.0.1:0").expect("bind test server");
    let port = listener.local_addr().unwrap().port();
    let body = Arc::new(body);
    let stats = Arc::new(RequestStats::default());
    let failures_left = Arc::new(AtomicUsize::new(opts.fail_first_ranged_gets));

    let stats_in_thread = Arc::clone(&stats);
    thread::spawn(move || {
        for stream in listener.incoming().flatten() {
            let body = Arc::clone(&body);
            let stats = Arc::clone(&stats_in_thread);
            let failures_left = Arc::clone(&failures_left);
            thread::spawn(move || handle(stream, &body, opts, &stats, &failures_left));
        }
    });

    ServerHandle {
        url: format!("http://127.0.0.1:{}/testfile.bin", port),
        stats,
    }
}

fn handle(
    mut stream: TcpStream,
    body: &[u8],
    opts: ServerOptions,
    stats: &RequestStats,
    failures_left: &AtomicUsize,
) {
    let _ = stream.set_read_timeout(Some(Duration::from_secs(5)));
    let _ = stream.set_write_timeout(Some(Duration::from_secs(5)));

    let mut buf = [0u8; 8192];
    let n = match stream.read(&mut buf) {
        Ok(0) | Err(_) => return,
        Ok(n) => n,
    };
    let request = match std::str::from_utf8(&buf[..n]) {
        Ok(s) => s,
        Err(_) => return,
    };
    let (method, range) = parse_request(request);
    let total = body.len() as u64;

    if method.eq_ignore_ascii_case("HEAD") {
        stats.head.fetch_add(1, Ordering::Relaxed);
        if !opts.head_allowed {
            let _ = stream.write_all(b"HTTP/1.1 405 Method Not Allowed\r\nConnection: close\r\n\r\n");
            return;
        }
        let mut headers = String::from("HTTP/1.1 200 OK\r\nConnection: close\r\n");
        if opts.send_content_length {
            headers.push_str(&format!("Content-Length: {}\r\n", total));
        }
        if opts.advertise_ranges {
            headers.push_str("Accept-Ranges: bytes\r\n");
        }
        headers.push_str("\r\n");
        let _ = stream.write_all(headers.as_bytes());
        return;
    }

    if !method.eq_ignore_ascii_case("GET") {
        let _ = stream.write_all(b"HTTP/1.1 405 Method Not Allowed\r\nConnection: close\r\n\r\n");
        return;
    }
    stats.get.fetch_add(1, Ordering::Relaxed);

    if let (true, Some((start, end_incl))) = (opts.support_ranges, range) {
        let end_incl = end_incl.min(total.saturating_sub(1));
        if start >= total || start > end_incl {
            let resp = format!(
                "HTTP/1.1 416 Range Not Satisfiable\r\nConnection: close\r\nContent-Range: bytes */{}\r\nContent-Length: 0\r\n\r\n",
                total
            );
            let _ = stream.write_all(resp.as_bytes());
            return;
        }
        let slice = &body[start as usize..=end_incl as usize];
        if slice.len() > 1 {
            stats.ranged_data_get.fetch_add(1, Ordering::Relaxed);
        }

        let reported_total = opts.content_range_total_override.unwrap_or(total);
        let mut headers = format!(
            "HTTP/1.1 206 Partial Content\r\nConnection: close\r\nContent-Range: bytes {}-{}/{}\r\nContent-Length: {}\r\n",
            start,
            end_incl,
            reported_total,
            slice.len()
        );
        if opts.advertise_ranges {
            headers.push_str("Accept-Ranges: bytes\r\n");
        }
        headers.push_str("\r\n");
        let _ = stream.write_all(headers.as_bytes());

        let should_fail = slice.len() > 1
            && failures_left
                .fetch_update(Ordering::Relaxed, Ordering::Relaxed, |v| v.checked_sub(1))
                .is_ok();
        if should_fail {
            let _ = stream.write_all(&slice[..slice.len() / 2]);
            let _ = stream.shutdown(Shutdown::Both);
            return;
        }
        write_body(&mut stream, slice, opts.chunk_delay);
        return;
    }

    // Plain 200: range unsupported, absent, or ignored.
    let mut headers = String::from("HTTP/1.1 200 OK\r\nConnection: close\r\n");
    if opts.send_content_length {
        headers.push_str(&format!("Content-Length: {}\r\n", total));
    }
    if opts.advertise_ranges {
        headers.push_str("Accept-Ranges: bytes\r\n");
    }
    headers.push_str("\r\n");
    let _ = stream.write_all(headers.as_bytes());
    write_body(&mut stream, body, opts.chunk_delay);
}

fn write_body(stream: &mut TcpStream, body: &[u8], chunk_delay: Option<Duration>) {
    match chunk_delay {
        None => {
            let _ = stream.write_all(body);
        }
        Some(delay) => {
            for chunk in body.chunks(8 * 1024) {
                if stream.write_all(chunk).is_err() {
                    return;
                }
                let _ = stream.flush();
                thread::sleep(delay);
            }
        }
    }
}

/// Returns `(method, Some((start, end_inclusive)))` for `Range: bytes=X-Y`.
fn parse_request(request: &str) -> (&str, Option<(u64, u64)>) {
    let mut lines = request.lines();
    let method = lines
        .next()
        .and_then(|l| l.split_whitespace().next())
        .unwrap_or("");
    let mut range = None;
    for line in lines {
        let line = line.trim();
        if line.is_empty() {
            break;
        }
        if let Some((name, value)) = line.split_once(':') {
            if name.trim().eq_ignore_ascii_case("range") {
                let lower = value.trim().to_ascii_lowercase();
                if let Some(bounds) = lower.strip_prefix("bytes=") {
                    if let Some((a, b)) = bounds.split_once('-') {
                        let start = a.trim().parse::<u64>().unwrap_or(0);
                        let end = b.trim();
                        let end_incl = if end.is_empty() {
                            u64::MAX
                        } else {
                            end.parse::<u64>().unwrap_or(0)
                        };
                        range = Some((start, end_incl));
                    }
                }
            }
        }
    }
    (method, range)
}
