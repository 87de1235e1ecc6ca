//! Server capability probing: range support and resource metadata.
//!
//! Everything here is read-only against the origin: HEAD requests and a
//! one-byte `Range: bytes=0-0` GET whose body is discarded. Probe failures
//! never abort a download; they only steer strategy selection toward the
//! single-stream path.

mod cache;
mod parse;

pub use cache::{HostKey, RangeSupport, RangeSupportCache};

use anyhow::{Context, Result};
use std::str;
use std::time::Duration;

/// Sent on every request. Some CDNs serve different (range-less) responses to
/// obvious tooling, so this mimics a desktop browser.
pub const USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) \
     AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36";

/// Maximum redirect depth on any request.
pub const MAX_REDIRECTS: u32 = 10;

const HEAD_PROBE_TIMEOUT: Duration = Duration::from_secs(3);
const RANGE_PROBE_TIMEOUT: Duration = Duration::from_secs(5);
const METADATA_TIMEOUT: Duration = Duration::from_secs(15);

/// Response metadata a download needs before the first body byte.
#[derive(Debug, Clone, Default)]
pub struct Metadata {
    /// Total size from `Content-Length` (or a 206 `Content-Range` total).
    pub content_length: Option<u64>,
    /// Server advertised or demonstrated byte-range support.
    pub accept_ranges: bool,
    /// Filename hint from `Content-Disposition`.
    pub content_disposition: Option<String>,
    /// Validators kept for a future resume check.
    pub etag: Option<String>,
    pub last_modified: Option<String>,
}

enum ProbeMethod {
    Head,
    RangeZero,
}

struct ProbeResponse {
    status: u32,
    headers: Vec<String>,
}

/// Decide whether `url`'s host honors byte ranges, consulting and feeding the
/// per-host cache. Network failures degrade to `Unsupported`; the verdict is
/// then cached, first write wins.
pub fn probe_range_support(cache: &RangeSupportCache, url: &str) -> RangeSupport {
    let key = match HostKey::from_url(url) {
        Ok(k) => k,
        Err(e) => {
            tracing::debug!("range probe skipped, bad URL: {}", e);
            return RangeSupport::Unsupported;
        }
    };
    match cache.get(&key) {
        RangeSupport::Unknown => {}
        cached => return cached,
    }
    let verdict = probe_origin(url);
    cache.record(&key, verdict);
    tracing::debug!(host = %key, ?verdict, "range support probed");
    verdict
}

/// Probe and metadata fetch for one download in a single network pass.
///
/// The range-support verdict is derived from the same responses that
/// produced the metadata (a 206 on the fallback ranged GET already counts as
/// demonstrated support), then recorded in `cache`; an earlier cached verdict
/// for the host wins. Only when the metadata fetch got nothing at all does
/// the dedicated probe cascade run, so a download never asks the origin the
/// same question twice.
pub fn probe_with_metadata(cache: &RangeSupportCache, url: &str) -> (RangeSupport, Metadata) {
    let metadata = match fetch_metadata(url) {
        Ok(m) => m,
        Err(e) => {
            tracing::debug!("metadata probe failed, proceeding blind: {:#}", e);
            return (probe_range_support(cache, url), Metadata::default());
        }
    };
    let observed = if metadata.accept_ranges {
        RangeSupport::Supported
    } else {
        RangeSupport::Unsupported
    };
    let support = match HostKey::from_url(url) {
        Ok(key) => {
            cache.record(&key, observed);
            cache.get(&key)
        }
        Err(_) => observed,
    };
    (support, metadata)
}

fn probe_origin(url: &str) -> RangeSupport {
    if let Ok(resp) = probe_request(url, ProbeMethod::Head, HEAD_PROBE_TIMEOUT) {
        if parse::headers_indicate_ranges(&resp.headers) {
            return RangeSupport::Supported;
        }
    }
    match probe_request(url, ProbeMethod::RangeZero, RANGE_PROBE_TIMEOUT) {
        Ok(resp) if resp.status == 206 || parse::headers_indicate_ranges(&resp.headers) => {
            RangeSupport::Supported
        }
        _ => RangeSupport::Unsupported,
    }
}

/// Best-effort metadata fetch: HEAD first, then the one-byte ranged GET when
/// HEAD is blocked or incomplete, merging what each saw. The ranged GET also
/// recovers the total length from `Content-Range` when `Content-Length`
/// covers only the single-byte body.
pub fn fetch_metadata(url: &str) -> Result<Metadata> {
    let head = probe_request(url, ProbeMethod::Head, METADATA_TIMEOUT)
        .context("HEAD request failed")
        .and_then(|resp| {
            if (200..300).contains(&resp.status) {
                Ok(parse::parse_headers(&resp.headers))
            } else {
                anyhow::bail!("HEAD returned HTTP {}", resp.status)
            }
        });

    match head {
        Ok(mut meta) => {
            if meta.accept_ranges && meta.content_length.is_some() {
                return Ok(meta);
            }
            if let Ok(extra) = metadata_from_range_probe(url) {
                meta.accept_ranges |= extra.accept_ranges;
                meta.content_length = meta.content_length.or(extra.content_length);
                meta.content_disposition = meta.content_disposition.or(extra.content_disposition);
                meta.etag = meta.etag.or(extra.etag);
                meta.last_modified = meta.last_modified.or(extra.last_modified);
            }
            Ok(meta)
        }
        Err(head_err) => metadata_from_range_probe(url).map_err(|_| head_err),
    }
}

fn metadata_from_range_probe(url: &str) -> Result<Metadata> {
    let resp = probe_request(url, ProbeMethod::RangeZero, METADATA_TIMEOUT)
        .context("range probe failed")?;
    if !(200..300).contains(&resp.status) {
        anyhow::bail!("range probe returned HTTP {}", resp.status);
    }
    let mut meta = parse::parse_headers(&resp.headers);
    if resp.status == 206 {
        meta.accept_ranges = true;
        if let Some(total) = parse::content_range_total(&resp.headers) {
            meta.content_length = Some(total);
        }
    }
    Ok(meta)
}

/// One probing request. Collects the final response's header lines (redirect
/// header blocks are discarded as they arrive) and throws the body away.
fn probe_request(
    url: &str,
    method: ProbeMethod,
    timeout: Duration,
) -> std::result::Result<ProbeResponse, curl::Error> {
    let mut headers: Vec<String> = Vec::new();

    let mut easy = curl::easy::Easy::new();
    easy.url(url)?;
    easy.useragent(USER_AGENT)?;
    easy.follow_location(true)?;
    easy.max_redirections(MAX_REDIRECTS)?;
    easy.connect_timeout(Duration::from_secs(10))?;
    easy.timeout(timeout)?;
    match method {
        ProbeMethod::Head => easy.nobody(true)?,
        ProbeMethod::RangeZero => easy.range("0-0")?,
    }

    {
        let mut transfer = easy.transfer();
        transfer.header_function(|line| {
            if let Ok(s) = str::from_utf8(line) {
                let s = s.trim_end();
                // Each redirect hop emits a fresh status line; only the last
                // block matters.
                if s.starts_with("HTTP/") {
                    headers.clear();
                }
                headers.push(s.to_string());
            }
            true
        })?;
        transfer.write_function(|data| Ok(data.len()))?;
        transfer.perform()?;
    }

    let status = easy.response_code()?;
    Ok(ProbeResponse { status, headers })
}
