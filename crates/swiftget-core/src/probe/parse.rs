//! Response header-line parsing for the probes.

use super::Metadata;

/// Case-insensitive lookup of a header value in collected lines.
pub(super) fn header_value<'a>(lines: &'a [String], name: &str) -> Option<&'a str> {
    lines.iter().find_map(|line| {
        let (n, v) = line.split_once(':')?;
        if n.trim().eq_ignore_ascii_case(name) {
            Some(v.trim())
        } else {
            None
        }
    })
}

/// True when the response advertises byte-range support: an `Accept-Ranges`
/// containing `bytes`, or any `Content-Range`.
pub(super) fn headers_indicate_ranges(lines: &[String]) -> bool {
    if let Some(v) = header_value(lines, "accept-ranges") {
        if v.to_ascii_lowercase().contains("bytes") {
            return true;
        }
    }
    header_value(lines, "content-range").is_some()
}

/// Total length from `Content-Range: bytes a-b/total`; `None` for `*`.
pub(super) fn content_range_total(lines: &[String]) -> Option<u64> {
    let value = header_value(lines, "content-range")?;
    let (_, total) = value.split_once('/')?;
    total.trim().parse::<u64>().ok()
}

/// Fold collected header lines into `Metadata`.
pub(super) fn parse_headers(lines: &[String]) -> Metadata {
    let content_length =
        header_value(lines, "content-length").and_then(|v| v.parse::<u64>().ok());
    let accept_ranges = header_value(lines, "accept-ranges")
        .map(|v| v.to_ascii_lowercase().contains("bytes"))
        .unwrap_or(false);
    let etag = header_value(lines, "etag").map(|v| v.trim_matches('"').to_string());
    let last_modified = header_value(lines, "last-modified").map(str::to_string);
    let content_disposition = header_value(lines, "content-disposition").map(str::to_string);

    Metadata {
        content_length,
        accept_ranges,
        content_disposition,
        etag,
        last_modified,
    }
}
