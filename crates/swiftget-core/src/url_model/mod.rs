//! Local filename derivation for a download.
//!
//! Preference order: `Content-Disposition` filename, then the last URL path
//! segment, then a generic fallback. Results are sanitized for Linux
//! filesystems and can be de-collided against a directory listing.

mod content_disposition;
mod sanitize;

pub use content_disposition::filename_from_content_disposition;
pub use sanitize::sanitize_filename;

/// Used when neither the URL nor the headers yield a usable name.
const FALLBACK_FILENAME: &str = "download.bin";

/// Last non-empty path segment of `url`, if it parses and has one.
pub fn filename_from_url_path(url: &str) -> Option<String> {
    let parsed = url::Url::parse(url).ok()?;
    let segment = parsed.path().rsplit('/').find(|s| !s.is_empty())?;
    match segment {
        "." | ".." => None,
        s => Some(s.to_string()),
    }
}

/// Derive a safe local filename for a download.
pub fn derive_filename(url: &str, content_disposition: Option<&str>) -> String {
    let candidate = content_disposition
        .and_then(filename_from_content_disposition)
        .filter(|s| !s.is_empty())
        .or_else(|| filename_from_url_path(url));

    let sanitized = match candidate {
        Some(raw) => sanitize_filename(&raw),
        None => return FALLBACK_FILENAME.to_string(),
    };
    if sanitized.is_empty() || sanitized == "." || sanitized == ".." {
        FALLBACK_FILENAME.to_string()
    } else {
        sanitized
    }
}

/// Avoid clobbering existing files: returns `candidate` unchanged when free,
/// else `stem (1).ext`, `stem (2).ext`, ...
pub fn unique_filename_among(candidate: &str, existing: &[String]) -> String {
    let taken = |name: &str| existing.iter().any(|e| e == name);
    if !taken(candidate) {
        return candidate.to_string();
    }
    let (stem, ext) = match candidate.rfind('.') {
        Some(i) if i > 0 => candidate.split_at(i),
        _ => (candidate, ""),
    };
    (1..)
        .map(|n| format!("{stem} ({n}){ext}"))
        .find(|name| !taken(name))
        .expect("counter space exhausted")
}
