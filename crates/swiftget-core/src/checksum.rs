//! Post-download integrity verification.
//!
//! Digests are recomputed by reading the finished file back; segment bytes
//! are never buffered for ordered hashing, so the concurrent path stays
//! zero-copy. Comparison against the expected hex is constant-time.

use anyhow::{Context, Result};
use md5::Context as Md5Context;
use sha2::{Digest, Sha256};
use std::fmt;
use std::fs::File;
use std::io::Read;
use std::path::Path;

const BUF_SIZE: usize = 64 * 1024;

/// Digest algorithms the engine can verify.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HashAlgo {
    Md5,
    Sha256,
}

impl fmt::Display for HashAlgo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HashAlgo::Md5 => write!(f, "MD5"),
            HashAlgo::Sha256 => write!(f, "SHA-256"),
        }
    }
}

/// The downloaded bytes do not match the digest the caller supplied.
#[derive(Debug)]
pub struct IntegrityMismatch {
    pub algo: HashAlgo,
    pub expected: String,
    pub got: String,
}

impl fmt::Display for IntegrityMismatch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} mismatch: expected {}, got {}",
            self.algo, self.expected, self.got
        )
    }
}

impl std::error::Error for IntegrityMismatch {}

/// SHA-256 of a file as lowercase hex. Streams in 64 KiB chunks.
pub fn sha256_path(path: &Path) -> Result<String> {
    let mut hasher = Sha256::new();
    stream_file(path, |chunk| hasher.update(chunk))?;
    Ok(hex::encode(hasher.finalize()))
}

/// MD5 of a file as lowercase hex. Streams in 64 KiB chunks.
pub fn md5_path(path: &Path) -> Result<String> {
    let mut ctx = Md5Context::new();
    stream_file(path, |chunk| ctx.consume(chunk))?;
    Ok(format!("{:x}", ctx.compute()))
}

fn stream_file(path: &Path, mut update: impl FnMut(&[u8])) -> Result<()> {
    let mut f = File::open(path).with_context(|| format!("open {}", path.display()))?;
    let mut buf = [0u8; BUF_SIZE];
    loop {
        let n = f
            .read(&mut buf)
            .with_context(|| format!("read {}", path.display()))?;
        if n == 0 {
            return Ok(());
        }
        update(&buf[..n]);
    }
}

/// Verifies the file against any supplied digests. Returns the mismatch
/// (without touching the file) so the caller decides what to delete.
pub fn verify(
    path: &Path,
    expected_md5: Option<&str>,
    expected_sha256: Option<&str>,
) -> Result<std::result::Result<(), IntegrityMismatch>> {
    if let Some(expected) = expected_md5 {
        let got = md5_path(path)?;
        if !hex_eq_constant_time(expected, &got) {
            return Ok(Err(IntegrityMismatch {
                algo: HashAlgo::Md5,
                expected: expected.to_ascii_lowercase(),
                got,
            }));
        }
    }
    if let Some(expected) = expected_sha256 {
        let got = sha256_path(path)?;
        if !hex_eq_constant_time(expected, &got) {
            return Ok(Err(IntegrityMismatch {
                algo: HashAlgo::Sha256,
                expected: expected.to_ascii_lowercase(),
                got,
            }));
        }
    }
    Ok(Ok(()))
}

/// Case-insensitive hex comparison that does not short-circuit on the first
/// differing byte. Length is not secret.
fn hex_eq_constant_time(a: &str, b: &str) -> bool {
    if a.len() != b.len() {
        return false;
    }
    let diff = a
        .bytes()
        .zip(b.bytes())
        .fold(0u8, |acc, (x, y)| acc | (x.to_ascii_lowercase() ^ y.to_ascii_lowercase()));
    diff == 0
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn file_with(content: &[u8]) -> tempfile::NamedTempFile {
        let mut f = tempfile::NamedTempFile::new().unwrap();
        f.write_all(content).unwrap();
        f.flush().unwrap();
        f
    }

    #[test]
    fn sha256_known_vectors() {
        let empty = file_with(b"");
        assert_eq!(
            sha256_path(empty.path()).unwrap(),
            "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
        );
        let hello = file_with(b"hello\n");
        assert_eq!(
            sha256_path(hello.path()).unwrap(),
            "5891b5b522d5df086d0ff0b110fbd9d21bb4fc7163af34d08286a2e846f6be03"
        );
    }

    #[test]
    fn md5_known_vector() {
        let hello = file_with(b"hello\n");
        assert_eq!(md5_path(hello.path()).unwrap(), "b1946ac92492d2347c6235b4d2611184");
    }

    #[test]
    fn verify_accepts_matching_digests_any_case() {
        let f = file_with(b"hello\n");
        let ok = verify(
            f.path(),
            Some("B1946AC92492D2347C6235B4D2611184"),
            Some("5891b5b522d5df086d0ff0b110fbd9d21bb4fc7163af34d08286a2e846f6be03"),
        )
        .unwrap();
        assert!(ok.is_ok());
    }

    #[test]
    fn verify_reports_the_failing_algorithm() {
        let f = file_with(b"hello\n");
        let err = verify(f.path(), None, Some(&"0".repeat(64))).unwrap().unwrap_err();
        assert_eq!(err.algo, HashAlgo::Sha256);
        assert_eq!(err.expected, "0".repeat(64));
        assert_ne!(err.got, err.expected);
    }

    #[test]
    fn hex_compare_is_length_strict() {
        assert!(!hex_eq_constant_time("abcd", "abc"));
        assert!(hex_eq_constant_time("AbCd", "abcd"));
        assert!(!hex_eq_constant_time("abcd", "abce"));
    }
}
