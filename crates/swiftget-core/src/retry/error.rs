//! Error type returned by a single transfer attempt.

use std::fmt;

/// Failure of one HTTP transfer attempt (whole body or one segment).
///
/// Kept as an enum rather than anyhow so the retry layer can classify it and
/// the director can recognize the protocol violations that change strategy.
#[derive(Debug)]
pub enum TransferError {
    /// libcurl failure: timeout, connection, TLS, abort-by-callback.
    Curl(curl::Error),
    /// Non-2xx HTTP status.
    Http(u32),
    /// Transfer ended with fewer bytes than the request covered (server
    /// closed early). Retryable; the cursor keeps what was written.
    PartialTransfer { expected: u64, received: u64 },
    /// Local write failed (disk full, permissions). Not retried.
    Storage(std::io::Error),
    /// A ranged request was answered 200 with the full body. The segmented
    /// strategy cannot continue; the caller falls back to single-stream.
    RangeNotHonored,
    /// The resource length reported by `Content-Range` no longer matches the
    /// length the plan was built from.
    LengthChanged { expected: u64, got: u64 },
}

impl fmt::Display for TransferError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TransferError::Curl(e) => write!(f, "{}", e),
            TransferError::Http(code) => write!(f, "HTTP {}", code),
            TransferError::PartialTransfer { expected, received } => {
                write!(f, "partial transfer: expected {} bytes, got {}", expected, received)
            }
            TransferError::Storage(e) => write!(f, "storage: {}", e),
            TransferError::RangeNotHonored => {
                write!(f, "server ignored Range request and sent the full body")
            }
            TransferError::LengthChanged { expected, got } => {
                write!(f, "resource length changed mid-download: {} became {}", expected, got)
            }
        }
    }
}

impl std::error::Error for TransferError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            TransferError::Curl(e) => Some(e),
            TransferError::Storage(e) => Some(e),
            _ => None,
        }
    }
}
