//! Process-wide cache of range-support verdicts, keyed by host authority.

use std::collections::HashMap;
use std::fmt;
use std::sync::Mutex;

use anyhow::{Context, Result};

/// Range-support verdict for a host.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RangeSupport {
    /// Never probed.
    #[default]
    Unknown,
    /// Honors `Range` requests.
    Supported,
    /// Ignores or rejects `Range` requests.
    Unsupported,
}

/// Cache key: `host[:port]`, host lowercased so verdicts are shared across
/// differently-cased URLs for one origin.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct HostKey {
    host: String,
    port: u16,
}

impl HostKey {
    pub fn from_url(url: &str) -> Result<Self> {
        let parsed = url::Url::parse(url).with_context(|| format!("invalid URL: {url}"))?;
        let host = parsed
            .host_str()
            .ok_or_else(|| anyhow::anyhow!("URL has no host: {url}"))?
            .to_ascii_lowercase();
        let port = parsed
            .port_or_known_default()
            .ok_or_else(|| anyhow::anyhow!("URL has no port and unknown scheme: {url}"))?;
        Ok(Self { host, port })
    }
}

impl fmt::Display for HostKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.host, self.port)
    }
}

/// Verdict cache shared by all downloads in the process. Read-often,
/// write-rare; first write wins and entries are never evicted. Construct one
/// per test to keep probes observable.
#[derive(Debug, Default)]
pub struct RangeSupportCache {
    verdicts: Mutex<HashMap<HostKey, RangeSupport>>,
}

impl RangeSupportCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Cached verdict for `key`; `Unknown` when the host was never probed.
    pub fn get(&self, key: &HostKey) -> RangeSupport {
        self.verdicts
            .lock()
            .unwrap()
            .get(key)
            .copied()
            .unwrap_or(RangeSupport::Unknown)
    }

    /// Store a verdict unless one already exists. `Unknown` is never stored.
    pub fn record(&self, key: &HostKey, verdict: RangeSupport) {
        if verdict == RangeSupport::Unknown {
            return;
        }
        self.verdicts
            .lock()
            .unwrap()
            .entry(key.clone())
            .or_insert(verdict);
    }
}
