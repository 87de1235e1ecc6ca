//! The `probe` command: show what the engine would learn about a URL.

use anyhow::Result;

use swiftget_core::probe::{self, RangeSupport, RangeSupportCache};

use super::human_bytes;

pub async fn run(url: &str) -> Result<()> {
    let url = url.to_string();
    let (support, metadata) = tokio::task::spawn_blocking({
        let url = url.clone();
        move || {
            let cache = RangeSupportCache::new();
            let support = probe::probe_range_support(&cache, &url);
            let metadata = probe::fetch_metadata(&url);
            (support, metadata)
        }
    })
    .await?;

    match support {
        RangeSupport::Supported => println!("range requests: supported"),
        RangeSupport::Unsupported => println!("range requests: not supported"),
        RangeSupport::Unknown => println!("range requests: unknown"),
    }

    match metadata {
        Ok(m) => {
            match m.content_length {
                Some(len) => println!("content length: {} ({})", len, human_bytes(len)),
                None => println!("content length: not announced"),
            }
            if let Some(cd) = &m.content_disposition {
                println!("content disposition: {}", cd);
            }
            if let Some(etag) = &m.etag {
                println!("etag: {}", etag);
            }
            if let Some(lm) = &m.last_modified {
                println!("last modified: {}", lm);
            }
        }
        Err(e) => println!("metadata: unavailable ({:#})", e),
    }
    Ok(())
}
