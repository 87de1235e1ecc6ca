//! Engine defaults loaded from `~/.config/swiftget/config.toml`.

use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::PathBuf;

use crate::segmenter::{DEFAULT_MIN_SEGMENT_BYTES, DEFAULT_WORKERS};

/// Tunables the CLI applies when the user passes no overrides.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Parallel connections for the segmented strategy (clamped to 1..=32).
    pub workers: usize,
    /// Smallest worthwhile segment; files under twice this use one stream.
    pub min_segment_bytes: u64,
    /// Attempts per transfer, including the first.
    pub max_attempts: u32,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            workers: DEFAULT_WORKERS,
            min_segment_bytes: DEFAULT_MIN_SEGMENT_BYTES,
            max_attempts: 3,
        }
    }
}

pub fn config_path() -> Result<PathBuf> {
    let dirs = xdg::BaseDirectories::with_prefix("swiftget")?;
    Ok(dirs.place_config_file("config.toml")?)
}

/// Load the config, writing a default file on first run.
pub fn load_or_init() -> Result<EngineConfig> {
    let path = config_path()?;
    if !path.exists() {
        let cfg = EngineConfig::default();
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(&path, toml::to_string_pretty(&cfg)?)?;
        tracing::info!("wrote default config to {}", path.display());
        return Ok(cfg);
    }
    let cfg = toml::from_str(&fs::read_to_string(&path)?)?;
    Ok(cfg)
}
