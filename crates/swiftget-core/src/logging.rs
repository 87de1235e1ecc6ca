//! Logging setup: file under the XDG state dir, stderr as the fallback.
//!
//! The CLI writes progress to the terminal, so tracing output goes to a file
//! where it cannot tear the display.

use anyhow::Result;
use std::fs;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

fn env_filter() -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info,swiftget_core=debug"))
}

/// Initialize tracing to `~/.local/state/swiftget/swiftget.log` (appending).
/// Returns an error when the state dir is unusable so the caller can fall
/// back to stderr.
pub fn init_logging() -> Result<()> {
    let dirs = xdg::BaseDirectories::with_prefix("swiftget")?;
    let dir = dirs.get_state_home();
    fs::create_dir_all(&dir)?;
    let path = dir.join("swiftget.log");
    let file = fs::OpenOptions::new().create(true).append(true).open(&path)?;

    tracing_subscriber::fmt()
        .with_env_filter(env_filter())
        .with_writer(Arc::new(file))
        .with_ansi(false)
        .init();

    tracing::info!("logging to {}", path.display());
    Ok(())
}

/// Stderr-only fallback when the log file cannot be opened.
pub fn init_logging_stderr() {
    tracing_subscriber::fmt()
        .with_env_filter(env_filter())
        .with_writer(std::io::stderr)
        .with_ansi(false)
        .init();
}
