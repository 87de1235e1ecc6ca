use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use swiftget_core::config;

mod commands;

/// Top-level CLI for the swiftget downloader.
#[derive(Debug, Parser)]
#[command(name = "swiftget")]
#[command(about = "swiftget: accelerated HTTP(S) file downloader", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Download a URL.
    Get {
        /// Direct HTTP/HTTPS URL to download.
        url: String,

        /// Output file, or directory to derive a filename into.
        /// Defaults to the current directory.
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Parallel connections (overrides the config file).
        #[arg(short, long)]
        workers: Option<usize>,

        /// Expected SHA-256 of the file, as hex.
        #[arg(long)]
        sha256: Option<String>,

        /// Expected MD5 of the file, as hex.
        #[arg(long)]
        md5: Option<String>,

        /// Log strategy decisions.
        #[arg(short, long)]
        verbose: bool,
    },

    /// Probe a URL for range support and metadata without downloading.
    Probe {
        /// URL to probe.
        url: String,
    },

    /// Compute checksums of a local file.
    Checksum {
        /// Path of the file to hash.
        path: PathBuf,

        /// Also compute MD5.
        #[arg(long)]
        md5: bool,
    },
}

impl Cli {
    pub async fn run_from_args() -> Result<()> {
        let cli = Cli::parse();
        let cfg = config::load_or_init()?;
        tracing::debug!("loaded config: {:?}", cfg);

        match cli.command {
            Command::Get {
                url,
                output,
                workers,
                sha256,
                md5,
                verbose,
            } => commands::get::run(&cfg, url, output, workers, md5, sha256, verbose).await,
            Command::Probe { url } => commands::probe::run(&url).await,
            Command::Checksum { path, md5 } => commands::checksum::run(&path, md5),
        }
    }
}
