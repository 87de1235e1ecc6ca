//! Destination-file lifecycle: `.part` temp file, preallocation, positional
//! writes from many workers, fsync, and atomic rename into place.
//!
//! The `.part` file doubles as the preserved partial on failure or cancel.

use anyhow::{Context, Result};
use std::fs::File;
use std::path::{Path, PathBuf};
use std::sync::Arc;

#[cfg(unix)]
use std::os::unix::fs::FileExt;
#[cfg(unix)]
use std::os::unix::io::AsRawFd;
#[cfg(not(unix))]
use std::sync::Mutex;

/// Temp-file suffix appended to the final path while a download is running.
pub const PART_SUFFIX: &str = ".part";

/// Path of the in-progress file for `final_path` (`file.iso` → `file.iso.part`).
pub fn part_path(final_path: &Path) -> PathBuf {
    let mut s = final_path.as_os_str().to_owned();
    s.push(PART_SUFFIX);
    PathBuf::from(s)
}

/// Shared writer over the temp file. Clones write through one descriptor;
/// `write_at` is pwrite-style so concurrent segment writers need no
/// coordination. On platforms without positional writes the seek+write pair
/// runs under a per-file mutex.
#[derive(Clone)]
pub struct StorageWriter {
    file: Arc<File>,
    path: PathBuf,
    #[cfg(not(unix))]
    seek_lock: Arc<Mutex<()>>,
}

impl StorageWriter {
    /// Create (or truncate) the temp file at `path` and preallocate
    /// `size` bytes when a length is known. On Unix tries
    /// `posix_fallocate` for real block allocation, falling back to
    /// `set_len`.
    pub fn create(path: &Path, size: Option<u64>) -> Result<Self> {
        let file = File::options()
            .read(true)
            .write(true)
            .create(true)
            .truncate(true)
            .open(path)
            .with_context(|| format!("create temp file {}", path.display()))?;
        let writer = Self {
            file: Arc::new(file),
            path: path.to_path_buf(),
            #[cfg(not(unix))]
            seek_lock: Arc::new(Mutex::new(())),
        };
        if let Some(size) = size {
            writer.preallocate(size)?;
        }
        Ok(writer)
    }

    fn preallocate(&self, size: u64) -> Result<()> {
        if size == 0 {
            return Ok(());
        }
        #[cfg(unix)]
        {
            let rc = unsafe { libc::posix_fallocate(self.file.as_raw_fd(), 0, size as libc::off_t) };
            if rc == 0 {
                return Ok(());
            }
            tracing::debug!(errno = rc, "posix_fallocate unavailable, using set_len");
        }
        self.file
            .set_len(size)
            .with_context(|| format!("preallocate {} bytes in {}", size, self.path.display()))
    }

    /// Write `data` at `offset` without moving any shared cursor.
    #[cfg(unix)]
    pub fn write_at(&self, offset: u64, data: &[u8]) -> std::io::Result<()> {
        self.file.write_all_at(data, offset)
    }

    #[cfg(not(unix))]
    pub fn write_at(&self, offset: u64, data: &[u8]) -> std::io::Result<()> {
        use std::io::{Seek, SeekFrom, Write};
        let _guard = self.seek_lock.lock().unwrap();
        let mut f = &*self.file;
        f.seek(SeekFrom::Start(offset))?;
        f.write_all(data)
    }

    /// Drop all written content (single-stream retry restarts from zero).
    pub fn truncate(&self) -> std::io::Result<()> {
        self.file.set_len(0)
    }

    /// Flush file data to disk. Called before finalize; failures are the
    /// caller's to ignore or surface.
    pub fn sync(&self) -> Result<()> {
        self.file.sync_all().context("fsync of temp file failed")
    }

    /// Current on-disk length of the temp file.
    pub fn len(&self) -> std::io::Result<u64> {
        Ok(self.file.metadata()?.len())
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Atomically rename the temp file to `final_path`, consuming the writer.
    /// Same-filesystem rename only.
    pub fn finalize(self, final_path: &Path) -> Result<()> {
        let temp = self.path.clone();
        drop(self.file);
        std::fs::rename(&temp, final_path).with_context(|| {
            format!("rename {} to {}", temp.display(), final_path.display())
        })
    }
}
