//! Resumable on-disk buffer accepting offset-addressed writes.
//!
//! A [`FileBuffer`] exclusively owns one output file and accepts writes from
//! concurrent fetch tasks at pre-agreed, disjoint byte ranges. It tracks
//! `written_size`, the length of the contiguous byte prefix known to be on
//! disk, which doubles as the resume offset across process runs.

use std::collections::BTreeMap;
use std::io::SeekFrom;
use std::path::{Path, PathBuf};

use tokio::fs::{File, OpenOptions};
use tokio::io::{AsyncSeekExt, AsyncWriteExt};
use tokio::sync::Mutex;
use tracing::{debug, instrument};

use super::error::DownloadError;

/// Mutable buffer state, serialized behind one lock so the frontier counter
/// stays consistent across concurrent writers.
struct BufferInner {
    /// Open handle; `None` once the buffer has been closed.
    file: Option<File>,
    /// Length of the contiguous prefix persisted so far.
    written_size: u64,
    /// Byte intervals landed beyond the frontier, keyed by start offset.
    /// Absorbed into `written_size` once the gap before them fills.
    pending: BTreeMap<u64, u64>,
}

/// On-disk sink for one elementary stream, supporting out-of-order writes
/// and resume.
pub struct FileBuffer {
    path: PathBuf,
    inner: Mutex<BufferInner>,
}

impl FileBuffer {
    /// Opens a buffer for `path`.
    ///
    /// With `overwrite` the file is created fresh (truncated) and
    /// `written_size` starts at 0. Otherwise an existing file is reused and
    /// `written_size` is its current length, enabling resume.
    ///
    /// # Errors
    ///
    /// Returns [`DownloadError::Io`] when the file cannot be opened.
    #[instrument(level = "debug", skip(path), fields(path = %path.as_ref().display()))]
    pub async fn open(path: impl AsRef<Path>, overwrite: bool) -> Result<Self, DownloadError> {
        let path = path.as_ref().to_path_buf();
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(overwrite)
            .open(&path)
            .await
            .map_err(|e| DownloadError::io(path.clone(), e))?;
        let written_size = file
            .metadata()
            .await
            .map_err(|e| DownloadError::io(path.clone(), e))?
            .len();

        debug!(written_size, overwrite, "opened buffer");
        Ok(Self {
            path,
            inner: Mutex::new(BufferInner {
                file: Some(file),
                written_size,
                pending: BTreeMap::new(),
            }),
        })
    }

    /// Writes `bytes` at the absolute `offset`.
    ///
    /// Bytes always land on disk at the correct position. The frontier
    /// counter only advances along the contiguous prefix: a write at the
    /// frontier extends it and then absorbs any previously landed intervals
    /// that became contiguous; a write past the frontier is recorded as
    /// pending.
    ///
    /// # Errors
    ///
    /// Returns [`DownloadError::BufferClosed`] after `close`, or
    /// [`DownloadError::Io`] on seek/write failure.
    pub async fn write_at(&self, offset: u64, bytes: &[u8]) -> Result<(), DownloadError> {
        if bytes.is_empty() {
            return Ok(());
        }
        let mut inner = self.inner.lock().await;
        let Some(file) = inner.file.as_mut() else {
            return Err(DownloadError::buffer_closed(&self.path));
        };

        file.seek(SeekFrom::Start(offset))
            .await
            .map_err(|e| DownloadError::io(&self.path, e))?;
        file.write_all(bytes)
            .await
            .map_err(|e| DownloadError::io(&self.path, e))?;

        let end = offset + bytes.len() as u64;
        if offset <= inner.written_size {
            if end > inner.written_size {
                inner.written_size = end;
            }
        } else {
            inner.pending.insert(offset, bytes.len() as u64);
        }
        // Absorb pending intervals now reachable from the frontier.
        while let Some((&start, &len)) = inner.pending.first_key_value() {
            if start > inner.written_size {
                break;
            }
            inner.pending.remove(&start);
            let pending_end = start + len;
            if pending_end > inner.written_size {
                inner.written_size = pending_end;
            }
        }
        Ok(())
    }

    /// Returns the length of the contiguous byte prefix persisted so far.
    pub async fn written_size(&self) -> u64 {
        self.inner.lock().await.written_size
    }

    /// Flushes and releases the underlying file handle.
    ///
    /// Must be invoked exactly once per buffer, on success and failure paths
    /// alike. Subsequent writes fail with [`DownloadError::BufferClosed`].
    ///
    /// # Errors
    ///
    /// Returns [`DownloadError::BufferClosed`] when already closed, or
    /// [`DownloadError::Io`] when the final flush fails.
    #[instrument(level = "debug", skip(self), fields(path = %self.path.display()))]
    pub async fn close(&self) -> Result<(), DownloadError> {
        let mut inner = self.inner.lock().await;
        let Some(mut file) = inner.file.take() else {
            return Err(DownloadError::buffer_closed(&self.path));
        };
        file.flush()
            .await
            .map_err(|e| DownloadError::io(&self.path, e))?;
        debug!(written_size = inner.written_size, "closed buffer");
        Ok(())
    }

    /// The file path this buffer owns.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl std::fmt::Debug for FileBuffer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FileBuffer")
            .field("path", &self.path)
            .finish_non_exhaustive()
    }
}
