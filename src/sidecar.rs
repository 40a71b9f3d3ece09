//! Sidecar payload persistence.
//!
//! Jobs may carry subtitle, danmaku, or media-description payloads that were
//! serialized upstream; the engine only persists them next to the final
//! output. Payload contents are opaque here.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use serde::Deserialize;
use thiserror::Error;
use tracing::{debug, instrument};

/// Errors produced while persisting sidecar payloads.
#[derive(Debug, Error)]
pub enum SidecarError {
    /// I/O error writing a sidecar file to disk.
    #[error("I/O error writing sidecar: {0}")]
    Io(#[from] std::io::Error),
}

/// One opaque payload to persist beside the output file.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct SidecarPayload {
    /// File name relative to the output directory (e.g. `ep01.zh-CN.srt`).
    pub file_name: String,
    /// Serialized contents, produced by the collaborator layer.
    pub contents: String,
}

/// Writes every payload into `output_dir`.
///
/// Existing files are left untouched (idempotent across reruns); a partially
/// written file is removed on error so it does not block retries. Returns
/// the paths actually created.
///
/// # Errors
///
/// Returns [`SidecarError`] on I/O failure.
#[instrument(skip(payloads), fields(output_dir = %output_dir.display(), count = payloads.len()))]
pub fn write_sidecars(
    output_dir: &Path,
    payloads: &[SidecarPayload],
) -> Result<Vec<PathBuf>, SidecarError> {
    let mut written = Vec::new();
    for payload in payloads {
        let path = output_dir.join(&payload.file_name);
        match std::fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&path)
        {
            Ok(file) => {
                use std::io::Write;
                let mut file = file;
                if let Err(err) = file.write_all(payload.contents.as_bytes()) {
                    // Best-effort cleanup so a partial file does not block
                    // a rerun.
                    let _ = std::fs::remove_file(&path);
                    return Err(err.into());
                }
                debug!(path = %path.display(), "sidecar written");
                written.push(path);
            }
            Err(err) if err.kind() == ErrorKind::AlreadyExists => {
                debug!(path = %path.display(), "sidecar already exists, skipping");
            }
            Err(err) => return Err(err.into()),
        }
    }
    Ok(written)
}
