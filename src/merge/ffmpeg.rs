//! FFmpeg-backed muxer invocation.

use std::path::PathBuf;
use std::process::Stdio;

use async_trait::async_trait;
use tokio::process::Command;
use tracing::{debug, instrument};

use super::{MergeError, MergeSpec};

/// Object-safe seam over the external multiplexer process.
///
/// The engine holds a `dyn Muxer` so tests can substitute a double without
/// spawning processes (native async traits are not object-safe, hence
/// `async_trait`).
#[async_trait]
pub trait Muxer: Send + Sync {
    /// Runs one merge. A non-zero exit is fatal for the job.
    async fn mux(&self, spec: &MergeSpec) -> Result<(), MergeError>;
}

/// Muxer backed by an `ffmpeg` binary.
#[derive(Debug, Clone)]
pub struct FfmpegMuxer {
    binary: PathBuf,
}

impl FfmpegMuxer {
    /// Creates a muxer invoking `binary` (usually `ffmpeg`, resolved via
    /// `PATH`).
    #[must_use]
    pub fn new(binary: impl Into<PathBuf>) -> Self {
        Self {
            binary: binary.into(),
        }
    }
}

impl Default for FfmpegMuxer {
    fn default() -> Self {
        Self::new("ffmpeg")
    }
}

#[async_trait]
impl Muxer for FfmpegMuxer {
    #[instrument(skip(self, spec), fields(binary = %self.binary.display(), output = %spec.output.display()))]
    async fn mux(&self, spec: &MergeSpec) -> Result<(), MergeError> {
        let args = spec.to_args();
        debug!(?args, "invoking muxer");

        let output = Command::new(&self.binary)
            .args(&args)
            .stdin(Stdio::null())
            .output()
            .await
            .map_err(|source| MergeError::Spawn {
                binary: self.binary.clone(),
                source,
            })?;

        if output.status.success() {
            debug!("muxer finished");
            Ok(())
        } else {
            Err(MergeError::MuxerFailed {
                status: output.status.code().unwrap_or(-1),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            })
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use std::path::Path;

    fn empty_spec(output: &Path) -> MergeSpec {
        MergeSpec {
            video: None,
            audio: None,
            video_tag: None,
            threads: 1,
            output: output.to_path_buf(),
        }
    }

    #[tokio::test]
    async fn test_missing_binary_is_spawn_error() {
        let muxer = FfmpegMuxer::new("/nonexistent/definitely-not-ffmpeg");
        let result = muxer.mux(&empty_spec(Path::new("/tmp/out.mp4"))).await;
        assert!(matches!(result, Err(MergeError::Spawn { .. })));
    }

    #[tokio::test]
    async fn test_nonzero_exit_surfaces_status() {
        // `false` accepts any arguments and exits 1.
        let muxer = FfmpegMuxer::new("false");
        let result = muxer.mux(&empty_spec(Path::new("/tmp/out.mp4"))).await;
        match result {
            Err(MergeError::MuxerFailed { status, .. }) => assert_eq!(status, 1),
            other => panic!("Expected MuxerFailed, got: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_zero_exit_is_success() {
        let muxer = FfmpegMuxer::new("true");
        muxer.mux(&empty_spec(Path::new("/tmp/out.mp4"))).await.unwrap();
    }
}
