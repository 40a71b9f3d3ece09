//! Download engine: per-episode orchestration of selection, download, and
//! merge.
//!
//! The engine owns the process-wide connection limiter and sequences one
//! [`EpisodeJob`] through its states: select streams, download them into
//! resumable buffers under the limiter, merge via the external muxer, and
//! clean up. Fetch tasks for the video and audio streams are interleaved
//! round-robin at submission time so neither stream starves the other.
//!
//! # Concurrency Model
//!
//! - Each byte-range fetch runs in its own Tokio task
//! - A semaphore permit is acquired inside each fetch before the request
//! - Permits are released automatically when fetches complete (RAII)
//! - On the first unrecovered fetch failure, sibling tasks are aborted,
//!   buffers are closed, and partial files stay on disk for a future resume

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use tokio::sync::{Semaphore, mpsc};
use tokio::task::JoinSet;
use tracing::{debug, info, instrument, warn};

use crate::download::{
    Block, DownloadError, Fetcher, FileBuffer, ProgressSnapshot, plan_blocks,
    spawn_progress_poller,
};
use crate::job::EpisodeJob;
use crate::merge::{FfmpegMuxer, MergeError, MergeSpec, Muxer};
use crate::options::{DownloadOptions, OutputFormat};
use crate::sidecar::{self, SidecarError};
use crate::stream::{AudioCodec, AudioStreamMeta, VideoStreamMeta, select_audio, select_video};

/// Minimum allowed worker count.
pub const MIN_WORKERS: usize = 1;

/// Maximum allowed worker count.
pub const MAX_WORKERS: usize = 100;

/// Error type for engine operations.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    /// Invalid worker count in the options.
    #[error("invalid worker count {value}: must be between {MIN_WORKERS} and {MAX_WORKERS}")]
    InvalidWorkerCount {
        /// The invalid value that was provided.
        value: usize,
    },

    /// Zero-byte block size in the options.
    #[error("invalid block size: chunks must be at least 1 byte")]
    InvalidBlockSize,

    /// A stream download failed.
    #[error("download error: {0}")]
    Download(#[from] DownloadError),

    /// The muxer invocation failed.
    #[error("merge error: {0}")]
    Merge(#[from] MergeError),

    /// A sidecar payload could not be persisted.
    #[error("sidecar error: {0}")]
    Sidecar(#[from] SidecarError),

    /// File system error outside the buffers (directories, output file).
    #[error("IO error at {path}: {source}")]
    Io {
        /// The path where the error occurred.
        path: PathBuf,
        /// The underlying IO error.
        #[source]
        source: std::io::Error,
    },

    /// A fetch task panicked.
    #[error("a fetch task panicked")]
    TaskPanicked,
}

impl EngineError {
    fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}

/// Terminal state of one episode job.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobOutcome {
    /// Streams downloaded and merged; temp files removed.
    Done {
        /// The final container path.
        output: PathBuf,
    },
    /// The output already existed and `overwrite` was off. Not an error;
    /// no network request was issued.
    Skipped {
        /// The pre-existing output path.
        output: PathBuf,
    },
    /// Neither a video nor an audio stream was selected for download.
    /// Reported as a warning, not an error.
    NothingToDo,
}

/// One stream's download state for the duration of a job.
struct StreamPlan {
    buffer: Arc<FileBuffer>,
    urls: Vec<String>,
    blocks: Vec<Block>,
    total: Option<u64>,
}

/// Engine coordinating selection, block-parallel download, and merge for
/// episode jobs.
pub struct DownloadEngine {
    options: DownloadOptions,
    fetcher: Fetcher,
    /// Process-wide bound on simultaneous connections, injected into every
    /// fetch task.
    limiter: Arc<Semaphore>,
    muxer: Arc<dyn Muxer>,
    progress_tx: Option<mpsc::UnboundedSender<ProgressSnapshot>>,
}

impl DownloadEngine {
    /// Creates an engine muxing through the configured ffmpeg binary.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::InvalidWorkerCount`] or
    /// [`EngineError::InvalidBlockSize`] when the options are out of range.
    pub fn new(options: DownloadOptions) -> Result<Self, EngineError> {
        let muxer = Arc::new(FfmpegMuxer::new(options.ffmpeg_path.clone()));
        Self::with_muxer(options, muxer)
    }

    /// Creates an engine with an injected muxer (used by tests to avoid
    /// spawning processes).
    ///
    /// # Errors
    ///
    /// Returns the same validation errors as [`DownloadEngine::new`].
    pub fn with_muxer(
        options: DownloadOptions,
        muxer: Arc<dyn Muxer>,
    ) -> Result<Self, EngineError> {
        if !(MIN_WORKERS..=MAX_WORKERS).contains(&options.num_workers) {
            return Err(EngineError::InvalidWorkerCount {
                value: options.num_workers,
            });
        }
        if options.block_size == Some(0) {
            return Err(EngineError::InvalidBlockSize);
        }

        debug!(
            num_workers = options.num_workers,
            block_size = ?options.block_size,
            overwrite = options.overwrite,
            "creating download engine"
        );

        let fetcher = Fetcher::with_settings(
            options.connect_timeout_secs,
            options.read_timeout_secs,
            options.referer.clone(),
        );
        Ok(Self {
            limiter: Arc::new(Semaphore::new(options.num_workers)),
            fetcher,
            muxer,
            progress_tx: None,
            options,
        })
    }

    /// The engine's configuration.
    #[must_use]
    pub fn options(&self) -> &DownloadOptions {
        &self.options
    }

    /// Opens the progress channel. Snapshots for every subsequent job's
    /// download phase arrive on the returned receiver.
    pub fn progress_receiver(&mut self) -> mpsc::UnboundedReceiver<ProgressSnapshot> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.progress_tx = Some(tx);
        rx
    }

    /// Runs one episode job to a terminal state.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError`] when the download or merge phase fails.
    /// Partial stream files are left on disk so a rerun with
    /// `overwrite=false` resumes them.
    #[instrument(skip(self, job), fields(filename = %job.filename))]
    pub async fn run_job(&self, job: &EpisodeJob) -> Result<JobOutcome, EngineError> {
        info!("processing episode");
        tokio::fs::create_dir_all(&job.tmp_dir)
            .await
            .map_err(|e| EngineError::io(&job.tmp_dir, e))?;
        tokio::fs::create_dir_all(&job.output_dir)
            .await
            .map_err(|e| EngineError::io(&job.output_dir, e))?;

        // Selecting
        let video = select_video(
            &job.videos,
            self.options.video_quality,
            &self.options.video_codec_preference,
        );
        let audio = select_audio(
            &job.audios,
            self.options.audio_quality,
            &self.options.audio_codec_preference,
        );
        log_video_candidates(&job.videos, video);
        log_audio_candidates(&job.audios, audio);

        let video = if self.options.require_video { video } else { None };
        let audio = if self.options.require_audio { audio } else { None };

        let extension = infer_output_extension(video, audio, &self.options);
        let output_path = job.output_path(&extension);

        // Sidecars are regenerated even when the container itself is
        // skipped below.
        let written = sidecar::write_sidecars(&job.output_dir, &job.sidecars)?;
        if !written.is_empty() {
            info!(count = written.len(), "sidecar files written");
        }

        if tokio::fs::try_exists(&output_path)
            .await
            .map_err(|e| EngineError::io(&output_path, e))?
        {
            if !self.options.overwrite {
                info!(output = %output_path.display(), "output already exists, skipping");
                return Ok(JobOutcome::Skipped {
                    output: output_path,
                });
            }
            info!(output = %output_path.display(), "output exists, removing per overwrite option");
            tokio::fs::remove_file(&output_path)
                .await
                .map_err(|e| EngineError::io(&output_path, e))?;
        }

        if video.is_none() && audio.is_none() {
            warn!("no streams to download");
            return Ok(JobOutcome::NothingToDo);
        }

        // Downloading
        self.download_streams(job, video, audio).await?;

        // Merging
        info!("merging streams");
        let video_temp = job.video_temp_path();
        let audio_temp = job.audio_temp_path();
        let spec = MergeSpec::build(
            video.map(|meta| (meta, video_temp.as_path())),
            audio.map(|meta| (meta, audio_temp.as_path())),
            self.options.video_save_codec,
            self.options.audio_save_codec,
            self.options.effective_threads(),
            &output_path,
        );
        self.muxer.mux(&spec).await?;

        // Temp files only go away after a successful merge; a muxer failure
        // above keeps them for inspection.
        if video.is_some() {
            remove_temp_file(&video_temp).await;
        }
        if audio.is_some() {
            remove_temp_file(&audio_temp).await;
        }

        info!(output = %output_path.display(), "episode complete");
        Ok(JobOutcome::Done {
            output: output_path,
        })
    }

    /// The Downloading phase: open buffers, plan blocks, fetch them all
    /// under the shared limiter, observe progress, verify totals.
    async fn download_streams(
        &self,
        job: &EpisodeJob,
        video: Option<&VideoStreamMeta>,
        audio: Option<&AudioStreamMeta>,
    ) -> Result<(), EngineError> {
        let mut plans: Vec<StreamPlan> = Vec::new();
        if let Some(meta) = video {
            plans.push(self.plan_stream(job.video_temp_path(), meta.all_urls()).await?);
        }
        if let Some(meta) = audio {
            plans.push(self.plan_stream(job.audio_temp_path(), meta.all_urls()).await?);
        }

        let bytes_total: u64 = plans.iter().filter_map(|plan| plan.total).sum();
        let block_count: usize = plans.iter().map(|plan| plan.blocks.len()).sum();
        info!(
            streams = plans.len(),
            blocks = block_count,
            bytes_total,
            "starting download"
        );

        let stop = Arc::new(AtomicBool::new(false));
        let poller = self.progress_tx.as_ref().map(|tx| {
            spawn_progress_poller(
                plans.iter().map(|plan| Arc::clone(&plan.buffer)).collect(),
                bytes_total,
                Duration::from_millis(self.options.progress_interval_ms),
                tx.clone(),
                Arc::clone(&stop),
            )
        });

        // Round-robin merge of the per-stream block lists, so submission
        // order alternates between streams under the FIFO limiter.
        let per_stream: Vec<Vec<(Vec<String>, Arc<FileBuffer>, Block)>> = plans
            .iter()
            .map(|plan| {
                plan.blocks
                    .iter()
                    .map(|block| (plan.urls.clone(), Arc::clone(&plan.buffer), *block))
                    .collect()
            })
            .collect();

        let mut fetches = JoinSet::new();
        for (urls, buffer, block) in xmerge(per_stream) {
            let fetcher = self.fetcher.clone();
            let limiter = Arc::clone(&self.limiter);
            fetches.spawn(async move {
                fetcher
                    .fetch_range(limiter, urls, buffer, block.start, block.size)
                    .await
            });
        }

        let mut failure: Option<EngineError> = None;
        while let Some(joined) = fetches.join_next().await {
            match joined {
                Ok(Ok(())) => {}
                Ok(Err(error)) => {
                    failure = Some(error.into());
                    fetches.abort_all();
                    break;
                }
                Err(join_error) if join_error.is_cancelled() => {}
                Err(join_error) => {
                    warn!(error = %join_error, "fetch task panicked");
                    failure = Some(EngineError::TaskPanicked);
                    fetches.abort_all();
                    break;
                }
            }
        }
        // Drain aborted siblings before touching the buffers.
        while fetches.join_next().await.is_some() {}

        stop.store(true, Ordering::SeqCst);
        if let Some(handle) = poller {
            let _ = handle.await;
        }

        let mut close_failure: Option<DownloadError> = None;
        for plan in &plans {
            if let Err(error) = plan.buffer.close().await {
                close_failure.get_or_insert(error);
            }
        }

        if let Some(error) = failure {
            warn!(error = %error, "stream download failed, partial files retained for resume");
            return Err(error);
        }
        if let Some(error) = close_failure {
            return Err(error.into());
        }

        for plan in &plans {
            if let Some(total) = plan.total {
                let written = plan.buffer.written_size().await;
                if written != total {
                    return Err(
                        DownloadError::size_mismatch(plan.buffer.path(), total, written).into(),
                    );
                }
            }
        }
        info!("download complete");
        Ok(())
    }

    /// Opens the buffer for one stream, probes its size, and plans the
    /// remaining blocks from the resume offset.
    async fn plan_stream(
        &self,
        path: PathBuf,
        urls: Vec<String>,
    ) -> Result<StreamPlan, EngineError> {
        let buffer = Arc::new(FileBuffer::open(&path, self.options.overwrite).await?);
        let primary = urls.first().map(String::as_str).unwrap_or_default();
        let total = self.fetcher.remote_size(primary).await?;
        let resume_from = buffer.written_size().await;
        if resume_from > 0 {
            info!(path = %path.display(), resume_from, "resuming partial stream");
        }
        let blocks = plan_blocks(resume_from, total, self.options.block_size)?;
        Ok(StreamPlan {
            buffer,
            urls,
            blocks,
            total,
        })
    }
}

impl std::fmt::Debug for DownloadEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DownloadEngine")
            .field("options", &self.options)
            .finish_non_exhaustive()
    }
}

/// Round-robin merge of ordered task lists: one item from each list in
/// turn, until every list is drained. Deterministic, which keeps the
/// interleaving testable.
fn xmerge<T>(mut lists: Vec<Vec<T>>) -> Vec<T> {
    let mut merged = Vec::with_capacity(lists.iter().map(Vec::len).sum());
    let mut iterators: Vec<_> = lists.drain(..).map(Vec::into_iter).collect();
    loop {
        let mut exhausted = true;
        for iterator in &mut iterators {
            if let Some(item) = iterator.next() {
                merged.push(item);
                exhausted = false;
            }
        }
        if exhausted {
            return merged;
        }
    }
}

/// Output extension per the container rules: `mp4` with video (`mkv` when
/// FLAC audio rides along, which MP4 cannot carry), `flac`/`aac` for
/// audio-only, explicit extensions winning over inference.
fn infer_output_extension(
    video: Option<&VideoStreamMeta>,
    audio: Option<&AudioStreamMeta>,
    options: &DownloadOptions,
) -> String {
    let flac_audio = audio.is_some_and(|meta| meta.codec == AudioCodec::Flac);
    if video.is_some() {
        match &options.output_format {
            OutputFormat::Ext(ext) => ext.clone(),
            OutputFormat::Infer if flac_audio => "mkv".to_string(),
            OutputFormat::Infer => "mp4".to_string(),
        }
    } else {
        match &options.output_format_audio_only {
            OutputFormat::Ext(ext) => ext.clone(),
            OutputFormat::Infer if flac_audio => "flac".to_string(),
            // Non-FLAC audio collapses to `.aac` regardless of the actual
            // codec; flagged for product review but preserved.
            OutputFormat::Infer => "aac".to_string(),
        }
    }
}

fn log_video_candidates(videos: &[VideoStreamMeta], selected: Option<&VideoStreamMeta>) {
    if videos.is_empty() {
        info!("no video streams offered");
        return;
    }
    info!(count = videos.len(), "video streams offered:");
    for (index, meta) in videos.iter().enumerate() {
        info!(
            index,
            selected = selected.is_some_and(|s| std::ptr::eq(s, meta)),
            codec = %meta.codec,
            quality = meta.quality,
            resolution = %format_args!("{}x{}", meta.width, meta.height),
            sources = meta.mirrors.len() + 1,
            "video candidate"
        );
    }
}

fn log_audio_candidates(audios: &[AudioStreamMeta], selected: Option<&AudioStreamMeta>) {
    if audios.is_empty() {
        info!("no audio streams offered");
        return;
    }
    info!(count = audios.len(), "audio streams offered:");
    for (index, meta) in audios.iter().enumerate() {
        info!(
            index,
            selected = selected.is_some_and(|s| std::ptr::eq(s, meta)),
            codec = %meta.codec,
            quality = meta.quality,
            sources = meta.mirrors.len() + 1,
            "audio candidate"
        );
    }
}

/// Best-effort removal of a merged temp file; a leftover is only noise.
async fn remove_temp_file(path: &Path) {
    if let Err(error) = tokio::fs::remove_file(path).await {
        warn!(path = %path.display(), error = %error, "failed to remove temp file");
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::stream::VideoCodec;

    fn video_meta(codec: VideoCodec) -> VideoStreamMeta {
        VideoStreamMeta {
            codec,
            quality: 80,
            width: 1920,
            height: 1080,
            url: "https://cdn.example.com/v.m4s".to_string(),
            mirrors: Vec::new(),
        }
    }

    fn audio_meta(codec: AudioCodec) -> AudioStreamMeta {
        AudioStreamMeta {
            codec,
            quality: 30280,
            url: "https://cdn.example.com/a.m4s".to_string(),
            mirrors: Vec::new(),
        }
    }

    #[test]
    fn test_engine_rejects_zero_workers() {
        let options = DownloadOptions {
            num_workers: 0,
            ..DownloadOptions::default()
        };
        assert!(matches!(
            DownloadEngine::new(options),
            Err(EngineError::InvalidWorkerCount { value: 0 })
        ));
    }

    #[test]
    fn test_engine_rejects_excessive_workers() {
        let options = DownloadOptions {
            num_workers: 101,
            ..DownloadOptions::default()
        };
        assert!(matches!(
            DownloadEngine::new(options),
            Err(EngineError::InvalidWorkerCount { value: 101 })
        ));
    }

    #[test]
    fn test_engine_rejects_zero_block_size() {
        let options = DownloadOptions {
            block_size: Some(0),
            ..DownloadOptions::default()
        };
        assert!(matches!(
            DownloadEngine::new(options),
            Err(EngineError::InvalidBlockSize)
        ));
    }

    #[test]
    fn test_engine_accepts_default_options() {
        let engine = DownloadEngine::new(DownloadOptions::default()).unwrap();
        assert_eq!(engine.options().num_workers, 8);
    }

    #[test]
    fn test_xmerge_round_robins_uneven_lists() {
        let merged = xmerge(vec![vec![1, 2, 3, 4], vec![10, 20]]);
        assert_eq!(merged, vec![1, 10, 2, 20, 3, 4]);
    }

    #[test]
    fn test_xmerge_single_and_empty_lists() {
        assert_eq!(xmerge(vec![vec![1, 2], Vec::new()]), vec![1, 2]);
        assert_eq!(xmerge::<u32>(Vec::new()), Vec::<u32>::new());
    }

    #[test]
    fn test_infer_extension_video_defaults_to_mp4() {
        let video = video_meta(VideoCodec::Avc);
        let audio = audio_meta(AudioCodec::Aac);
        let ext = infer_output_extension(Some(&video), Some(&audio), &DownloadOptions::default());
        assert_eq!(ext, "mp4");
    }

    #[test]
    fn test_infer_extension_flac_with_video_needs_mkv() {
        let video = video_meta(VideoCodec::Avc);
        let audio = audio_meta(AudioCodec::Flac);
        let ext = infer_output_extension(Some(&video), Some(&audio), &DownloadOptions::default());
        assert_eq!(ext, "mkv");
    }

    #[test]
    fn test_infer_extension_audio_only() {
        let flac = audio_meta(AudioCodec::Flac);
        let aac = audio_meta(AudioCodec::Aac);
        let options = DownloadOptions::default();
        assert_eq!(infer_output_extension(None, Some(&flac), &options), "flac");
        assert_eq!(infer_output_extension(None, Some(&aac), &options), "aac");
        let eac3 = audio_meta(AudioCodec::Eac3);
        assert_eq!(
            infer_output_extension(None, Some(&eac3), &options),
            "aac",
            "non-FLAC audio collapses to .aac"
        );
    }

    #[test]
    fn test_explicit_formats_win_over_inference() {
        let video = video_meta(VideoCodec::Avc);
        let audio = audio_meta(AudioCodec::Flac);
        let options = DownloadOptions {
            output_format: OutputFormat::Ext("mov".to_string()),
            output_format_audio_only: OutputFormat::Ext("ogg".to_string()),
            ..DownloadOptions::default()
        };
        assert_eq!(
            infer_output_extension(Some(&video), Some(&audio), &options),
            "mov"
        );
        assert_eq!(infer_output_extension(None, Some(&audio), &options), "ogg");
    }
}
