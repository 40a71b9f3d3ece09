//! CLI entry point for the avget tool.

use anyhow::Result;
use clap::Parser;
use tracing::{debug, error, info, warn};

use avget_core::{DownloadEngine, DownloadOptions, EpisodeJob, JobOutcome};

mod cli;
mod progress_ui;

use cli::Args;

#[tokio::main]
async fn main() -> Result<()> {
    // Parse CLI arguments first (before tracing, so --help works without logs)
    let args = Args::parse();

    // Determine log level based on verbose/quiet flags
    // Priority: RUST_LOG env var > quiet flag > verbose flag > default (info)
    let default_level = if args.quiet {
        "error"
    } else {
        match args.verbose {
            0 => "info",
            1 => "debug",
            _ => "trace",
        }
    };

    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_level));

    tracing_subscriber::fmt().with_env_filter(filter).init();

    debug!(?args, "CLI arguments parsed");
    info!("avget starting");

    // Layer options: file config first, then CLI overrides
    let mut options = match &args.config {
        Some(path) => DownloadOptions::from_file(path)?,
        None => DownloadOptions::default(),
    };
    if let Some(num_workers) = args.num_workers {
        options.num_workers = usize::from(num_workers);
    }
    if let Some(block_size) = args.block_size_bytes() {
        options.block_size = block_size;
    }
    if args.overwrite {
        options.overwrite = true;
    }
    if args.no_video {
        options.require_video = false;
    }
    if args.no_audio {
        options.require_audio = false;
    }

    let mut engine = DownloadEngine::new(options)?;

    // Progress bar unless quiet; the task ends when the engine is dropped.
    let progress_handle = if args.quiet {
        None
    } else {
        Some(progress_ui::spawn_progress_bar(engine.progress_receiver()))
    };

    let mut completed = 0usize;
    let mut skipped = 0usize;
    let mut failed = 0usize;
    for job_path in &args.jobs {
        let job = match EpisodeJob::from_file(job_path) {
            Ok(job) => job,
            Err(e) => {
                error!(path = %job_path.display(), error = %e, "failed to load job");
                failed += 1;
                continue;
            }
        };
        match engine.run_job(&job).await {
            Ok(JobOutcome::Done { output }) => {
                info!(output = %output.display(), "job finished");
                completed += 1;
            }
            Ok(JobOutcome::Skipped { output }) => {
                info!(output = %output.display(), "job skipped, output already present");
                skipped += 1;
            }
            Ok(JobOutcome::NothingToDo) => {
                warn!(path = %job_path.display(), "job had nothing to download");
                skipped += 1;
            }
            Err(e) => {
                error!(path = %job_path.display(), error = %e, "job failed");
                failed += 1;
            }
        }
    }

    drop(engine);
    if let Some(handle) = progress_handle {
        let _ = handle.await;
    }

    info!(
        completed,
        skipped,
        failed,
        total = args.jobs.len(),
        "all jobs processed"
    );

    if failed > 0 {
        anyhow::bail!("{failed} job(s) failed");
    }
    Ok(())
}
