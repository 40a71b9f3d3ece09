//! Cross-stream progress aggregation.
//!
//! A poller task samples the written sizes of every active buffer on a fixed
//! interval and publishes [`ProgressSnapshot`]s through a channel. It is
//! observation-only: it never throttles or gates the fetchers.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use super::buffer::FileBuffer;

/// One sampled progress observation across all buffers of a job.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProgressSnapshot {
    /// Bytes persisted so far, summed over all buffers.
    pub bytes_done: u64,
    /// Sum of the known total sizes. Streams with an unknown size
    /// contribute nothing.
    pub bytes_total: u64,
}

/// Spawns the progress poller for one download phase.
///
/// Snapshots are sent on `tx` every `interval` until `stop` is raised (or
/// the receiver goes away); a final snapshot is emitted after the stop so
/// consumers land on the closing byte counts. Returns the poller handle so
/// the caller can await a clean exit.
pub fn spawn_progress_poller(
    buffers: Vec<Arc<FileBuffer>>,
    bytes_total: u64,
    interval: Duration,
    tx: mpsc::UnboundedSender<ProgressSnapshot>,
    stop: Arc<AtomicBool>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        while !stop.load(Ordering::SeqCst) {
            if tx.send(sample(&buffers, bytes_total).await).is_err() {
                return;
            }
            tokio::time::sleep(interval).await;
        }
        let _ = tx.send(sample(&buffers, bytes_total).await);
    })
}

async fn sample(buffers: &[Arc<FileBuffer>], bytes_total: u64) -> ProgressSnapshot {
    let mut bytes_done = 0;
    for buffer in buffers {
        bytes_done += buffer.written_size().await;
    }
    ProgressSnapshot {
        bytes_done,
        bytes_total,
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_poller_reports_summed_progress_and_stops() {
        let tmp = TempDir::new().unwrap();
        let video = Arc::new(FileBuffer::open(tmp.path().join("v.m4s"), false).await.unwrap());
        let audio = Arc::new(FileBuffer::open(tmp.path().join("a.m4s"), false).await.unwrap());

        video.write_at(0, &[1u8; 300]).await.unwrap();
        audio.write_at(0, &[2u8; 200]).await.unwrap();

        let (tx, mut rx) = mpsc::unbounded_channel();
        let stop = Arc::new(AtomicBool::new(false));
        let handle = spawn_progress_poller(
            vec![Arc::clone(&video), Arc::clone(&audio)],
            1000,
            Duration::from_millis(10),
            tx,
            Arc::clone(&stop),
        );

        let first = rx.recv().await.unwrap();
        assert_eq!(first.bytes_total, 1000);
        assert_eq!(first.bytes_done, 500);

        video.write_at(300, &[1u8; 700]).await.unwrap();
        stop.store(true, Ordering::SeqCst);
        handle.await.unwrap();

        // The final snapshot after stop must carry the closing counts.
        let mut last = first;
        while let Ok(snapshot) = rx.try_recv() {
            last = snapshot;
        }
        assert_eq!(last.bytes_done, 1200);

        video.close().await.unwrap();
        audio.close().await.unwrap();
    }

    #[tokio::test]
    async fn test_poller_exits_when_receiver_dropped() {
        let tmp = TempDir::new().unwrap();
        let buffer = Arc::new(FileBuffer::open(tmp.path().join("v.m4s"), false).await.unwrap());

        let (tx, rx) = mpsc::unbounded_channel();
        drop(rx);
        let stop = Arc::new(AtomicBool::new(false));
        let handle = spawn_progress_poller(
            vec![Arc::clone(&buffer)],
            100,
            Duration::from_millis(5),
            tx,
            stop,
        );

        // Never raises the stop flag; the dropped receiver alone must end
        // the task.
        handle.await.unwrap();
        buffer.close().await.unwrap();
    }
}
