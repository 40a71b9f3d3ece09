//! Progress UI (byte-count bar) for download runs.

use indicatif::{ProgressBar, ProgressStyle};
use tokio::sync::mpsc;

use avget_core::ProgressSnapshot;

/// Spawns the progress bar task fed by the engine's snapshot channel.
/// The task ends when the channel closes (engine dropped).
pub(crate) fn spawn_progress_bar(
    mut rx: mpsc::UnboundedReceiver<ProgressSnapshot>,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let bar = ProgressBar::new(0);
        bar.set_style(
            ProgressStyle::with_template(
                "{bar:40} {bytes}/{total_bytes} ({bytes_per_sec}, {eta})",
            )
            .unwrap_or_else(|_| ProgressStyle::default_bar()),
        );

        while let Some(snapshot) = rx.recv().await {
            if bar.length() != Some(snapshot.bytes_total) {
                bar.set_length(snapshot.bytes_total);
            }
            bar.set_position(snapshot.bytes_done);
        }
        bar.finish_and_clear();
    })
}

#[cfg(test)]
mod tests {
    use super::spawn_progress_bar;
    use avget_core::ProgressSnapshot;
    use tokio::sync::mpsc;

    #[tokio::test]
    async fn test_bar_task_ends_when_channel_closes() {
        let (tx, rx) = mpsc::unbounded_channel();
        let handle = spawn_progress_bar(rx);

        tx.send(ProgressSnapshot {
            bytes_done: 10,
            bytes_total: 100,
        })
        .unwrap();
        drop(tx);

        // If we get here without hanging, the bar task exited on close
        handle.await.unwrap();
    }
}
