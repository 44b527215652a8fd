use std::path::Path;

use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tokio::task::JoinHandle;

use crate::entry::TrafficEntry;
use crate::writer::{TrafficWriteError, TrafficWriter};

/// Entries that may queue up before `log` waits and `record` drops.
const CHANNEL_BUFFER: usize = 1024;

/// Seconds without a new entry after which pending output is flushed.
const FLUSH_INTERVAL_SECS: u64 = 1;

/// Handle for queueing [`TrafficEntry`] values to the file writer task.
/// Clones share one queue; the task finishes once all of them are gone.
#[derive(Clone)]
pub struct TrafficSink {
    tx: mpsc::Sender<TrafficEntry>,
}

impl TrafficSink {
    /// Spawn the background writer task and return a `(sink, join_handle)` pair.
    ///
    /// The task appends each entry to the file at `path` as a JSON line,
    /// flushes after a second of channel inactivity, and flushes once more
    /// when the last `TrafficSink` clone is dropped before exiting.
    ///
    /// I/O errors inside the task are logged via `tracing::error` and the
    /// entry is skipped.
    pub async fn start(
        path: impl AsRef<Path>,
    ) -> Result<(Self, JoinHandle<()>), TrafficWriteError> {
        let (tx, rx) = mpsc::channel::<TrafficEntry>(CHANNEL_BUFFER);

        let mut writer = TrafficWriter::new(path).await?;

        let handle = tokio::spawn(async move {
            run_writer_loop(&mut writer, rx).await;
        });

        Ok((Self { tx }, handle))
    }

    /// Send an entry, waiting for channel capacity if needed.
    pub async fn log(&self, entry: TrafficEntry) {
        if let Err(err) = self.tx.send(entry).await {
            tracing::warn!(
                event_type = ?err.0.event_type,
                "traffic sink channel closed, entry dropped"
            );
        }
    }

    /// Send an entry without waiting.
    ///
    /// Observer callbacks are synchronous, so they use this variant. When the
    /// channel is full or the writer has exited the entry is dropped and a
    /// warning is logged.
    pub fn record(&self, entry: TrafficEntry) {
        match self.tx.try_send(entry) {
            Ok(()) => {}
            Err(TrySendError::Full(entry)) => {
                tracing::warn!(
                    event_type = ?entry.event_type,
                    "traffic sink channel full, entry dropped"
                );
            }
            Err(TrySendError::Closed(entry)) => {
                tracing::warn!(
                    event_type = ?entry.event_type,
                    "traffic sink channel closed, entry dropped"
                );
            }
        }
    }
}

/// Drain the queue into `writer` until every sender is dropped.
async fn run_writer_loop(writer: &mut TrafficWriter, mut rx: mpsc::Receiver<TrafficEntry>) {
    let flush_interval = tokio::time::Duration::from_secs(FLUSH_INTERVAL_SECS);
    let mut dirty = false;

    loop {
        let maybe_entry = tokio::time::timeout(flush_interval, rx.recv()).await;

        match maybe_entry {
            Ok(Some(entry)) => {
                if let Err(err) = writer.write(&entry).await {
                    tracing::error!(%err, "failed to write traffic entry");
                } else {
                    dirty = true;
                }
            }
            // Channel closed: final flush and exit.
            Ok(None) => {
                if dirty {
                    if let Err(err) = writer.flush().await {
                        tracing::error!(%err, "failed to flush traffic log on shutdown");
                    }
                }
                tracing::debug!("traffic writer background task shutting down");
                return;
            }
            // Idle.
            Err(_) => {
                if dirty {
                    if let Err(err) = writer.flush().await {
                        tracing::error!(%err, "periodic traffic log flush failed");
                    } else {
                        dirty = false;
                    }
                }
            }
        }
    }
}
