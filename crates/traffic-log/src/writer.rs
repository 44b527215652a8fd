use std::path::Path;

use tokio::io::AsyncWriteExt;

use crate::entry::TrafficEntry;

/// Failure modes of [`TrafficWriter`], one per I/O step.
#[derive(Debug, thiserror::Error)]
pub enum TrafficWriteError {
    #[error("failed to create parent directories: {0}")]
    CreateDir(std::io::Error),

    #[error("failed to open traffic log file: {0}")]
    OpenFile(std::io::Error),

    #[error("failed to serialize traffic entry: {0}")]
    Serialize(#[from] serde_json::Error),

    #[error("failed to write to traffic log: {0}")]
    Write(std::io::Error),

    #[error("failed to flush traffic log: {0}")]
    Flush(std::io::Error),
}

/// Writes intercepted traffic to disk as newline-delimited JSON.
///
/// The file is never truncated; a new session adds lines after the previous
/// session's output.
pub struct TrafficWriter {
    file: tokio::fs::File,
}

impl TrafficWriter {
    /// Open `path` for appending. Missing parent directories are created and
    /// a missing file starts out empty.
    pub async fn new(path: impl AsRef<Path>) -> Result<Self, TrafficWriteError> {
        let path = path.as_ref();

        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent)
                    .await
                    .map_err(TrafficWriteError::CreateDir)?;
            }
        }

        let file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .await
            .map_err(TrafficWriteError::OpenFile)?;

        Ok(Self { file })
    }

    pub async fn write(&mut self, entry: &TrafficEntry) -> Result<(), TrafficWriteError> {
        let mut line = serde_json::to_vec(entry)?;
        line.push(b'\n');

        self.file
            .write_all(&line)
            .await
            .map_err(TrafficWriteError::Write)
    }

    pub async fn flush(&mut self) -> Result<(), TrafficWriteError> {
        self.file.flush().await.map_err(TrafficWriteError::Flush)
    }
}
