use std::future::Future;
use std::io::SeekFrom;
use std::path::{Path, PathBuf};
use std::time::Duration;

use chrono::{DateTime, Utc};
use thiserror::Error;
use tokio::fs::File;
use tokio::io::{AsyncBufReadExt, AsyncSeekExt, BufReader};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::format::{LogFormat, TimestampError};

/// Default backoff between reads once the end of the log is reached
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(500);

/// I/O failure on a log source (fatal to the running session)
#[derive(Debug, Error)]
pub enum SourceError {
    #[error("failed to open log {path}: {source}")]
    Open {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to read log {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// A stream of log lines that can be tailed and polled
pub trait LogSource: Send {
    /// Parse the leading timestamp of a line using the channel's format
    fn timestamp(&self, line: &str) -> Result<DateTime<Utc>, TimestampError>;

    /// Wait for the next complete line
    ///
    /// End of file is retried internally with a fixed backoff. Returns `Ok(None)` once
    /// `cancel` fires or the source has been closed.
    fn next_line(
        &mut self,
        cancel: &CancellationToken,
    ) -> impl Future<Output = Result<Option<String>, SourceError>> + Send;

    /// Skip everything currently in the log
    fn tail(&mut self) -> impl Future<Output = Result<(), SourceError>> + Send;

    /// Release the underlying handle
    fn close(&mut self);
}

/// Log source following a file on disk
pub struct FileLogSource {
    path: PathBuf,
    format: LogFormat,
    poll_interval: Duration,
    reader: Option<BufReader<File>>,

    /// Byte offset of the next unread byte
    position: u64,

    /// Bytes of a line whose newline has not been written yet
    partial: Vec<u8>,
}

impl FileLogSource {
    /// Open a log file for reading from its start
    pub async fn open(
        path: impl AsRef<Path>,
        format: LogFormat,
        poll_interval: Duration,
    ) -> Result<Self, SourceError> {
        let path = path.as_ref().to_path_buf();
        let file = File::open(&path).await.map_err(|source| SourceError::Open {
            path: path.clone(),
            source,
        })?;

        Ok(Self {
            path,
            format,
            poll_interval,
            reader: Some(BufReader::new(file)),
            position: 0,
            partial: Vec::new(),
        })
    }

    fn read_error(&self, source: std::io::Error) -> SourceError {
        SourceError::Read {
            path: self.path.clone(),
            source,
        }
    }

    /// Restart from the beginning if the file shrank below our position
    async fn rewind_if_truncated(&mut self) -> Result<(), SourceError> {
        let len = match tokio::fs::metadata(&self.path).await {
            Ok(meta) => meta.len(),
            Err(e) => return Err(self.read_error(e)),
        };
        if len >= self.position {
            return Ok(());
        }

        warn!(
            path = %self.path.display(),
            len,
            position = self.position,
            "log truncated, rewinding"
        );
        if let Some(reader) = self.reader.as_mut() {
            if let Err(e) = reader.seek(SeekFrom::Start(0)).await {
                return Err(self.read_error(e));
            }
        }
        self.position = 0;
        self.partial.clear();
        Ok(())
    }
}

impl LogSource for FileLogSource {
    fn timestamp(&self, line: &str) -> Result<DateTime<Utc>, TimestampError> {
        self.format.timestamp(line)
    }

    async fn next_line(
        &mut self,
        cancel: &CancellationToken,
    ) -> Result<Option<String>, SourceError> {
        loop {
            if cancel.is_cancelled() {
                return Ok(None);
            }
            let Some(reader) = self.reader.as_mut() else {
                return Ok(None);
            };

            let read = match reader.read_until(b'\n', &mut self.partial).await {
                Ok(read) => read,
                Err(e) => return Err(self.read_error(e)),
            };
            self.position += read as u64;

            if self.partial.last() == Some(&b'\n') {
                let line = String::from_utf8_lossy(&self.partial).into_owned();
                self.partial.clear();
                return Ok(Some(line));
            }

            // End of file, possibly in the middle of a line
            self.rewind_if_truncated().await?;
            tokio::select! {
                _ = cancel.cancelled() => return Ok(None),
                _ = tokio::time::sleep(self.poll_interval) => {}
            }
        }
    }

    async fn tail(&mut self) -> Result<(), SourceError> {
        let Some(reader) = self.reader.as_mut() else {
            return Ok(());
        };
        let end = match reader.seek(SeekFrom::End(0)).await {
            Ok(end) => end,
            Err(e) => return Err(self.read_error(e)),
        };
        debug!(path = %self.path.display(), offset = end, "tailing log");
        self.position = end;
        self.partial.clear();
        Ok(())
    }

    fn close(&mut self) {
        self.reader = None;
        self.partial.clear();
    }
}
