//! In-memory log source for session tests

use std::collections::VecDeque;
use std::path::PathBuf;

use chrono::{DateTime, Duration, Utc};
use querywatch_logs::{LogFormat, LogSource, SourceError, TimestampError};
use tokio_util::sync::CancellationToken;

/// What the source does once its scripted lines run out
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum Drained {
    /// Behave as if the session was cancelled
    Stop,
    /// Block until the session is cancelled
    Wait,
    /// Fail with a read error
    Fail,
}

pub(crate) struct ScriptedSource {
    backlog: VecDeque<String>,
    lines: VecDeque<String>,
    drained: Drained,
    tailed: bool,
    closed: bool,
}

impl ScriptedSource {
    pub(crate) fn new<S: Into<String>>(lines: impl IntoIterator<Item = S>) -> Self {
        Self {
            backlog: VecDeque::new(),
            lines: lines.into_iter().map(Into::into).collect(),
            drained: Drained::Stop,
            tailed: false,
            closed: false,
        }
    }

    /// Lines already in the log before the session tails it
    pub(crate) fn with_backlog<S>(mut self, lines: impl IntoIterator<Item = S>) -> Self
    where
        S: Into<String>,
    {
        self.backlog = lines.into_iter().map(Into::into).collect();
        self
    }

    pub(crate) fn when_drained(mut self, drained: Drained) -> Self {
        self.drained = drained;
        self
    }
}

impl LogSource for ScriptedSource {
    fn timestamp(&self, line: &str) -> Result<DateTime<Utc>, TimestampError> {
        LogFormat::Rfc3339.timestamp(line)
    }

    async fn next_line(
        &mut self,
        cancel: &CancellationToken,
    ) -> Result<Option<String>, SourceError> {
        if self.closed || cancel.is_cancelled() {
            return Ok(None);
        }
        if !self.tailed {
            if let Some(line) = self.backlog.pop_front() {
                return Ok(Some(line));
            }
        }
        if let Some(line) = self.lines.pop_front() {
            return Ok(Some(line));
        }

        match self.drained {
            Drained::Stop => Ok(None),
            Drained::Wait => {
                cancel.cancelled().await;
                Ok(None)
            }
            Drained::Fail => Err(SourceError::Read {
                path: PathBuf::from("scripted.log"),
                source: std::io::Error::new(std::io::ErrorKind::UnexpectedEof, "log vanished"),
            }),
        }
    }

    async fn tail(&mut self) -> Result<(), SourceError> {
        self.backlog.clear();
        self.tailed = true;
        Ok(())
    }

    fn close(&mut self) {
        self.closed = true;
    }
}

/// A log line stamped well inside any session started now
pub(crate) fn fresh(statement: &str) -> String {
    stamped(Utc::now() + Duration::hours(1), statement)
}

/// A log line stamped before any session started now
pub(crate) fn stale(statement: &str) -> String {
    stamped(Utc::now() - Duration::hours(1), statement)
}

pub(crate) fn stamped(ts: DateTime<Utc>, statement: &str) -> String {
    format!("{} [4242] LOG:  statement: {statement}\n", ts.to_rfc3339())
}
