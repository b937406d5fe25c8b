use std::sync::Arc;

use querywatch_logs::{LogSource, match_any, normalize, tokenize};
use querywatch_types::{Expectation, Testcase};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};

use crate::channel::Channel;
use crate::clock::SessionClock;
use crate::error::Result;
use crate::store::TestStore;

/// Captures the statements of a reference run as expectations
pub struct Recorder<S> {
    testcase: Testcase,
    channel: Arc<Channel>,
    source: S,
    store: Arc<dyn TestStore>,
    clock: SessionClock,
}

impl<S: LogSource> Recorder<S> {
    pub fn new(
        name: impl Into<String>,
        channel: Arc<Channel>,
        source: S,
        store: Arc<dyn TestStore>,
    ) -> Self {
        Self {
            testcase: Testcase::new(name),
            channel,
            source,
            store,
            clock: SessionClock::new(),
        }
    }

    pub fn testcase(&self) -> &Testcase {
        &self.testcase
    }

    /// Record one raw log line, returning the new expectation if it qualified
    pub fn process_line(&mut self, line: &str) -> Option<&Expectation> {
        let ts = match self.source.timestamp(line) {
            Ok(ts) => ts,
            Err(e) => {
                trace!(error = %e, "skipping line without timestamp");
                return None;
            }
        };
        if !self.clock.matches_recording_period(ts) {
            trace!(%ts, "skipping line from before the session");
            return None;
        }

        let pattern = match_any(&self.channel.patterns, line)?;
        let tokens = tokenize(normalize(line, &self.channel.patterns));
        debug!(
            test = %self.testcase.name,
            pattern = %pattern,
            tokens = tokens.len(),
            "recorded statement"
        );

        self.testcase
            .expectations
            .push(Expectation::new(tokens, pattern.spec()));
        self.testcase.expectations.last()
    }

    /// Record until `cancel` fires, then persist the testcase
    ///
    /// A log read failure ends the session; whatever was recorded so far is still
    /// persisted before the error is returned.
    pub async fn run(mut self, cancel: CancellationToken) -> Result<Testcase> {
        let name = self.testcase.name.clone();
        self.testcase = Testcase::new(name.clone());
        self.testcase.running = true;
        self.clock.start();
        self.store.write(&name, &self.testcase)?;
        info!(test = %name, channel = %self.channel.name, "recording started");

        let scanned = self.scan(&cancel).await;
        self.source.close();
        self.testcase.running = false;

        let persisted = self.store.write(&name, &self.testcase);
        if let Err(e) = &scanned {
            warn!(test = %name, error = %e, "recording aborted");
        }
        scanned?;
        persisted?;

        info!(
            test = %name,
            expectations = self.testcase.expectations.len(),
            "recording finished"
        );
        Ok(self.testcase)
    }

    async fn scan(&mut self, cancel: &CancellationToken) -> Result<()> {
        self.source.tail().await?;
        while let Some(line) = self.source.next_line(cancel).await? {
            self.process_line(&line);
        }
        Ok(())
    }
}
