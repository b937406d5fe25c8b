use std::sync::Arc;

use chrono::Utc;
use querywatch_logs::{LogSource, match_any, normalize, tokenize};
use querywatch_types::{Expectation, Testcase};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};

use crate::channel::Channel;
use crate::clock::SessionClock;
use crate::diff::{diff, equal, unmasked_diffs};
use crate::error::Result;
use crate::store::TestStore;

/// What happened to a single log line during verification
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum LineOutcome {
    /// No parsable timestamp, or logged before the session started
    Skipped,
    /// Matched none of the channel's patterns
    Unmatched,
    /// First comparison of an expectation; its tolerance mask was learned
    Calibrated { index: usize, ignore_diffs: Vec<usize> },
    /// Accepted by an already calibrated expectation
    Verified { index: usize },
    /// Matched a pattern but no expectation, kept as additional expectation
    Additional,
    /// Matched a pattern but no expectation, additional reporting disabled
    Dropped,
}

/// Replays a testcase against live log lines
pub struct Verifier<S> {
    testcase: Testcase,
    channel: Arc<Channel>,
    source: S,
    store: Arc<dyn TestStore>,
    clock: SessionClock,
}

impl<S: LogSource> Verifier<S> {
    pub fn new(
        testcase: Testcase,
        channel: Arc<Channel>,
        source: S,
        store: Arc<dyn TestStore>,
    ) -> Self {
        Self {
            testcase,
            channel,
            source,
            store,
            clock: SessionClock::new(),
        }
    }

    pub fn testcase(&self) -> &Testcase {
        &self.testcase
    }

    /// Prepare the testcase for a new verification session
    ///
    /// Only `fulfilled` is reset; `verified` and `ignore_diffs` carry over.
    pub fn begin(&mut self) {
        self.testcase.verifications += 1;
        self.testcase.last_execution = Some(Utc::now());
        self.testcase.running = true;
        self.testcase.additional_expectations.clear();
        for expectation in &mut self.testcase.expectations {
            expectation.fulfilled = false;
        }
        self.clock.start();
    }

    /// Check one raw log line against the expectations
    pub fn process_line(&mut self, line: &str) -> LineOutcome {
        let ts = match self.source.timestamp(line) {
            Ok(ts) => ts,
            Err(e) => {
                trace!(error = %e, "skipping line without timestamp");
                return LineOutcome::Skipped;
            }
        };
        if !self.clock.matches_recording_period(ts) {
            return LineOutcome::Skipped;
        }

        let Some(pattern) = match_any(&self.channel.patterns, line) else {
            return LineOutcome::Unmatched;
        };
        let candidate = tokenize(normalize(line, &self.channel.patterns));

        if let Some(outcome) = fulfil(&mut self.testcase.expectations, pattern.spec(), &candidate) {
            return outcome;
        }

        if self.channel.report_additional {
            debug!(test = %self.testcase.name, pattern = %pattern, "additional statement");
            self.testcase
                .additional_expectations
                .push(Expectation::new(candidate, pattern.spec()));
            LineOutcome::Additional
        } else {
            trace!(test = %self.testcase.name, pattern = %pattern, "unexpected statement dropped");
            LineOutcome::Dropped
        }
    }

    /// Verify until `cancel` fires, then persist the testcase
    ///
    /// The returned testcase keeps its additional expectations for reporting; the
    /// persisted copy does not. Accumulated state is persisted even when the log
    /// read fails.
    pub async fn run(mut self, cancel: CancellationToken) -> Result<Testcase> {
        let name = self.testcase.name.clone();
        self.begin();
        self.store.write(&name, &self.testcase)?;
        info!(
            test = %name,
            channel = %self.channel.name,
            verification = self.testcase.verifications,
            expectations = self.testcase.expectations.len(),
            "verification started"
        );

        let scanned = self.scan(&cancel).await;
        self.source.close();
        self.testcase.running = false;

        let persisted = self.store.write(&name, &self.testcase);
        if let Err(e) = &scanned {
            warn!(test = %name, error = %e, "verification aborted");
        }
        scanned?;
        persisted?;

        info!(
            test = %name,
            fulfilled = self.testcase.fulfilled_count(),
            expectations = self.testcase.expectations.len(),
            additional = self.testcase.additional_expectations.len(),
            "verification finished"
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

/// Satisfy the first open expectation of `pattern` that accepts `candidate`
///
/// Calibrated expectations must be equal outside their frozen mask. An expectation
/// seen for the first time accepts any candidate of the same length and keeps the
/// deviating positions as its mask. Rejections never touch the mask.
fn fulfil(
    expectations: &mut [Expectation],
    pattern: &str,
    candidate: &[String],
) -> Option<LineOutcome> {
    for (index, expectation) in expectations.iter_mut().enumerate() {
        if expectation.fulfilled || expectation.pattern != pattern {
            continue;
        }

        if expectation.is_calibrated() {
            if equal(&expectation.tokens, &expectation.ignore_diffs, candidate) {
                expectation.fulfilled = true;
                expectation.verified += 1;
                return Some(LineOutcome::Verified { index });
            }
            if let Ok(deviations) =
                unmasked_diffs(&expectation.tokens, &expectation.ignore_diffs, candidate)
            {
                trace!(index, ?deviations, "calibrated expectation rejected");
            }
            continue;
        }

        if let Ok(ignore_diffs) = diff(&expectation.tokens, candidate) {
            debug!(index, ?ignore_diffs, "expectation calibrated");
            expectation.ignore_diffs = ignore_diffs.clone();
            expectation.fulfilled = true;
            expectation.verified = 1;
            return Some(LineOutcome::Calibrated {
                index,
                ignore_diffs,
            });
        }
    }
    None
}
