//! Record and verify sessions for querywatch
//!
//! A [`Recorder`] turns the statements of a reference run into expectations. A
//! [`Verifier`] replays them: the first comparison of each expectation learns which
//! token positions may vary, every later comparison holds the other positions to
//! equality.

mod channel;
mod clock;
mod diff;
mod error;
mod recorder;
mod report;
mod session;
mod store;
mod verifier;

#[cfg(test)]
mod testing;

pub use channel::Channel;
pub use clock::SessionClock;
pub use diff::{LengthMismatch, diff, equal, unmasked_diffs};
pub use error::{EngineError, Result};
pub use recorder::Recorder;
pub use report::report_results;
pub use session::{SessionInfo, SessionRegistry};
pub use store::{JsonTestStore, TestStore};
pub use verifier::{LineOutcome, Verifier};

// Re-export types used in our public API
pub use querywatch_types::{Expectation, ReportResults, SessionKind, Testcase};

/// Lifecycle of a test name's session as tracked by [`SessionRegistry`]
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum SessionState {
    /// No session registered
    #[default]
    Idle,
    Running,
    /// Ended on its own; the result waits to be collected with `stop`
    Finished,
}
