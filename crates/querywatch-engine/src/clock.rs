use chrono::{DateTime, Utc};

/// Start time of a session, used to discard log activity predating it
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SessionClock {
    start: DateTime<Utc>,
}

impl SessionClock {
    /// Clock started now
    pub fn new() -> Self {
        Self { start: Utc::now() }
    }

    /// Clock started at a fixed instant
    pub fn at(start: DateTime<Utc>) -> Self {
        Self { start }
    }

    /// Restart the clock at the current time
    pub fn start(&mut self) {
        self.start = Utc::now();
    }

    pub fn get_start(&self) -> DateTime<Utc> {
        self.start
    }

    /// True iff `ts` is not before the session start
    pub fn matches_recording_period(&self, ts: DateTime<Utc>) -> bool {
        ts >= self.start
    }
}

impl Default for SessionClock {
    fn default() -> Self {
        Self::new()
    }
}
