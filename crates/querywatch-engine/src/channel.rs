use querywatch_logs::Pattern;

use crate::error::{EngineError, Result};

/// One monitored query log: which statements matter and how to treat extras
#[derive(Clone, Debug)]
pub struct Channel {
    pub name: String,

    /// Ordered pattern list, first match wins
    pub patterns: Vec<Pattern>,

    /// Keep matching lines that satisfy no expectation as additional expectations
    pub report_additional: bool,
}

impl Channel {
    /// Build a channel from pattern specs, rejecting unusable pattern lists
    pub fn new<S: AsRef<str>>(name: impl Into<String>, specs: &[S]) -> Result<Self> {
        let name = name.into();
        if specs.is_empty() {
            return Err(EngineError::InvalidChannel {
                name,
                reason: "pattern list is empty".to_string(),
            });
        }

        let patterns = Pattern::parse_all(specs);
        if let Some(bad) = patterns.iter().find(|p| p.include().is_empty()) {
            return Err(EngineError::InvalidChannel {
                reason: format!("pattern '{}' has an empty include part", bad.spec()),
                name,
            });
        }

        Ok(Self {
            name,
            patterns,
            report_additional: false,
        })
    }

    pub fn with_report_additional(mut self, enabled: bool) -> Self {
        self.report_additional = enabled;
        self
    }
}
