//! Shared types for querywatch
//!
//! This crate contains the persisted data model used by the recorder, the verifier
//! and the reporting front ends.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

// ============================================================================
// Expectation Types
// ============================================================================

/// One recorded statement plus its replay tolerance
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Expectation {
    /// Canonical recorded tokens
    pub tokens: Vec<String>,

    /// Pattern spec that selected the statement (join key for later lines)
    pub pattern: String,

    /// Token positions allowed to differ on replay
    #[serde(default)]
    pub ignore_diffs: Vec<usize>,

    /// Number of successful verifications
    #[serde(default)]
    pub verified: u32,

    /// Whether the current verification session has seen this statement
    #[serde(default)]
    pub fulfilled: bool,

    #[serde(default = "Uuid::new_v4")]
    pub uuid: Uuid,
}

impl Expectation {
    /// Create a fresh, never verified expectation
    pub fn new(tokens: Vec<String>, pattern: impl Into<String>) -> Self {
        Self {
            tokens,
            pattern: pattern.into(),
            ignore_diffs: Vec::new(),
            verified: 0,
            fulfilled: false,
            uuid: Uuid::new_v4(),
        }
    }

    /// An expectation is calibrated once its tolerance mask has been learned
    pub fn is_calibrated(&self) -> bool {
        self.verified > 0
    }

    /// Tokens joined back into a single statement for display
    pub fn statement(&self) -> String {
        self.tokens.join(" ")
    }
}

// ============================================================================
// Testcase Types
// ============================================================================

/// A named set of expectations captured from one recording session
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Testcase {
    pub name: String,

    /// Whether a session is currently driving this testcase
    #[serde(default)]
    pub running: bool,

    /// Number of verification sessions run against this testcase
    #[serde(default)]
    pub verifications: u32,

    #[serde(rename = "expectation", default)]
    pub expectations: Vec<Expectation>,

    #[serde(default)]
    pub last_execution: Option<DateTime<Utc>>,

    /// Lines that matched a pattern but no stored expectation (never persisted)
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub additional_expectations: Vec<Expectation>,
}

impl Testcase {
    /// Create an empty testcase
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    /// Copy of this testcase in its canonical persisted form
    pub fn persisted(&self) -> Self {
        Self {
            additional_expectations: Vec::new(),
            ..self.clone()
        }
    }

    pub fn fulfilled_count(&self) -> usize {
        self.expectations.iter().filter(|e| e.fulfilled).count()
    }
}

// ============================================================================
// Session Types
// ============================================================================

/// The two kinds of session that can drive a testcase
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionKind {
    Recording,
    Verification,
}

impl SessionKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Recording => "recording",
            Self::Verification => "verification",
        }
    }
}

impl std::fmt::Display for SessionKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// Report Types
// ============================================================================

/// Summary of a testcase after a verification session
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ReportResults {
    pub name: String,
    pub verifications: u32,
    pub expectations: usize,
    pub fulfilled: usize,

    /// Mean of `verified` over all expectations (0 when there are none)
    pub verification_mean: f64,

    pub unfulfilled: Vec<Expectation>,
    pub additional: Vec<Expectation>,
}

impl ReportResults {
    /// Whether every recorded statement reappeared in the last session
    pub fn is_success(&self) -> bool {
        self.unfulfilled.is_empty()
    }
}
