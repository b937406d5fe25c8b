//! Log processing for querywatch
//!
//! This crate provides pattern filtering, statement tokenizing, timestamp parsing
//! and log tailing.

mod format;
mod pattern;
mod source;
mod tokenizer;

pub use format::{FormatError, LogFormat, TimestampError};
pub use pattern::{Pattern, match_any};
pub use source::{DEFAULT_POLL_INTERVAL, FileLogSource, LogSource, SourceError};
pub use tokenizer::{normalize, tokenize};
