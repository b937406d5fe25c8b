use std::path::PathBuf;

use querywatch_logs::SourceError;
use querywatch_types::SessionKind;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum EngineError {
    #[error(transparent)]
    Source(#[from] SourceError),

    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to serialize testcase '{name}': {source}")]
    Serialize {
        name: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("failed to parse testcase {path}: {source}")]
    Deserialize {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("testcase '{0}' not found")]
    NotFound(String),

    #[error("invalid testcase name '{0}'")]
    InvalidName(String),

    #[error("invalid channel '{name}': {reason}")]
    InvalidChannel { name: String, reason: String },

    #[error("a {kind} session for '{name}' is already running")]
    AlreadyRunning { name: String, kind: SessionKind },

    #[error("no session running for '{0}'")]
    NotRunning(String),

    #[error("session for '{0}' ended without reporting a result")]
    SessionLost(String),
}

pub type Result<T> = std::result::Result<T, EngineError>;
