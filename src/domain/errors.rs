//! Error types for the progress monitor
//!
//! Only connection-level conditions are errors of the monitor itself. A failed
//! pipeline step is ordinary data and never shows up here.

use thiserror::Error;

/// A stream message that could not be turned into a progress record
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum EventParseError {
    #[error("message is not valid JSON: {0}")]
    InvalidJson(String),

    #[error("message has no status field")]
    MissingStatus,

    #[error("unknown status '{0}'")]
    UnknownStatus(String),

    #[error("progress record with status '{status}' has no step id")]
    MissingStep { status: String },

    #[error("data payload must be a JSON object")]
    DataNotObject,
}

/// Connection-level failure of the event stream
#[derive(Error, Debug)]
pub enum TransportError {
    #[error("invalid stream endpoint '{url}': {reason}")]
    InvalidEndpoint { url: String, reason: String },

    #[error("failed to build HTTP client: {0}")]
    ClientBuild(#[source] reqwest::Error),

    #[error("failed to connect to progress stream: {0}")]
    Connect(#[source] reqwest::Error),

    #[error("progress stream returned HTTP {status}")]
    HttpStatus { status: u16 },

    #[error("progress stream read failed: {0}")]
    Read(#[from] std::io::Error),

    #[error("stream record exceeds {limit} bytes")]
    RecordTooLarge { limit: usize },

    #[error("progress stream closed by the server")]
    Closed,

    #[error("progress source for job '{0}' is unavailable")]
    Unavailable(String),
}

impl TransportError {
    /// Whether the failure happened before the stream was established
    pub const fn is_connect_failure(&self) -> bool {
        matches!(
            self,
            Self::InvalidEndpoint { .. }
                | Self::ClientBuild(_)
                | Self::Connect(_)
                | Self::HttpStatus { .. }
                | Self::Unavailable(_)
        )
    }
}

/// Invalid static pipeline definition
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PipelineError {
    #[error("pipeline must contain at least one stage")]
    Empty,

    #[error("stage id '{0}' is declared more than once")]
    DuplicateStage(String),

    #[error("terminal stage '{0}' is not part of the pipeline")]
    UnknownTerminalStage(String),

    #[error("first stage '{0}' cannot run in parallel with a predecessor")]
    LeadingParallelStage(String),
}
