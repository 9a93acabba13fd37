//! Error types for the ingestion pipeline.

use crate::db::UpsertOutcome;
use std::time::Duration;
use thiserror::Error;

/// Failures while obtaining an authenticated stream.
#[derive(Error, Debug)]
pub enum AuthError {
    /// Upstream refused the credentials. Never retried.
    #[error("credentials rejected by upstream (HTTP {status})")]
    Rejected { status: u16 },

    /// The handshake failed in a way retrying will not fix.
    #[error("stream handshake failed: {0}")]
    Handshake(String),

    /// Retryable failures kept happening until the attempt budget ran out.
    #[error("gave up after {attempts} attempts: {last}")]
    Exhausted { attempts: u32, last: String },
}

impl AuthError {
    pub fn is_fatal(&self) -> bool {
        matches!(self, AuthError::Rejected { .. })
    }
}

/// Failures while reading an established stream.
#[derive(Error, Debug)]
pub enum StreamError {
    /// Transport error from the HTTP body.
    #[error("stream transport error: {0}")]
    Transport(String),

    /// No bytes arrived within the stall timeout.
    #[error("stream silent for {0:?}")]
    Stalled(Duration),

    /// A single line grew past the framing limit without a newline.
    #[error("line exceeds {limit} bytes")]
    LineTooLong { limit: usize },
}

impl From<reqwest::Error> for StreamError {
    fn from(err: reqwest::Error) -> Self {
        StreamError::Transport(err.to_string())
    }
}

/// A raw record that could not be turned into a post.
///
/// Every variant keeps the offending payload for diagnostics.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ParseError {
    #[error("malformed json: {reason}")]
    Json { reason: String, payload: String },

    #[error("invalid status: {reason}")]
    Status { reason: String, payload: String },

    #[error("unparseable created_at {value:?}: {reason}")]
    Timestamp {
        value: String,
        reason: String,
        payload: String,
    },
}

impl ParseError {
    pub fn payload(&self) -> &str {
        match self {
            ParseError::Json { payload, .. }
            | ParseError::Status { payload, .. }
            | ParseError::Timestamp { payload, .. } => payload,
        }
    }
}

/// Relational store failures.
#[derive(Error, Debug)]
pub enum StoreError {
    /// The pool could not be built (bad path, unreachable store).
    #[error("cannot establish store pool: {0}")]
    Connect(String),

    /// Schema migrations failed to apply.
    #[error("schema setup failed: {0}")]
    Schema(String),

    /// No pooled connection became free within the acquire timeout.
    #[error("connection pool exhausted: {0}")]
    PoolExhausted(String),

    /// Any write failure other than a duplicate post id.
    #[error("store write failed: {0}")]
    Write(#[from] diesel::result::Error),

    /// The post row was handled as `post`, then an edge insert failed after
    /// `written` edges of that post landed.
    #[error("edge write failed after {written} edges: {source}")]
    PartialEdges {
        post: UpsertOutcome,
        written: usize,
        source: diesel::result::Error,
    },
}

/// An edge insert failed. Earlier edges of the same post stay written.
#[derive(Error, Debug)]
#[error("edge write failed after {written} edges: {source}")]
pub struct EdgeWriteError {
    pub written: usize,
    pub source: diesel::result::Error,
}

impl StoreError {
    /// Startup-time failures that must stop the process.
    pub fn is_fatal(&self) -> bool {
        matches!(self, StoreError::Connect(_) | StoreError::Schema(_))
    }
}

/// Invalid process configuration.
#[derive(Error, Debug, PartialEq)]
pub enum ConfigError {
    #[error("missing required setting {0}")]
    Missing(&'static str),

    #[error("search term {0:?} has no alphabetic characters")]
    InvalidSearchTerm(String),
}

/// Errors that stop the pipeline.
#[derive(Error, Debug)]
pub enum PipelineError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("authentication failed: {0}")]
    Auth(#[from] AuthError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("stream lost and {attempts} reconnect attempts failed: {last}")]
    ReconnectsExhausted { attempts: u32, last: String },
}
