//! Error types for alert aggregation.
//!
//! Per-project [`QueryError`]s are contained inside snapshots. Only
//! [`DirectoryError`] and [`InvalidFilterError`] reach the caller of a
//! refresh cycle.

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Classification of a failed per-project query.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum QueryErrorKind {
    Timeout,
    NotFound,
    ServerError,
    TransportError,
}

impl QueryErrorKind {
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Timeout => "TIMEOUT",
            Self::NotFound => "NOT_FOUND",
            Self::ServerError => "SERVER_ERROR",
            Self::TransportError => "TRANSPORT_ERROR",
        }
    }
}

impl fmt::Display for QueryErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single project's alert query (or acknowledge) failed.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
#[error("project {project_id}: {kind}: {message}")]
pub struct QueryError {
    pub project_id: String,
    pub kind: QueryErrorKind,
    pub message: String,
}

impl QueryError {
    pub fn new(project_id: impl Into<String>, kind: QueryErrorKind, message: impl Into<String>) -> Self {
        Self {
            project_id: project_id.into(),
            kind,
            message: message.into(),
        }
    }

    pub fn timeout(project_id: impl Into<String>, after: std::time::Duration) -> Self {
        Self::new(
            project_id,
            QueryErrorKind::Timeout,
            format!("no response within {}ms", after.as_millis()),
        )
    }
}

/// Listing projects failed; no aggregation can happen this cycle.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DirectoryError {
    /// The directory did not answer in time
    #[error("project directory timed out")]
    Timeout,

    /// The directory answered with a non-success status
    #[error("project directory returned status {status}: {body}")]
    Status { status: u16, body: String },

    /// Connection or decoding failure
    #[error("project directory unavailable: {0}")]
    Unavailable(String),
}

/// Caller supplied a filter that cannot be turned into a query.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum InvalidFilterError {
    /// A time bound could not be parsed or does not exist locally
    #[error("invalid {field} '{value}': {reason}")]
    InvalidTime {
        field: &'static str,
        value: String,
        reason: String,
    },

    /// An enumerated field carried an unknown value
    #[error("unknown {field} '{value}'")]
    UnknownValue { field: &'static str, value: String },

    /// The start bound lies after the end bound
    #[error("start_time {start} is after end_time {end}")]
    InvertedRange { start: String, end: String },
}

/// Lifecycle misuse of the refresh scheduler.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SchedulerError {
    #[error("scheduler is already running")]
    AlreadyRunning,

    #[error("scheduler has been stopped and cannot be restarted")]
    Stopped,

    #[error("refresh interval must be greater than zero")]
    ZeroInterval,

    #[error("scheduler must be started from within a tokio runtime")]
    NoRuntime,
}

/// Top-level failure of a refresh cycle.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Error {
    #[error(transparent)]
    Directory(#[from] DirectoryError),

    #[error(transparent)]
    InvalidFilter(#[from] InvalidFilterError),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
