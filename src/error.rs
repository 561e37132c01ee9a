//! Error types for seatwatch.
//!
//! All errors in seatwatch are strongly typed using thiserror.
//! Errors are `Clone` so a single failure can be fanned out to every
//! subscriber's error channel.

use thiserror::Error;

use crate::course::CourseId;

/// Failures reported by a fetch collaborator.
///
/// A fetch failure never escapes the refresh cycle: it is recorded as `false`
/// in the availability vector and the course keeps its last good state.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum FetchError {
    #[error("HTTP request failed: {message}")]
    Http {
        message: String,
    },

    #[error("Unexpected HTTP status {status}")]
    UnexpectedStatus {
        status: u16,
    },

    #[error("Could not read section page: {reason}")]
    Parse {
        reason: String,
    },

    #[error("No fetch result scripted for {course}")]
    Unscripted {
        course: CourseId,
    },
}

/// Top-level error type for seatwatch.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum WatchError {
    #[error("Invalid state: {field} cannot be negative (got {value})")]
    InvalidState {
        field: &'static str,
        value: i64,
    },

    #[error("Course not found: {course}")]
    NotFound {
        course: CourseId,
    },

    #[error("Fetch error: {0}")]
    Fetch(#[from] FetchError),

    #[error("Fetch for {course} panicked: {reason}")]
    FetchPanicked {
        course: CourseId,
        reason: String,
    },

    #[error("Subscriber failed: {reason}")]
    Subscriber {
        reason: String,
    },

    #[error("Demand must be positive (requested {requested})")]
    InvalidDemand {
        requested: i64,
    },

    #[error("Course {course} is already being watched")]
    DuplicateCourse {
        course: CourseId,
    },

    #[error("Not a course identifier: '{input}'")]
    InvalidCourse {
        input: String,
    },

    #[error("Not a polling period: '{input}'")]
    InvalidPeriod {
        input: String,
    },

    #[error("Watch list lock poisoned")]
    WatchListPoisoned,

    #[error("Failed to spawn worker thread: {message}")]
    Spawn {
        message: String,
    },

    #[error("I/O error: {message}")]
    Io {
        message: String,
    },

    #[error("Publisher is closed")]
    Closed,
}

impl WatchError {
    /// Creates a subscriber error.
    #[must_use]
    pub fn subscriber(reason: impl Into<String>) -> Self {
        Self::Subscriber {
            reason: reason.into(),
        }
    }

    /// Returns true if this error terminates the publisher.
    #[must_use]
    pub const fn is_fatal(&self) -> bool {
        matches!(self, Self::WatchListPoisoned | Self::Spawn { .. })
    }

    /// Returns true if this is a fetch-side failure.
    #[must_use]
    pub const fn is_fetch(&self) -> bool {
        matches!(self, Self::Fetch(_) | Self::FetchPanicked { .. })
    }

    /// Returns true if this error may clear up on a later attempt.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        match self {
            Self::Fetch(e) => match e {
                FetchError::Http { .. } => true,
                FetchError::UnexpectedStatus { status } => *status >= 500,
                _ => false,
            },
            Self::Io { .. } => true,
            _ => false,
        }
    }
}

impl From<std::io::Error> for WatchError {
    fn from(err: std::io::Error) -> Self {
        Self::Io {
            message: err.to_string(),
        }
    }
}

/// Result type alias for seatwatch operations.
pub type WatchResult<T> = Result<T, WatchError>;
