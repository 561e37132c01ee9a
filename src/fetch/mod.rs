//! Fetch collaborator boundary.
//!
//! The watch core only needs one thing from the outside world: the current
//! state of a single course section. [`CourseFetcher`] is that seam. The
//! crate ships an in-memory implementation ([`ScriptedFetcher`]) and, behind
//! the `http` feature, a blocking HTTP implementation that reads the public
//! section page.

#[cfg(feature = "http")]
pub mod http;
/// Section-page parsing.
pub mod page;
/// In-memory fetcher.
pub mod scripted;

use crate::course::{CourseId, SeatCounts};
use crate::error::{FetchError, WatchResult};

#[cfg(feature = "http")]
pub use http::{HttpFetcher, HttpFetcherConfig};
pub use scripted::ScriptedFetcher;

/// Counts as reported by the remote source, before validation.
#[allow(missing_docs)]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RawSeatCounts {
    pub total_seats_remaining: i64,
    pub total_registered: i64,
    pub general_seats_remaining: i64,
    pub restricted_seats_remaining: i64,
}

impl RawSeatCounts {
    /// Validates all four counts at once.
    pub fn validate(&self) -> WatchResult<SeatCounts> {
        SeatCounts::new(
            self.total_seats_remaining,
            self.total_registered,
            self.general_seats_remaining,
            self.restricted_seats_remaining,
        )
    }
}

/// Result of one fetch for one course.
#[allow(missing_docs)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FetchOutcome {
    pub exists: bool,
    pub counts: RawSeatCounts,
}

impl FetchOutcome {
    /// The section exists and shows these counts.
    #[must_use]
    pub const fn found(
        total_seats_remaining: i64,
        total_registered: i64,
        general_seats_remaining: i64,
        restricted_seats_remaining: i64,
    ) -> Self {
        Self {
            exists: true,
            counts: RawSeatCounts {
                total_seats_remaining,
                total_registered,
                general_seats_remaining,
                restricted_seats_remaining,
            },
        }
    }

    /// The remote source says the section does not exist.
    #[must_use]
    pub const fn missing() -> Self {
        Self {
            exists: false,
            counts: RawSeatCounts {
                total_seats_remaining: 0,
                total_registered: 0,
                general_seats_remaining: 0,
                restricted_seats_remaining: 0,
            },
        }
    }
}

/// Retrieves the current state of one course section.
///
/// Implementations own their own timeouts; the watch core calls `fetch`
/// once per course per cycle and treats anything but `Ok` with
/// `exists == true` as "unchanged".
pub trait CourseFetcher: Send + Sync {
    /// Fetches the current state of `course`.
    fn fetch(&self, course: &CourseId) -> Result<FetchOutcome, FetchError>;
}

impl<F: CourseFetcher + ?Sized> CourseFetcher for std::sync::Arc<F> {
    fn fetch(&self, course: &CourseId) -> Result<FetchOutcome, FetchError> {
        (**self).fetch(course)
    }
}
