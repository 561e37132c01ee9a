//! Watched courses.
//!
//! A [`Course`] pairs an immutable [`CourseId`] with the last observed
//! [`SeatCounts`]. Counts only ever change through a successful refresh
//! (all four at once) or through the validating setters.

mod identity;
mod seats;

use std::fmt;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{WatchError, WatchResult};
use crate::fetch::CourseFetcher;

pub use identity::CourseId;
pub use seats::SeatCounts;

/// A course section under observation.
///
/// Equality covers the identity and the last observed counts.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Course {
    id: CourseId,
    seats: SeatCounts,
}

impl Course {
    /// Fetches `id` once and builds the course from the result.
    ///
    /// Fails with [`WatchError::NotFound`] when the fetch reports the section
    /// missing or cannot complete.
    pub fn open(id: CourseId, fetcher: &dyn CourseFetcher) -> WatchResult<Self> {
        let mut course = Self::with_seats(id, SeatCounts::default());
        if course.refresh(fetcher) {
            Ok(course)
        } else {
            Err(WatchError::NotFound { course: course.id })
        }
    }

    /// Builds a course from known counts without fetching.
    #[must_use]
    pub const fn with_seats(id: CourseId, seats: SeatCounts) -> Self {
        Self { id, seats }
    }

    /// Re-fetches this course and replaces all four counts on success.
    ///
    /// Returns `false` and keeps the previous counts when the fetch fails,
    /// reports the section missing, or carries an invalid count.
    pub fn refresh(&mut self, fetcher: &dyn CourseFetcher) -> bool {
        let outcome = match fetcher.fetch(&self.id) {
            Ok(outcome) => outcome,
            Err(err) => {
                debug!(course = %self.id, error = %err, "fetch failed");
                return false;
            }
        };

        if !outcome.exists {
            debug!(course = %self.id, "section reported missing");
            return false;
        }

        match outcome.counts.validate() {
            Ok(seats) => {
                self.seats = seats;
                true
            }
            Err(err) => {
                debug!(course = %self.id, error = %err, "fetched counts rejected");
                false
            }
        }
    }

    #[must_use]
    pub const fn id(&self) -> &CourseId {
        &self.id
    }

    #[must_use]
    pub const fn seats(&self) -> &SeatCounts {
        &self.seats
    }

    /// True when general seats are available.
    #[must_use]
    pub const fn is_open(&self) -> bool {
        self.seats.general_seats_remaining() > 0
    }

    pub fn set_total_seats_remaining(&mut self, value: i64) -> WatchResult<&mut Self> {
        self.seats.set_total_seats_remaining(value)?;
        Ok(self)
    }

    pub fn set_total_registered(&mut self, value: i64) -> WatchResult<&mut Self> {
        self.seats.set_total_registered(value)?;
        Ok(self)
    }

    pub fn set_general_seats_remaining(&mut self, value: i64) -> WatchResult<&mut Self> {
        self.seats.set_general_seats_remaining(value)?;
        Ok(self)
    }

    pub fn set_restricted_seats_remaining(&mut self, value: i64) -> WatchResult<&mut Self> {
        self.seats.set_restricted_seats_remaining(value)?;
        Ok(self)
    }

    /// Multi-line printout of the identity and all four counts.
    #[must_use]
    pub fn verbose(&self) -> String {
        format!(
            "{}\n\tTotal Seats Remaining: {}\n\tRegistered: {}\n\tGeneral Seats Remaining: {}\n\t\
             Restricted Seats Remaining: {}",
            self.id,
            self.seats.total_seats_remaining(),
            self.seats.total_registered(),
            self.seats.general_seats_remaining(),
            self.seats.restricted_seats_remaining(),
        )
    }
}

impl fmt::Display for Course {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.id.fmt(f)
    }
}
