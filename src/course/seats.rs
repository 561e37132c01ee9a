//! Observed seat counts for a course section.

use serde::{Deserialize, Serialize};

use crate::error::{WatchError, WatchResult};

/// The four non-negative counts shown on a section page.
///
/// Setters take signed input and reject negatives with
/// [`WatchError::InvalidState`], leaving the counts untouched.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SeatCounts {
    total_seats_remaining: u32,
    total_registered: u32,
    general_seats_remaining: u32,
    restricted_seats_remaining: u32,
}

fn checked(field: &'static str, value: i64) -> WatchResult<u32> {
    u32::try_from(value).map_err(|_| WatchError::InvalidState { field, value })
}

impl SeatCounts {
    /// Validates all four counts together; nothing is built if any is invalid.
    pub fn new(
        total_seats_remaining: i64,
        total_registered: i64,
        general_seats_remaining: i64,
        restricted_seats_remaining: i64,
    ) -> WatchResult<Self> {
        Ok(Self {
            total_seats_remaining: checked("total_seats_remaining", total_seats_remaining)?,
            total_registered: checked("total_registered", total_registered)?,
            general_seats_remaining: checked("general_seats_remaining", general_seats_remaining)?,
            restricted_seats_remaining: checked(
                "restricted_seats_remaining",
                restricted_seats_remaining,
            )?,
        })
    }

    #[must_use]
    pub const fn total_seats_remaining(&self) -> u32 {
        self.total_seats_remaining
    }

    #[must_use]
    pub const fn total_registered(&self) -> u32 {
        self.total_registered
    }

    #[must_use]
    pub const fn general_seats_remaining(&self) -> u32 {
        self.general_seats_remaining
    }

    #[must_use]
    pub const fn restricted_seats_remaining(&self) -> u32 {
        self.restricted_seats_remaining
    }

    pub fn set_total_seats_remaining(&mut self, value: i64) -> WatchResult<&mut Self> {
        self.total_seats_remaining = checked("total_seats_remaining", value)?;
        Ok(self)
    }

    pub fn set_total_registered(&mut self, value: i64) -> WatchResult<&mut Self> {
        self.total_registered = checked("total_registered", value)?;
        Ok(self)
    }

    pub fn set_general_seats_remaining(&mut self, value: i64) -> WatchResult<&mut Self> {
        self.general_seats_remaining = checked("general_seats_remaining", value)?;
        Ok(self)
    }

    pub fn set_restricted_seats_remaining(&mut self, value: i64) -> WatchResult<&mut Self> {
        self.restricted_seats_remaining = checked("restricted_seats_remaining", value)?;
        Ok(self)
    }
}
