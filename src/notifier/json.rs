//! JSON-lines notifier for machine consumers.

use std::io::Write;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::course::{Course, CourseId, SeatCounts};
use crate::error::{WatchError, WatchResult};

use super::Notifier;

/// One line of output per available course.
#[allow(missing_docs)]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NotificationRecord {
    pub timestamp: DateTime<Utc>,
    pub course: CourseId,
    pub seats: SeatCounts,
}

impl NotificationRecord {
    #[must_use]
    pub fn now(course: &Course) -> Self {
        Self {
            timestamp: Utc::now(),
            course: course.id().clone(),
            seats: *course.seats(),
        }
    }
}

/// Writes each available course as a [`NotificationRecord`] JSON line.
#[derive(Debug)]
pub struct JsonLinesNotifier<W> {
    out: W,
}

impl<W: Write + Send + 'static> JsonLinesNotifier<W> {
    #[must_use]
    pub const fn new(out: W) -> Self {
        Self { out }
    }

    pub fn into_inner(self) -> W {
        self.out
    }
}

impl<W: Write + Send + 'static> Notifier for JsonLinesNotifier<W> {
    fn notify(&mut self, courses: &[Course]) -> WatchResult<()> {
        for course in courses {
            let line = serde_json::to_string(&NotificationRecord::now(course))
                .map_err(|e| WatchError::subscriber(format!("cannot encode notification: {e}")))?;
            writeln!(self.out, "{line}")?;
        }
        self.out.flush()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn emits_one_record_per_course() {
        let mut notifier = JsonLinesNotifier::new(Vec::new());
        let seats = SeatCounts::new(4, 196, 3, 1).unwrap();
        let course = Course::with_seats(CourseId::new("CPSC", "221", "101"), seats);
        notifier.notify(&[course]).unwrap();

        let text = String::from_utf8(notifier.into_inner()).unwrap();
        let record: NotificationRecord = serde_json::from_str(text.trim_end()).unwrap();
        assert_eq!(record.course.to_string(), "CPSC 221 101");
        assert_eq!(record.seats, seats);

        let raw: serde_json::Value = serde_json::from_str(text.trim_end()).unwrap();
        assert_eq!(raw["course"], "CPSC 221 101");
        assert_eq!(raw["seats"]["general_seats_remaining"], 3);
    }
}
