//! The refresh cycle: one pass over the watch list.

use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;

use tracing::{debug, warn};

use crate::course::Course;
use crate::error::{WatchError, WatchResult};
use crate::fetch::CourseFetcher;
use crate::watchlist::WatchList;

use super::config::SignalMode;

/// Ordered per-course signals produced by one cycle.
///
/// Slot `i` refers to watch-list position `i` at the time the cycle ran.
/// Immutable once produced; clones share the same storage.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AvailabilityVector {
    cycle: u64,
    signals: Arc<[bool]>,
}

impl AvailabilityVector {
    #[must_use]
    pub fn new(cycle: u64, signals: Vec<bool>) -> Self {
        Self {
            cycle,
            signals: signals.into(),
        }
    }

    /// Sequence number of the cycle that produced this vector (starting at 1).
    #[must_use]
    pub const fn cycle(&self) -> u64 {
        self.cycle
    }

    #[must_use]
    pub fn signals(&self) -> &[bool] {
        &self.signals
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.signals.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.signals.is_empty()
    }

    /// Number of `true` slots.
    #[must_use]
    pub fn flagged(&self) -> usize {
        self.signals.iter().filter(|s| **s).count()
    }
}

/// Signals plus any contained faults from one pass.
#[derive(Debug, Default)]
pub struct CycleReport {
    /// One entry per course, in list order.
    pub signals: Vec<bool>,
    /// Fetch panics that were contained during the pass.
    pub faults: Vec<WatchError>,
}

pub(crate) fn panic_reason(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

/// Refreshes every course in order and reports one signal per course.
///
/// Courses are never reordered, added or removed. A failure (or panic) while
/// refreshing one course yields `false` for that slot and does not stop the
/// rest of the pass.
pub fn refresh_all(
    courses: &mut [Course],
    fetcher: &dyn CourseFetcher,
    mode: SignalMode,
) -> CycleReport {
    let mut report = CycleReport {
        signals: Vec::with_capacity(courses.len()),
        faults: Vec::new(),
    };

    for course in courses.iter_mut() {
        let was_open = course.is_open();
        let refreshed = panic::catch_unwind(AssertUnwindSafe(|| course.refresh(fetcher)));

        let signal = match refreshed {
            Ok(ok) => match mode {
                SignalMode::RefreshSucceeded => ok,
                SignalMode::BecameAvailable => ok && !was_open && course.is_open(),
            },
            Err(payload) => {
                let reason = panic_reason(payload.as_ref());
                warn!(course = %course, %reason, "fetch panicked; slot recorded as false");
                report.faults.push(WatchError::FetchPanicked {
                    course: course.id().clone(),
                    reason,
                });
                false
            }
        };
        report.signals.push(signal);
    }

    report
}

/// Runs refresh cycles against a shared watch list.
#[derive(Clone)]
pub struct CycleRunner {
    courses: WatchList,
    fetcher: Arc<dyn CourseFetcher>,
    mode: SignalMode,
}

impl std::fmt::Debug for CycleRunner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CycleRunner")
            .field("courses", &self.courses)
            .field("mode", &self.mode)
            .finish_non_exhaustive()
    }
}

impl CycleRunner {
    #[must_use]
    pub fn new(courses: WatchList, fetcher: Arc<dyn CourseFetcher>, mode: SignalMode) -> Self {
        Self { courses, fetcher, mode }
    }

    /// Runs one pass while holding the watch-list lock.
    ///
    /// Only a poisoned lock is an error; per-course failures are in the report.
    pub fn run(&self) -> WatchResult<CycleReport> {
        let mut courses = self.courses.lock()?;
        let report = refresh_all(&mut courses, self.fetcher.as_ref(), self.mode);
        debug!(
            courses = report.signals.len(),
            flagged = report.signals.iter().filter(|s| **s).count(),
            faults = report.faults.len(),
            "refresh cycle finished"
        );
        Ok(report)
    }

    #[must_use]
    pub fn courses(&self) -> &WatchList {
        &self.courses
    }
}
