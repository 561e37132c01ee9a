//! Scripted in-memory fetcher.
//!
//! Each course has a queue of canned results. Once the queue drains, the last
//! result is repeated. Used for offline runs and throughout the test suite.

use std::collections::{HashMap, VecDeque};
use std::sync::{Mutex, MutexGuard, PoisonError};

use crate::course::CourseId;
use crate::error::FetchError;

use super::{CourseFetcher, FetchOutcome};

/// One canned fetch result.
pub type Scripted = Result<FetchOutcome, FetchError>;

#[derive(Debug, Default)]
struct Script {
    queue: VecDeque<Scripted>,
    last: Option<Scripted>,
    calls: usize,
}

/// A [`CourseFetcher`] that replays queued results per course.
#[derive(Debug, Default)]
pub struct ScriptedFetcher {
    scripts: Mutex<HashMap<CourseId, Script>>,
}

impl ScriptedFetcher {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn scripts(&self) -> MutexGuard<'_, HashMap<CourseId, Script>> {
        self.scripts.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Queues one result for `course`.
    pub fn push(&self, course: &CourseId, result: Scripted) {
        self.scripts().entry(course.clone()).or_default().queue.push_back(result);
    }

    /// Replaces the script for `course` with a single repeating result.
    ///
    /// Results queued with [`ScriptedFetcher::push`] are discarded; queue the
    /// final result with `push` instead to keep them.
    pub fn always(&self, course: &CourseId, result: Scripted) {
        let mut scripts = self.scripts();
        let script = scripts.entry(course.clone()).or_default();
        script.queue.clear();
        script.last = Some(result);
    }

    /// Number of fetches made for `course` so far.
    #[must_use]
    pub fn calls(&self, course: &CourseId) -> usize {
        self.scripts().get(course).map_or(0, |s| s.calls)
    }
}

impl CourseFetcher for ScriptedFetcher {
    fn fetch(&self, course: &CourseId) -> Result<FetchOutcome, FetchError> {
        let mut scripts = self.scripts();
        let Some(script) = scripts.get_mut(course) else {
            return Err(FetchError::Unscripted {
                course: course.clone(),
            });
        };

        script.calls += 1;
        if let Some(next) = script.queue.pop_front() {
            script.last = Some(next.clone());
            return next;
        }

        script.last.clone().unwrap_or_else(|| {
            Err(FetchError::Unscripted {
                course: course.clone(),
            })
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn replays_queue_then_repeats_last() {
        let id = CourseId::new("CPSC", "221", "101");
        let fetcher = ScriptedFetcher::new();
        fetcher.push(&id, Ok(FetchOutcome::found(1, 1, 1, 1)));
        fetcher.push(&id, Ok(FetchOutcome::missing()));

        assert_eq!(fetcher.fetch(&id), Ok(FetchOutcome::found(1, 1, 1, 1)));
        assert_eq!(fetcher.fetch(&id), Ok(FetchOutcome::missing()));
        assert_eq!(fetcher.fetch(&id), Ok(FetchOutcome::missing()));
        assert_eq!(fetcher.calls(&id), 3);
    }

    #[test]
    fn unknown_course_is_unscripted() {
        let id = CourseId::new("MATH", "100", "101");
        let fetcher = ScriptedFetcher::new();
        assert!(matches!(fetcher.fetch(&id), Err(FetchError::Unscripted { .. })));
        assert_eq!(fetcher.calls(&id), 0);
    }

    #[test]
    fn always_overrides_queue() {
        let id = CourseId::new("CPSC", "110", "L1A");
        let fetcher = ScriptedFetcher::new();
        fetcher.push(&id, Ok(FetchOutcome::missing()));
        fetcher.always(&id, Ok(FetchOutcome::found(0, 10, 0, 0)));

        for _ in 0..3 {
            assert_eq!(fetcher.fetch(&id), Ok(FetchOutcome::found(0, 10, 0, 0)));
        }
    }
}
