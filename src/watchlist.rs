//! The shared, ordered watch list.
//!
//! Position in the list is what ties an availability vector slot back to a
//! course, so the list is shared by handle (never copied per cycle) and all
//! access goes through one lock. A refresh cycle holds the lock for its whole
//! traversal, which keeps external additions from interleaving with it.

use std::fs;
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};

use tracing::info;

use crate::course::{Course, CourseId};
use crate::error::{WatchError, WatchResult};
use crate::fetch::CourseFetcher;

/// Shared handle to the ordered list of watched courses.
///
/// Clones share the same underlying list. Courses are unique by identity.
#[derive(Debug, Clone, Default)]
pub struct WatchList {
    courses: Arc<Mutex<Vec<Course>>>,
}

/// Outcome of [`WatchList::open_all`].
#[allow(missing_docs)]
#[derive(Debug, Default)]
pub struct OpenReport {
    pub added: Vec<CourseId>,
    pub rejected: Vec<WatchError>,
}

impl WatchList {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds a list from courses, rejecting duplicate identities.
    pub fn from_courses(courses: impl IntoIterator<Item = Course>) -> WatchResult<Self> {
        let list = Self::new();
        for course in courses {
            list.add(course)?;
        }
        Ok(list)
    }

    pub(crate) fn lock(&self) -> WatchResult<MutexGuard<'_, Vec<Course>>> {
        self.courses.lock().map_err(|_| WatchError::WatchListPoisoned)
    }

    /// Appends a course; fails if its identity is already watched.
    pub fn add(&self, course: Course) -> WatchResult<()> {
        let mut courses = self.lock()?;
        if courses.iter().any(|c| c.id() == course.id()) {
            return Err(WatchError::DuplicateCourse {
                course: course.id().clone(),
            });
        }
        courses.push(course);
        Ok(())
    }

    /// Fetches and appends each identity in order.
    ///
    /// Missing and duplicate courses are collected in the report instead of
    /// aborting the remaining ones. Only a poisoned lock is an error.
    pub fn open_all(
        &self,
        ids: impl IntoIterator<Item = CourseId>,
        fetcher: &dyn CourseFetcher,
    ) -> WatchResult<OpenReport> {
        let mut report = OpenReport::default();
        for id in ids {
            if self.contains(&id)? {
                report.rejected.push(WatchError::DuplicateCourse { course: id });
                continue;
            }
            match Course::open(id, fetcher) {
                Ok(course) => {
                    let id = course.id().clone();
                    match self.add(course) {
                        Ok(()) => {
                            info!(course = %id, "watching course");
                            report.added.push(id);
                        }
                        Err(WatchError::WatchListPoisoned) => {
                            return Err(WatchError::WatchListPoisoned);
                        }
                        Err(err) => report.rejected.push(err),
                    }
                }
                Err(err) => report.rejected.push(err),
            }
        }
        Ok(report)
    }

    /// Removes the course with identity `id`, returning whether it was present.
    pub fn remove(&self, id: &CourseId) -> WatchResult<bool> {
        let mut courses = self.lock()?;
        let before = courses.len();
        courses.retain(|c| c.id() != id);
        Ok(courses.len() != before)
    }

    pub fn contains(&self, id: &CourseId) -> WatchResult<bool> {
        Ok(self.lock()?.iter().any(|c| c.id() == id))
    }

    pub fn len(&self) -> WatchResult<usize> {
        Ok(self.lock()?.len())
    }

    pub fn is_empty(&self) -> WatchResult<bool> {
        Ok(self.lock()?.is_empty())
    }

    /// Copies the current courses and their counts.
    pub fn snapshot(&self) -> WatchResult<Vec<Course>> {
        Ok(self.lock()?.clone())
    }

    /// Courses at the positions flagged `true`, in list order.
    ///
    /// Positions past the shorter of the two lengths are ignored.
    pub fn resolve(&self, signals: &[bool]) -> WatchResult<Vec<Course>> {
        let courses = self.lock()?;
        Ok(courses
            .iter()
            .zip(signals)
            .filter(|(_, flagged)| **flagged)
            .map(|(course, _)| course.clone())
            .collect())
    }
}

/// Splits comma- or newline-separated identifiers.
///
/// Tokens are trimmed and uppercased before parsing. Returns the parsed
/// identities (first occurrence wins) and the tokens that did not parse.
#[must_use]
pub fn parse_course_list(text: &str) -> (Vec<CourseId>, Vec<String>) {
    let mut ids: Vec<CourseId> = Vec::new();
    let mut rejected = Vec::new();

    for token in text.split([',', '\n']).map(str::trim).filter(|t| !t.is_empty()) {
        match CourseId::parse(&token.to_uppercase()) {
            Some(id) if !ids.contains(&id) => ids.push(id),
            Some(_) => {}
            None => rejected.push(token.to_string()),
        }
    }

    (ids, rejected)
}

/// Reads a course list file; one identifier per line (commas also accepted).
pub fn load_watch_file(path: &Path) -> WatchResult<(Vec<CourseId>, Vec<String>)> {
    let text = fs::read_to_string(path).map_err(|e| WatchError::Io {
        message: format!("{}: {e}", path.display()),
    })?;
    Ok(parse_course_list(&text))
}
