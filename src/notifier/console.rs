//! Plain-text notifier.

use std::io::{self, Stdout, Write};

use chrono::{SecondsFormat, Utc};

use crate::course::Course;
use crate::error::WatchResult;

use super::Notifier;

/// Writes a timestamp line followed by one line per open course.
#[derive(Debug)]
pub struct ConsoleNotifier<W> {
    out: W,
}

impl ConsoleNotifier<Stdout> {
    #[must_use]
    pub fn stdout() -> Self {
        Self::new(io::stdout())
    }
}

impl<W: Write + Send + 'static> ConsoleNotifier<W> {
    #[must_use]
    pub const fn new(out: W) -> Self {
        Self { out }
    }

    pub fn into_inner(self) -> W {
        self.out
    }
}

impl<W: Write + Send + 'static> Notifier for ConsoleNotifier<W> {
    fn notify(&mut self, courses: &[Course]) -> WatchResult<()> {
        writeln!(self.out, "[{}]", Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true))?;
        for course in courses {
            writeln!(self.out, "There is a space open in {course}")?;
        }
        self.out.flush()?;
        Ok(())
    }
}
