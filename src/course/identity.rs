//! Course identity: the immutable `DEPT CODE SECTION` key.

use std::fmt;
use std::sync::OnceLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

/// Shape of a course identifier, e.g. `CPSC 221 101` or `MATH 100A L1A`.
const COURSE_PATTERN: &str = r"^([A-Z]{2,4}) ([0-9]{3}[A-Z]?) ([A-Za-z0-9]{3})$";

fn course_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(COURSE_PATTERN).expect("course pattern is a valid regex"))
}

/// Three-part course key: department, course code and section.
///
/// Equality and hashing cover all three parts. The serialized form is the
/// display string, and deserialization goes through [`CourseId::parse`].
///
/// # Examples
///
/// ```
/// use seatwatch::CourseId;
///
/// let id = CourseId::parse("CPSC 221 101").unwrap();
/// assert_eq!(id.dept(), "CPSC");
/// assert_eq!(id.to_string(), "CPSC 221 101");
/// assert!(CourseId::parse("cpsc 221 101").is_none());
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct CourseId {
    dept: String,
    course: String,
    section: String,
}

impl CourseId {
    /// Builds an identity from parts without validating their shape.
    ///
    /// Prefer [`CourseId::parse`] for untrusted input.
    #[must_use]
    pub fn new(
        dept: impl Into<String>,
        course: impl Into<String>,
        section: impl Into<String>,
    ) -> Self {
        Self {
            dept: dept.into(),
            course: course.into(),
            section: section.into(),
        }
    }

    /// Parses `DEPT CODE SECTION`.
    ///
    /// Accepts 2-4 uppercase letters, a space, 3 digits with an optional
    /// uppercase suffix, a space, then 3 alphanumerics. Anything else yields
    /// `None`; no trimming or case folding is applied.
    #[must_use]
    pub fn parse(text: &str) -> Option<Self> {
        let caps = course_regex().captures(text)?;
        Some(Self::new(&caps[1], &caps[2], &caps[3]))
    }

    /// Department code, e.g. `CPSC`.
    #[must_use]
    pub fn dept(&self) -> &str {
        &self.dept
    }

    /// Course code, e.g. `221` or `100A`.
    #[must_use]
    pub fn course(&self) -> &str {
        &self.course
    }

    /// Section, e.g. `101` or `L1A`.
    #[must_use]
    pub fn section(&self) -> &str {
        &self.section
    }
}

impl fmt::Display for CourseId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {} {}", self.dept, self.course, self.section)
    }
}

impl TryFrom<String> for CourseId {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value).ok_or_else(|| format!("invalid course identifier '{value}'"))
    }
}

impl From<CourseId> for String {
    fn from(id: CourseId) -> Self {
        id.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_three_parts() {
        let id = CourseId::parse("CPSC 221 101").unwrap();
        assert_eq!(id.dept(), "CPSC");
        assert_eq!(id.course(), "221");
        assert_eq!(id.section(), "101");
    }

    #[test]
    fn accepts_suffixed_codes_and_lab_sections() {
        let id = CourseId::parse("MATH 100A L1a").unwrap();
        assert_eq!(id.course(), "100A");
        assert_eq!(id.section(), "L1a");
        assert!(CourseId::parse("EE 101 T01").is_some());
    }

    #[test]
    fn rejects_malformed_identifiers() {
        for bad in [
            "cpsc 221 101",
            "CPSC221101",
            "CPSCS 221 101",
            "C 221 101",
            "CPSC 22 101",
            "CPSC 221a 101",
            "CPSC 221 1010",
            "CPSC 221 10",
            " CPSC 221 101",
            "CPSC 221 101 ",
            "CPSC  221 101",
            "",
        ] {
            assert!(CourseId::parse(bad).is_none(), "accepted {bad:?}");
        }
    }

    #[test]
    fn display_round_trips_through_parse() {
        let id = CourseId::new("ABC", "123", "L1A");
        assert_eq!(CourseId::parse(&id.to_string()), Some(id));
    }

    #[test]
    fn serde_uses_display_form() {
        let id = CourseId::parse("CPSC 221 101").unwrap();
        let json = serde_json::to_string(&id).unwrap();
        assert_eq!(json, "\"CPSC 221 101\"");

        let back: CourseId = serde_json::from_str(&json).unwrap();
        assert_eq!(back, id);

        assert!(serde_json::from_str::<CourseId>("\"cpsc 221\"").is_err());
    }
}
