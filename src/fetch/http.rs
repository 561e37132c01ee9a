//! Blocking HTTP fetcher for the public course schedule.

use std::time::Duration;

use reqwest::blocking::Client;
use tracing::debug;

use crate::course::CourseId;
use crate::error::{FetchError, WatchError, WatchResult};

use super::page::parse_section_page;
use super::{CourseFetcher, FetchOutcome};

/// Default section-page endpoint; identity parts are appended as query parameters.
pub const DEFAULT_BASE_URL: &str =
    "https://courses.students.ubc.ca/cs/main?pname=subjarea&tname=subjareas&req=5";

#[allow(missing_docs)]
#[derive(Debug, Clone)]
pub struct HttpFetcherConfig {
    /// Section-page URL up to (not including) the identity parameters.
    pub base_url: String,
    /// Per-request timeout.
    pub timeout: Duration,
    pub user_agent: String,
}

impl Default for HttpFetcherConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            timeout: Duration::from_secs(20),
            user_agent: format!("seatwatch/{}", env!("CARGO_PKG_VERSION")),
        }
    }
}

/// [`CourseFetcher`] backed by a blocking `reqwest` client.
#[derive(Debug, Clone)]
pub struct HttpFetcher {
    client: Client,
    base_url: String,
}

impl HttpFetcher {
    pub fn new(cfg: HttpFetcherConfig) -> WatchResult<Self> {
        let client = Client::builder()
            .timeout(cfg.timeout)
            .user_agent(cfg.user_agent)
            .build()
            .map_err(|e| {
                WatchError::Fetch(FetchError::Http {
                    message: e.to_string(),
                })
            })?;

        Ok(Self {
            client,
            base_url: cfg.base_url,
        })
    }

    /// Section-page URL for `course`.
    #[must_use]
    pub fn section_url(&self, course: &CourseId) -> String {
        format!(
            "{}&dept={}&course={}&section={}",
            self.base_url,
            course.dept(),
            course.course(),
            course.section()
        )
    }
}

impl CourseFetcher for HttpFetcher {
    fn fetch(&self, course: &CourseId) -> Result<FetchOutcome, FetchError> {
        let url = self.section_url(course);
        debug!(%course, %url, "fetching section page");

        let response = self.client.get(&url).send().map_err(|e| FetchError::Http {
            message: e.to_string(),
        })?;

        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::UnexpectedStatus {
                status: status.as_u16(),
            });
        }

        let body = response.text().map_err(|e| FetchError::Http {
            message: e.to_string(),
        })?;

        parse_section_page(&body)
    }
}
