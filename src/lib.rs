//! # seatwatch - periodic course-seat availability watcher
//!
//! seatwatch keeps an ordered watch list of course sections, refreshes each
//! one's seat counts on a fixed period, and publishes one availability
//! vector per cycle to any number of independently paced subscribers.
//!
//! ## Core Concepts
//!
//! - **Course**: a section identity (`DEPT COURSE SECTION`) plus its last
//!   known seat counts
//! - **`WatchList`**: the shared, ordered list the watcher refreshes
//! - **`AvailabilityVector`**: one boolean per watch-list position per cycle
//! - **Watcher**: timer-driven producer that fans vectors out to subscribers
//!
//! ## Usage
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use seatwatch::{ConsoleNotifier, NotifierSubscriber, ScriptedFetcher};
//! use seatwatch::{WatchList, Watcher, WatcherConfig};
//!
//! let fetcher = Arc::new(ScriptedFetcher::new());
//! let courses = WatchList::new();
//! let watcher = Watcher::new(courses.clone(), fetcher, WatcherConfig::default())?;
//! watcher.subscribe(NotifierSubscriber::new(courses, ConsoleNotifier::stdout()))?;
//! watcher.start()?;
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod course;
pub mod error;
pub mod fetch;
pub mod notifier;
pub mod watch;
pub mod watchlist;

pub use course::{Course, CourseId, SeatCounts};
pub use error::{FetchError, WatchError, WatchResult};
pub use fetch::{CourseFetcher, FetchOutcome, RawSeatCounts, ScriptedFetcher};
#[cfg(feature = "http")]
pub use fetch::{HttpFetcher, HttpFetcherConfig};
pub use notifier::{
    ChannelNotifier, ConsoleNotifier, JsonLinesNotifier, NotificationRecord, Notifier,
    NotifierStats, NotifierSubscriber,
};
pub use watch::{
    AvailabilityVector, OverflowPolicy, Publisher, SignalMode, Subscriber, Subscription,
    SubscriptionId, Watcher, WatcherConfig, WatcherState,
};
pub use watchlist::{load_watch_file, parse_course_list, OpenReport, WatchList};
