//! Watch core: periodic refresh, availability vectors and their delivery.
//!
//! A [`Watcher`] fires on a fixed period. Each fire refreshes every course in
//! the shared [`WatchList`](crate::watchlist::WatchList) once, in order, and
//! produces one [`AvailabilityVector`] with a slot per course. Vectors fan out
//! through a [`Publisher`] to any number of [`Subscriber`]s, each with its own
//! bounded buffer and credit-based demand.

pub mod config;
pub mod cycle;
pub mod publisher;
pub mod subscription;
pub mod watcher;

pub use config::{parse_period, OverflowPolicy, SignalMode, WatcherConfig};
pub use cycle::{refresh_all, AvailabilityVector, CycleReport, CycleRunner};
pub use publisher::{Publisher, PublisherConfig};
pub use subscription::{Subscriber, Subscription, SubscriptionId};
pub use watcher::{Watcher, WatcherState};
