//! Notification side of the watch core.
//!
//! [`Notifier`] is the single capability a front end provides: deliver a
//! notification for the courses that just became available.
//! [`NotifierSubscriber`] adapts any notifier into a subscriber of
//! availability vectors. It resolves `true` slots back to watch-list courses
//! and keeps exactly one request outstanding.

mod channel;
mod console;
mod json;

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use tracing::{info, warn};

use crate::course::Course;
use crate::error::{WatchError, WatchResult};
use crate::watch::{AvailabilityVector, Subscriber, Subscription};
use crate::watchlist::WatchList;

pub use channel::ChannelNotifier;
pub use console::ConsoleNotifier;
pub use json::{JsonLinesNotifier, NotificationRecord};

/// Delivers a notification for a batch of now-available courses.
pub trait Notifier: Send + 'static {
    /// Called with a non-empty batch, in watch-list order.
    fn notify(&mut self, courses: &[Course]) -> WatchResult<()>;
}

impl<N: Notifier + ?Sized> Notifier for Box<N> {
    fn notify(&mut self, courses: &[Course]) -> WatchResult<()> {
        (**self).notify(courses)
    }
}

/// Counters shared between a [`NotifierSubscriber`] and its owner.
#[derive(Debug, Default)]
pub struct NotifierStats {
    vectors: AtomicU64,
    notified: AtomicU64,
    errors: AtomicU64,
    completed: AtomicU64,
}

impl NotifierStats {
    /// Vectors received.
    #[must_use]
    pub fn vectors(&self) -> u64 {
        self.vectors.load(Ordering::Relaxed)
    }

    /// Courses passed to the notifier.
    #[must_use]
    pub fn notified(&self) -> u64 {
        self.notified.load(Ordering::Relaxed)
    }

    /// Errors observed (from the publisher or from the notifier itself).
    #[must_use]
    pub fn errors(&self) -> u64 {
        self.errors.load(Ordering::Relaxed)
    }

    /// Completion signals received.
    #[must_use]
    pub fn completed(&self) -> u64 {
        self.completed.load(Ordering::Relaxed)
    }
}

/// Subscriber that turns availability vectors into notifications.
///
/// Errors are logged and counted; the subscription stays active.
#[derive(Debug)]
pub struct NotifierSubscriber<N> {
    courses: WatchList,
    notifier: N,
    subscription: Option<Subscription>,
    stats: Arc<NotifierStats>,
}

impl<N: Notifier> NotifierSubscriber<N> {
    /// `courses` must be the same list the watcher refreshes.
    #[must_use]
    pub fn new(courses: WatchList, notifier: N) -> Self {
        Self {
            courses,
            notifier,
            subscription: None,
            stats: Arc::new(NotifierStats::default()),
        }
    }

    /// Shared counters; stays readable after the subscriber moves into a publisher.
    #[must_use]
    pub fn stats(&self) -> Arc<NotifierStats> {
        Arc::clone(&self.stats)
    }

    fn handle(&mut self, vector: &AvailabilityVector) -> WatchResult<()> {
        let available = self.courses.resolve(vector.signals())?;
        if available.is_empty() {
            return Ok(());
        }
        self.notifier.notify(&available)?;
        self.stats.notified.fetch_add(available.len() as u64, Ordering::Relaxed);
        Ok(())
    }
}

impl<N: Notifier> Subscriber<AvailabilityVector> for NotifierSubscriber<N> {
    fn on_subscribe(&mut self, subscription: Subscription) {
        subscription.request(1);
        self.subscription = Some(subscription);
    }

    fn on_next(&mut self, vector: AvailabilityVector) {
        self.stats.vectors.fetch_add(1, Ordering::Relaxed);
        if let Err(err) = self.handle(&vector) {
            self.on_error(WatchError::subscriber(format!("cycle {}: {err}", vector.cycle())));
        }
        if let Some(subscription) = &self.subscription {
            subscription.request(1);
        }
    }

    fn on_error(&mut self, error: WatchError) {
        self.stats.errors.fetch_add(1, Ordering::Relaxed);
        warn!(error = %error, "watch error");
    }

    fn on_complete(&mut self) {
        self.stats.completed.fetch_add(1, Ordering::Relaxed);
        if let Some(subscription) = self.subscription.take() {
            subscription.cancel();
        }
        info!("notifier unsubscribed");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::course::{CourseId, SeatCounts};
    use crossbeam_channel::unbounded;

    fn list() -> WatchList {
        WatchList::from_courses([
            Course::with_seats(CourseId::new("CPSC", "110", "101"), SeatCounts::default()),
            Course::with_seats(CourseId::new("CPSC", "221", "101"), SeatCounts::default()),
        ])
        .unwrap()
    }

    struct Failing;

    impl Notifier for Failing {
        fn notify(&mut self, _courses: &[Course]) -> WatchResult<()> {
            Err(WatchError::Io {
                message: "broken pipe".to_string(),
            })
        }
    }

    #[test]
    fn resolves_flagged_positions() {
        let (tx, rx) = unbounded();
        let mut sub = NotifierSubscriber::new(list(), ChannelNotifier::new(tx));

        sub.on_next(AvailabilityVector::new(1, vec![false, true]));
        let batch = rx.try_recv().unwrap();
        assert_eq!(batch.len(), 1);
        assert_eq!(batch[0].to_string(), "CPSC 221 101");
        assert_eq!(sub.stats().notified(), 1);
    }

    #[test]
    fn empty_subset_is_not_notified() {
        let (tx, rx) = unbounded();
        let mut sub = NotifierSubscriber::new(list(), ChannelNotifier::new(tx));

        sub.on_next(AvailabilityVector::new(1, vec![false, false]));
        assert!(rx.try_recv().is_err());
        assert_eq!(sub.stats().vectors(), 1);
    }

    #[test]
    fn length_mismatch_is_tolerated() {
        let (tx, rx) = unbounded();
        let mut sub = NotifierSubscriber::new(list(), ChannelNotifier::new(tx));

        sub.on_next(AvailabilityVector::new(1, vec![true, true, true, true]));
        assert_eq!(rx.try_recv().unwrap().len(), 2);

        sub.on_next(AvailabilityVector::new(2, vec![true]));
        assert_eq!(rx.try_recv().unwrap().len(), 1);
    }

    #[test]
    fn notifier_failure_is_counted_not_fatal() {
        let mut sub = NotifierSubscriber::new(list(), Failing);
        let stats = sub.stats();

        sub.on_next(AvailabilityVector::new(1, vec![true, false]));
        sub.on_next(AvailabilityVector::new(2, vec![true, false]));
        assert_eq!(stats.errors(), 2);
        assert_eq!(stats.vectors(), 2);
        assert_eq!(stats.notified(), 0);
    }

    #[test]
    fn complete_is_counted() {
        let mut sub = NotifierSubscriber::new(list(), Failing);
        let stats = sub.stats();
        sub.on_complete();
        assert_eq!(stats.completed(), 1);
    }
}
