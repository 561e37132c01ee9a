//! Subscriber contract and the credit handle given to each subscriber.

use std::sync::atomic::{AtomicBool, AtomicI64, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use crossbeam_channel::Sender;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::WatchError;

/// Unique identifier for a subscription.
#[allow(missing_docs)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SubscriptionId(Uuid);

impl SubscriptionId {
    /// Create a new random subscription id.
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for SubscriptionId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for SubscriptionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Receiver of published items under credit-based flow control.
///
/// All callbacks for one subscriber run on that subscriber's delivery thread,
/// in order: `on_subscribe` first, then any number of `on_next`/`on_error`,
/// then at most one `on_complete`. `on_next` is only called while the
/// subscriber has outstanding credit.
pub trait Subscriber<T>: Send + 'static {
    /// Called once before anything else; request initial credit here.
    fn on_subscribe(&mut self, subscription: Subscription);

    /// Called with the next item, consuming one unit of credit.
    fn on_next(&mut self, item: T);

    /// Called for non-fatal and fatal errors alike.
    fn on_error(&mut self, error: WatchError);

    /// Called once when the publisher closes. No further callbacks follow.
    fn on_complete(&mut self);
}

/// How a subscription ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Termination {
    /// Publisher closed normally.
    Completed,
    /// Publisher (or this subscription) failed; `on_error` then `on_complete`.
    Failed(WatchError),
    /// Subscriber cancelled; no further callbacks.
    Cancelled,
}

#[derive(Debug)]
pub(crate) struct SubscriptionState {
    id: SubscriptionId,
    credit: AtomicI64,
    delivered: AtomicU64,
    terminated: AtomicBool,
    termination: Mutex<Option<Termination>>,
    wake_tx: Sender<()>,
}

impl SubscriptionState {
    pub(crate) fn new(id: SubscriptionId, wake_tx: Sender<()>) -> Self {
        Self {
            id,
            credit: AtomicI64::new(0),
            delivered: AtomicU64::new(0),
            terminated: AtomicBool::new(false),
            termination: Mutex::new(None),
            wake_tx,
        }
    }

    pub(crate) fn id(&self) -> SubscriptionId {
        self.id
    }

    pub(crate) fn wake(&self) {
        // A pending token is enough; the worker re-checks state on every wake.
        let _ = self.wake_tx.try_send(());
    }

    pub(crate) fn credit(&self) -> i64 {
        self.credit.load(Ordering::Acquire)
    }

    /// Takes one unit of credit if any is available.
    pub(crate) fn take_credit(&self) -> bool {
        self.credit
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |c| (c > 0).then(|| c - 1))
            .is_ok()
    }

    pub(crate) fn record_delivery(&self) {
        self.delivered.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn delivered(&self) -> u64 {
        self.delivered.load(Ordering::Relaxed)
    }

    pub(crate) fn is_terminated(&self) -> bool {
        self.terminated.load(Ordering::Acquire)
    }

    /// Records the first termination; later ones are ignored.
    pub(crate) fn terminate(&self, how: Termination) -> bool {
        let mut slot = self.termination.lock().unwrap_or_else(PoisonError::into_inner);
        if slot.is_some() {
            return false;
        }
        *slot = Some(how);
        self.terminated.store(true, Ordering::Release);
        drop(slot);
        self.wake();
        true
    }

    pub(crate) fn termination(&self) -> Option<Termination> {
        self.termination.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }
}

/// Credit handle held by a subscriber.
///
/// Cloning is cheap; all clones refer to the same subscription.
#[derive(Debug, Clone)]
pub struct Subscription {
    state: Arc<SubscriptionState>,
}

impl Subscription {
    pub(crate) fn new(state: Arc<SubscriptionState>) -> Self {
        Self { state }
    }

    #[must_use]
    pub fn id(&self) -> SubscriptionId {
        self.state.id
    }

    /// Grants `n` more deliveries.
    ///
    /// Credit saturates at `i64::MAX`. A non-positive `n` terminates the
    /// subscription with [`WatchError::InvalidDemand`].
    pub fn request(&self, n: i64) {
        if n <= 0 {
            self.state.terminate(Termination::Failed(WatchError::InvalidDemand { requested: n }));
            return;
        }
        let _ = self
            .state
            .credit
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |c| Some(c.saturating_add(n)));
        self.state.wake();
    }

    /// Stops all further deliveries. Idempotent.
    pub fn cancel(&self) {
        self.state.terminate(Termination::Cancelled);
    }

    /// Outstanding credit.
    #[must_use]
    pub fn credit(&self) -> i64 {
        self.state.credit()
    }

    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.state.is_terminated()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crossbeam_channel::bounded;

    fn subscription() -> (Subscription, crossbeam_channel::Receiver<()>) {
        let (wake_tx, wake_rx) = bounded(1);
        let state = Arc::new(SubscriptionState::new(SubscriptionId::new(), wake_tx));
        (Subscription::new(state), wake_rx)
    }

    #[test]
    fn request_accumulates_and_wakes() {
        let (sub, wake_rx) = subscription();
        sub.request(1);
        sub.request(2);
        assert_eq!(sub.credit(), 3);
        assert!(wake_rx.try_recv().is_ok());
        // Wakes coalesce into a single pending token.
        assert!(wake_rx.try_recv().is_err());
    }

    #[test]
    fn credit_saturates() {
        let (sub, _wake_rx) = subscription();
        sub.request(i64::MAX);
        sub.request(10);
        assert_eq!(sub.credit(), i64::MAX);
    }

    #[test]
    fn take_credit_stops_at_zero() {
        let (sub, _wake_rx) = subscription();
        sub.request(2);
        assert!(sub.state.take_credit());
        assert!(sub.state.take_credit());
        assert!(!sub.state.take_credit());
        assert_eq!(sub.credit(), 0);
    }

    #[test]
    fn non_positive_request_fails_subscription() {
        let (sub, _wake_rx) = subscription();
        sub.request(0);
        assert!(sub.is_cancelled());
        assert_eq!(
            sub.state.termination(),
            Some(Termination::Failed(WatchError::InvalidDemand { requested: 0 }))
        );
    }

    #[test]
    fn first_termination_wins() {
        let (sub, _wake_rx) = subscription();
        sub.cancel();
        assert!(!sub.state.terminate(Termination::Completed));
        assert_eq!(sub.state.termination(), Some(Termination::Cancelled));
    }
}
