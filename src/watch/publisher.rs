//! Credit-based fan-out publisher.
//!
//! Each subscriber gets a dedicated delivery thread, a bounded FIFO of
//! undelivered items, and a small bounded error channel. Items are handed to
//! the subscriber only while it holds credit; until then they wait in its
//! FIFO. When the FIFO is full the configured [`OverflowPolicy`] decides which
//! item is dropped. Submitting never blocks the caller.

use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::thread::{self, JoinHandle, ThreadId};

use crossbeam_channel::{bounded, never, select, Receiver, Sender, TrySendError};
use tracing::{debug, info, warn};

use crate::error::{WatchError, WatchResult};

use super::config::{OverflowPolicy, WatcherConfig};
use super::cycle::panic_reason;
use super::subscription::{Subscriber, Subscription, SubscriptionId, SubscriptionState, Termination};

#[allow(missing_docs)]
#[derive(Debug, Clone)]
pub struct PublisherConfig {
    /// Per-subscriber buffered items awaiting credit.
    pub subscriber_capacity: usize,
    /// Per-subscriber buffered error notifications.
    pub error_capacity: usize,
    pub overflow: OverflowPolicy,
}

impl Default for PublisherConfig {
    fn default() -> Self {
        Self::from(&WatcherConfig::default())
    }
}

impl From<&WatcherConfig> for PublisherConfig {
    fn from(cfg: &WatcherConfig) -> Self {
        Self {
            subscriber_capacity: cfg.subscriber_capacity,
            error_capacity: cfg.error_capacity,
            overflow: cfg.overflow,
        }
    }
}

#[derive(Debug)]
struct Slot<T> {
    state: Arc<SubscriptionState>,
    items_tx: Sender<T>,
    // Kept so DropOldest can evict from the front of the FIFO.
    items_rx: Receiver<T>,
    errors_tx: Sender<WatchError>,
    worker: JoinHandle<()>,
}

#[derive(Debug)]
struct Inner<T> {
    slots: Vec<Slot<T>>,
    // Workers of subscriptions that ended on their own; joined on close.
    finished: Vec<JoinHandle<()>>,
    closed: bool,
}

impl<T> Inner<T> {
    fn reap(&mut self) {
        let (live, ended): (Vec<_>, Vec<_>) =
            self.slots.drain(..).partition(|s| !s.state.is_terminated());
        self.slots = live;
        self.finished.extend(ended.into_iter().map(|s| s.worker));
    }
}

/// Publisher of cloneable items to credit-holding subscribers.
///
/// Within one subscriber, items arrive in submission order. There is no
/// ordering across subscribers.
#[derive(Debug)]
pub struct Publisher<T> {
    cfg: PublisherConfig,
    inner: Mutex<Inner<T>>,
    dropped: AtomicU64,
    dropped_errors: AtomicU64,
    workers_spawned: AtomicU64,
}

impl<T: Clone + Send + 'static> Publisher<T> {
    #[must_use]
    pub fn new(cfg: PublisherConfig) -> Self {
        Self {
            cfg,
            inner: Mutex::new(Inner {
                slots: Vec::new(),
                finished: Vec::new(),
                closed: false,
            }),
            dropped: AtomicU64::new(0),
            dropped_errors: AtomicU64::new(0),
            workers_spawned: AtomicU64::new(0),
        }
    }

    fn inner(&self) -> std::sync::MutexGuard<'_, Inner<T>> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Registers a subscriber and starts its delivery thread.
    ///
    /// `on_subscribe` runs on that thread before anything else. Fails with
    /// [`WatchError::Closed`] once the publisher is closed; the subscriber is
    /// then dropped without any callback.
    pub fn subscribe<S: Subscriber<T>>(&self, subscriber: S) -> WatchResult<SubscriptionId> {
        let mut inner = self.inner();
        if inner.closed {
            return Err(WatchError::Closed);
        }
        inner.reap();

        let id = SubscriptionId::new();
        let (items_tx, items_rx) = bounded::<T>(self.cfg.subscriber_capacity.max(1));
        let (errors_tx, errors_rx) = bounded::<WatchError>(self.cfg.error_capacity.max(1));
        let (wake_tx, wake_rx) = bounded::<()>(1);

        let state = Arc::new(SubscriptionState::new(id, wake_tx));
        let subscription = Subscription::new(Arc::clone(&state));

        let n = self.workers_spawned.fetch_add(1, Ordering::Relaxed);
        let worker_state = Arc::clone(&state);
        let worker_items = items_rx.clone();
        let worker = thread::Builder::new()
            .name(format!("seatwatch-delivery-{n}"))
            .spawn(move || {
                delivery_loop(
                    Box::new(subscriber),
                    subscription,
                    &worker_state,
                    &worker_items,
                    &errors_rx,
                    &wake_rx,
                );
            })
            .map_err(|e| WatchError::Spawn { message: e.to_string() })?;

        inner.slots.push(Slot {
            state,
            items_tx,
            items_rx,
            errors_tx,
            worker,
        });
        debug!(subscription = %id, "subscriber registered");
        Ok(id)
    }

    /// Offers `item` to every live subscriber without blocking.
    ///
    /// Returns how many subscribers had the item enqueued. Fails with
    /// [`WatchError::Closed`] once the publisher is closed.
    pub fn submit(&self, item: T) -> WatchResult<usize> {
        let mut inner = self.inner();
        if inner.closed {
            return Err(WatchError::Closed);
        }
        inner.reap();

        let enqueued = inner.slots.iter().filter(|slot| self.offer(slot, item.clone())).count();
        Ok(enqueued)
    }

    /// Enqueues `item` for one subscriber, applying the overflow policy.
    fn offer(&self, slot: &Slot<T>, item: T) -> bool {
        let item = match slot.items_tx.try_send(item) {
            Ok(()) => return true,
            Err(TrySendError::Disconnected(_)) => return false,
            Err(TrySendError::Full(item)) => item,
        };

        match self.cfg.overflow {
            OverflowPolicy::DropNewest => {
                self.dropped.fetch_add(1, Ordering::Relaxed);
                warn!(
                    subscription = %slot.state.id(),
                    "subscriber buffer full; dropped newest item"
                );
                false
            }
            OverflowPolicy::DropOldest => {
                // The worker may have taken an item since the first attempt.
                let item = match slot.items_tx.try_send(item) {
                    Ok(()) => return true,
                    Err(TrySendError::Disconnected(_)) => return false,
                    Err(TrySendError::Full(item)) => item,
                };
                if slot.items_rx.try_recv().is_ok() {
                    self.dropped.fetch_add(1, Ordering::Relaxed);
                    warn!(
                        subscription = %slot.state.id(),
                        "subscriber buffer full; dropped oldest item"
                    );
                }
                // Only this thread sends under the lock, so there is room now.
                slot.items_tx.try_send(item).is_ok()
            }
        }
    }

    /// Sends a non-fatal error to every live subscriber's error channel.
    ///
    /// Errors are not subject to credit. Returns how many subscribers had the
    /// error enqueued.
    pub fn publish_error(&self, error: &WatchError) -> usize {
        let inner = self.inner();
        if inner.closed {
            return 0;
        }

        let mut enqueued = 0;
        for slot in inner.slots.iter().filter(|s| !s.state.is_terminated()) {
            match slot.errors_tx.try_send(error.clone()) {
                Ok(()) => enqueued += 1,
                Err(_) => {
                    self.dropped_errors.fetch_add(1, Ordering::Relaxed);
                }
            }
        }
        enqueued
    }

    /// Closes the publisher; every subscriber gets `on_complete` exactly once.
    ///
    /// Idempotent: returns `false` if already closed. Buffered items are
    /// discarded. On return no subscriber will see another `on_next`, except
    /// that a call made from a delivery thread cannot wait for its own
    /// subscriber.
    pub fn close(&self) -> bool {
        self.shutdown(Termination::Completed, true)
    }

    /// Closes the publisher after a fatal error: `on_error` then `on_complete`.
    pub fn close_exceptionally(&self, error: WatchError) -> bool {
        self.shutdown(Termination::Failed(error), true)
    }

    fn shutdown(&self, how: Termination, join: bool) -> bool {
        let (slots, finished) = {
            let mut inner = self.inner();
            if inner.closed {
                return false;
            }
            inner.closed = true;
            (std::mem::take(&mut inner.slots), std::mem::take(&mut inner.finished))
        };

        match &how {
            Termination::Failed(err) => {
                warn!(error = %err, subscribers = slots.len(), "publisher closed exceptionally");
            }
            _ => info!(subscribers = slots.len(), "publisher closed"),
        }

        let mut workers = finished;
        for slot in slots {
            slot.state.terminate(how.clone());
            workers.push(slot.worker);
            // Dropping the slot closes this side of its channels.
        }

        if join {
            let me: ThreadId = thread::current().id();
            for worker in workers {
                if worker.thread().id() != me {
                    let _ = worker.join();
                }
            }
        }
        true
    }

    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.inner().closed
    }

    /// Live (non-terminated) subscribers.
    #[must_use]
    pub fn subscriber_count(&self) -> usize {
        self.inner().slots.iter().filter(|s| !s.state.is_terminated()).count()
    }

    /// Items dropped because a subscriber buffer was full.
    #[must_use]
    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }

    /// Error notifications dropped because an error buffer was full.
    #[must_use]
    pub fn dropped_errors(&self) -> u64 {
        self.dropped_errors.load(Ordering::Relaxed)
    }

    /// Items handed to `on_next` for the given subscription, if still registered.
    #[must_use]
    pub fn delivered(&self, id: SubscriptionId) -> Option<u64> {
        self.inner()
            .slots
            .iter()
            .find(|s| s.state.id() == id)
            .map(|s| s.state.delivered())
    }
}

impl<T> Drop for Publisher<T> {
    fn drop(&mut self) {
        // Do not join here: a subscriber may hold the last reference and be
        // dropping it from its own delivery thread.
        let inner = self.inner.get_mut().unwrap_or_else(PoisonError::into_inner);
        if !inner.closed {
            inner.closed = true;
            for slot in inner.slots.drain(..) {
                slot.state.terminate(Termination::Completed);
            }
        }
    }
}

/// Runs one subscriber callback, converting a panic into a subscription failure.
fn guarded(state: &SubscriptionState, what: &str, f: impl FnOnce()) {
    if let Err(payload) = panic::catch_unwind(AssertUnwindSafe(f)) {
        let reason = format!("{what} panicked: {}", panic_reason(payload.as_ref()));
        warn!(%reason, "subscriber failed; cancelling its subscription");
        state.terminate(Termination::Failed(WatchError::subscriber(reason)));
    }
}

/// Runs a shutdown callback; a panic here only gets logged.
fn quietly(what: &str, f: impl FnOnce()) {
    if let Err(payload) = panic::catch_unwind(AssertUnwindSafe(f)) {
        warn!(reason = %panic_reason(payload.as_ref()), "{what} panicked during shutdown");
    }
}

fn finish<T: 'static>(subscriber: &mut dyn Subscriber<T>, how: Termination) {
    match how {
        Termination::Completed => quietly("on_complete", || subscriber.on_complete()),
        Termination::Failed(err) => {
            quietly("on_error", || subscriber.on_error(err));
            quietly("on_complete", || subscriber.on_complete());
        }
        Termination::Cancelled => {}
    }
}

fn delivery_loop<T: 'static>(
    mut subscriber: Box<dyn Subscriber<T>>,
    subscription: Subscription,
    state: &SubscriptionState,
    items_rx: &Receiver<T>,
    errors_rx: &Receiver<WatchError>,
    wake_rx: &Receiver<()>,
) {
    guarded(state, "on_subscribe", || subscriber.on_subscribe(subscription));

    loop {
        if let Some(how) = state.termination() {
            finish(subscriber.as_mut(), how);
            return;
        }

        // Without credit, leave items parked in the FIFO.
        let ready = if state.credit() > 0 { items_rx.clone() } else { never() };

        select! {
            recv(errors_rx) -> msg => {
                if let Ok(err) = msg {
                    guarded(state, "on_error", || subscriber.on_error(err));
                }
            }
            recv(wake_rx) -> _ => {}
            recv(ready) -> msg => {
                match msg {
                    // Closed while we were waiting: discard instead of delivering.
                    // Only this thread consumes credit, so the check above still holds.
                    Ok(item) => {
                        if !state.is_terminated() && state.take_credit() {
                            state.record_delivery();
                            guarded(state, "on_next", || subscriber.on_next(item));
                        }
                    }
                    Err(_) => {
                        state.terminate(Termination::Completed);
                    }
                }
            }
        }
    }
}
