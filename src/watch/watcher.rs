//! Timer-driven watcher.
//!
//! A `Watcher` owns one timer thread that runs the refresh cycle every period
//! and hands each availability vector to a [`Publisher`]. Fires never
//! overlap; a cycle that overruns its period pushes the next fire back to
//! "now" instead of firing a burst to catch up.

use std::sync::atomic::{AtomicU64, AtomicU8, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use crossbeam_channel::{bounded, select, Receiver, Sender};
use tracing::{debug, error, info, warn};

use crate::error::{WatchError, WatchResult};
use crate::fetch::CourseFetcher;
use crate::watchlist::WatchList;

use super::config::WatcherConfig;
use super::cycle::{AvailabilityVector, CycleRunner};
use super::publisher::{Publisher, PublisherConfig};
use super::subscription::{Subscriber, SubscriptionId};

const IDLE: u8 = 0;
const RUNNING: u8 = 1;
const CLOSED: u8 = 2;

/// Lifecycle of a [`Watcher`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WatcherState {
    /// Constructed; timer not armed.
    Idle,
    /// Timer armed; zero or more cycles completed.
    Running,
    /// Terminal. No further cycles, all subscriptions ended.
    Closed,
}

impl WatcherState {
    const fn from_raw(raw: u8) -> Self {
        match raw {
            IDLE => Self::Idle,
            RUNNING => Self::Running,
            _ => Self::Closed,
        }
    }
}

/// Everything one fire needs; shared by the timer thread and `poll_once`.
#[derive(Debug, Clone)]
struct FireContext {
    runner: CycleRunner,
    publisher: Arc<Publisher<AvailabilityVector>>,
    state: Arc<AtomicU8>,
    cycles: Arc<AtomicU64>,
    // Serializes fires so cycle numbers match submission order.
    fire_lock: Arc<Mutex<()>>,
}

impl FireContext {
    fn is_closed(&self) -> bool {
        self.state.load(Ordering::Acquire) == CLOSED
    }

    fn fire(&self) -> WatchResult<AvailabilityVector> {
        let _guard = self.fire_lock.lock().unwrap_or_else(PoisonError::into_inner);
        if self.is_closed() {
            return Err(WatchError::Closed);
        }

        let report = self.runner.run()?;
        let cycle = self.cycles.fetch_add(1, Ordering::AcqRel) + 1;
        let vector = AvailabilityVector::new(cycle, report.signals);

        for fault in &report.faults {
            self.publisher.publish_error(fault);
        }
        let enqueued = self.publisher.submit(vector.clone())?;
        debug!(cycle, flagged = vector.flagged(), subscribers = enqueued, "cycle published");
        Ok(vector)
    }

    /// Moves to `Closed` and ends every subscription with `error`.
    fn fail(&self, error: WatchError) {
        error!(error = %error, "watcher failed; closing");
        self.state.store(CLOSED, Ordering::Release);
        self.publisher.close_exceptionally(error);
    }
}

/// Periodic publisher of availability vectors for a shared watch list.
#[derive(Debug)]
pub struct Watcher {
    cfg: WatcherConfig,
    ctx: FireContext,
    stop_tx: Mutex<Option<Sender<()>>>,
    timer: Mutex<Option<JoinHandle<()>>>,
}

impl Watcher {
    /// Builds an idle watcher. Subscribe, then call [`Watcher::start`].
    ///
    /// Fails with [`WatchError::InvalidPeriod`] for a zero period.
    pub fn new(
        courses: WatchList,
        fetcher: Arc<dyn CourseFetcher>,
        cfg: WatcherConfig,
    ) -> WatchResult<Self> {
        if cfg.period.is_zero() {
            return Err(WatchError::InvalidPeriod {
                input: format!("{:?}", cfg.period),
            });
        }

        let ctx = FireContext {
            runner: CycleRunner::new(courses, fetcher, cfg.signal_mode),
            publisher: Arc::new(Publisher::new(PublisherConfig::from(&cfg))),
            state: Arc::new(AtomicU8::new(IDLE)),
            cycles: Arc::new(AtomicU64::new(0)),
            fire_lock: Arc::new(Mutex::new(())),
        };

        Ok(Self {
            cfg,
            ctx,
            stop_tx: Mutex::new(None),
            timer: Mutex::new(None),
        })
    }

    /// Builds a watcher and arms its timer immediately.
    pub fn spawn(
        courses: WatchList,
        fetcher: Arc<dyn CourseFetcher>,
        cfg: WatcherConfig,
    ) -> WatchResult<Self> {
        let watcher = Self::new(courses, fetcher, cfg)?;
        watcher.start()?;
        Ok(watcher)
    }

    /// Arms the timer. A no-op while running; fails once closed.
    ///
    /// If the timer thread cannot be spawned the watcher closes and every
    /// subscriber receives the error before completion.
    pub fn start(&self) -> WatchResult<()> {
        match self
            .ctx
            .state
            .compare_exchange(IDLE, RUNNING, Ordering::AcqRel, Ordering::Acquire)
        {
            Ok(_) => {}
            Err(RUNNING) => return Ok(()),
            Err(_) => return Err(WatchError::Closed),
        }

        let (stop_tx, stop_rx) = bounded::<()>(1);
        let ctx = self.ctx.clone();
        let period = self.cfg.period;
        let initial_delay = self.cfg.initial_delay;

        let spawned = thread::Builder::new()
            .name("seatwatch-timer".to_string())
            .spawn(move || timer_loop(&ctx, period, initial_delay, &stop_rx));

        match spawned {
            Ok(handle) => {
                *self.stop_tx.lock().unwrap_or_else(PoisonError::into_inner) = Some(stop_tx);
                *self.timer.lock().unwrap_or_else(PoisonError::into_inner) = Some(handle);
                info!(?period, ?initial_delay, "watcher started");
                Ok(())
            }
            Err(e) => {
                let err = WatchError::Spawn { message: e.to_string() };
                self.ctx.fail(err.clone());
                Err(err)
            }
        }
    }

    /// Registers a subscriber for every vector published from now on.
    pub fn subscribe<S>(&self, subscriber: S) -> WatchResult<SubscriptionId>
    where
        S: Subscriber<AvailabilityVector>,
    {
        self.ctx.publisher.subscribe(subscriber)
    }

    /// Runs one cycle on the calling thread and publishes its vector.
    ///
    /// Shares the timer's serialization, so it never overlaps a timed fire.
    /// After [`Watcher::close`] it refreshes nothing and returns
    /// [`WatchError::Closed`].
    pub fn poll_once(&self) -> WatchResult<AvailabilityVector> {
        match self.ctx.fire() {
            Err(err) if err.is_fatal() => {
                self.ctx.fail(err.clone());
                Err(err)
            }
            other => other,
        }
    }

    /// Cancels the timer, waits for an in-flight cycle, and completes every
    /// subscriber.
    ///
    /// Must not be called from inside a fetch. Idempotent: returns `false` if
    /// the watcher was already closed.
    pub fn close(&self) -> bool {
        let first = self.ctx.state.swap(CLOSED, Ordering::AcqRel) != CLOSED;

        // Dropping the sender wakes the timer out of its wait.
        drop(self.stop_tx.lock().unwrap_or_else(PoisonError::into_inner).take());
        let timer = self.timer.lock().unwrap_or_else(PoisonError::into_inner).take();
        if let Some(handle) = timer {
            if handle.thread().id() != thread::current().id() {
                let _ = handle.join();
            }
        }
        // A `poll_once` on another thread may still be mid-cycle.
        drop(self.ctx.fire_lock.lock().unwrap_or_else(PoisonError::into_inner));

        self.ctx.publisher.close();
        if first {
            info!(cycles = self.cycles(), "watcher closed");
        }
        first
    }

    #[must_use]
    pub fn state(&self) -> WatcherState {
        WatcherState::from_raw(self.ctx.state.load(Ordering::Acquire))
    }

    /// Completed cycles so far.
    #[must_use]
    pub fn cycles(&self) -> u64 {
        self.ctx.cycles.load(Ordering::Acquire)
    }

    #[must_use]
    pub fn courses(&self) -> &WatchList {
        self.ctx.runner.courses()
    }

    #[must_use]
    pub fn publisher(&self) -> &Publisher<AvailabilityVector> {
        &self.ctx.publisher
    }

    #[must_use]
    pub const fn config(&self) -> &WatcherConfig {
        &self.cfg
    }
}

impl Drop for Watcher {
    fn drop(&mut self) {
        self.close();
    }
}

fn timer_loop(
    ctx: &FireContext,
    period: Duration,
    initial_delay: Duration,
    stop_rx: &Receiver<()>,
) {
    let mut next_fire = Instant::now() + initial_delay;

    loop {
        let wait = next_fire.saturating_duration_since(Instant::now());
        let stopped = select! {
            recv(stop_rx) -> _ => true,
            default(wait) => false,
        };
        if stopped {
            break;
        }

        match ctx.fire() {
            Ok(_) => {}
            Err(WatchError::Closed) => break,
            Err(err) if err.is_fatal() => {
                ctx.fail(err);
                break;
            }
            Err(err) => warn!(error = %err, "refresh cycle failed; continuing"),
        }

        next_fire += period;
        let now = Instant::now();
        if next_fire < now {
            debug!(overrun = ?(now - next_fire), "cycle overran its period; delaying next fire");
            next_fire = now;
        }
    }
    debug!("timer stopped");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::course::{Course, CourseId, SeatCounts};
    use crate::fetch::{FetchOutcome, ScriptedFetcher};
    use crate::watch::subscription::Subscription;

    use std::sync::atomic::AtomicUsize;

    use crossbeam_channel::unbounded;

    struct Collect {
        items: Sender<Result<AvailabilityVector, WatchError>>,
    }

    impl Subscriber<AvailabilityVector> for Collect {
        fn on_subscribe(&mut self, subscription: Subscription) {
            subscription.request(i64::MAX);
        }

        fn on_next(&mut self, item: AvailabilityVector) {
            let _ = self.items.send(Ok(item));
        }

        fn on_error(&mut self, error: WatchError) {
            let _ = self.items.send(Err(error));
        }

        fn on_complete(&mut self) {}
    }

    fn one_course() -> (WatchList, Arc<ScriptedFetcher>) {
        let id = CourseId::new("CPSC", "221", "101");
        let fetcher = Arc::new(ScriptedFetcher::new());
        fetcher.always(&id, Ok(FetchOutcome::found(1, 1, 1, 0)));
        let list = WatchList::from_courses([Course::with_seats(id, SeatCounts::default())])
            .unwrap();
        (list, fetcher)
    }

    /// Fetcher whose first call sleeps; tracks overlap and timer fire times.
    struct SlowFirst {
        first_delay: Duration,
        calls: AtomicUsize,
        in_flight: AtomicUsize,
        max_in_flight: AtomicUsize,
        timer_starts: Mutex<Vec<Instant>>,
        first_started: Sender<()>,
    }

    impl SlowFirst {
        fn new(first_delay: Duration) -> (Arc<Self>, Receiver<()>) {
            let (first_started, rx) = unbounded();
            let fetcher = Self {
                first_delay,
                calls: AtomicUsize::new(0),
                in_flight: AtomicUsize::new(0),
                max_in_flight: AtomicUsize::new(0),
                timer_starts: Mutex::new(Vec::new()),
                first_started,
            };
            (Arc::new(fetcher), rx)
        }
    }

    impl CourseFetcher for SlowFirst {
        fn fetch(&self, _course: &CourseId) -> Result<FetchOutcome, crate::error::FetchError> {
            let active = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.max_in_flight.fetch_max(active, Ordering::SeqCst);
            if thread::current().name() == Some("seatwatch-timer") {
                self.timer_starts.lock().unwrap().push(Instant::now());
            }
            if self.calls.fetch_add(1, Ordering::SeqCst) == 0 {
                let _ = self.first_started.send(());
                thread::sleep(self.first_delay);
            }
            self.in_flight.fetch_sub(1, Ordering::SeqCst);
            Ok(FetchOutcome::found(1, 1, 1, 0))
        }
    }

    fn one_slow_course(first_delay: Duration) -> (WatchList, Arc<SlowFirst>, Receiver<()>) {
        let id = CourseId::new("CPSC", "221", "101");
        let list = WatchList::from_courses([Course::with_seats(id, SeatCounts::default())])
            .unwrap();
        let (fetcher, started) = SlowFirst::new(first_delay);
        (list, fetcher, started)
    }

    fn manual() -> WatcherConfig {
        WatcherConfig::with_period(Duration::from_secs(3600))
    }

    #[test]
    fn zero_period_is_rejected() {
        let (list, fetcher) = one_course();
        let cfg = WatcherConfig::with_period(Duration::ZERO);
        let err = Watcher::new(list, fetcher, cfg).unwrap_err();
        assert!(matches!(err, WatchError::InvalidPeriod { .. }));
    }

    #[test]
    fn lifecycle_states() {
        let (list, fetcher) = one_course();
        let watcher = Watcher::new(list, fetcher, manual()).unwrap();
        assert_eq!(watcher.state(), WatcherState::Idle);

        watcher.start().unwrap();
        watcher.start().unwrap();
        assert_eq!(watcher.state(), WatcherState::Running);

        assert!(watcher.close());
        assert!(!watcher.close());
        assert_eq!(watcher.state(), WatcherState::Closed);
        assert_eq!(watcher.start(), Err(WatchError::Closed));
    }

    #[test]
    fn poll_once_numbers_cycles() {
        let (list, fetcher) = one_course();
        let watcher = Watcher::new(list, fetcher, manual()).unwrap();

        assert_eq!(watcher.poll_once().unwrap().cycle(), 1);
        assert_eq!(watcher.poll_once().unwrap().cycle(), 2);
        assert_eq!(watcher.cycles(), 2);
    }

    #[test]
    fn poisoned_watch_list_closes_exceptionally() {
        let (list, fetcher) = one_course();
        let watcher = Watcher::new(list.clone(), fetcher, manual()).unwrap();
        let (tx, rx) = unbounded();
        watcher.subscribe(Collect { items: tx }).unwrap();

        let poisoner = list.clone();
        let _ = thread::spawn(move || {
            let _guard = poisoner.lock().unwrap();
            panic!("mutator crashed");
        })
        .join();

        assert_eq!(watcher.poll_once(), Err(WatchError::WatchListPoisoned));
        assert_eq!(watcher.state(), WatcherState::Closed);
        assert_eq!(
            rx.recv_timeout(Duration::from_secs(2)).unwrap(),
            Err(WatchError::WatchListPoisoned)
        );
        assert_eq!(watcher.poll_once(), Err(WatchError::Closed));
    }

    #[test]
    fn timer_fires_immediately_then_periodically() {
        let (list, fetcher) = one_course();
        let cfg = WatcherConfig::with_period(Duration::from_millis(20));
        let watcher = Watcher::new(list, fetcher, cfg).unwrap();
        let (tx, rx) = unbounded();
        watcher.subscribe(Collect { items: tx }).unwrap();
        watcher.start().unwrap();

        let cycles: Vec<u64> = (0..3)
            .map(|_| rx.recv_timeout(Duration::from_secs(2)).unwrap().unwrap().cycle())
            .collect();
        assert_eq!(cycles, vec![1, 2, 3]);
        watcher.close();
    }

    #[test]
    fn overrun_refires_once_then_keeps_period() {
        let period = Duration::from_millis(40);
        let (list, fetcher, started) = one_slow_course(period * 5);
        let cfg = WatcherConfig::with_period(period);
        let watcher = Watcher::new(list, fetcher.clone(), cfg).unwrap();
        let (tx, rx) = unbounded();
        watcher.subscribe(Collect { items: tx }).unwrap();
        watcher.start().unwrap();

        // A manual fire issued mid-cycle waits for the timed one.
        started.recv_timeout(Duration::from_secs(2)).unwrap();
        let polled = thread::scope(|s| s.spawn(|| watcher.poll_once()).join().unwrap());
        assert!(polled.is_ok());

        let cycles: Vec<u64> = (0..5)
            .map(|_| rx.recv_timeout(Duration::from_secs(2)).unwrap().unwrap().cycle())
            .collect();
        watcher.close();

        assert_eq!(cycles, vec![1, 2, 3, 4, 5]);
        assert_eq!(fetcher.max_in_flight.load(Ordering::SeqCst), 1);

        let starts = fetcher.timer_starts.lock().unwrap().clone();
        assert!(starts.len() >= 3);
        assert!(starts[1] - starts[0] >= period * 5);
        // No catch-up burst: after the immediate re-fire the period applies again.
        assert!(starts[2] - starts[1] >= period / 2);
    }

    #[test]
    fn close_waits_for_in_flight_poll() {
        let (list, fetcher, started) = one_slow_course(Duration::from_millis(150));
        let watcher = Watcher::new(list, fetcher.clone(), manual()).unwrap();

        thread::scope(|s| {
            let poll = s.spawn(|| watcher.poll_once());
            started.recv_timeout(Duration::from_secs(2)).unwrap();

            assert!(watcher.close());
            assert_eq!(fetcher.in_flight.load(Ordering::SeqCst), 0);
            assert_eq!(poll.join().unwrap().unwrap().cycle(), 1);
        });
        assert_eq!(watcher.poll_once(), Err(WatchError::Closed));
    }
}
