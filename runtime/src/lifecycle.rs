//! Worker lifecycle tracking.
//!
//! The [`LifecycleTracker`] is the single writer of the worker's operational
//! state: whether it is running, when it started, how long it has been up and
//! how many fatal exits it has recorded. It is owned by the consumer loop.
//! Any number of [`LifecycleObserver`]s can read a consistent-enough
//! [`LifecycleSnapshot`] concurrently; storage is a handful of atomics, so
//! readers never block the loop.
//!
//! # State Machine
//!
//! ```text
//! Starting ──► Running ──► Stopping ──► Stopped
//!    │            │
//!    └────────────┴──────► FatalError ──► Stopped
//! ```
//!
//! Uptime is non-decreasing while running and frozen at the value recorded on
//! the transition out of `Running`.

use crate::metrics::{WORKER_RESTARTS_TOTAL, WORKER_RUNNING, WORKER_UPTIME_SECONDS};
use chrono::{DateTime, Utc};
use notification_worker_core::environment::Clock;
use notification_worker_core::metrics::MetricsSink;
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicI64, AtomicU8, AtomicU64, Ordering};

/// Lifecycle state of the worker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum WorkerState {
    /// Establishing the broker subscription.
    Starting,
    /// Consuming and dispatching messages.
    Running,
    /// Shutdown requested; finishing the in-flight dispatch.
    Stopping,
    /// Exited, gracefully or after a fatal error.
    Stopped,
    /// A transport-level error ended consumption.
    FatalError,
}

impl WorkerState {
    const fn to_u8(self) -> u8 {
        match self {
            Self::Starting => 0,
            Self::Running => 1,
            Self::Stopping => 2,
            Self::Stopped => 3,
            Self::FatalError => 4,
        }
    }

    const fn from_u8(value: u8) -> Self {
        match value {
            1 => Self::Running,
            2 => Self::Stopping,
            3 => Self::Stopped,
            4 => Self::FatalError,
            _ => Self::Starting,
        }
    }

    /// Lowercase name, used in logs.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Starting => "starting",
            Self::Running => "running",
            Self::Stopping => "stopping",
            Self::Stopped => "stopped",
            Self::FatalError => "fatal_error",
        }
    }
}

impl fmt::Display for WorkerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Why the worker stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StopReason {
    /// An external shutdown signal was honored.
    Graceful,
    /// A transport error ended consumption; a supervisor restart is expected.
    Fatal,
}

const REASON_NONE: u8 = 0;
const REASON_GRACEFUL: u8 = 1;
const REASON_FATAL: u8 = 2;

/// Sentinel for "never started".
const NOT_STARTED: i64 = i64::MIN;

/// Point-in-time view of the lifecycle.
#[derive(Debug, Clone, PartialEq)]
pub struct LifecycleSnapshot {
    /// Current state
    pub state: WorkerState,
    /// `true` only in [`WorkerState::Running`]
    pub running: bool,
    /// When the worker entered `Running`, if it ever did
    pub started_at: Option<DateTime<Utc>>,
    /// Seconds since `started_at`; frozen once the worker leaves `Running`
    pub uptime_seconds: f64,
    /// Fatal exits recorded by this tracker
    pub restart_count: u64,
    /// Set once the worker has stopped
    pub stop_reason: Option<StopReason>,
}

struct Shared {
    state: AtomicU8,
    stop_reason: AtomicU8,
    started_at_ms: AtomicI64,
    uptime_ms: AtomicU64,
    restart_count: AtomicU64,
    clock: Arc<dyn Clock>,
}

impl Shared {
    fn state(&self) -> WorkerState {
        WorkerState::from_u8(self.state.load(Ordering::Acquire))
    }

    fn started_at(&self) -> Option<DateTime<Utc>> {
        match self.started_at_ms.load(Ordering::Acquire) {
            NOT_STARTED => None,
            millis => DateTime::<Utc>::from_timestamp_millis(millis),
        }
    }

    /// Elapsed milliseconds since start according to the clock, clamped to
    /// never fall below what was already recorded.
    fn live_uptime_ms(&self) -> u64 {
        let recorded = self.uptime_ms.load(Ordering::Acquire);
        let Some(started_at) = self.started_at() else {
            return recorded;
        };
        let elapsed = (self.clock.now() - started_at).num_milliseconds();
        u64::try_from(elapsed).unwrap_or(0).max(recorded)
    }

    #[allow(clippy::cast_precision_loss)] // Uptime in milliseconds fits comfortably in f64
    fn snapshot(&self) -> LifecycleSnapshot {
        let state = self.state();
        let running = state == WorkerState::Running;
        let uptime_ms = if running {
            self.live_uptime_ms()
        } else {
            self.uptime_ms.load(Ordering::Acquire)
        };
        let stop_reason = match self.stop_reason.load(Ordering::Acquire) {
            REASON_GRACEFUL => Some(StopReason::Graceful),
            REASON_FATAL => Some(StopReason::Fatal),
            _ => None,
        };

        LifecycleSnapshot {
            state,
            running,
            started_at: self.started_at(),
            uptime_seconds: uptime_ms as f64 / 1000.0,
            restart_count: self.restart_count.load(Ordering::Acquire),
            stop_reason,
        }
    }
}

/// Read-only handle onto a tracker's state.
#[derive(Clone)]
pub struct LifecycleObserver {
    shared: Arc<Shared>,
}

impl LifecycleObserver {
    /// Current lifecycle snapshot.
    #[must_use]
    pub fn snapshot(&self) -> LifecycleSnapshot {
        self.shared.snapshot()
    }

    /// Current state.
    #[must_use]
    pub fn state(&self) -> WorkerState {
        self.shared.state()
    }
}

impl fmt::Debug for LifecycleObserver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LifecycleObserver")
            .field("snapshot", &self.snapshot())
            .finish()
    }
}

/// Single-writer lifecycle bookkeeping.
///
/// Every transition is mirrored to the metrics sink:
/// `notification_worker_running`, `notification_worker_uptime_seconds` and
/// `notification_worker_restarts_total`.
pub struct LifecycleTracker {
    shared: Arc<Shared>,
    metrics: Arc<dyn MetricsSink>,
}

impl LifecycleTracker {
    /// Create a tracker in [`WorkerState::Starting`].
    #[must_use]
    pub fn new(clock: Arc<dyn Clock>, metrics: Arc<dyn MetricsSink>) -> Self {
        Self {
            shared: Arc::new(Shared {
                state: AtomicU8::new(WorkerState::Starting.to_u8()),
                stop_reason: AtomicU8::new(REASON_NONE),
                started_at_ms: AtomicI64::new(NOT_STARTED),
                uptime_ms: AtomicU64::new(0),
                restart_count: AtomicU64::new(0),
                clock,
            }),
            metrics,
        }
    }

    /// A reader for this tracker.
    #[must_use]
    pub fn observer(&self) -> LifecycleObserver {
        LifecycleObserver {
            shared: Arc::clone(&self.shared),
        }
    }

    /// Current lifecycle snapshot.
    #[must_use]
    pub fn snapshot(&self) -> LifecycleSnapshot {
        self.shared.snapshot()
    }

    /// Current state.
    #[must_use]
    pub fn state(&self) -> WorkerState {
        self.shared.state()
    }

    /// Enter `Running`: the subscription is established.
    ///
    /// Sets `started_at` once; calling `start` again has no effect.
    pub fn start(&self) {
        if self.shared.state() != WorkerState::Starting {
            return;
        }
        let now = self.shared.clock.now();
        self.shared
            .started_at_ms
            .store(now.timestamp_millis(), Ordering::Release);
        self.shared.uptime_ms.store(0, Ordering::Release);
        self.set_state(WorkerState::Running);

        self.metrics.set_gauge(WORKER_RUNNING, &[], 1.0);
        self.metrics.set_gauge(WORKER_UPTIME_SECONDS, &[], 0.0);
        tracing::info!(started_at = %now, "Worker running");
    }

    /// Refresh uptime. Called once per loop iteration.
    ///
    /// Returns the current uptime in seconds. Outside `Running` this is the
    /// frozen value and nothing is recorded.
    pub fn record_tick(&self) -> f64 {
        if self.shared.state() == WorkerState::Running {
            self.freeze_uptime();
            let uptime = self.snapshot().uptime_seconds;
            self.metrics.set_gauge(WORKER_UPTIME_SECONDS, &[], uptime);
            uptime
        } else {
            self.snapshot().uptime_seconds
        }
    }

    /// Enter `Stopping` on an external shutdown signal.
    ///
    /// Uptime is frozen and `running` becomes false.
    pub fn begin_shutdown(&self) {
        match self.shared.state() {
            WorkerState::Running => self.freeze_uptime(),
            WorkerState::Starting => {}
            WorkerState::Stopping | WorkerState::Stopped | WorkerState::FatalError => return,
        }
        self.set_state(WorkerState::Stopping);
        self.metrics.set_gauge(WORKER_RUNNING, &[], 0.0);
        tracing::info!("Worker stopping");
    }

    /// Enter `Stopped` after a graceful shutdown, or after [`record_fatal`](Self::record_fatal).
    ///
    /// The stop reason of a fatal exit is preserved.
    pub fn record_shutdown(&self) {
        let previous = self.shared.state();
        match previous {
            WorkerState::Stopped => return,
            WorkerState::Running => self.freeze_uptime(),
            WorkerState::Starting | WorkerState::Stopping | WorkerState::FatalError => {}
        }
        if previous != WorkerState::FatalError {
            self.shared
                .stop_reason
                .store(REASON_GRACEFUL, Ordering::Release);
        }
        self.set_state(WorkerState::Stopped);
        self.metrics.set_gauge(WORKER_RUNNING, &[], 0.0);
        self.metrics
            .set_gauge(WORKER_UPTIME_SECONDS, &[], self.snapshot().uptime_seconds);
        tracing::info!(
            uptime_seconds = self.snapshot().uptime_seconds,
            "Worker stopped"
        );
    }

    /// Enter `FatalError`: consumption ended because of a transport error.
    ///
    /// Increments the restart counter exactly once per call; an external
    /// supervisor is expected to restart the process.
    pub fn record_fatal(&self) {
        if self.shared.state() == WorkerState::Running {
            self.freeze_uptime();
        }
        self.set_state(WorkerState::FatalError);
        self.shared
            .stop_reason
            .store(REASON_FATAL, Ordering::Release);
        let restarts = self.shared.restart_count.fetch_add(1, Ordering::AcqRel) + 1;

        self.metrics.set_gauge(WORKER_RUNNING, &[], 0.0);
        self.metrics.increment_counter(WORKER_RESTARTS_TOTAL, &[]);
        tracing::error!(restart_count = restarts, "Worker entered fatal state");
    }

    fn set_state(&self, state: WorkerState) {
        self.shared.state.store(state.to_u8(), Ordering::Release);
    }

    fn freeze_uptime(&self) {
        let uptime = self.shared.live_uptime_ms();
        self.shared.uptime_ms.fetch_max(uptime, Ordering::AcqRel);
    }
}

impl fmt::Debug for LifecycleTracker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LifecycleTracker")
            .field("snapshot", &self.snapshot())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::float_cmp)]
mod tests {
    use super::*;
    use notification_worker_testing::{ManualClock, RecordingMetricsSink, test_clock};
    use proptest::prelude::*;

    fn tracker() -> (LifecycleTracker, Arc<ManualClock>, Arc<RecordingMetricsSink>) {
        let clock = Arc::new(ManualClock::new(test_clock().now()));
        let sink = Arc::new(RecordingMetricsSink::new());
        let tracker = LifecycleTracker::new(clock.clone(), sink.clone());
        (tracker, clock, sink)
    }

    #[test]
    fn new_tracker_is_starting_and_not_running() {
        let (tracker, _, _) = tracker();
        let snapshot = tracker.snapshot();
        assert_eq!(snapshot.state, WorkerState::Starting);
        assert!(!snapshot.running);
        assert!(snapshot.started_at.is_none());
        assert_eq!(snapshot.uptime_seconds, 0.0);
        assert_eq!(snapshot.restart_count, 0);
        assert!(snapshot.stop_reason.is_none());
    }

    #[test]
    fn start_sets_running_and_started_at() {
        let (tracker, clock, sink) = tracker();
        tracker.start();

        let snapshot = tracker.snapshot();
        assert!(snapshot.running);
        assert_eq!(snapshot.started_at, Some(clock.now()));
        assert_eq!(sink.gauge(WORKER_RUNNING, &[]), Some(1.0));
    }

    #[test]
    fn ticks_track_uptime_while_running() {
        let (tracker, clock, sink) = tracker();
        tracker.start();

        clock.advance(chrono::Duration::seconds(3));
        assert_eq!(tracker.record_tick(), 3.0);
        clock.advance(chrono::Duration::milliseconds(500));
        assert_eq!(tracker.record_tick(), 3.5);
        assert_eq!(sink.gauge(WORKER_UPTIME_SECONDS, &[]), Some(3.5));
    }

    #[test]
    fn uptime_never_goes_backwards_when_clock_does() {
        let (tracker, clock, _) = tracker();
        tracker.start();
        let start = clock.now();

        clock.advance(chrono::Duration::seconds(10));
        tracker.record_tick();
        clock.set(start + chrono::Duration::seconds(4));

        assert_eq!(tracker.record_tick(), 10.0);
        assert_eq!(tracker.snapshot().uptime_seconds, 10.0);
    }

    #[test]
    fn graceful_shutdown_freezes_uptime() {
        let (tracker, clock, sink) = tracker();
        tracker.start();
        clock.advance(chrono::Duration::seconds(2));

        tracker.begin_shutdown();
        assert_eq!(tracker.state(), WorkerState::Stopping);
        assert!(!tracker.snapshot().running);

        clock.advance(chrono::Duration::seconds(60));
        tracker.record_shutdown();

        let snapshot = tracker.snapshot();
        assert_eq!(snapshot.state, WorkerState::Stopped);
        assert_eq!(snapshot.uptime_seconds, 2.0);
        assert_eq!(snapshot.stop_reason, Some(StopReason::Graceful));
        assert_eq!(snapshot.restart_count, 0);
        assert_eq!(sink.gauge(WORKER_RUNNING, &[]), Some(0.0));
        assert_eq!(sink.counter(WORKER_RESTARTS_TOTAL, &[]), 0);
    }

    #[test]
    fn fatal_increments_restart_count_once() {
        let (tracker, clock, sink) = tracker();
        let observer = tracker.observer();
        tracker.start();
        clock.advance(chrono::Duration::seconds(7));

        tracker.record_fatal();
        assert_eq!(observer.state(), WorkerState::FatalError);
        tracker.record_shutdown();

        let snapshot = observer.snapshot();
        assert_eq!(snapshot.state, WorkerState::Stopped);
        assert!(!snapshot.running);
        assert_eq!(snapshot.restart_count, 1);
        assert_eq!(snapshot.uptime_seconds, 7.0);
        assert_eq!(snapshot.stop_reason, Some(StopReason::Fatal));
        assert_eq!(sink.counter(WORKER_RESTARTS_TOTAL, &[]), 1);
    }

    #[test]
    fn fatal_during_starting_never_runs() {
        let (tracker, _, _) = tracker();
        tracker.record_fatal();
        tracker.record_shutdown();

        let snapshot = tracker.snapshot();
        assert!(snapshot.started_at.is_none());
        assert_eq!(snapshot.uptime_seconds, 0.0);
        assert_eq!(snapshot.restart_count, 1);
    }

    #[test]
    fn observer_sees_live_uptime() {
        let (tracker, clock, _) = tracker();
        let observer = tracker.observer();
        tracker.start();

        clock.advance(chrono::Duration::seconds(1));
        assert_eq!(observer.snapshot().uptime_seconds, 1.0);
    }

    proptest! {
        #[test]
        fn uptime_is_monotonic_then_frozen(
            steps in prop::collection::vec(-5_000i64..20_000, 1..40),
            after_stop in 0i64..100_000,
        ) {
            let (tracker, clock, _) = tracker();
            tracker.start();

            let mut last = 0.0;
            for step in steps {
                clock.advance(chrono::Duration::milliseconds(step));
                let uptime = tracker.record_tick();
                prop_assert!(uptime >= last);
                last = uptime;
            }

            tracker.begin_shutdown();
            let frozen = tracker.snapshot().uptime_seconds;
            prop_assert!(frozen >= last);

            clock.advance(chrono::Duration::milliseconds(after_stop));
            tracker.record_tick();
            tracker.record_shutdown();
            prop_assert_eq!(tracker.snapshot().uptime_seconds, frozen);
        }
    }
}
