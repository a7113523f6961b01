//! The consumer loop.
//!
//! `ConsumerLoop` subscribes to a fixed set of topics under a consumer group,
//! then pulls one message at a time and hands it to the [`Dispatcher`]. It is
//! strictly sequential: a message is fully dispatched (success or contained
//! failure) before the next one is awaited, so per-partition broker order is
//! preserved.
//!
//! # States
//!
//! ```text
//! Starting ──subscribe ok──► Running ──shutdown──► Stopping ──► Stopped
//!    │                          │
//!    │ subscribe failed         │ transport error / stream ended
//!    ▼                          ▼
//! FatalError ──────────────► Stopped   (run returns Err, restart count +1)
//! ```
//!
//! Per-message failures never leave `Running`. Only errors from the
//! subscription itself are fatal; the process is expected to exit non-zero
//! and be restarted by its supervisor. The loop never reconnects on its own.
//!
//! # Shutdown
//!
//! The wait for the next message races the shutdown signal. Dispatch runs
//! outside that race, so a signal arriving mid-dispatch takes effect only
//! after the in-flight message completes.

use crate::dispatcher::Dispatcher;
use crate::lifecycle::{LifecycleObserver, LifecycleSnapshot, LifecycleTracker};
use futures::StreamExt;
use notification_worker_core::environment::Clock;
use notification_worker_core::event_bus::{EventBus, EventBusError};
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::broadcast;
use tracing::{debug, error, info};

/// Fatal errors that end the consumer loop.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConsumerError {
    /// The subscription could not be established.
    #[error("Failed to subscribe: {0}")]
    Subscribe(#[source] EventBusError),

    /// The subscription failed while consuming.
    #[error("Transport failure while consuming: {0}")]
    Transport(#[source] EventBusError),

    /// The message stream ended without a shutdown request.
    #[error("Message stream closed unexpectedly")]
    StreamClosed,
}

/// Summary of a loop that stopped gracefully.
#[derive(Debug, Clone, PartialEq)]
pub struct RunReport {
    /// Messages pulled and dispatched, whatever their outcome
    pub dispatched: u64,
    /// Lifecycle state after stopping
    pub lifecycle: LifecycleSnapshot,
}

/// What the loop consumes and as whom.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConsumerSettings {
    /// Consumer name, used in logs
    pub name: String,
    /// Topics to subscribe to
    pub topics: Vec<String>,
    /// Consumer group to join
    pub group_id: String,
}

impl ConsumerSettings {
    /// Create settings.
    #[must_use]
    pub fn new(
        name: impl Into<String>,
        topics: impl IntoIterator<Item = impl Into<String>>,
        group_id: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            topics: topics.into_iter().map(Into::into).collect(),
            group_id: group_id.into(),
        }
    }
}

/// Subscribes to the broker and drives the dispatcher.
///
/// Owns the subscription and the [`LifecycleTracker`]; nothing else mutates
/// either. Use [`observer`](Self::observer) before [`run`](Self::run) to read
/// the lifecycle from elsewhere.
pub struct ConsumerLoop {
    settings: ConsumerSettings,
    event_bus: Arc<dyn EventBus>,
    dispatcher: Dispatcher,
    clock: Arc<dyn Clock>,
    tracker: LifecycleTracker,
    shutdown: broadcast::Receiver<()>,
}

impl ConsumerLoop {
    /// Create a loop in the `Starting` state.
    ///
    /// Lifecycle metrics go to the same sink as the dispatcher's.
    #[must_use]
    pub fn new(
        settings: ConsumerSettings,
        event_bus: Arc<dyn EventBus>,
        dispatcher: Dispatcher,
        clock: Arc<dyn Clock>,
        shutdown: broadcast::Receiver<()>,
    ) -> Self {
        let tracker = LifecycleTracker::new(Arc::clone(&clock), dispatcher.metrics());
        Self {
            settings,
            event_bus,
            dispatcher,
            clock,
            tracker,
            shutdown,
        }
    }

    /// A read-only view of this loop's lifecycle.
    #[must_use]
    pub fn observer(&self) -> LifecycleObserver {
        self.tracker.observer()
    }

    /// Run the loop as a background task.
    #[must_use]
    pub fn spawn(self) -> tokio::task::JoinHandle<Result<RunReport, ConsumerError>> {
        tokio::spawn(self.run())
    }

    /// Subscribe, then consume until shutdown or a fatal error.
    ///
    /// # Errors
    ///
    /// - [`ConsumerError::Subscribe`] if the subscription fails in `Starting`
    /// - [`ConsumerError::Transport`] if the stream yields a transport error
    /// - [`ConsumerError::StreamClosed`] if the stream ends on its own
    ///
    /// Each of these records a fatal transition (restart count +1) first.
    pub async fn run(self) -> Result<RunReport, ConsumerError> {
        let Self {
            settings,
            event_bus,
            dispatcher,
            clock,
            tracker,
            mut shutdown,
        } = self;
        let name = settings.name.as_str();
        let topics: Vec<&str> = settings.topics.iter().map(String::as_str).collect();

        info!(
            consumer = name,
            topics = ?topics,
            group_id = %settings.group_id,
            "Consumer loop starting"
        );

        // A closed shutdown channel counts as a shutdown request.
        let subscribed = tokio::select! {
            biased;
            _ = shutdown.recv() => None,
            result = event_bus.subscribe(&topics, &settings.group_id) => Some(result),
        };

        let mut stream = match subscribed {
            None => {
                info!(consumer = name, "Shutdown requested before subscription completed");
                tracker.begin_shutdown();
                tracker.record_shutdown();
                return Ok(RunReport {
                    dispatched: 0,
                    lifecycle: tracker.snapshot(),
                });
            }
            Some(Err(e)) => {
                error!(consumer = name, error = %e, "Failed to subscribe to event bus");
                tracker.record_fatal();
                tracker.record_shutdown();
                return Err(ConsumerError::Subscribe(e));
            }
            Some(Ok(stream)) => stream,
        };

        info!(consumer = name, topics = ?topics, "Subscribed to event bus");
        tracker.start();

        let mut dispatched: u64 = 0;
        let failure = loop {
            let next = tokio::select! {
                biased;
                _ = shutdown.recv() => None,
                item = stream.next() => Some(item),
            };

            match next {
                None => break None,
                Some(Some(Ok(message))) => {
                    let outcome = dispatcher.dispatch_message(&message, clock.now());
                    dispatched += 1;
                    tracker.record_tick();
                    debug!(
                        consumer = name,
                        topic = %message.topic,
                        offset = message.offset,
                        outcome = ?outcome,
                        "Message dispatched"
                    );
                }
                Some(Some(Err(e))) => break Some(ConsumerError::Transport(e)),
                Some(None) => break Some(ConsumerError::StreamClosed),
            }
        };

        match failure {
            None => {
                info!(consumer = name, dispatched, "Consumer loop received shutdown signal");
                tracker.begin_shutdown();
                tracker.record_shutdown();
                Ok(RunReport {
                    dispatched,
                    lifecycle: tracker.snapshot(),
                })
            }
            Some(err) => {
                error!(consumer = name, error = %err, dispatched, "Consumer loop failed");
                tracker.record_fatal();
                tracker.record_shutdown();
                Err(err)
            }
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::lifecycle::{StopReason, WorkerState};
    use crate::registry::HandlerRegistry;
    use notification_worker_testing::{InMemoryEventBus, RecordingMetricsSink, test_clock};

    fn consumer(
        bus: Arc<InMemoryEventBus>,
        shutdown: broadcast::Receiver<()>,
    ) -> (ConsumerLoop, Arc<RecordingMetricsSink>) {
        let sink = Arc::new(RecordingMetricsSink::new());
        let dispatcher = Dispatcher::new(Arc::new(HandlerRegistry::default()), sink.clone());
        let settings = ConsumerSettings::new("test", ["stock.low"], "test-group");
        let consumer = ConsumerLoop::new(
            settings,
            bus,
            dispatcher,
            Arc::new(test_clock()),
            shutdown,
        );
        (consumer, sink)
    }

    #[tokio::test]
    async fn shutdown_before_subscription_never_runs() {
        let bus = Arc::new(InMemoryEventBus::new());
        let (tx, rx) = broadcast::channel(1);
        let (consumer, _) = consumer(bus, rx);
        tx.send(()).unwrap();

        let report = consumer.run().await.unwrap();

        assert_eq!(report.dispatched, 0);
        assert_eq!(report.lifecycle.state, WorkerState::Stopped);
        assert!(report.lifecycle.started_at.is_none());
        assert_eq!(report.lifecycle.restart_count, 0);
    }

    #[tokio::test]
    async fn subscription_failure_is_fatal() {
        let bus = Arc::new(InMemoryEventBus::new());
        bus.fail_subscriptions("broker unreachable");
        let (_tx, rx) = broadcast::channel(1);
        let (consumer, _) = consumer(bus, rx);
        let observer = consumer.observer();

        let err = consumer.run().await.unwrap_err();

        assert!(matches!(err, ConsumerError::Subscribe(_)));
        let snapshot = observer.snapshot();
        assert_eq!(snapshot.restart_count, 1);
        assert!(snapshot.started_at.is_none());
        assert_eq!(snapshot.stop_reason, Some(StopReason::Fatal));
    }

    #[tokio::test]
    async fn stream_end_is_fatal() {
        let bus = Arc::new(InMemoryEventBus::new());
        bus.close();
        let (_tx, rx) = broadcast::channel(1);
        let (consumer, _) = consumer(bus, rx);

        let err = consumer.run().await.unwrap_err();

        assert_eq!(err, ConsumerError::StreamClosed);
    }

    #[tokio::test]
    async fn dropped_shutdown_sender_stops_the_loop() {
        let bus = Arc::new(InMemoryEventBus::new());
        let (tx, rx) = broadcast::channel::<()>(1);
        let (consumer, _) = consumer(bus.clone(), rx);
        drop(tx);

        let report = consumer.run().await.unwrap();

        assert_eq!(report.lifecycle.stop_reason, Some(StopReason::Graceful));
        assert_eq!(bus.subscribe_calls(), 0);
    }
}
