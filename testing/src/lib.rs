//! # Notification Worker Testing
//!
//! Testing utilities for the notification worker.
//!
//! This crate provides:
//! - Deterministic clocks ([`FixedClock`], [`ManualClock`])
//! - [`InMemoryEventBus`]: an [`EventBus`](notification_worker_core::EventBus)
//!   that can inject malformed payloads, transport errors and disconnections
//! - [`RecordingMetricsSink`]: a metrics sink that keeps every sample for assertions
//! - Message builders and proptest strategies
//!
//! ## Example
//!
//! ```ignore
//! use notification_worker_testing::{InMemoryEventBus, RecordingMetricsSink, test_clock};
//!
//! #[tokio::test]
//! async fn order_created_is_processed() {
//!     let bus = Arc::new(InMemoryEventBus::new());
//!     let metrics = Arc::new(RecordingMetricsSink::new());
//!
//!     bus.inject(helpers::json_message("order.created", json!({"order_id": 1})));
//!     bus.close();
//!
//!     // ... run the consumer loop against `bus` ...
//!
//!     assert_eq!(
//!         metrics.counter(MESSAGES_PROCESSED_TOTAL, &[("topic", "order.created"), ("event_type", "order.created")]),
//!         1
//!     );
//! }
//! ```

use chrono::{DateTime, Utc};
use notification_worker_core::environment::Clock;

pub mod event_bus;
pub mod metrics;

/// Mock implementations of Environment traits.
pub mod mocks {
    use super::{Clock, DateTime, Utc};
    use std::sync::{Mutex, PoisonError};

    /// Fixed clock for deterministic tests
    ///
    /// Always returns the same time, making tests reproducible.
    ///
    /// # Example
    ///
    /// ```
    /// use notification_worker_testing::mocks::FixedClock;
    /// use notification_worker_core::environment::Clock;
    /// use chrono::Utc;
    ///
    /// let clock = FixedClock::new(Utc::now());
    /// let time1 = clock.now();
    /// let time2 = clock.now();
    /// assert_eq!(time1, time2); // Always the same!
    /// ```
    #[derive(Debug, Clone)]
    pub struct FixedClock {
        time: DateTime<Utc>,
    }

    impl FixedClock {
        /// Create a new fixed clock with the given time
        #[must_use]
        pub const fn new(time: DateTime<Utc>) -> Self {
            Self { time }
        }
    }

    impl Clock for FixedClock {
        fn now(&self) -> DateTime<Utc> {
            self.time
        }
    }

    /// Clock that only moves when told to.
    ///
    /// Used to drive uptime calculations step by step. [`ManualClock::set`]
    /// can also move time backwards, which is how wall-clock corrections are
    /// simulated.
    ///
    /// # Example
    ///
    /// ```
    /// use notification_worker_testing::mocks::ManualClock;
    /// use notification_worker_testing::test_clock;
    /// use notification_worker_core::environment::Clock;
    ///
    /// let clock = ManualClock::new(test_clock().now());
    /// let start = clock.now();
    /// clock.advance(chrono::Duration::seconds(5));
    /// assert_eq!((clock.now() - start).num_seconds(), 5);
    /// ```
    #[derive(Debug)]
    pub struct ManualClock {
        time: Mutex<DateTime<Utc>>,
    }

    impl ManualClock {
        /// Create a clock reading `time`.
        #[must_use]
        pub const fn new(time: DateTime<Utc>) -> Self {
            Self {
                time: Mutex::new(time),
            }
        }

        /// Move the clock forward by `delta`.
        pub fn advance(&self, delta: chrono::Duration) {
            let mut time = self.time.lock().unwrap_or_else(PoisonError::into_inner);
            *time += delta;
        }

        /// Jump to an arbitrary instant, possibly in the past.
        pub fn set(&self, time: DateTime<Utc>) {
            *self.time.lock().unwrap_or_else(PoisonError::into_inner) = time;
        }
    }

    impl Clock for ManualClock {
        fn now(&self) -> DateTime<Utc> {
            *self.time.lock().unwrap_or_else(PoisonError::into_inner)
        }
    }

    /// Create a default fixed clock for tests (2025-01-01 00:00:00 UTC)
    #[must_use]
    pub fn test_clock() -> FixedClock {
        FixedClock::new(DateTime::<Utc>::from_timestamp(1_735_689_600, 0).unwrap_or_default())
    }
}

/// Test helpers and utilities.
pub mod helpers {
    use notification_worker_core::envelope::{BrokerMessage, Payload};
    use serde_json::Value;

    /// Build a broker message whose payload is `value` serialized as JSON.
    #[must_use]
    pub fn json_message(topic: &str, value: &Value) -> BrokerMessage {
        BrokerMessage::new(topic, value.to_string().into_bytes())
    }

    /// Build a broker message carrying raw, possibly malformed, bytes.
    #[must_use]
    pub fn raw_message(topic: &str, bytes: &[u8]) -> BrokerMessage {
        BrokerMessage::new(topic, bytes.to_vec())
    }

    /// Convert a `json!({...})` object literal into a [`Payload`].
    ///
    /// Non-object values yield an empty payload.
    #[must_use]
    pub fn payload(value: Value) -> Payload {
        match value {
            Value::Object(map) => map,
            _ => Payload::new(),
        }
    }

    /// Install a test-friendly tracing subscriber once per process.
    ///
    /// Honors `RUST_LOG`; output goes through the test harness writer so it
    /// only shows for failing tests.
    pub fn init_tracing() {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .with_test_writer()
            .try_init();
    }
}

/// Property-based testing utilities using proptest.
pub mod properties {
    use proptest::prelude::*;

    /// Dotted lowercase topic names such as `order.created`.
    pub fn topic_name() -> impl Strategy<Value = String> {
        "[a-z]{1,8}(\\.[a-z_]{1,12}){0,2}"
    }

    /// A set of distinct topic names.
    pub fn distinct_topics(max: usize) -> impl Strategy<Value = Vec<String>> {
        prop::collection::btree_set(topic_name(), 1..=max)
            .prop_map(|topics| topics.into_iter().collect())
    }
}

// Re-export commonly used items
pub use event_bus::InMemoryEventBus;
pub use metrics::{RecordedSample, RecordingMetricsSink, SampleKind};
pub use mocks::{FixedClock, ManualClock, test_clock};
