//! # Notification Worker Core
//!
//! Core types shared by every crate in the notification worker.
//!
//! This crate provides the vocabulary the rest of the workspace speaks:
//!
//! - [`envelope`]: the unit of data flowing through the worker ([`EventEnvelope`])
//!   and the raw [`BrokerMessage`] it is decoded from
//! - [`event_bus`]: the [`EventBus`] trait for subscribing to and publishing on
//!   named topics, plus its error type
//! - [`metrics`]: the [`MetricsSink`] interface dispatch outcomes are reported to
//! - [`environment`]: injected dependencies (currently the [`Clock`](environment::Clock))
//!
//! ## Data Flow
//!
//! ```text
//! ┌──────────────┐   BrokerMessage   ┌──────────────┐   EventEnvelope   ┌──────────┐
//! │  Event Bus   │ ────────────────► │    decode    │ ────────────────► │ Handler  │
//! │ (subscribe)  │   raw JSON bytes  │ (topic, map) │   typed access    │          │
//! └──────────────┘                   └──────────────┘                   └──────────┘
//! ```
//!
//! Nothing in this crate performs I/O. Broker implementations live in
//! `notification-worker-redpanda`, the dispatch machinery in
//! `notification-worker-runtime`.

pub mod envelope;
pub mod event_bus;
pub mod metrics;

// Re-export commonly used types
pub use chrono::{DateTime, Utc};
pub use envelope::{BrokerMessage, EnvelopeError, EventEnvelope, Payload};
pub use event_bus::{EventBus, EventBusError, MessageStream};
pub use metrics::{MetricsSink, NoopMetricsSink};

/// Environment module - Dependency injection traits
///
/// All time-dependent behavior in the worker (envelope receive timestamps,
/// lifecycle start time and uptime) reads the clock through this trait so that
/// tests can substitute deterministic implementations.
pub mod environment {
    use chrono::{DateTime, Utc};

    /// Clock trait - abstracts time operations for testability
    ///
    /// # Examples
    ///
    /// ```
    /// use notification_worker_core::environment::{Clock, SystemClock};
    ///
    /// let clock = SystemClock;
    /// let earlier = clock.now();
    /// assert!(clock.now() >= earlier);
    /// ```
    pub trait Clock: Send + Sync {
        /// Get the current time
        fn now(&self) -> DateTime<Utc>;
    }

    /// Production clock backed by the system wall clock.
    #[derive(Debug, Clone, Copy, Default)]
    pub struct SystemClock;

    impl Clock for SystemClock {
        fn now(&self) -> DateTime<Utc> {
            Utc::now()
        }
    }
}
