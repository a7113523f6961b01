//! # Notification Worker Runtime
//!
//! Dispatch machinery for the notification worker.
//!
//! This crate turns a stream of broker messages into handler invocations
//! without ever letting one bad message stop the stream.
//!
//! ## Core Components
//!
//! - **Handler Registry**: immutable topic → handler mapping, validated at startup
//! - **Dispatcher**: invokes the handler for each envelope inside a failure boundary
//! - **Lifecycle Tracker**: running flag, start time, uptime, restart count
//! - **Consumer Loop**: subscribes, pulls one message at a time, dispatches
//! - **Metrics**: Prometheus-backed metrics sink and exporter
//!
//! ## Example
//!
//! ```ignore
//! use notification_worker_runtime::{ConsumerLoop, ConsumerSettings, Dispatcher, HandlerRegistry};
//!
//! let registry = HandlerRegistry::new(registrations)?;
//! let dispatcher = Dispatcher::new(Arc::new(registry), Arc::new(PrometheusSink));
//! let consumer = ConsumerLoop::new(
//!     ConsumerSettings::new("notification-worker", topics, "notification-worker-group"),
//!     event_bus,
//!     dispatcher,
//!     Arc::new(SystemClock),
//!     shutdown_rx,
//! );
//!
//! match consumer.run().await {
//!     Ok(report) => println!("stopped after {} messages", report.dispatched),
//!     Err(e) => eprintln!("fatal: {e}"),
//! }
//! ```

/// Consumer loop driving the dispatcher from a broker subscription
pub mod consumer;

/// Fault-isolated dispatch of envelopes to handlers
pub mod dispatcher;

/// Handler and registry error types
pub mod error;

/// Worker lifecycle state and bookkeeping
pub mod lifecycle;

/// Prometheus metrics for observability
pub mod metrics;

/// Topic → handler registry
pub mod registry;

// Re-export commonly used types
pub use consumer::{ConsumerError, ConsumerLoop, ConsumerSettings, RunReport};
pub use dispatcher::{Dispatcher, Outcome};
pub use error::{ErrorKind, HandlerError, RegistryError};
pub use lifecycle::{
    LifecycleObserver, LifecycleSnapshot, LifecycleTracker, StopReason, WorkerState,
};
pub use metrics::{MetricsError, MetricsServer, PrometheusSink};
pub use registry::{Handler, HandlerRegistry, Registration};
