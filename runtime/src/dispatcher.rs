//! Fault-isolated dispatcher.
//!
//! The dispatcher routes each envelope to the handler registered for its
//! topic and converts every handler-originated failure into an [`Outcome`].
//! Nothing a handler does, including panicking, can propagate past
//! [`Dispatcher::dispatch`]; the consumer loop always gets an outcome back and
//! moves on to the next message.
//!
//! # Outcome Recording
//!
//! | Outcome | Log level | Metrics |
//! |---------|-----------|---------|
//! | `Processed` | debug | processed counter, duration histogram |
//! | `NoHandler` | warn | failed counter with `error_type=no_handler` |
//! | `HandlerFailed(kind)` | error | failed counter with `error_type=kind`, error-kind counters |
//!
//! Durations cover the handler invocation only, never the broker wait.

use crate::error::{ErrorKind, HandlerError};
use crate::metrics::{
    CONSUMER_LAG_SECONDS, DESERIALIZATION_ERRORS_TOTAL, HANDLER_ERRORS_TOTAL,
    MESSAGES_CONSUMED_TOTAL, MESSAGES_FAILED_TOTAL, MESSAGES_PROCESSED_TOTAL, NO_HANDLER,
    PROCESSING_DURATION_SECONDS, PROCESSING_ERRORS_TOTAL,
};
use crate::registry::HandlerRegistry;
use chrono::{DateTime, Utc};
use notification_worker_core::envelope::{BrokerMessage, EventEnvelope};
use notification_worker_core::metrics::MetricsSink;
use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, error, warn};

/// Result of dispatching one envelope.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// The registered handler completed successfully.
    Processed {
        /// Handler invocation time
        duration: Duration,
    },
    /// No handler is registered for the envelope's topic.
    NoHandler,
    /// The handler failed (or the payload could not be decoded); the failure was contained.
    HandlerFailed(ErrorKind),
}

impl Outcome {
    /// Whether the envelope was processed successfully.
    #[must_use]
    pub const fn is_processed(&self) -> bool {
        matches!(self, Self::Processed { .. })
    }
}

/// Routes envelopes to handlers inside a failure boundary.
#[derive(Clone)]
pub struct Dispatcher {
    registry: Arc<HandlerRegistry>,
    metrics: Arc<dyn MetricsSink>,
}

impl Dispatcher {
    /// Create a dispatcher over an immutable registry.
    #[must_use]
    pub fn new(registry: Arc<HandlerRegistry>, metrics: Arc<dyn MetricsSink>) -> Self {
        Self { registry, metrics }
    }

    /// The registry this dispatcher routes through.
    #[must_use]
    pub fn registry(&self) -> &HandlerRegistry {
        &self.registry
    }

    /// The sink outcomes are recorded to.
    #[must_use]
    pub fn metrics(&self) -> Arc<dyn MetricsSink> {
        Arc::clone(&self.metrics)
    }

    /// Decode a raw broker message and dispatch it.
    ///
    /// Counts the message as consumed, then decodes it. A payload that cannot
    /// be decoded never reaches the registry and is reported as
    /// `HandlerFailed(Deserialization)` for the message's topic.
    pub fn dispatch_message(&self, message: &BrokerMessage, received_at: DateTime<Utc>) -> Outcome {
        let topic = message.topic.as_str();
        self.metrics
            .increment_counter(MESSAGES_CONSUMED_TOTAL, &[("topic", topic)]);

        match EventEnvelope::decode(message, received_at) {
            Ok(envelope) => {
                if let Some(lag) = envelope.lag_seconds() {
                    self.metrics
                        .set_gauge(CONSUMER_LAG_SECONDS, &[("topic", topic)], lag);
                }
                self.dispatch(&envelope)
            }
            Err(e) => {
                let err = HandlerError::from(e);
                error!(
                    topic,
                    partition = message.partition,
                    offset = message.offset,
                    error = %err,
                    error_type = err.kind().as_str(),
                    "Failed to decode event payload"
                );
                self.record_failure(topic, err.kind());
                Outcome::HandlerFailed(err.kind())
            }
        }
    }

    /// Dispatch a decoded envelope to its handler.
    ///
    /// Never fails and never panics: handler errors and panics are caught,
    /// classified and returned as [`Outcome::HandlerFailed`].
    pub fn dispatch(&self, envelope: &EventEnvelope) -> Outcome {
        let topic = envelope.topic();

        let Some(handler) = self.registry.lookup(topic) else {
            warn!(
                topic,
                partition = envelope.partition(),
                offset = envelope.offset(),
                "No handler found for topic"
            );
            self.metrics.increment_counter(
                MESSAGES_FAILED_TOTAL,
                &[("topic", topic), ("error_type", NO_HANDLER)],
            );
            return Outcome::NoHandler;
        };

        let started = Instant::now();
        let result = panic::catch_unwind(AssertUnwindSafe(|| handler.handle(envelope)))
            .unwrap_or_else(|payload| Err(HandlerError::Panicked(panic_message(payload.as_ref()))));
        let duration = started.elapsed();

        match result {
            Ok(()) => {
                let labels = [("topic", topic), ("event_type", topic)];
                self.metrics.observe_histogram(
                    PROCESSING_DURATION_SECONDS,
                    &labels,
                    duration.as_secs_f64(),
                );
                self.metrics
                    .increment_counter(MESSAGES_PROCESSED_TOTAL, &labels);
                debug!(
                    topic,
                    offset = envelope.offset(),
                    duration_ms = duration.as_millis(),
                    "Event processed"
                );
                Outcome::Processed { duration }
            }
            Err(err) => {
                error!(
                    topic,
                    partition = envelope.partition(),
                    offset = envelope.offset(),
                    error = %err,
                    error_type = err.kind().as_str(),
                    "Handler failed to process event"
                );
                self.record_failure(topic, err.kind());
                Outcome::HandlerFailed(err.kind())
            }
        }
    }

    fn record_failure(&self, topic: &str, kind: ErrorKind) {
        let error_type = kind.as_str();
        self.metrics.increment_counter(
            MESSAGES_FAILED_TOTAL,
            &[("topic", topic), ("error_type", error_type)],
        );
        self.metrics
            .increment_counter(PROCESSING_ERRORS_TOTAL, &[("error_type", error_type)]);
        if kind == ErrorKind::Deserialization {
            self.metrics.increment_counter(DESERIALIZATION_ERRORS_TOTAL, &[]);
        } else {
            self.metrics.increment_counter(HANDLER_ERRORS_TOTAL, &[]);
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "non-string panic payload".to_string()
    }
}
