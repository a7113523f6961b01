//! Prometheus metrics for the notification worker.
//!
//! This module provides:
//! - Metric names recorded by the dispatcher and lifecycle tracker
//! - [`PrometheusSink`]: a [`MetricsSink`] backed by the `metrics` facade
//! - [`MetricsServer`]: installs the Prometheus exporter with an HTTP listener
//!
//! # Example
//!
//! ```rust,no_run
//! use notification_worker_runtime::metrics::MetricsServer;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! // Start metrics server on port 8005
//! let mut server = MetricsServer::new("0.0.0.0:8005".parse()?);
//! server.start()?;
//!
//! // Metrics available at http://localhost:8005/metrics
//! # Ok(())
//! # }
//! ```

use metrics::{Label, describe_counter, describe_gauge, describe_histogram};
use metrics_exporter_prometheus::{Matcher, PrometheusBuilder, PrometheusHandle};
use notification_worker_core::metrics::{Labels, MetricsSink};
use std::net::SocketAddr;
use thiserror::Error;

/// Worker is running (1) or not (0).
pub const WORKER_RUNNING: &str = "notification_worker_running";
/// Seconds since the worker entered `Running`.
pub const WORKER_UPTIME_SECONDS: &str = "notification_worker_uptime_seconds";
/// Fatal exits, each expected to be followed by a supervisor restart.
pub const WORKER_RESTARTS_TOTAL: &str = "notification_worker_restarts_total";
/// Messages pulled from the broker, labelled by `topic`.
pub const MESSAGES_CONSUMED_TOTAL: &str = "notification_messages_consumed_total";
/// Messages a handler processed successfully, labelled by `topic` and `event_type`.
pub const MESSAGES_PROCESSED_TOTAL: &str = "notification_messages_processed_total";
/// Messages that failed, labelled by `topic` and `error_type`.
pub const MESSAGES_FAILED_TOTAL: &str = "notification_messages_failed_total";
/// Handler invocation time for processed messages.
pub const PROCESSING_DURATION_SECONDS: &str = "notification_message_processing_duration_seconds";
/// Contained failures labelled by `error_type` only.
pub const PROCESSING_ERRORS_TOTAL: &str = "notification_processing_errors_total";
/// Payloads that could not be decoded.
pub const DESERIALIZATION_ERRORS_TOTAL: &str = "notification_deserialization_errors_total";
/// Handler failures other than decoding.
pub const HANDLER_ERRORS_TOTAL: &str = "notification_handler_errors_total";
/// Seconds between production and consumption, labelled by `topic`.
pub const CONSUMER_LAG_SECONDS: &str = "notification_kafka_consumer_lag_seconds";

/// `error_type` label used when a topic has no handler.
pub const NO_HANDLER: &str = "no_handler";

/// Histogram buckets for processing durations, in seconds.
pub const DURATION_BUCKETS: &[f64] = &[0.01, 0.05, 0.1, 0.5, 1.0, 2.0, 5.0];

/// Errors from metrics operations.
#[derive(Error, Debug)]
pub enum MetricsError {
    /// Failed to build metrics exporter
    #[error("Failed to build metrics exporter: {0}")]
    Build(String),
    /// Failed to install metrics exporter
    #[error("Failed to install metrics exporter: {0}")]
    Install(String),
}

/// [`MetricsSink`] that forwards to whatever recorder the `metrics` facade has installed.
#[derive(Debug, Clone, Copy, Default)]
pub struct PrometheusSink;

impl PrometheusSink {
    fn labels(labels: Labels<'_>) -> Vec<Label> {
        labels
            .iter()
            .map(|(key, value)| Label::new((*key).to_owned(), (*value).to_owned()))
            .collect()
    }
}

impl MetricsSink for PrometheusSink {
    fn increment_counter(&self, name: &str, labels: Labels<'_>) {
        metrics::counter!(name.to_owned(), Self::labels(labels)).increment(1);
    }

    fn observe_histogram(&self, name: &str, labels: Labels<'_>, value: f64) {
        metrics::histogram!(name.to_owned(), Self::labels(labels)).record(value);
    }

    fn set_gauge(&self, name: &str, labels: Labels<'_>, value: f64) {
        metrics::gauge!(name.to_owned(), Self::labels(labels)).set(value);
    }
}

/// Prometheus metrics server.
///
/// Exposes metrics on an HTTP endpoint for Prometheus scraping.
pub struct MetricsServer {
    addr: SocketAddr,
    handle: Option<PrometheusHandle>,
}

impl MetricsServer {
    /// Create a new metrics server.
    ///
    /// # Arguments
    ///
    /// * `addr` - Socket address to bind to (e.g., `0.0.0.0:8005`)
    #[must_use]
    pub const fn new(addr: SocketAddr) -> Self {
        Self { addr, handle: None }
    }

    /// Address the exporter listens on.
    #[must_use]
    pub const fn addr(&self) -> SocketAddr {
        self.addr
    }

    /// Register metric descriptions and start the HTTP exporter.
    ///
    /// Must be called from within a Tokio runtime; the exporter's listener is
    /// spawned onto it.
    ///
    /// # Errors
    ///
    /// Returns [`MetricsError::Build`] if the bucket configuration is rejected
    /// and [`MetricsError::Install`] if the listener cannot be started or a
    /// different recorder is already installed.
    pub fn start(&mut self) -> Result<(), MetricsError> {
        let builder = PrometheusBuilder::new()
            .with_http_listener(self.addr)
            .set_buckets_for_metric(
                Matcher::Suffix("duration_seconds".to_string()),
                DURATION_BUCKETS,
            )
            .map_err(|e| MetricsError::Build(e.to_string()))?;

        let (recorder, exporter) = builder
            .build()
            .map_err(|e| MetricsError::Install(e.to_string()))?;
        let handle = recorder.handle();

        metrics::set_global_recorder(recorder).map_err(|_| {
            MetricsError::Install("a metrics recorder is already installed".to_string())
        })?;
        let addr = self.addr;
        tokio::spawn(async move {
            if exporter.await.is_err() {
                tracing::error!(addr = %addr, "Prometheus exporter stopped");
            }
        });

        register_metrics();
        self.handle = Some(handle);

        tracing::info!(
            addr = %self.addr,
            "Metrics server started - available at http://{}/metrics",
            self.addr
        );
        Ok(())
    }

    /// Render current metrics in Prometheus format.
    ///
    /// Returns `None` if the server hasn't been started.
    #[must_use]
    pub fn render(&self) -> Option<String> {
        self.handle.as_ref().map(PrometheusHandle::render)
    }
}

/// Register all worker metric descriptions.
pub fn register_metrics() {
    // Lifecycle
    describe_gauge!(WORKER_RUNNING, "Is notification worker running (1=yes, 0=no)");
    describe_gauge!(WORKER_UPTIME_SECONDS, "Worker uptime in seconds");
    describe_counter!(WORKER_RESTARTS_TOTAL, "Total worker restarts");

    // Consumption
    describe_counter!(MESSAGES_CONSUMED_TOTAL, "Total messages consumed from Kafka");
    describe_counter!(MESSAGES_PROCESSED_TOTAL, "Total messages successfully processed");
    describe_counter!(MESSAGES_FAILED_TOTAL, "Total messages that failed processing");
    describe_histogram!(PROCESSING_DURATION_SECONDS, "Message processing duration");
    describe_gauge!(CONSUMER_LAG_SECONDS, "Kafka consumer lag in seconds");

    // Errors
    describe_counter!(PROCESSING_ERRORS_TOTAL, "Total processing errors");
    describe_counter!(DESERIALIZATION_ERRORS_TOTAL, "Total deserialization errors");
    describe_counter!(HANDLER_ERRORS_TOTAL, "Total handler execution errors");
}
