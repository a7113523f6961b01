//! Metrics sink abstraction.
//!
//! The worker reports every dispatch outcome and lifecycle transition through
//! [`MetricsSink`]. Production wires in the Prometheus-backed sink from
//! `notification-worker-runtime`; tests use the recording sink from
//! `notification-worker-testing`.
//!
//! Labels are passed as borrowed `(key, value)` pairs so call sites on the hot
//! path never allocate unless the sink needs to keep them.

/// Label set attached to a metric sample.
pub type Labels<'a> = &'a [(&'a str, &'a str)];

/// Destination for counters, histograms and gauges.
pub trait MetricsSink: Send + Sync {
    /// Increment the counter `name` with `labels` by one.
    fn increment_counter(&self, name: &str, labels: Labels<'_>);

    /// Record `value` into the histogram `name` with `labels`.
    fn observe_histogram(&self, name: &str, labels: Labels<'_>, value: f64);

    /// Set the gauge `name` with `labels` to `value`.
    fn set_gauge(&self, name: &str, labels: Labels<'_>, value: f64);
}

/// Sink that drops everything. Handy when metrics are irrelevant.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopMetricsSink;

impl MetricsSink for NoopMetricsSink {
    fn increment_counter(&self, _name: &str, _labels: Labels<'_>) {}

    fn observe_histogram(&self, _name: &str, _labels: Labels<'_>, _value: f64) {}

    fn set_gauge(&self, _name: &str, _labels: Labels<'_>, _value: f64) {}
}
