//! Recording metrics sink.
//!
//! Every call is stored in order so tests can assert exact counts per label
//! set. Label order does not matter for lookups.

use notification_worker_core::metrics::{Labels, MetricsSink};
use std::sync::{Mutex, PoisonError};

/// What kind of call produced a sample.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SampleKind {
    /// `increment_counter`
    Counter,
    /// `observe_histogram` with the observed value
    Histogram(f64),
    /// `set_gauge` with the new value
    Gauge(f64),
}

/// One recorded call.
#[derive(Debug, Clone, PartialEq)]
pub struct RecordedSample {
    /// Metric name
    pub name: String,
    /// Labels, sorted by key
    pub labels: Vec<(String, String)>,
    /// Call kind and value
    pub kind: SampleKind,
}

/// [`MetricsSink`] that remembers everything.
#[derive(Debug, Default)]
pub struct RecordingMetricsSink {
    samples: Mutex<Vec<RecordedSample>>,
}

fn normalize(labels: Labels<'_>) -> Vec<(String, String)> {
    let mut owned: Vec<(String, String)> = labels
        .iter()
        .map(|(key, value)| ((*key).to_string(), (*value).to_string()))
        .collect();
    owned.sort();
    owned
}

impl RecordingMetricsSink {
    /// Create an empty sink.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn push(&self, name: &str, labels: Labels<'_>, kind: SampleKind) {
        self.samples
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(RecordedSample {
                name: name.to_string(),
                labels: normalize(labels),
                kind,
            });
    }

    fn matching(&self, name: &str, labels: Labels<'_>) -> Vec<SampleKind> {
        let wanted = normalize(labels);
        self.samples
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .filter(|sample| sample.name == name && sample.labels == wanted)
            .map(|sample| sample.kind)
            .collect()
    }

    /// Value of the counter `name` with exactly `labels`.
    #[must_use]
    pub fn counter(&self, name: &str, labels: Labels<'_>) -> u64 {
        self.matching(name, labels)
            .into_iter()
            .filter(|kind| *kind == SampleKind::Counter)
            .count() as u64
    }

    /// Sum of the counter `name` across every label set.
    #[must_use]
    pub fn counter_total(&self, name: &str) -> u64 {
        self.samples
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .filter(|sample| sample.name == name && sample.kind == SampleKind::Counter)
            .count() as u64
    }

    /// Last value set on the gauge `name` with exactly `labels`.
    #[must_use]
    pub fn gauge(&self, name: &str, labels: Labels<'_>) -> Option<f64> {
        self.gauge_history(name, labels).last().copied()
    }

    /// Every value set on the gauge `name` with exactly `labels`, in order.
    #[must_use]
    pub fn gauge_history(&self, name: &str, labels: Labels<'_>) -> Vec<f64> {
        self.matching(name, labels)
            .into_iter()
            .filter_map(|kind| match kind {
                SampleKind::Gauge(value) => Some(value),
                _ => None,
            })
            .collect()
    }

    /// Every value observed on the histogram `name` with exactly `labels`.
    #[must_use]
    pub fn histogram(&self, name: &str, labels: Labels<'_>) -> Vec<f64> {
        self.matching(name, labels)
            .into_iter()
            .filter_map(|kind| match kind {
                SampleKind::Histogram(value) => Some(value),
                _ => None,
            })
            .collect()
    }

    /// All samples recorded so far.
    #[must_use]
    pub fn samples(&self) -> Vec<RecordedSample> {
        self.samples
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Forget everything recorded so far.
    pub fn clear(&self) {
        self.samples
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }
}

impl MetricsSink for RecordingMetricsSink {
    fn increment_counter(&self, name: &str, labels: Labels<'_>) {
        self.push(name, labels, SampleKind::Counter);
    }

    fn observe_histogram(&self, name: &str, labels: Labels<'_>, value: f64) {
        self.push(name, labels, SampleKind::Histogram(value));
    }

    fn set_gauge(&self, name: &str, labels: Labels<'_>, value: f64) {
        self.push(name, labels, SampleKind::Gauge(value));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counters_match_exact_label_sets_in_any_order() {
        let sink = RecordingMetricsSink::new();
        sink.increment_counter("failed", &[("topic", "a"), ("error_type", "panic")]);
        sink.increment_counter("failed", &[("error_type", "panic"), ("topic", "a")]);
        sink.increment_counter("failed", &[("topic", "b"), ("error_type", "panic")]);

        assert_eq!(sink.counter("failed", &[("topic", "a"), ("error_type", "panic")]), 2);
        assert_eq!(sink.counter("failed", &[("topic", "a")]), 0);
        assert_eq!(sink.counter_total("failed"), 3);
    }

    #[test]
    fn gauges_and_histograms_keep_values() {
        let sink = RecordingMetricsSink::new();
        sink.set_gauge("running", &[], 1.0);
        sink.set_gauge("running", &[], 0.0);
        sink.observe_histogram("duration", &[("topic", "a")], 0.25);

        assert_eq!(sink.gauge("running", &[]), Some(0.0));
        assert_eq!(sink.gauge_history("running", &[]), vec![1.0, 0.0]);
        assert_eq!(sink.histogram("duration", &[("topic", "a")]), vec![0.25]);
        assert_eq!(sink.gauge("missing", &[]), None);

        sink.clear();
        assert!(sink.samples().is_empty());
    }
}
