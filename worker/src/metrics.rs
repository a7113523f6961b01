//! Domain metrics for the notification handlers.
//!
//! The runtime records consumption, dispatch and lifecycle metrics on its own.
//! This module covers what the handlers add on top:
//!
//! ## Counters
//! - `notification_order_events_processed_total` - Order events handled
//! - `notification_payment_events_processed_total` - Payment confirmations handled
//! - `notification_chaos_events_processed_total{chaos_type}` - Chaos events by type
//! - `notification_notification_events_processed_total` - User, stock and security events
//! - `notification_notifications_sent_total{channel,status}` - Notifications emitted
//!
//! ## Gauges
//! - `notification_event_types_distribution{event_type}` - Running tally per event family

use crate::handlers::Channel;
use metrics::{describe_counter, describe_gauge};

/// Order events handled.
pub const ORDER_EVENTS_PROCESSED_TOTAL: &str = "notification_order_events_processed_total";
/// Payment confirmations handled.
pub const PAYMENT_EVENTS_PROCESSED_TOTAL: &str = "notification_payment_events_processed_total";
/// Chaos events handled, labelled by `chaos_type`.
pub const CHAOS_EVENTS_PROCESSED_TOTAL: &str = "notification_chaos_events_processed_total";
/// User, stock and security events handled.
pub const NOTIFICATION_EVENTS_PROCESSED_TOTAL: &str =
    "notification_notification_events_processed_total";
/// Running tally per event family, labelled by `event_type`.
pub const EVENT_TYPES_DISTRIBUTION: &str = "notification_event_types_distribution";
/// Notifications emitted, labelled by `channel` and `status`.
pub const NOTIFICATIONS_SENT_TOTAL: &str = "notification_notifications_sent_total";

/// Register descriptions for the domain metrics.
///
/// Call once at startup, after the exporter is installed.
pub fn register_domain_metrics() {
    describe_counter!(ORDER_EVENTS_PROCESSED_TOTAL, "Total order events processed");
    describe_counter!(PAYMENT_EVENTS_PROCESSED_TOTAL, "Total payment events processed");
    describe_counter!(
        CHAOS_EVENTS_PROCESSED_TOTAL,
        "Total chaos events processed by chaos type"
    );
    describe_counter!(
        NOTIFICATION_EVENTS_PROCESSED_TOTAL,
        "Total notification events processed"
    );
    describe_gauge!(
        EVENT_TYPES_DISTRIBUTION,
        "Distribution of event types processed (order, payment, chaos, notification)"
    );
    describe_counter!(
        NOTIFICATIONS_SENT_TOTAL,
        "Total notifications sent by channel and status"
    );

    tracing::info!("Domain metrics registered");
}

// ============================================================================
// Metric Recording Functions
// ============================================================================

/// Record an order event.
pub fn record_order_event() {
    metrics::counter!(ORDER_EVENTS_PROCESSED_TOTAL).increment(1);
    metrics::gauge!(EVENT_TYPES_DISTRIBUTION, "event_type" => "order").increment(1.0);
}

/// Record a payment confirmation.
pub fn record_payment_event() {
    metrics::counter!(PAYMENT_EVENTS_PROCESSED_TOTAL).increment(1);
    metrics::gauge!(EVENT_TYPES_DISTRIBUTION, "event_type" => "payment").increment(1.0);
}

/// Record a chaos event.
///
/// # Arguments
///
/// * `chaos_type` - Experiment type from the event (e.g., "latency", "error")
pub fn record_chaos_event(chaos_type: &str) {
    metrics::counter!(CHAOS_EVENTS_PROCESSED_TOTAL, "chaos_type" => chaos_type.to_owned())
        .increment(1);
    metrics::gauge!(EVENT_TYPES_DISTRIBUTION, "event_type" => "chaos").increment(1.0);
    tracing::debug!(chaos_type, "Recorded chaos_event metric");
}

/// Record a user, stock or security event.
pub fn record_notification_event() {
    metrics::counter!(NOTIFICATION_EVENTS_PROCESSED_TOTAL).increment(1);
    metrics::gauge!(EVENT_TYPES_DISTRIBUTION, "event_type" => "notification").increment(1.0);
}

/// Record one notification emitted on `channel`.
pub fn record_notification_sent(channel: Channel) {
    metrics::counter!(
        NOTIFICATIONS_SENT_TOTAL,
        "channel" => channel.as_str(),
        "status" => "success"
    )
    .increment(1);
}

#[cfg(test)]
mod tests {
    use super::*;
    use metrics_exporter_prometheus::PrometheusBuilder;

    #[test]
    fn domain_metrics_render_with_labels() {
        let recorder = PrometheusBuilder::new().build_recorder();
        let handle = recorder.handle();

        metrics::with_local_recorder(&recorder, || {
            register_domain_metrics();
            record_order_event();
            record_order_event();
            record_payment_event();
            record_chaos_event("latency");
            record_notification_event();
            record_notification_sent(Channel::Email);
            record_notification_sent(Channel::Sms);
        });

        let rendered = handle.render();
        assert!(rendered.contains("notification_order_events_processed_total 2"));
        assert!(rendered.contains("notification_payment_events_processed_total 1"));
        assert!(rendered
            .contains("notification_chaos_events_processed_total{chaos_type=\"latency\"} 1"));
        assert!(rendered.contains("notification_event_types_distribution{event_type=\"order\"} 2"));
        assert!(rendered
            .contains("notification_event_types_distribution{event_type=\"notification\"} 1"));
        assert!(rendered.contains("channel=\"email\""));
        assert!(rendered.contains("channel=\"sms\""));
    }
}
