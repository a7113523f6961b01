//! Notification handlers, one per [`KnownTopic`].
//!
//! Handlers decode the payload into a typed struct, log the notifications
//! that would go out, and record domain metrics. Delivery itself is simulated
//! through structured logs; nothing here talks to a mail or SMS gateway.
//!
//! A payload missing a required field fails with
//! [`HandlerError::InvalidPayload`]; the dispatcher counts it and moves on.

use crate::metrics;
use crate::topics::KnownTopic;
use notification_worker_core::EventEnvelope;
use notification_worker_runtime::{HandlerError, Registration};
use serde::Deserialize;
use serde_json::Value;
use std::fmt;
use tracing::{info, warn};

/// Channel a notification goes out on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Channel {
    /// E-mail to a user or team
    Email,
    /// Text message to a user
    Sms,
    /// Alert posted to an internal team channel
    Slack,
}

impl Channel {
    /// Metric label for this channel.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Email => "email",
            Self::Sms => "sms",
            Self::Slack => "slack",
        }
    }
}

impl fmt::Display for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Order status as carried by `order.status_changed`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OrderStatus {
    /// Order placed, payment outstanding
    AwaitingPayment,
    /// Payment received
    Confirmed,
    /// Handed to the carrier
    Shipped,
    /// Received by the customer
    Delivered,
    /// Cancelled before fulfilment
    Cancelled,
    /// Sent back by the customer
    Returned,
    /// Any status this worker has no dedicated notification for
    Other,
}

impl OrderStatus {
    /// Parse a wire status; unknown values map to [`OrderStatus::Other`].
    #[must_use]
    pub fn parse(status: &str) -> Self {
        match status {
            "awaiting_payment" => Self::AwaitingPayment,
            "confirmed" => Self::Confirmed,
            "shipped" => Self::Shipped,
            "delivered" => Self::Delivered,
            "cancelled" => Self::Cancelled,
            "returned" => Self::Returned,
            _ => Self::Other,
        }
    }

    /// Channels notified when an order enters this status.
    #[must_use]
    pub const fn channels(self) -> &'static [Channel] {
        match self {
            Self::Delivered => &[Channel::Email, Channel::Sms],
            Self::AwaitingPayment
            | Self::Confirmed
            | Self::Shipped
            | Self::Cancelled
            | Self::Returned
            | Self::Other => &[Channel::Email],
        }
    }
}

#[derive(Debug, Deserialize)]
struct UserCreated {
    user_id: Option<i64>,
    username: Option<String>,
    email: String,
}

#[derive(Debug, Deserialize)]
struct OrderCreated {
    order_id: i64,
    user_id: i64,
    total_amount: f64,
    items: Option<u64>,
}

#[derive(Debug, Deserialize)]
struct PaymentConfirmed {
    order_id: i64,
    user_id: i64,
    total_amount: f64,
    item_count: Option<u64>,
    payment_method: Option<String>,
}

#[derive(Debug, Deserialize)]
struct StatusChanged {
    order_id: i64,
    old_status: String,
    new_status: String,
    user_id: Option<i64>,
    total_amount: Option<f64>,
    item_count: Option<u64>,
    message: Option<String>,
}

#[derive(Debug, Deserialize)]
struct StockLow {
    product_id: i64,
    product_name: String,
    stock: i64,
}

#[derive(Debug, Deserialize)]
struct RateLimited {
    ip: String,
    path: String,
}

#[derive(Debug, Deserialize)]
struct ChaosInjected {
    chaos_type: Option<String>,
    details: Option<Value>,
}

/// The handler set for [`KnownTopic::ALL`].
#[must_use]
pub fn notification_handlers() -> Vec<Registration> {
    KnownTopic::ALL
        .into_iter()
        .map(|topic| match topic {
            KnownTopic::UserCreated => Registration::new(topic.as_str(), on_user_created),
            KnownTopic::OrderCreated => Registration::new(topic.as_str(), on_order_created),
            KnownTopic::OrderPaymentConfirmed => {
                Registration::new(topic.as_str(), on_payment_confirmed)
            }
            KnownTopic::OrderStatusChanged => {
                Registration::new(topic.as_str(), on_order_status_changed)
            }
            KnownTopic::StockLow => Registration::new(topic.as_str(), on_stock_low),
            KnownTopic::ApiRateLimited => Registration::new(topic.as_str(), on_rate_limited),
            KnownTopic::ChaosInjected => Registration::new(topic.as_str(), on_chaos_injected),
        })
        .collect()
}

/// `user.created`: welcome e-mail.
///
/// # Errors
///
/// [`HandlerError::InvalidPayload`] if `email` is missing.
pub fn on_user_created(envelope: &EventEnvelope) -> Result<(), HandlerError> {
    let event: UserCreated = envelope.decode_payload()?;

    info!(
        user_id = event.user_id,
        username = event.username.as_deref().unwrap_or("unknown"),
        email = %event.email,
        "New user registered, welcome email sent"
    );
    metrics::record_notification_sent(Channel::Email);
    metrics::record_notification_event();
    Ok(())
}

/// `order.created`: order confirmation and payment instructions.
///
/// # Errors
///
/// [`HandlerError::InvalidPayload`] if `order_id`, `user_id` or
/// `total_amount` is missing.
pub fn on_order_created(envelope: &EventEnvelope) -> Result<(), HandlerError> {
    let event: OrderCreated = envelope.decode_payload()?;

    info!(
        order_id = event.order_id,
        user_id = event.user_id,
        total_amount = event.total_amount,
        items = event.items,
        status = "awaiting_payment",
        "Order created, confirmation and payment instructions sent (payment due within 24 hours)"
    );
    metrics::record_notification_sent(Channel::Email);
    metrics::record_notification_sent(Channel::Email);
    metrics::record_order_event();
    Ok(())
}

/// `order.payment_confirmed`: confirmation to the user, fulfilment notice to the warehouse.
///
/// # Errors
///
/// [`HandlerError::InvalidPayload`] if `order_id`, `user_id` or
/// `total_amount` is missing.
pub fn on_payment_confirmed(envelope: &EventEnvelope) -> Result<(), HandlerError> {
    let event: PaymentConfirmed = envelope.decode_payload()?;

    info!(
        order_id = event.order_id,
        user_id = event.user_id,
        total_amount = event.total_amount,
        item_count = event.item_count,
        payment_method = event.payment_method.as_deref().unwrap_or("unknown"),
        "Payment confirmed, order ready for fulfillment"
    );
    info!(order_id = event.order_id, "Payment confirmation sent to user");
    info!(order_id = event.order_id, "Fulfillment notification sent to warehouse team");
    metrics::record_notification_sent(Channel::Email);
    metrics::record_notification_sent(Channel::Email);
    metrics::record_payment_event();
    Ok(())
}

/// `order.status_changed`: notify the customer according to the new status.
///
/// # Errors
///
/// [`HandlerError::InvalidPayload`] if `order_id`, `old_status` or
/// `new_status` is missing.
pub fn on_order_status_changed(envelope: &EventEnvelope) -> Result<(), HandlerError> {
    let event: StatusChanged = envelope.decode_payload()?;
    let status = OrderStatus::parse(&event.new_status);
    let status_message = event.message.as_deref().unwrap_or("Order status updated");

    info!(
        order_id = event.order_id,
        user_id = event.user_id,
        old_status = %event.old_status,
        new_status = %event.new_status,
        total_amount = event.total_amount,
        item_count = event.item_count,
        status_message,
        "Order status updated"
    );

    match status {
        OrderStatus::Shipped => info!(
            order_id = event.order_id,
            user_id = event.user_id,
            "Shipping notification sent with tracking information"
        ),
        OrderStatus::Delivered => info!(
            order_id = event.order_id,
            user_id = event.user_id,
            "Delivery confirmation sent by email and SMS"
        ),
        OrderStatus::Confirmed => info!(
            order_id = event.order_id,
            user_id = event.user_id,
            total_amount = event.total_amount,
            "Order confirmation sent, ready for fulfillment"
        ),
        OrderStatus::Cancelled => warn!(
            order_id = event.order_id,
            refund_amount = event.total_amount,
            "Order cancelled, cancellation confirmation sent and refund initiated"
        ),
        OrderStatus::Returned => info!(
            order_id = event.order_id,
            user_id = event.user_id,
            "Return processed, confirmation sent"
        ),
        OrderStatus::AwaitingPayment | OrderStatus::Other => info!(
            order_id = event.order_id,
            new_status = %event.new_status,
            "Status change notification sent"
        ),
    }

    for channel in status.channels() {
        metrics::record_notification_sent(*channel);
    }
    metrics::record_order_event();
    Ok(())
}

/// `stock.low`: inventory alert to the management team.
///
/// # Errors
///
/// [`HandlerError::InvalidPayload`] if `product_id`, `product_name` or
/// `stock` is missing.
pub fn on_stock_low(envelope: &EventEnvelope) -> Result<(), HandlerError> {
    let event: StockLow = envelope.decode_payload()?;

    warn!(
        product_id = event.product_id,
        product_name = %event.product_name,
        stock = event.stock,
        "Low stock, inventory alert sent to management team"
    );
    metrics::record_notification_sent(Channel::Slack);
    metrics::record_notification_event();
    Ok(())
}

/// `api.rate_limited`: security alert.
///
/// # Errors
///
/// [`HandlerError::InvalidPayload`] if `ip` or `path` is missing.
pub fn on_rate_limited(envelope: &EventEnvelope) -> Result<(), HandlerError> {
    let event: RateLimited = envelope.decode_payload()?;

    warn!(
        ip = %event.ip,
        path = %event.path,
        "Rate limit triggered, alert sent to security team"
    );
    metrics::record_notification_sent(Channel::Slack);
    metrics::record_notification_event();
    Ok(())
}

/// `chaos.injected`: log the experiment and count it by type.
///
/// # Errors
///
/// [`HandlerError::InvalidPayload`] if `chaos_type` or `details` has the wrong type.
/// A missing `chaos_type` is counted as `unknown`.
pub fn on_chaos_injected(envelope: &EventEnvelope) -> Result<(), HandlerError> {
    let event: ChaosInjected = envelope.decode_payload()?;
    let chaos_type = event.chaos_type.as_deref().unwrap_or("unknown");

    let details = event.details.as_ref().map(|details| match details {
        Value::String(text) => text.clone(),
        other => other.to_string(),
    });

    info!(
        chaos_type,
        details = details.as_deref().unwrap_or("none"),
        "Chaos event detected"
    );
    metrics::record_chaos_event(chaos_type);
    Ok(())
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use notification_worker_core::Utc;
    use notification_worker_runtime::{ErrorKind, HandlerRegistry};
    use notification_worker_testing::helpers::payload;
    use serde_json::json;

    fn envelope(topic: KnownTopic, value: Value) -> EventEnvelope {
        EventEnvelope::new(topic.as_str(), payload(value), Utc::now()).unwrap()
    }

    #[test]
    fn every_known_topic_has_exactly_one_handler() {
        let registry = HandlerRegistry::new(notification_handlers()).unwrap();

        assert_eq!(registry.len(), KnownTopic::ALL.len());
        for topic in KnownTopic::ALL {
            assert!(registry.contains(topic.as_str()), "{topic} is unhandled");
        }
    }

    #[test]
    fn user_created_requires_email() {
        let ok = envelope(
            KnownTopic::UserCreated,
            json!({"user_id": 7, "username": "ada", "email": "ada@example.com"}),
        );
        assert!(on_user_created(&ok).is_ok());

        let missing = envelope(KnownTopic::UserCreated, json!({"username": "ada"}));
        let err = on_user_created(&missing).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidPayload);
        assert!(err.to_string().contains("email"));
    }

    #[test]
    fn order_events_accept_producer_payloads() {
        let created = envelope(
            KnownTopic::OrderCreated,
            json!({
                "order_id": 123,
                "user_id": 456,
                "total_amount": 99.99,
                "status": "awaiting_payment",
                "items": 3,
                "timestamp": "2025-01-01T00:00:00Z"
            }),
        );
        assert!(on_order_created(&created).is_ok());

        let paid = envelope(
            KnownTopic::OrderPaymentConfirmed,
            json!({
                "order_id": 123,
                "user_id": 456,
                "total_amount": 99.99,
                "payment_method": "credit_card",
                "item_count": 3
            }),
        );
        assert!(on_payment_confirmed(&paid).is_ok());
    }

    #[test]
    fn mistyped_amount_is_an_invalid_payload() {
        let created = envelope(
            KnownTopic::OrderCreated,
            json!({"order_id": 1, "user_id": 2, "total_amount": "lots"}),
        );
        assert_eq!(
            on_order_created(&created).unwrap_err().kind(),
            ErrorKind::InvalidPayload
        );
    }

    #[test]
    fn status_change_accepts_every_status() {
        for status in [
            "awaiting_payment",
            "confirmed",
            "shipped",
            "delivered",
            "cancelled",
            "returned",
            "on_hold",
        ] {
            let changed = envelope(
                KnownTopic::OrderStatusChanged,
                json!({"order_id": 9, "old_status": "confirmed", "new_status": status}),
            );
            assert!(on_order_status_changed(&changed).is_ok(), "{status}");
        }
    }

    #[test]
    fn status_maps_to_notification_channels() {
        assert_eq!(OrderStatus::parse("shipped"), OrderStatus::Shipped);
        assert_eq!(OrderStatus::parse("on_hold"), OrderStatus::Other);
        assert_eq!(
            OrderStatus::Delivered.channels(),
            &[Channel::Email, Channel::Sms]
        );
        assert_eq!(OrderStatus::Cancelled.channels(), &[Channel::Email]);
    }

    #[test]
    fn alerts_and_chaos_events() {
        let stock = envelope(
            KnownTopic::StockLow,
            json!({"product_id": 5, "product_name": "Keyboard", "stock": 3}),
        );
        assert!(on_stock_low(&stock).is_ok());

        let limited = envelope(
            KnownTopic::ApiRateLimited,
            json!({"ip": "10.0.0.8", "path": "/api/orders"}),
        );
        assert!(on_rate_limited(&limited).is_ok());

        let chaos = envelope(
            KnownTopic::ChaosInjected,
            json!({"chaos_type": "latency", "details": "Injected 500ms delay"}),
        );
        assert!(on_chaos_injected(&chaos).is_ok());

        let structured = envelope(
            KnownTopic::ChaosInjected,
            json!({"chaos_type": "error", "details": {"status": 503}}),
        );
        assert!(on_chaos_injected(&structured).is_ok());

        let untyped = envelope(KnownTopic::ChaosInjected, json!({"details": "custom run"}));
        assert!(on_chaos_injected(&untyped).is_ok());

        let mistyped = envelope(KnownTopic::ChaosInjected, json!({"chaos_type": 7}));
        assert_eq!(
            on_chaos_injected(&mistyped).unwrap_err().kind(),
            ErrorKind::InvalidPayload
        );
    }
}
