//! Event bus abstraction for topic-based publish/subscribe.
//!
//! This module provides the [`EventBus`] trait the worker consumes events
//! through. Producers (user, product, order and chaos services) publish JSON
//! objects to named topics; the worker joins a consumer group, subscribes to a
//! fixed topic set and pulls [`BrokerMessage`]s one at a time.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────┐ ┌──────────┐ ┌──────────┐ ┌──────────┐
//! │  users   │ │ products │ │  orders  │ │  chaos   │
//! └────┬─────┘ └────┬─────┘ └────┬─────┘ └────┬─────┘
//!      │ publish    │            │            │
//!      └────────────┴─────┬──────┴────────────┘
//!                         ▼
//!               ┌───────────────────┐
//!               │     Event Bus     │◄─── auto-ack at pull time
//!               └─────────┬─────────┘
//!                         │ subscribe(topics, group)
//!                         ▼
//!               ┌───────────────────┐
//!               │  Consumer Loop    │
//!               └───────────────────┘
//! ```
//!
//! # Delivery Semantics
//!
//! Acknowledgment is implicit: offsets are committed as messages are pulled,
//! independent of what the worker does with them afterwards. A crash between
//! the pull and the end of dispatch loses that message's processing. Callers
//! must not depend on guaranteed processing.
//!
//! # Errors
//!
//! Errors on the [`MessageStream`] come from the transport itself (broker
//! unreachable, disconnected mid-stream). They are never produced by
//! application-level handling and consumers treat them as fatal.
//!
//! # Implementations
//!
//! - `InMemoryEventBus` in `notification-worker-testing` - for tests
//! - `RedpandaEventBus` in `notification-worker-redpanda` - for production (Kafka-compatible)

use crate::envelope::{BrokerMessage, Payload};
use futures::Stream;
use std::future::Future;
use std::pin::Pin;
use thiserror::Error;

/// Errors that can occur during event bus operations.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum EventBusError {
    /// Failed to connect to the event bus
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    /// Failed to publish an event to a topic
    #[error("Publish failed for topic '{topic}': {reason}")]
    PublishFailed {
        /// The topic that failed
        topic: String,
        /// The reason for failure
        reason: String,
    },

    /// Failed to subscribe to topics
    #[error("Subscription failed for topics {topics:?}: {reason}")]
    SubscriptionFailed {
        /// The topics that failed to subscribe
        topics: Vec<String>,
        /// The reason for failure
        reason: String,
    },

    /// Topic not found or invalid
    #[error("Invalid topic: {0}")]
    InvalidTopic(String),

    /// Network or transport error while consuming
    #[error("Transport error: {0}")]
    TransportError(String),
}

/// Stream of raw messages from a subscription.
///
/// Each item is either a message pulled from the broker or a transport-level
/// error. A stream that ends means the subscription is gone.
pub type MessageStream =
    Pin<Box<dyn Stream<Item = Result<BrokerMessage, EventBusError>> + Send>>;

/// Trait for event bus implementations.
///
/// # Thread Safety
///
/// Implementations must be `Send + Sync` so one bus can be shared between the
/// consumer loop and any producers in the same process.
///
/// # Dyn Compatibility
///
/// This trait uses explicit `Pin<Box<dyn Future>>` returns instead of `async fn`
/// so the consumer loop can hold an `Arc<dyn EventBus>`.
pub trait EventBus: Send + Sync {
    /// Publish a JSON payload to a topic.
    ///
    /// Publishing is best-effort: implementations may retry a bounded number of
    /// times, then log and report the failure. They never retry forever.
    ///
    /// # Errors
    ///
    /// Returns [`EventBusError::PublishFailed`] if the payload cannot be
    /// encoded or the broker rejects it.
    fn publish(
        &self,
        topic: &str,
        payload: &Payload,
    ) -> Pin<Box<dyn Future<Output = Result<(), EventBusError>> + Send + '_>>;

    /// Join `group_id` and subscribe to `topics`.
    ///
    /// Returns a [`MessageStream`] yielding messages from all subscribed topics
    /// in the order the broker delivers them (per-partition FIFO).
    ///
    /// # Errors
    ///
    /// Returns [`EventBusError::SubscriptionFailed`] if the broker cannot be
    /// reached or the subscription is rejected.
    fn subscribe(
        &self,
        topics: &[&str],
        group_id: &str,
    ) -> Pin<Box<dyn Future<Output = Result<MessageStream, EventBusError>> + Send + '_>>;
}
