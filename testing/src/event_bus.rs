//! In-memory event bus.
//!
//! `InMemoryEventBus` lets tests script exactly what a subscriber sees:
//! published JSON events, raw (possibly malformed) messages, transport errors
//! and the end of the stream. Anything scripted before a subscriber exists is
//! buffered and replayed, in order, to the next subscriber, so a test can set
//! up the whole scenario before the consumer loop even subscribes.

use async_stream::stream;
use notification_worker_core::envelope::{BrokerMessage, Payload};
use notification_worker_core::event_bus::{EventBus, EventBusError, MessageStream};
use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::{Mutex, PoisonError};
use tokio::sync::mpsc;

type Item = Result<BrokerMessage, EventBusError>;

enum Scripted {
    Item(Item),
    Close,
}

struct Subscriber {
    topics: Vec<String>,
    group_id: String,
    sender: mpsc::UnboundedSender<Item>,
}

#[derive(Default)]
struct State {
    subscribers: Vec<Subscriber>,
    backlog: Vec<Scripted>,
    published: Vec<(String, Payload)>,
    next_offset: HashMap<String, i64>,
    subscribe_failure: Option<String>,
    subscribe_calls: usize,
}

impl State {
    fn assign_offset(&mut self, mut message: BrokerMessage) -> BrokerMessage {
        let next = self.next_offset.entry(message.topic.clone()).or_insert(0);
        message.offset = *next;
        *next += 1;
        message
    }

    fn deliver(&mut self, item: Scripted, respect_topics: bool) {
        if self.subscribers.is_empty() {
            self.backlog.push(item);
            return;
        }
        match item {
            Scripted::Close => self.subscribers.clear(),
            Scripted::Item(item) => {
                self.subscribers.retain(|subscriber| {
                    let wants = match &item {
                        Ok(message) if respect_topics => {
                            subscriber.topics.iter().any(|topic| *topic == message.topic)
                        }
                        _ => true,
                    };
                    // Drop subscribers whose stream has been dropped.
                    !wants || subscriber.sender.send(item.clone()).is_ok()
                });
            }
        }
    }
}

/// Scriptable [`EventBus`] for tests.
///
/// `publish` routes only to subscribers of the topic. `inject` bypasses topic
/// filtering, mirroring a broker that delivers a message the consumer did not
/// expect (an unregistered topic, a malformed payload).
#[derive(Default)]
pub struct InMemoryEventBus {
    state: Mutex<State>,
}

impl InMemoryEventBus {
    /// Create an empty bus with no subscribers.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> std::sync::MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Deliver a raw message to every subscriber, ignoring topic filters.
    ///
    /// The offset is assigned per topic in arrival order.
    pub fn inject(&self, message: BrokerMessage) {
        let mut state = self.state();
        let message = state.assign_offset(message);
        state.deliver(Scripted::Item(Ok(message)), false);
    }

    /// Deliver a consume-level error, as if the broker connection dropped.
    pub fn inject_transport_error(&self, reason: impl Into<String>) {
        self.state().deliver(
            Scripted::Item(Err(EventBusError::TransportError(reason.into()))),
            false,
        );
    }

    /// End every subscriber's stream (or the next subscriber's, once the
    /// backlog before it has been replayed).
    pub fn close(&self) {
        self.state().deliver(Scripted::Close, false);
    }

    /// Make every subsequent `subscribe` call fail with `reason`.
    pub fn fail_subscriptions(&self, reason: impl Into<String>) {
        self.state().subscribe_failure = Some(reason.into());
    }

    /// Everything passed to `publish`, in order.
    #[must_use]
    pub fn published(&self) -> Vec<(String, Payload)> {
        self.state().published.clone()
    }

    /// Number of live subscriptions.
    #[must_use]
    pub fn subscriber_count(&self) -> usize {
        self.state().subscribers.len()
    }

    /// Number of `subscribe` calls, successful or not.
    #[must_use]
    pub fn subscribe_calls(&self) -> usize {
        self.state().subscribe_calls
    }

    /// Consumer groups of the live subscriptions.
    #[must_use]
    pub fn group_ids(&self) -> Vec<String> {
        self.state()
            .subscribers
            .iter()
            .map(|subscriber| subscriber.group_id.clone())
            .collect()
    }
}

impl EventBus for InMemoryEventBus {
    fn publish(
        &self,
        topic: &str,
        payload: &Payload,
    ) -> Pin<Box<dyn Future<Output = Result<(), EventBusError>> + Send + '_>> {
        let topic = topic.to_string();
        let payload = payload.clone();

        Box::pin(async move {
            if topic.is_empty() {
                return Err(EventBusError::InvalidTopic(topic));
            }
            let bytes =
                serde_json::to_vec(&payload).map_err(|e| EventBusError::PublishFailed {
                    topic: topic.clone(),
                    reason: e.to_string(),
                })?;

            let mut state = self.state();
            state.published.push((topic.clone(), payload));
            let message = state.assign_offset(BrokerMessage::new(topic, bytes));
            state.deliver(Scripted::Item(Ok(message)), true);
            Ok(())
        })
    }

    fn subscribe(
        &self,
        topics: &[&str],
        group_id: &str,
    ) -> Pin<Box<dyn Future<Output = Result<MessageStream, EventBusError>> + Send + '_>> {
        let topics: Vec<String> = topics.iter().map(|t| (*t).to_string()).collect();
        let group_id = group_id.to_string();

        Box::pin(async move {
            let mut state = self.state();
            state.subscribe_calls += 1;

            if let Some(reason) = state.subscribe_failure.clone() {
                return Err(EventBusError::SubscriptionFailed { topics, reason });
            }
            if topics.iter().any(String::is_empty) {
                return Err(EventBusError::InvalidTopic(String::new()));
            }

            let (sender, mut receiver) = mpsc::unbounded_channel();
            let mut closed = false;
            for scripted in std::mem::take(&mut state.backlog) {
                if closed {
                    // Scripted after the close; keep it for the next subscriber.
                    state.backlog.push(scripted);
                    continue;
                }
                match scripted {
                    Scripted::Item(item) => {
                        let _ = sender.send(item);
                    }
                    Scripted::Close => closed = true,
                }
            }
            if !closed {
                state.subscribers.push(Subscriber {
                    topics,
                    group_id,
                    sender,
                });
            }
            drop(state);

            let messages: MessageStream = Box::pin(stream! {
                while let Some(item) = receiver.recv().await {
                    yield item;
                }
            });
            Ok(messages)
        })
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::helpers::{json_message, payload, raw_message};
    use futures::StreamExt;
    use serde_json::json;

    #[tokio::test]
    async fn backlog_is_replayed_to_first_subscriber() {
        let bus = InMemoryEventBus::new();
        bus.inject(json_message("order.created", &json!({"order_id": 1})));
        bus.inject(raw_message("order.created", b"not json"));
        bus.close();

        let mut stream = bus.subscribe(&["order.created"], "group").await.unwrap();

        let first = stream.next().await.unwrap().unwrap();
        assert_eq!(first.offset, 0);
        let second = stream.next().await.unwrap().unwrap();
        assert_eq!(second.offset, 1);
        assert_eq!(second.payload, b"not json");
        assert!(stream.next().await.is_none());
    }

    #[tokio::test]
    async fn publish_respects_topic_subscriptions() {
        let bus = InMemoryEventBus::new();
        let mut stream = bus.subscribe(&["stock.low"], "group").await.unwrap();

        tokio_test::assert_ok!(
            bus.publish("user.created", &payload(json!({"email": "a@b.c"})))
                .await
        );
        tokio_test::assert_ok!(bus.publish("stock.low", &payload(json!({"stock": 2}))).await);
        bus.close();

        let message = stream.next().await.unwrap().unwrap();
        assert_eq!(message.topic, "stock.low");
        assert!(stream.next().await.is_none());
        assert_eq!(bus.published().len(), 2);
    }

    #[tokio::test]
    async fn transport_errors_reach_the_stream() {
        let bus = InMemoryEventBus::new();
        let mut stream = bus.subscribe(&["stock.low"], "group").await.unwrap();
        assert_eq!(bus.group_ids(), vec!["group".to_string()]);

        bus.inject_transport_error("broker went away");

        let item = stream.next().await.unwrap();
        assert_eq!(
            item.unwrap_err(),
            EventBusError::TransportError("broker went away".to_string())
        );
    }

    #[tokio::test]
    async fn subscription_failure_is_reported() {
        let bus = InMemoryEventBus::new();
        bus.fail_subscriptions("connection refused");

        let result = bus.subscribe(&["stock.low"], "group").await;

        assert!(matches!(result, Err(EventBusError::SubscriptionFailed { .. })));
        assert_eq!(bus.subscribe_calls(), 1);
        assert_eq!(bus.subscriber_count(), 0);
    }
}
