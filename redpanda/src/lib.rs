//! Redpanda event bus for the notification worker.
//!
//! This crate provides a Kafka-compatible [`EventBus`] built on rdkafka. It
//! works against Redpanda, Apache Kafka or any other broker speaking the Kafka
//! protocol.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────┐      ┌────────────────────┐      ┌────────────────┐
//! │  StreamConsumer  │ ───► │  forwarding task   │ ───► │ mpsc (bounded) │ ───► MessageStream
//! │ (auto-commit on) │      │ Kafka msg → Broker │      │  buffer_size   │
//! └──────────────────┘      │      Message       │      └────────────────┘
//!                           └────────────────────┘
//! ```
//!
//! # Delivery Semantics
//!
//! Offsets are committed automatically by the client as messages are pulled,
//! independent of what the consumer does with them. A crash between the
//! commit and the end of processing loses that message's processing; it is
//! not redelivered. Ordering is preserved within a partition.
//!
//! A consume-level Kafka error is forwarded once as
//! [`EventBusError::TransportError`] and the subscription then ends. The
//! worker treats both as fatal and leaves reconnection to its supervisor.
//!
//! # Example
//!
//! ```no_run
//! use notification_worker_redpanda::RedpandaEventBus;
//! use notification_worker_core::event_bus::EventBus;
//! use futures::StreamExt;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let event_bus = RedpandaEventBus::new("localhost:9092")?;
//!
//! let mut payload = serde_json::Map::new();
//! payload.insert("order_id".to_string(), 123.into());
//! event_bus.publish("order.created", &payload).await?;
//!
//! let mut stream = event_bus
//!     .subscribe(&["order.created"], "notification-worker-group")
//!     .await?;
//! while let Some(result) = stream.next().await {
//!     match result {
//!         Ok(message) => println!("Received: {message}"),
//!         Err(e) => eprintln!("Error: {e}"),
//!     }
//! }
//! # Ok(())
//! # }
//! ```

use chrono::{DateTime, Utc};
use notification_worker_core::envelope::{BrokerMessage, Payload};
use notification_worker_core::event_bus::{EventBus, EventBusError, MessageStream};
use rdkafka::config::ClientConfig;
use rdkafka::consumer::{Consumer, StreamConsumer};
use rdkafka::message::{BorrowedMessage, Message};
use rdkafka::producer::{FutureProducer, FutureRecord};
use rdkafka::util::Timeout;
use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

const DEFAULT_ACKS: &str = "1";
const DEFAULT_COMPRESSION: &str = "none";
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(5);
const DEFAULT_MAX_RETRIES: u32 = 5;
const DEFAULT_AUTO_OFFSET_RESET: &str = "earliest";
const DEFAULT_SESSION_TIMEOUT: Duration = Duration::from_secs(45);
const DEFAULT_AUTO_COMMIT_INTERVAL: Duration = Duration::from_secs(5);
const DEFAULT_STARTUP_TIMEOUT: Duration = Duration::from_secs(10);
const DEFAULT_BUFFER_SIZE: usize = 1000;

/// Redpanda event bus implementation.
///
/// # Configuration
///
/// - **Broker addresses**: Bootstrap servers (required)
/// - **Producer settings**: Acks, compression, timeout, bounded retry count
/// - **Consumer settings**: Offset reset, session timeout, auto-commit interval
/// - **Startup timeout**: How long `subscribe` waits for broker metadata
/// - **Buffer size**: Messages buffered between the Kafka client and the subscriber
///
/// # Example
///
/// ```no_run
/// use notification_worker_redpanda::RedpandaEventBus;
/// use std::time::Duration;
///
/// # fn example() -> Result<(), Box<dyn std::error::Error>> {
/// // Basic configuration
/// let event_bus = RedpandaEventBus::new("localhost:9092")?;
///
/// // Custom configuration
/// let event_bus = RedpandaEventBus::builder()
///     .brokers("kafka-1:9092,kafka-2:9092")
///     .producer_acks("all")
///     .max_retries(3)
///     .startup_timeout(Duration::from_secs(30))
///     .build()?;
/// # Ok(())
/// # }
/// ```
pub struct RedpandaEventBus {
    producer: FutureProducer,
    brokers: String,
    timeout: Duration,
    auto_offset_reset: String,
    session_timeout: Duration,
    auto_commit_interval: Duration,
    startup_timeout: Duration,
    buffer_size: usize,
}

impl RedpandaEventBus {
    /// Create a new event bus with default configuration.
    ///
    /// # Errors
    ///
    /// Returns [`EventBusError::ConnectionFailed`] if the producer cannot be
    /// created from the given broker list.
    pub fn new(brokers: &str) -> Result<Self, EventBusError> {
        Self::builder().brokers(brokers).build()
    }

    /// Create a new builder for configuring the event bus.
    #[must_use]
    pub fn builder() -> RedpandaEventBusBuilder {
        RedpandaEventBusBuilder::default()
    }

    /// Configured broker addresses.
    #[must_use]
    pub fn brokers(&self) -> &str {
        &self.brokers
    }

    fn consumer_config(&self, group_id: &str) -> ClientConfig {
        let mut config = ClientConfig::new();
        config
            .set("bootstrap.servers", &self.brokers)
            .set("group.id", group_id)
            .set("enable.auto.commit", "true")
            .set(
                "auto.commit.interval.ms",
                self.auto_commit_interval.as_millis().to_string(),
            )
            .set("auto.offset.reset", &self.auto_offset_reset)
            .set(
                "session.timeout.ms",
                self.session_timeout.as_millis().to_string(),
            )
            .set("enable.partition.eof", "false");
        config
    }
}

/// Convert a Kafka message into the broker-neutral representation.
fn to_broker_message(message: &BorrowedMessage<'_>) -> BrokerMessage {
    BrokerMessage {
        topic: message.topic().to_string(),
        partition: message.partition(),
        offset: message.offset(),
        key: message.key().map(<[u8]>::to_vec),
        payload: message.payload().map(<[u8]>::to_vec).unwrap_or_default(),
        timestamp: message
            .timestamp()
            .to_millis()
            .and_then(DateTime::<Utc>::from_timestamp_millis),
    }
}

/// Builder for configuring a [`RedpandaEventBus`].
#[derive(Default)]
pub struct RedpandaEventBusBuilder {
    brokers: Option<String>,
    producer_acks: Option<String>,
    compression: Option<String>,
    timeout: Option<Duration>,
    max_retries: Option<u32>,
    auto_offset_reset: Option<String>,
    session_timeout: Option<Duration>,
    auto_commit_interval: Option<Duration>,
    startup_timeout: Option<Duration>,
    buffer_size: Option<usize>,
}

impl RedpandaEventBusBuilder {
    /// Set the broker addresses (comma-separated, e.g. `"kafka:9092"`).
    #[must_use]
    pub fn brokers(mut self, brokers: impl Into<String>) -> Self {
        self.brokers = Some(brokers.into());
        self
    }

    /// Set the producer acknowledgment mode: `"0"`, `"1"` or `"all"`.
    ///
    /// Default: `"1"`
    #[must_use]
    pub fn producer_acks(mut self, acks: impl Into<String>) -> Self {
        self.producer_acks = Some(acks.into());
        self
    }

    /// Set the compression codec: `"none"`, `"gzip"`, `"snappy"`, `"lz4"`, `"zstd"`.
    ///
    /// Default: `"none"`
    #[must_use]
    pub fn compression(mut self, compression: impl Into<String>) -> Self {
        self.compression = Some(compression.into());
        self
    }

    /// Set the producer send timeout.
    ///
    /// Default: 5 seconds
    #[must_use]
    pub const fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Set how many times the producer retries a failed send before giving up.
    ///
    /// Default: 5
    #[must_use]
    pub const fn max_retries(mut self, retries: u32) -> Self {
        self.max_retries = Some(retries);
        self
    }

    /// Set where a new consumer group starts reading: `"earliest"` or `"latest"`.
    ///
    /// Default: `"earliest"`
    #[must_use]
    pub fn auto_offset_reset(mut self, policy: impl Into<String>) -> Self {
        self.auto_offset_reset = Some(policy.into());
        self
    }

    /// Set the consumer group session timeout.
    ///
    /// Default: 45 seconds
    #[must_use]
    pub const fn session_timeout(mut self, timeout: Duration) -> Self {
        self.session_timeout = Some(timeout);
        self
    }

    /// Set how often pulled offsets are committed.
    ///
    /// Default: 5 seconds
    #[must_use]
    pub const fn auto_commit_interval(mut self, interval: Duration) -> Self {
        self.auto_commit_interval = Some(interval);
        self
    }

    /// Set how long `subscribe` waits for the broker to answer a metadata request.
    ///
    /// Default: 10 seconds
    #[must_use]
    pub const fn startup_timeout(mut self, timeout: Duration) -> Self {
        self.startup_timeout = Some(timeout);
        self
    }

    /// Set the message buffer size for subscriptions.
    ///
    /// Values below 1 are treated as 1. Default: 1000
    #[must_use]
    pub fn buffer_size(mut self, buffer_size: usize) -> Self {
        self.buffer_size = Some(buffer_size.max(1));
        self
    }

    /// Build the [`RedpandaEventBus`].
    ///
    /// Creating the producer does not contact the broker; reachability is
    /// checked when subscribing.
    ///
    /// # Errors
    ///
    /// Returns [`EventBusError::ConnectionFailed`] if brokers are not set or
    /// the producer configuration is rejected.
    pub fn build(self) -> Result<RedpandaEventBus, EventBusError> {
        let brokers = self
            .brokers
            .filter(|brokers| !brokers.trim().is_empty())
            .ok_or_else(|| EventBusError::ConnectionFailed("Brokers not configured".to_string()))?;

        let acks = self.producer_acks.as_deref().unwrap_or(DEFAULT_ACKS);
        let compression = self.compression.as_deref().unwrap_or(DEFAULT_COMPRESSION);
        let timeout = self.timeout.unwrap_or(DEFAULT_TIMEOUT);
        let max_retries = self.max_retries.unwrap_or(DEFAULT_MAX_RETRIES);

        let producer: FutureProducer = ClientConfig::new()
            .set("bootstrap.servers", &brokers)
            .set("message.timeout.ms", timeout.as_millis().to_string())
            .set("message.send.max.retries", max_retries.to_string())
            .set("acks", acks)
            .set("compression.type", compression)
            .create()
            .map_err(|e| {
                EventBusError::ConnectionFailed(format!("Failed to create producer: {e}"))
            })?;

        let bus = RedpandaEventBus {
            producer,
            brokers,
            timeout,
            auto_offset_reset: self
                .auto_offset_reset
                .unwrap_or_else(|| DEFAULT_AUTO_OFFSET_RESET.to_string()),
            session_timeout: self.session_timeout.unwrap_or(DEFAULT_SESSION_TIMEOUT),
            auto_commit_interval: self
                .auto_commit_interval
                .unwrap_or(DEFAULT_AUTO_COMMIT_INTERVAL),
            startup_timeout: self.startup_timeout.unwrap_or(DEFAULT_STARTUP_TIMEOUT),
            buffer_size: self.buffer_size.unwrap_or(DEFAULT_BUFFER_SIZE),
        };

        tracing::info!(
            brokers = %bus.brokers,
            acks,
            compression,
            max_retries,
            buffer_size = bus.buffer_size,
            auto_offset_reset = %bus.auto_offset_reset,
            "RedpandaEventBus created successfully"
        );

        Ok(bus)
    }
}

impl EventBus for RedpandaEventBus {
    fn publish(
        &self,
        topic: &str,
        payload: &Payload,
    ) -> Pin<Box<dyn Future<Output = Result<(), EventBusError>> + Send + '_>> {
        let topic = topic.to_string();
        let encoded = serde_json::to_vec(payload);
        let timeout = self.timeout;

        Box::pin(async move {
            if topic.is_empty() {
                return Err(EventBusError::InvalidTopic(topic));
            }
            let bytes = encoded.map_err(|e| EventBusError::PublishFailed {
                topic: topic.clone(),
                reason: format!("Failed to serialize payload: {e}"),
            })?;

            let record = FutureRecord::<(), [u8]>::to(&topic).payload(&bytes);

            match self.producer.send(record, Timeout::After(timeout)).await {
                Ok((partition, offset)) => {
                    tracing::debug!(
                        topic = %topic,
                        partition,
                        offset,
                        "Event published successfully"
                    );
                    Ok(())
                }
                Err((kafka_error, _)) => {
                    tracing::error!(
                        topic = %topic,
                        error = %kafka_error,
                        "Failed to publish event"
                    );
                    Err(EventBusError::PublishFailed {
                        topic,
                        reason: kafka_error.to_string(),
                    })
                }
            }
        })
    }

    fn subscribe(
        &self,
        topics: &[&str],
        group_id: &str,
    ) -> Pin<Box<dyn Future<Output = Result<MessageStream, EventBusError>> + Send + '_>> {
        let topics: Vec<String> = topics.iter().map(|s| (*s).to_string()).collect();
        let group_id = group_id.to_string();

        Box::pin(async move {
            let subscription_failed = |reason: String| EventBusError::SubscriptionFailed {
                topics: topics.clone(),
                reason,
            };

            if let Some(empty) = topics.iter().find(|topic| topic.is_empty()) {
                return Err(EventBusError::InvalidTopic(empty.clone()));
            }

            let consumer: StreamConsumer = self
                .consumer_config(&group_id)
                .create()
                .map_err(|e| subscription_failed(format!("Failed to create consumer: {e}")))?;

            // Metadata fetches block; keep them off the async worker threads.
            let startup_timeout = self.startup_timeout;
            let consumer = tokio::task::spawn_blocking(move || {
                consumer
                    .fetch_metadata(None, Timeout::After(startup_timeout))
                    .map(|_| consumer)
            })
            .await
            .map_err(|e| subscription_failed(format!("Broker check aborted: {e}")))?
            .map_err(|e| subscription_failed(format!("Broker unreachable: {e}")))?;

            let topic_refs: Vec<&str> = topics.iter().map(String::as_str).collect();
            consumer
                .subscribe(&topic_refs)
                .map_err(|e| subscription_failed(format!("Failed to subscribe to topics: {e}")))?;

            tracing::info!(
                topics = ?topics,
                group_id = %group_id,
                buffer_size = self.buffer_size,
                auto_offset_reset = %self.auto_offset_reset,
                auto_commit = true,
                "Subscribed to topics"
            );

            let (tx, mut rx) = tokio::sync::mpsc::channel(self.buffer_size);

            // The task owns the consumer; dropping it leaves the group.
            tokio::spawn(async move {
                use futures::StreamExt;

                let mut stream = consumer.stream();

                while let Some(result) = stream.next().await {
                    match result {
                        Ok(message) => {
                            let message = to_broker_message(&message);
                            tracing::trace!(
                                topic = %message.topic,
                                partition = message.partition,
                                offset = message.offset,
                                "Received message"
                            );
                            if tx.send(Ok(message)).await.is_err() {
                                tracing::debug!("Channel receiver dropped, exiting consumer task");
                                break;
                            }
                        }
                        Err(e) => {
                            tracing::error!(error = %e, "Kafka consume error");
                            let _ = tx
                                .send(Err(EventBusError::TransportError(format!(
                                    "Failed to receive message: {e}"
                                ))))
                                .await;
                            break;
                        }
                    }
                }

                tracing::debug!("Consumer task exiting");
            });

            let stream = async_stream::stream! {
                while let Some(result) = rx.recv().await {
                    yield result;
                }
            };

            Ok(Box::pin(stream) as MessageStream)
        })
    }
}
