//! Event envelopes and the raw broker messages they are decoded from.
//!
//! An [`EventEnvelope`] is one unit of event data consumed from the broker,
//! tagged with the topic it arrived on. Producers emit JSON objects; the worker
//! keeps the payload as an untyped string-keyed map and lets each handler read
//! the fields it cares about.
//!
//! # Design
//!
//! Decoding is split from dispatch on purpose: a [`BrokerMessage`] carries the
//! raw bytes exactly as they came off the wire, and [`EventEnvelope::decode`]
//! turns them into a structured payload. A decode failure is reported as
//! [`EnvelopeError::Deserialization`] and is distinct from any error a handler
//! raises afterwards.
//!
//! # Example
//!
//! ```
//! use notification_worker_core::envelope::{BrokerMessage, EventEnvelope};
//! use chrono::Utc;
//!
//! let message = BrokerMessage::new(
//!     "order.created",
//!     br#"{"order_id": 123, "user_id": 456, "total_amount": 99.99}"#.to_vec(),
//! );
//!
//! let envelope = EventEnvelope::decode(&message, Utc::now()).unwrap();
//! assert_eq!(envelope.topic(), "order.created");
//! assert_eq!(envelope.require_i64("order_id").unwrap(), 123);
//! ```

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::fmt;
use thiserror::Error;

/// Structured event payload: a string-keyed map of heterogeneous JSON values.
pub type Payload = serde_json::Map<String, Value>;

/// Errors produced while decoding an envelope or reading its fields.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum EnvelopeError {
    /// The message was published without a topic.
    #[error("Envelope topic must not be empty")]
    EmptyTopic,

    /// The payload bytes are not a JSON object.
    #[error("Failed to deserialize payload: {0}")]
    Deserialization(String),

    /// A required field is absent from the payload.
    #[error("Missing payload field '{0}'")]
    MissingField(String),

    /// A field is present but holds the wrong JSON type.
    #[error("Payload field '{field}' is not a {expected}")]
    FieldType {
        /// Field name
        field: String,
        /// Expected JSON type
        expected: &'static str,
    },

    /// The payload does not match the shape a handler asked for.
    #[error("Payload does not match expected shape: {0}")]
    InvalidPayload(String),
}

/// A raw message pulled from the broker, before decoding.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BrokerMessage {
    /// Topic the message was published to
    pub topic: String,

    /// Partition the message was read from
    pub partition: i32,

    /// Offset within the partition
    pub offset: i64,

    /// Optional message key
    pub key: Option<Vec<u8>>,

    /// Raw payload bytes (JSON encoded by producers)
    pub payload: Vec<u8>,

    /// Producer or broker timestamp, when the broker supplies one
    pub timestamp: Option<DateTime<Utc>>,
}

impl BrokerMessage {
    /// Create a message with no key, no timestamp and a zero position.
    ///
    /// Mostly useful for in-memory buses and tests; real brokers fill in the
    /// position fields.
    #[must_use]
    pub fn new(topic: impl Into<String>, payload: Vec<u8>) -> Self {
        Self {
            topic: topic.into(),
            partition: 0,
            offset: 0,
            key: None,
            payload,
            timestamp: None,
        }
    }

    /// Set the partition and offset.
    #[must_use]
    pub const fn with_position(mut self, partition: i32, offset: i64) -> Self {
        self.partition = partition;
        self.offset = offset;
        self
    }

    /// Set the producer timestamp.
    #[must_use]
    pub const fn with_timestamp(mut self, timestamp: DateTime<Utc>) -> Self {
        self.timestamp = Some(timestamp);
        self
    }
}

impl fmt::Display for BrokerMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "BrokerMessage {{ topic: {}, partition: {}, offset: {}, size: {} bytes }}",
            self.topic,
            self.partition,
            self.offset,
            self.payload.len()
        )
    }
}

/// One unit of event data consumed from the broker, tagged with a topic.
///
/// Envelopes are created per received message and dropped once dispatch
/// completes. They are never persisted or retried by the worker.
#[derive(Clone, Debug, PartialEq)]
pub struct EventEnvelope {
    topic: String,
    payload: Payload,
    received_at: DateTime<Utc>,
    produced_at: Option<DateTime<Utc>>,
    partition: i32,
    offset: i64,
}

impl EventEnvelope {
    /// Build an envelope directly from a topic and payload.
    ///
    /// # Errors
    ///
    /// Returns [`EnvelopeError::EmptyTopic`] if `topic` is empty.
    pub fn new(
        topic: impl Into<String>,
        payload: Payload,
        received_at: DateTime<Utc>,
    ) -> Result<Self, EnvelopeError> {
        let topic = topic.into();
        if topic.is_empty() {
            return Err(EnvelopeError::EmptyTopic);
        }
        Ok(Self {
            topic,
            payload,
            received_at,
            produced_at: None,
            partition: 0,
            offset: 0,
        })
    }

    /// Decode a raw broker message into an envelope.
    ///
    /// `received_at` is the consumption timestamp assigned by the consumer loop.
    ///
    /// # Errors
    ///
    /// - [`EnvelopeError::EmptyTopic`] if the message has no topic
    /// - [`EnvelopeError::Deserialization`] if the bytes are not valid JSON or
    ///   the JSON value is not an object
    pub fn decode(
        message: &BrokerMessage,
        received_at: DateTime<Utc>,
    ) -> Result<Self, EnvelopeError> {
        if message.topic.is_empty() {
            return Err(EnvelopeError::EmptyTopic);
        }

        let value: Value = serde_json::from_slice(&message.payload)
            .map_err(|e| EnvelopeError::Deserialization(e.to_string()))?;

        let Value::Object(payload) = value else {
            return Err(EnvelopeError::Deserialization(format!(
                "expected a JSON object, found {}",
                json_type_name(&value)
            )));
        };

        Ok(Self {
            topic: message.topic.clone(),
            payload,
            received_at,
            produced_at: message.timestamp,
            partition: message.partition,
            offset: message.offset,
        })
    }

    /// Topic the envelope arrived on.
    #[must_use]
    pub fn topic(&self) -> &str {
        &self.topic
    }

    /// The decoded payload.
    #[must_use]
    pub const fn payload(&self) -> &Payload {
        &self.payload
    }

    /// When the consumer pulled the message.
    #[must_use]
    pub const fn received_at(&self) -> DateTime<Utc> {
        self.received_at
    }

    /// Producer timestamp, if the broker supplied one.
    #[must_use]
    pub const fn produced_at(&self) -> Option<DateTime<Utc>> {
        self.produced_at
    }

    /// Partition the message was read from.
    #[must_use]
    pub const fn partition(&self) -> i32 {
        self.partition
    }

    /// Offset within the partition.
    #[must_use]
    pub const fn offset(&self) -> i64 {
        self.offset
    }

    /// Time between production and consumption, in seconds.
    ///
    /// Returns `None` without a producer timestamp. Clock skew between
    /// producer and consumer is clamped to zero.
    #[must_use]
    #[allow(clippy::cast_precision_loss)] // Lag in milliseconds fits comfortably in f64
    pub fn lag_seconds(&self) -> Option<f64> {
        self.produced_at.map(|produced| {
            let millis = (self.received_at - produced).num_milliseconds().max(0);
            millis as f64 / 1000.0
        })
    }

    /// Raw access to a payload field.
    #[must_use]
    pub fn field(&self, key: &str) -> Option<&Value> {
        self.payload.get(key)
    }

    /// Read an optional string field. Non-string values are treated as absent.
    #[must_use]
    pub fn optional_str(&self, key: &str) -> Option<&str> {
        self.payload.get(key).and_then(Value::as_str)
    }

    /// Read a required string field.
    ///
    /// # Errors
    ///
    /// [`EnvelopeError::MissingField`] or [`EnvelopeError::FieldType`].
    pub fn require_str(&self, key: &str) -> Result<&str, EnvelopeError> {
        self.require(key)?
            .as_str()
            .ok_or_else(|| type_error(key, "string"))
    }

    /// Read a required integer field.
    ///
    /// # Errors
    ///
    /// [`EnvelopeError::MissingField`] or [`EnvelopeError::FieldType`].
    pub fn require_i64(&self, key: &str) -> Result<i64, EnvelopeError> {
        self.require(key)?
            .as_i64()
            .ok_or_else(|| type_error(key, "integer"))
    }

    /// Read a required numeric field. Integers are widened to `f64`.
    ///
    /// # Errors
    ///
    /// [`EnvelopeError::MissingField`] or [`EnvelopeError::FieldType`].
    pub fn require_f64(&self, key: &str) -> Result<f64, EnvelopeError> {
        self.require(key)?
            .as_f64()
            .ok_or_else(|| type_error(key, "number"))
    }

    /// Deserialize the whole payload into a typed structure.
    ///
    /// # Errors
    ///
    /// Returns [`EnvelopeError::InvalidPayload`] if the payload does not fit `T`.
    pub fn decode_payload<T: DeserializeOwned>(&self) -> Result<T, EnvelopeError> {
        serde_json::from_value(Value::Object(self.payload.clone()))
            .map_err(|e| EnvelopeError::InvalidPayload(e.to_string()))
    }

    fn require(&self, key: &str) -> Result<&Value, EnvelopeError> {
        match self.payload.get(key) {
            None | Some(Value::Null) => Err(EnvelopeError::MissingField(key.to_string())),
            Some(value) => Ok(value),
        }
    }
}

impl fmt::Display for EventEnvelope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "EventEnvelope {{ topic: {}, fields: {}, partition: {}, offset: {} }}",
            self.topic,
            self.payload.len(),
            self.partition,
            self.offset
        )
    }
}

fn type_error(field: &str, expected: &'static str) -> EnvelopeError {
    EnvelopeError::FieldType {
        field: field.to_string(),
        expected,
    }
}

const fn json_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use serde::Deserialize;

    fn at(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(secs, 0).single().expect("valid timestamp")
    }

    #[test]
    fn decode_reads_object_payload() {
        let message = BrokerMessage::new(
            "order.created",
            br#"{"order_id": 123, "user_id": 456, "total_amount": 99.99}"#.to_vec(),
        )
        .with_position(2, 41);

        let envelope = EventEnvelope::decode(&message, at(100)).unwrap();

        assert_eq!(envelope.topic(), "order.created");
        assert_eq!(envelope.partition(), 2);
        assert_eq!(envelope.offset(), 41);
        assert_eq!(envelope.received_at(), at(100));
        assert_eq!(envelope.require_i64("order_id").unwrap(), 123);
        assert!((envelope.require_f64("total_amount").unwrap() - 99.99).abs() < f64::EPSILON);
    }

    #[test]
    fn decode_rejects_invalid_json() {
        let message = BrokerMessage::new("order.created", b"{not json".to_vec());
        let err = EventEnvelope::decode(&message, at(0)).unwrap_err();
        assert!(matches!(err, EnvelopeError::Deserialization(_)));
    }

    #[test]
    fn decode_rejects_non_object_json() {
        let message = BrokerMessage::new("order.created", b"[1, 2, 3]".to_vec());
        let err = EventEnvelope::decode(&message, at(0)).unwrap_err();
        assert_eq!(
            err,
            EnvelopeError::Deserialization("expected a JSON object, found array".to_string())
        );
    }

    #[test]
    fn decode_rejects_empty_topic() {
        let message = BrokerMessage::new("", b"{}".to_vec());
        assert_eq!(
            EventEnvelope::decode(&message, at(0)).unwrap_err(),
            EnvelopeError::EmptyTopic
        );
        assert_eq!(
            EventEnvelope::new("", Payload::new(), at(0)).unwrap_err(),
            EnvelopeError::EmptyTopic
        );
    }

    #[test]
    fn field_accessors_report_missing_and_mistyped_fields() {
        let message = BrokerMessage::new(
            "user.created",
            br#"{"username": "ada", "email": null, "age": "old"}"#.to_vec(),
        );
        let envelope = EventEnvelope::decode(&message, at(0)).unwrap();

        assert_eq!(envelope.require_str("username").unwrap(), "ada");
        assert_eq!(
            envelope.require_str("email").unwrap_err(),
            EnvelopeError::MissingField("email".to_string())
        );
        assert_eq!(
            envelope.require_i64("age").unwrap_err(),
            EnvelopeError::FieldType {
                field: "age".to_string(),
                expected: "integer",
            }
        );
        assert_eq!(envelope.optional_str("age"), Some("old"));
        assert_eq!(envelope.optional_str("missing"), None);
    }

    #[test]
    fn decode_payload_into_typed_struct() {
        #[derive(Deserialize)]
        struct StockLow {
            product_id: i64,
            stock: i64,
        }

        let message =
            BrokerMessage::new("stock.low", br#"{"product_id": 7, "stock": 2}"#.to_vec());
        let envelope = EventEnvelope::decode(&message, at(0)).unwrap();
        let typed: StockLow = envelope.decode_payload().unwrap();
        assert_eq!(typed.product_id, 7);
        assert_eq!(typed.stock, 2);

        let bad: Result<StockLow, _> = EventEnvelope::new("stock.low", Payload::new(), at(0))
            .unwrap()
            .decode_payload();
        assert!(matches!(bad, Err(EnvelopeError::InvalidPayload(_))));
    }

    #[test]
    fn lag_uses_producer_timestamp_and_clamps_skew() {
        let message = BrokerMessage::new("stock.low", b"{}".to_vec()).with_timestamp(at(10));
        let envelope = EventEnvelope::decode(&message, at(12)).unwrap();
        assert_eq!(envelope.lag_seconds(), Some(2.0));

        let skewed = EventEnvelope::decode(&message, at(5)).unwrap();
        assert_eq!(skewed.lag_seconds(), Some(0.0));

        let untimed = EventEnvelope::new("stock.low", Payload::new(), at(5)).unwrap();
        assert_eq!(untimed.lag_seconds(), None);
    }

    #[test]
    fn display_summarizes_message() {
        let message = BrokerMessage::new("chaos.injected", vec![1, 2, 3]).with_position(1, 9);
        let display = format!("{message}");
        assert!(display.contains("chaos.injected"));
        assert!(display.contains("3 bytes"));
    }

    mod properties {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            #[test]
            fn any_json_object_round_trips_through_decode(
                entries in proptest::collection::hash_map("[a-z_]{1,12}", any::<i64>(), 0..8)
            ) {
                let payload: Payload = entries
                    .iter()
                    .map(|(k, v)| (k.clone(), Value::from(*v)))
                    .collect();
                let bytes = serde_json::to_vec(&payload).unwrap();
                let message = BrokerMessage::new("user.created", bytes);

                let envelope = EventEnvelope::decode(&message, at(0)).unwrap();
                prop_assert_eq!(envelope.payload(), &payload);
                for (key, value) in &entries {
                    prop_assert_eq!(envelope.require_i64(key).unwrap(), *value);
                }
            }
        }
    }
}
