//! Handler registry: the static mapping from topic name to handler.
//!
//! The registry is built once at startup from a fixed list of
//! [`Registration`]s and is read-only afterwards, so it can be shared behind an
//! `Arc` without locking. Construction fails fast on a duplicate or empty
//! topic instead of silently overwriting the earlier handler.
//!
//! # Example
//!
//! ```
//! use notification_worker_runtime::registry::{HandlerRegistry, Registration};
//! use notification_worker_runtime::HandlerError;
//! use notification_worker_core::EventEnvelope;
//!
//! fn on_stock_low(envelope: &EventEnvelope) -> Result<(), HandlerError> {
//!     let stock = envelope.require_i64("stock")?;
//!     tracing::warn!(stock, "Low stock");
//!     Ok(())
//! }
//!
//! let registry = HandlerRegistry::new([Registration::new("stock.low", on_stock_low)]).unwrap();
//! assert!(registry.lookup("stock.low").is_some());
//! assert!(registry.lookup("unknown.topic").is_none());
//! ```

use crate::error::{HandlerError, RegistryError};
use notification_worker_core::envelope::EventEnvelope;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

/// Processing function bound to a topic.
///
/// Handlers run synchronously and to completion; the dispatcher invokes at
/// most one handler at a time per worker. Any error returned here is contained
/// by the dispatcher and never stops the consumer loop.
pub trait Handler: Send + Sync {
    /// Process one envelope.
    ///
    /// # Errors
    ///
    /// Returns a [`HandlerError`] describing why the envelope could not be
    /// processed. Payload shape problems should use
    /// [`HandlerError::InvalidPayload`] (the `?` conversion from envelope field
    /// accessors does this automatically).
    fn handle(&self, envelope: &EventEnvelope) -> Result<(), HandlerError>;
}

impl<F> Handler for F
where
    F: Fn(&EventEnvelope) -> Result<(), HandlerError> + Send + Sync,
{
    fn handle(&self, envelope: &EventEnvelope) -> Result<(), HandlerError> {
        self(envelope)
    }
}

/// A `(topic, handler)` pair supplied at startup.
#[derive(Clone)]
pub struct Registration {
    topic: String,
    handler: Arc<dyn Handler>,
}

impl Registration {
    /// Bind `handler` to `topic`.
    #[must_use]
    pub fn new(topic: impl Into<String>, handler: impl Handler + 'static) -> Self {
        Self {
            topic: topic.into(),
            handler: Arc::new(handler),
        }
    }

    /// Topic this registration is for.
    #[must_use]
    pub fn topic(&self) -> &str {
        &self.topic
    }
}

impl fmt::Debug for Registration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Registration")
            .field("topic", &self.topic)
            .field("handler", &"<handler>")
            .finish()
    }
}

/// Immutable topic → handler mapping.
#[derive(Clone, Default)]
pub struct HandlerRegistry {
    handlers: HashMap<String, Arc<dyn Handler>>,
}

impl HandlerRegistry {
    /// Build the registry from a fixed list of registrations.
    ///
    /// # Errors
    ///
    /// - [`RegistryError::EmptyTopic`] if any registration has an empty topic
    /// - [`RegistryError::DuplicateTopic`] if two registrations share a topic
    pub fn new(
        registrations: impl IntoIterator<Item = Registration>,
    ) -> Result<Self, RegistryError> {
        let mut handlers: HashMap<String, Arc<dyn Handler>> = HashMap::new();

        for registration in registrations {
            if registration.topic.is_empty() {
                return Err(RegistryError::EmptyTopic);
            }
            if handlers.contains_key(&registration.topic) {
                return Err(RegistryError::DuplicateTopic(registration.topic));
            }
            handlers.insert(registration.topic, registration.handler);
        }

        tracing::debug!(handler_count = handlers.len(), "Handler registry built");

        Ok(Self { handlers })
    }

    /// Handler for `topic`, or `None` when the topic is unregistered.
    ///
    /// An absent handler is not an error here; the dispatcher reports it as
    /// a `NoHandler` outcome.
    #[must_use]
    pub fn lookup(&self, topic: &str) -> Option<&dyn Handler> {
        self.handlers.get(topic).map(|handler| handler.as_ref())
    }

    /// Whether `topic` has a handler.
    #[must_use]
    pub fn contains(&self, topic: &str) -> bool {
        self.handlers.contains_key(topic)
    }

    /// Registered topics, sorted.
    #[must_use]
    pub fn topics(&self) -> Vec<&str> {
        let mut topics: Vec<&str> = self.handlers.keys().map(String::as_str).collect();
        topics.sort_unstable();
        topics
    }

    /// Number of registered handlers.
    #[must_use]
    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    /// Whether the registry has no handlers.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }
}

impl fmt::Debug for HandlerRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HandlerRegistry")
            .field("topics", &self.topics())
            .finish()
    }
}
