//! Error taxonomy for handlers and registry construction.
//!
//! Everything that originates in handler logic is recoverable and is reduced
//! to an [`ErrorKind`] label by the dispatcher. Registry errors are
//! configuration errors and surface before the consumer loop starts.
//! Transport errors live with the consumer loop (`ConsumerError`).

use notification_worker_core::envelope::EnvelopeError;
use std::fmt;
use thiserror::Error;

/// Classification of a contained per-message failure.
///
/// The string form is the `error_type` label on failure counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// The payload could not be parsed before reaching a handler.
    Deserialization,
    /// A handler found the payload shape unusable (missing or mistyped field).
    InvalidPayload,
    /// Any other error a handler returned.
    Processing,
    /// The handler panicked and the failure boundary caught the unwind.
    Panic,
}

impl ErrorKind {
    /// Metric label for this kind.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Deserialization => "deserialization",
            Self::InvalidPayload => "invalid_payload",
            Self::Processing => "processing",
            Self::Panic => "panic",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error returned by a handler.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum HandlerError {
    /// The payload bytes could not be decoded.
    #[error("Failed to deserialize payload: {0}")]
    Deserialization(String),

    /// The payload decoded but does not have the shape the handler needs.
    #[error("Invalid payload: {0}")]
    InvalidPayload(String),

    /// Handler-specific processing failure.
    #[error("Processing failed: {0}")]
    Processing(String),

    /// The handler panicked.
    #[error("Handler panicked: {0}")]
    Panicked(String),
}

impl HandlerError {
    /// Build a [`HandlerError::Processing`] from any displayable reason.
    #[must_use]
    pub fn processing(reason: impl fmt::Display) -> Self {
        Self::Processing(reason.to_string())
    }

    /// The [`ErrorKind`] this error is counted under.
    #[must_use]
    pub const fn kind(&self) -> ErrorKind {
        match self {
            Self::Deserialization(_) => ErrorKind::Deserialization,
            Self::InvalidPayload(_) => ErrorKind::InvalidPayload,
            Self::Processing(_) => ErrorKind::Processing,
            Self::Panicked(_) => ErrorKind::Panic,
        }
    }
}

impl From<EnvelopeError> for HandlerError {
    fn from(err: EnvelopeError) -> Self {
        match err {
            EnvelopeError::EmptyTopic | EnvelopeError::Deserialization(_) => {
                Self::Deserialization(err.to_string())
            }
            EnvelopeError::MissingField(_)
            | EnvelopeError::FieldType { .. }
            | EnvelopeError::InvalidPayload(_) => Self::InvalidPayload(err.to_string()),
        }
    }
}

impl From<serde_json::Error> for HandlerError {
    fn from(err: serde_json::Error) -> Self {
        Self::InvalidPayload(err.to_string())
    }
}

/// Configuration error raised while building the handler registry.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RegistryError {
    /// Two registrations share a topic.
    #[error("Topic '{0}' is already registered. Each topic must have exactly one handler.")]
    DuplicateTopic(String),

    /// A registration has an empty topic name.
    #[error("Handler registered with an empty topic name")]
    EmptyTopic,
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn kinds_map_to_metric_labels() {
        assert_eq!(ErrorKind::Deserialization.as_str(), "deserialization");
        assert_eq!(ErrorKind::InvalidPayload.to_string(), "invalid_payload");
        assert_eq!(HandlerError::processing("smtp down").kind(), ErrorKind::Processing);
        assert_eq!(HandlerError::Panicked("boom".into()).kind(), ErrorKind::Panic);
    }

    #[test]
    fn envelope_errors_split_into_deserialization_and_shape() {
        let decode: HandlerError = EnvelopeError::Deserialization("eof".into()).into();
        assert_eq!(decode.kind(), ErrorKind::Deserialization);

        let missing: HandlerError = EnvelopeError::MissingField("email".into()).into();
        assert_eq!(missing.kind(), ErrorKind::InvalidPayload);
        assert!(missing.to_string().contains("email"));
    }

    #[test]
    fn json_errors_are_shape_errors() {
        let err = serde_json::from_str::<u32>("\"nope\"").map_err(HandlerError::from);
        assert_eq!(err.unwrap_err().kind(), ErrorKind::InvalidPayload);
    }
}
