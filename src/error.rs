//! Error types for alertroute.
//!
//! All errors are strongly typed using thiserror so callers can match on the
//! specific condition (unknown topic, closed topic, rejected spec, ...).
//! Handler delivery failures are absent from `AlertError`: they
//! never reach the caller of `collect`.

use thiserror::Error;

use crate::topic::TopicState;

/// Validation errors raised synchronously by mutations.
#[derive(Debug, Error)]
pub enum ValidationError {
    #[error("Required field '{field}' is missing")]
    MissingField {
        field: String,
    },

    #[error("Handler spec '{id}' does not list any topics")]
    NoTopics {
        id: String,
    },

    #[error("Topic name cannot be empty")]
    EmptyTopic,

    #[error("Event id cannot be empty")]
    EmptyEventId,

    #[error("Invalid URL {url:?}: {reason}")]
    InvalidUrl {
        url: String,
        reason: String,
    },

    #[error("Invalid pattern {pattern:?}: {reason}")]
    InvalidPattern {
        pattern: String,
        reason: String,
    },

    #[error("Unknown level {value:?}")]
    UnknownLevel {
        value: String,
    },
}

/// Errors reported by pluggable persistence backends.
#[derive(Debug, Error)]
pub enum StorageError {
    /// Key already exists.
    #[error("Duplicate key: {0}")]
    DuplicateKey(String),

    /// Key does not exist.
    #[error("Key not found: {0}")]
    KeyNotFound(String),

    /// Backend error.
    #[error("Storage backend error: {0}")]
    BackendError(String),
}

/// Error returned by a handler for a single delivery.
///
/// Recorded by the dispatcher, never propagated to producers.
#[derive(Debug, Error)]
pub enum HandlerError {
    #[error("delivery failed: {0}")]
    Delivery(String),

    #[error("handler rejected event: {0}")]
    Rejected(String),
}

impl HandlerError {
    /// Creates a delivery error.
    #[must_use]
    pub fn delivery(message: impl Into<String>) -> Self {
        Self::Delivery(message.into())
    }
}

/// Top-level error type for alertroute.
#[derive(Debug, Error)]
pub enum AlertError {
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    #[error("{kind} not found: {name}")]
    NotFound {
        kind: &'static str,
        name: String,
    },

    #[error("{kind} already exists: {name}")]
    AlreadyExists {
        kind: &'static str,
        name: String,
    },

    #[error("Topic '{topic}' is not accepting events (state: {state})")]
    TopicClosed {
        topic: String,
        state: TopicState,
    },

    #[error("Restore of topic '{topic}' was abandoned")]
    RestoreAbandoned {
        topic: String,
    },

    #[error("Persistence error: {0}")]
    Persistence(#[from] StorageError),

    #[error("Internal error: {message}")]
    Internal {
        message: String,
    },
}

impl AlertError {
    /// Creates an internal error.
    #[must_use]
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    pub(crate) fn topic_not_found(topic: &str) -> Self {
        Self::NotFound {
            kind: "topic",
            name: topic.to_string(),
        }
    }

    pub(crate) fn spec_not_found(id: &str) -> Self {
        Self::NotFound {
            kind: "handler spec",
            name: id.to_string(),
        }
    }

    pub(crate) fn spec_exists(id: &str) -> Self {
        Self::AlreadyExists {
            kind: "handler spec",
            name: id.to_string(),
        }
    }

    /// Returns true if this is a validation error.
    #[must_use]
    pub const fn is_validation(&self) -> bool {
        matches!(self, Self::Validation(_))
    }

    /// Returns true if the referenced topic, event or spec does not exist.
    #[must_use]
    pub const fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }

    /// Returns true if the entity being created already exists.
    #[must_use]
    pub const fn is_already_exists(&self) -> bool {
        matches!(self, Self::AlreadyExists { .. })
    }

    /// Returns true if the topic refused an event because of its lifecycle state.
    #[must_use]
    pub const fn is_topic_closed(&self) -> bool {
        matches!(self, Self::TopicClosed { .. })
    }

    /// Returns true if a persistence backend failed.
    #[must_use]
    pub const fn is_persistence(&self) -> bool {
        matches!(self, Self::Persistence(_))
    }
}

/// Result type alias for alertroute operations.
pub type AlertResult<T> = Result<T, AlertError>;

pub(crate) fn lock_err(context: &'static str) -> AlertError {
    AlertError::internal(format!("poisoned lock: {context}"))
}
