//! Alert events and their materialized per-event state.
//!
//! An `Event` is what producers hand to `collect`. An `EventState` is what the
//! store remembers about the latest event for a (topic, event id) pair.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::error::ValidationError;
use crate::level::Level;

/// A timestamped, leveled occurrence identified within a topic.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    /// Topic the event is routed through.
    pub topic: String,
    /// Identifier of the event within its topic.
    pub id: String,
    /// Severity.
    pub level: Level,
    /// When the event was produced.
    pub time: DateTime<Utc>,
    /// Human readable message.
    #[serde(default)]
    pub message: String,
    /// Opaque payload.
    #[serde(default)]
    pub details: serde_json::Value,
}

impl Event {
    /// Creates an event stamped with the current time.
    #[must_use]
    pub fn new(topic: impl Into<String>, id: impl Into<String>, level: Level) -> Self {
        Self {
            topic: topic.into(),
            id: id.into(),
            level,
            time: Utc::now(),
            message: String::new(),
            details: serde_json::Value::Null,
        }
    }

    /// Sets the message.
    #[must_use]
    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = message.into();
        self
    }

    /// Sets the opaque details payload.
    #[must_use]
    pub fn with_details(mut self, details: serde_json::Value) -> Self {
        self.details = details;
        self
    }

    /// Overrides the event time.
    #[must_use]
    pub fn at(mut self, time: DateTime<Utc>) -> Self {
        self.time = time;
        self
    }

    /// Checks that the event can be routed.
    ///
    /// # Errors
    ///
    /// Returns an error if the topic or event id is empty.
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.topic.trim().is_empty() {
            return Err(ValidationError::EmptyTopic);
        }
        if self.id.trim().is_empty() {
            return Err(ValidationError::EmptyEventId);
        }
        Ok(())
    }
}

/// Latest known state of one (topic, event id) pair.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventState {
    /// Current level.
    pub level: Level,
    /// Message of the last event received.
    #[serde(default)]
    pub message: String,
    /// Details of the last event received.
    #[serde(default)]
    pub details: serde_json::Value,
    /// Time of the last event received.
    pub time: DateTime<Utc>,
    /// Time the level last changed.
    pub last_change: DateTime<Utc>,
    /// Whether the event still counts towards its topic's status.
    pub live: bool,
}

impl EventState {
    /// Builds a live state from a single event, as if seen for the first time.
    #[must_use]
    pub fn from_event(event: &Event) -> Self {
        Self {
            level: event.level,
            message: event.message.clone(),
            details: event.details.clone(),
            time: event.time,
            last_change: event.time,
            live: true,
        }
    }

    /// Next state after `event` arrives on top of `prev`.
    ///
    /// The state is replaced wholesale; only `last_change` is carried over,
    /// and only when the level did not change.
    #[must_use]
    pub fn advance(prev: Option<&Self>, event: &Event) -> Self {
        let mut next = Self::from_event(event);
        if let Some(prev) = prev {
            if prev.level == event.level {
                next.last_change = prev.last_change;
            }
        }
        next
    }

    /// How long the event has held its current level, as of its last update.
    #[must_use]
    pub fn duration(&self) -> Duration {
        self.time - self.last_change
    }
}
