//! Capability traits of the alert service.
//!
//! Each trait is one narrow surface a collaborator needs: producers use
//! [`Events`], operator UIs use [`TopicQueries`], in-process subscribers use
//! [`AnonHandlerRegistrar`], persistence glue uses [`TopicPersister`] and
//! configuration APIs use [`HandlerSpecRegistrar`].

use std::collections::BTreeMap;

use crate::error::AlertResult;
use crate::event::{Event, EventState};
use crate::handler::{HandlerRef, HandlerSpec};
use crate::level::Level;
use crate::topic::{RestoreHandle, TopicStatus};

/// Accepting events and seeding event state.
pub trait Events {
    /// Accepts a new event for processing.
    ///
    /// # Errors
    ///
    /// Fails if the event is malformed or its topic does not accept events.
    fn collect(&self, event: Event) -> AlertResult<()>;

    /// Installs a previously known state for an event.
    ///
    /// # Errors
    ///
    /// Fails for an empty topic name.
    fn update_event(&self, topic: &str, event_id: &str, state: EventState) -> AlertResult<()>;

    /// Marks an event as no longer live. Returns whether it existed.
    ///
    /// # Errors
    ///
    /// Fails only on internal errors.
    fn clear_event(&self, topic: &str, event_id: &str) -> AlertResult<bool>;
}

/// Read-only queries over topics and their events.
pub trait TopicQueries {
    /// Status of one topic.
    ///
    /// # Errors
    ///
    /// `NotFound` for an unknown topic.
    fn topic_status(&self, topic: &str) -> AlertResult<TopicStatus>;

    /// Live events of a topic at or above `min_level`.
    ///
    /// # Errors
    ///
    /// `NotFound` for an unknown topic.
    fn topic_status_events(&self, topic: &str, min_level: Level) -> AlertResult<BTreeMap<String, EventState>>;

    /// Current state of one event; `None` if it was never seen.
    ///
    /// # Errors
    ///
    /// Fails only on internal errors.
    fn topic_event_state(&self, topic: &str, event_id: &str) -> AlertResult<Option<EventState>>;

    /// Status of every matching topic with at least `min_level`.
    ///
    /// # Errors
    ///
    /// Fails for an invalid pattern.
    fn list_topic_status(&self, pattern: &str, min_level: Level) -> AlertResult<BTreeMap<String, TopicStatus>>;
}

/// Registration of handlers that are not backed by a spec.
pub trait AnonHandlerRegistrar {
    /// Registers the handler on the listed topics.
    ///
    /// # Errors
    ///
    /// Fails for an empty topic name or if the handler worker cannot start.
    fn register_anon_handler(&self, topics: &[String], handler: &HandlerRef) -> AlertResult<()>;

    /// Removes the handler from the listed topics.
    ///
    /// # Errors
    ///
    /// Fails only on internal errors.
    fn deregister_anon_handler(&self, topics: &[String], handler: &HandlerRef) -> AlertResult<()>;
}

/// Control over the persistence lifecycle of topics.
pub trait TopicPersister {
    /// Closes a topic without deleting its state.
    ///
    /// # Errors
    ///
    /// `NotFound` for an unknown topic.
    fn close_topic(&self, topic: &str) -> AlertResult<()>;

    /// Deletes a topic and all state associated with it.
    ///
    /// # Errors
    ///
    /// Fails only on internal errors.
    fn delete_topic(&self, topic: &str) -> AlertResult<()>;

    /// Signals that a topic is about to be restored from persisted state.
    ///
    /// # Errors
    ///
    /// Fails for an empty topic name.
    fn restore_topic(&self, topic: &str) -> AlertResult<RestoreHandle>;
}

/// Registration and persistence of handler specs.
pub trait HandlerSpecRegistrar {
    /// Saves the spec and registers the handler it defines.
    ///
    /// # Errors
    ///
    /// Fails for invalid or duplicate specs or a persistence failure.
    fn register_handler_spec(&self, spec: HandlerSpec) -> AlertResult<()>;

    /// Deletes the spec and deregisters its handler.
    ///
    /// # Errors
    ///
    /// `NotFound` for an unknown id.
    fn deregister_handler_spec(&self, id: &str) -> AlertResult<()>;

    /// Replaces `old` with `new`, moving the handler between topics.
    ///
    /// # Errors
    ///
    /// Fails for an invalid `new`, an unknown `old` or a persistence failure.
    fn update_handler_spec(&self, old: &HandlerSpec, new: HandlerSpec) -> AlertResult<()>;

    /// Looks up a spec.
    ///
    /// # Errors
    ///
    /// `NotFound` for an unknown id.
    fn handler_spec(&self, id: &str) -> AlertResult<HandlerSpec>;

    /// Specs whose id matches `pattern`.
    ///
    /// # Errors
    ///
    /// Fails for an invalid pattern or a persistence failure.
    fn handler_specs(&self, pattern: &str) -> AlertResult<Vec<HandlerSpec>>;
}
