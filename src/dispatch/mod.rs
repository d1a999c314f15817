//! Event ingestion and fan-out to handlers.
//!
//! `collect` updates the topic's event state and enqueues the event on every
//! handler registered for the topic, all under the topic's write lock. That
//! lock is what gives each (topic, handler) pair collect-order delivery, and
//! what makes registration changes apply from the next event on. Handler
//! execution happens on per-handler worker threads and is never awaited.

/// Topic to handler registrations.
pub mod registry;
/// Per-handler worker threads.
mod worker;

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::AlertResult;
use crate::event::Event;
use crate::topic::Topics;

pub use registry::HandlerRegistry;
pub(crate) use registry::{HandlerSet, SpecWorker};

/// Dispatch configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DispatchConfig {
    /// Queued events per handler at which a backlog warning is logged.
    /// Events are never dropped.
    pub backlog_warn_threshold: usize,
    /// Name prefix of handler worker threads.
    pub thread_name_prefix: String,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            backlog_warn_threshold: 1024,
            thread_name_prefix: "alert-handler".to_string(),
        }
    }
}

/// Delivery counters shared by every handler worker.
#[derive(Debug, Default)]
pub struct DispatchStats {
    pub(crate) delivered: AtomicU64,
    pub(crate) failed: AtomicU64,
    pub(crate) dropped: AtomicU64,
}

impl DispatchStats {
    /// Point-in-time copy of the counters.
    #[must_use]
    pub fn snapshot(&self) -> DispatchCounts {
        DispatchCounts {
            delivered: self.delivered.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
            dropped: self.dropped.load(Ordering::Relaxed),
        }
    }
}

/// Snapshot of [`DispatchStats`].
#[allow(missing_docs)]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DispatchCounts {
    pub delivered: u64,
    pub failed: u64,
    pub dropped: u64,
}

/// Ingestion entry point.
#[derive(Debug, Clone)]
pub struct Dispatcher {
    topics: Arc<Topics>,
}

impl Dispatcher {
    /// Creates a dispatcher over `topics`.
    #[must_use]
    pub const fn new(topics: Arc<Topics>) -> Self {
        Self { topics }
    }

    /// Accepts an event: updates its state, then hands it to every handler
    /// currently registered on its topic. Returns without waiting for handlers.
    ///
    /// # Errors
    ///
    /// Returns a validation error for an empty topic or event id, and
    /// `TopicClosed` if the topic is closed or restoring.
    pub fn collect(&self, event: Event) -> AlertResult<()> {
        event.validate()?;
        let event = Arc::new(event);
        let handlers = self
            .topics
            .with_entry_mut(&event.topic, true, |entry| {
                entry.apply(&event.topic, &event)?;
                entry.handlers.dispatch(&event);
                Ok(entry.handlers.len())
            })?
            .unwrap_or(0);
        debug!(
            topic = %event.topic,
            event_id = %event.id,
            level = %event.level,
            handlers,
            "event collected"
        );
        Ok(())
    }
}
