//! Topic lifecycle: close, delete and restore.
//!
//! ```text
//! Open ──close──▶ Closed
//!  │  ╲             │
//!  │   restore    restore
//!  │     ╲          │
//!  │      ▶ Restoring ──complete──▶ Open
//!  │            └────cancel/drop──▶ Closed
//!  └──delete (from any state)──▶ removed
//! ```

use std::collections::BTreeMap;
use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::error::{AlertError, AlertResult, StorageError};
use crate::event::EventState;

use super::{TopicState, Topics};

/// Durable source of previously known event states.
pub trait TopicStateSource: Send + Sync {
    /// Loads every persisted event state of `topic`, keyed by event id.
    ///
    /// # Errors
    ///
    /// Returns a storage error if the backend cannot be read.
    fn load_topic(&self, topic: &str) -> Result<BTreeMap<String, EventState>, StorageError>;
}

impl Topics {
    /// Closes a topic: state and handlers are kept, new events are refused.
    ///
    /// Closing a closed topic is a no-op. Closing a restoring topic abandons
    /// the restore.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` if the topic does not exist.
    pub fn close_topic(&self, topic: &str) -> AlertResult<()> {
        let prev = self
            .with_entry_mut(topic, false, |entry| {
                let prev = entry.state;
                entry.state = TopicState::Closed;
                Ok(prev)
            })?
            .ok_or_else(|| AlertError::topic_not_found(topic))?;
        if prev != TopicState::Closed {
            info!(topic, from = %prev, "topic closed");
        }
        Ok(())
    }

    /// Deletes a topic with all its event states and handler registrations.
    ///
    /// Deleting a missing topic is a no-op.
    ///
    /// # Errors
    ///
    /// Returns an internal error if a lock is poisoned.
    pub fn delete_topic(&self, topic: &str) -> AlertResult<()> {
        if let Some(events) = self.remove(topic)? {
            info!(topic, events, "topic deleted");
        }
        Ok(())
    }

    /// Puts a topic into the restoring state, creating it if needed.
    ///
    /// The caller repopulates event states with [`Topics::update_event`] and then
    /// calls [`RestoreHandle::complete`]. Dropping or cancelling the handle
    /// reverts the topic to closed. A newer restore supersedes an older one.
    ///
    /// # Errors
    ///
    /// Returns a validation error for an empty topic name.
    pub fn restore_topic(self: &Arc<Self>, topic: &str) -> AlertResult<RestoreHandle> {
        let generation = self.next_restore_generation();
        self.with_entry_mut(topic, true, |entry| {
            entry.restore_generation = generation;
            entry.state = TopicState::Restoring;
            Ok(())
        })?
        .ok_or_else(|| AlertError::internal("created topic vanished"))?;
        debug!(topic, generation, "topic restore started");
        Ok(RestoreHandle {
            topics: Arc::clone(self),
            topic: topic.to_string(),
            generation,
            finished: false,
        })
    }

    /// Restores a topic from `source` and reopens it.
    ///
    /// On a source failure the topic is left closed.
    ///
    /// # Errors
    ///
    /// Returns `Persistence` if the source fails, or the error of
    /// [`RestoreHandle::complete`].
    pub fn restore_topic_from(self: &Arc<Self>, topic: &str, source: &dyn TopicStateSource) -> AlertResult<usize> {
        let handle = self.restore_topic(topic)?;
        let states = source.load_topic(topic)?;
        let count = states.len();
        for (event_id, state) in states {
            if !handle.is_current()? {
                return Err(AlertError::RestoreAbandoned {
                    topic: topic.to_string(),
                });
            }
            self.update_event(topic, &event_id, state)?;
        }
        handle.complete()?;
        Ok(count)
    }
}

/// In-progress restore of one topic.
///
/// Dropping an unfinished handle cancels the restore.
#[derive(Debug)]
pub struct RestoreHandle {
    topics: Arc<Topics>,
    topic: String,
    generation: u64,
    finished: bool,
}

impl RestoreHandle {
    /// Topic being restored.
    #[must_use]
    pub fn topic(&self) -> &str {
        &self.topic
    }

    /// Whether this restore is still the one in progress.
    ///
    /// # Errors
    ///
    /// Returns an internal error if a lock is poisoned.
    pub fn is_current(&self) -> AlertResult<bool> {
        Ok(self
            .topics
            .with_entry(&self.topic, |e| {
                e.state == TopicState::Restoring && e.restore_generation == self.generation
            })?
            .unwrap_or(false))
    }

    /// Finishes the restore and reopens the topic.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` if the topic was deleted, or `RestoreAbandoned` if the
    /// restore was superseded or the topic closed meanwhile.
    pub fn complete(mut self) -> AlertResult<()> {
        self.finished = true;
        let generation = self.generation;
        let reopened = self
            .topics
            .with_entry_mut(&self.topic, false, |entry| {
                if entry.state == TopicState::Restoring && entry.restore_generation == generation {
                    entry.state = TopicState::Open;
                    Ok(true)
                } else {
                    Ok(false)
                }
            })?
            .ok_or_else(|| AlertError::topic_not_found(&self.topic))?;
        if !reopened {
            return Err(AlertError::RestoreAbandoned {
                topic: self.topic.clone(),
            });
        }
        info!(topic = %self.topic, "topic restored");
        Ok(())
    }

    /// Abandons the restore, leaving the topic closed.
    ///
    /// # Errors
    ///
    /// Returns an internal error if a lock is poisoned.
    pub fn cancel(mut self) -> AlertResult<()> {
        self.finished = true;
        self.revert()
    }

    fn revert(&self) -> AlertResult<()> {
        let generation = self.generation;
        let reverted = self
            .topics
            .with_entry_mut(&self.topic, false, |entry| {
                if entry.state == TopicState::Restoring && entry.restore_generation == generation {
                    entry.state = TopicState::Closed;
                    Ok(true)
                } else {
                    Ok(false)
                }
            })?
            .unwrap_or(false);
        if reverted {
            info!(topic = %self.topic, "topic restore cancelled");
        }
        Ok(())
    }
}

impl Drop for RestoreHandle {
    fn drop(&mut self) {
        if self.finished {
            return;
        }
        if let Err(err) = self.revert() {
            warn!(topic = %self.topic, error = %err, "failed to revert abandoned restore");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::Event;
    use crate::level::Level;

    struct FixedSource(BTreeMap<String, EventState>);

    impl TopicStateSource for FixedSource {
        fn load_topic(&self, _topic: &str) -> Result<BTreeMap<String, EventState>, StorageError> {
            Ok(self.0.clone())
        }
    }

    struct BrokenSource;

    impl TopicStateSource for BrokenSource {
        fn load_topic(&self, _topic: &str) -> Result<BTreeMap<String, EventState>, StorageError> {
            Err(StorageError::BackendError("offline".to_string()))
        }
    }

    fn collect(topics: &Topics, topic: &str, id: &str, level: Level) -> AlertResult<()> {
        let event = Event::new(topic, id, level);
        topics
            .with_entry_mut(topic, true, |entry| entry.apply(topic, &event))
            .map(|_| ())
    }

    #[test]
    fn test_close_keeps_state_and_refuses_events() {
        let topics = Topics::new();
        collect(&topics, "disk", "e1", Level::Warning).unwrap();
        topics.close_topic("disk").unwrap();
        topics.close_topic("disk").unwrap();

        assert!(collect(&topics, "disk", "e1", Level::Critical).unwrap_err().is_topic_closed());
        assert_eq!(topics.topic_status("disk").unwrap().level, Level::Warning);
        assert!(topics.close_topic("missing").unwrap_err().is_not_found());
    }

    #[test]
    fn test_delete_is_idempotent_and_resets() {
        let topics = Topics::new();
        collect(&topics, "disk", "e1", Level::Critical).unwrap();
        topics.close_topic("disk").unwrap();
        topics.delete_topic("disk").unwrap();
        topics.delete_topic("disk").unwrap();
        topics.delete_topic("never").unwrap();

        assert!(topics.topic_status("disk").unwrap_err().is_not_found());
        assert!(topics.topic_event_state("disk", "e1").unwrap().is_none());

        collect(&topics, "disk", "e2", Level::Info).unwrap();
        let status = topics.topic_status("disk").unwrap();
        assert_eq!(status.level, Level::Info);
        assert_eq!(status.collected, 1);
        assert!(topics.topic_event_state("disk", "e1").unwrap().is_none());
    }

    #[test]
    fn test_restore_complete_reopens() {
        let topics = Arc::new(Topics::new());
        collect(&topics, "disk", "e1", Level::Ok).unwrap();
        topics.close_topic("disk").unwrap();

        let handle = topics.restore_topic("disk").unwrap();
        assert_eq!(topics.topic_state("disk").unwrap(), Some(TopicState::Restoring));
        assert!(collect(&topics, "disk", "e1", Level::Info).unwrap_err().is_topic_closed());

        let seed = EventState::from_event(&Event::new("disk", "e9", Level::Critical));
        topics.update_event("disk", "e9", seed).unwrap();
        assert_eq!(topics.topic_status("disk").unwrap().level, Level::Critical);

        handle.complete().unwrap();
        assert_eq!(topics.topic_state("disk").unwrap(), Some(TopicState::Open));
        collect(&topics, "disk", "e1", Level::Info).unwrap();
    }

    #[test]
    fn test_dropped_restore_reverts_to_closed() {
        let topics = Arc::new(Topics::new());
        {
            let _handle = topics.restore_topic("fresh").unwrap();
        }
        assert_eq!(topics.topic_state("fresh").unwrap(), Some(TopicState::Closed));

        topics.restore_topic("fresh").unwrap().cancel().unwrap();
        assert_eq!(topics.topic_state("fresh").unwrap(), Some(TopicState::Closed));
    }

    #[test]
    fn test_superseded_restore_is_abandoned() {
        let topics = Arc::new(Topics::new());
        let first = topics.restore_topic("disk").unwrap();
        let second = topics.restore_topic("disk").unwrap();
        assert!(!first.is_current().unwrap());
        assert!(matches!(first.complete(), Err(AlertError::RestoreAbandoned { .. })));
        assert_eq!(topics.topic_state("disk").unwrap(), Some(TopicState::Restoring));
        second.complete().unwrap();
        assert_eq!(topics.topic_state("disk").unwrap(), Some(TopicState::Open));
    }

    #[test]
    fn test_restore_of_deleted_topic_fails() {
        let topics = Arc::new(Topics::new());
        let handle = topics.restore_topic("disk").unwrap();
        topics.delete_topic("disk").unwrap();
        assert!(handle.complete().unwrap_err().is_not_found());
    }

    #[test]
    fn test_restore_handle_from_deleted_topic_does_not_touch_new_restore() {
        let topics = Arc::new(Topics::new());
        let stale = topics.restore_topic("disk").unwrap();
        topics.delete_topic("disk").unwrap();
        let fresh = topics.restore_topic("disk").unwrap();

        assert!(!stale.is_current().unwrap());
        drop(stale);
        assert_eq!(topics.topic_state("disk").unwrap(), Some(TopicState::Restoring));

        let stale = {
            let h = topics.restore_topic("cpu").unwrap();
            topics.delete_topic("cpu").unwrap();
            h
        };
        let _cpu = topics.restore_topic("cpu").unwrap();
        assert!(matches!(stale.complete(), Err(AlertError::RestoreAbandoned { .. })));
        assert_eq!(topics.topic_state("cpu").unwrap(), Some(TopicState::Restoring));

        fresh.complete().unwrap();
        assert_eq!(topics.topic_state("disk").unwrap(), Some(TopicState::Open));
    }

    #[test]
    fn test_restore_from_source() {
        let topics = Arc::new(Topics::new());
        let mut states = BTreeMap::new();
        states.insert(
            "e1".to_string(),
            EventState::from_event(&Event::new("disk", "e1", Level::Warning)),
        );
        let n = topics.restore_topic_from("disk", &FixedSource(states)).unwrap();
        assert_eq!(n, 1);
        assert_eq!(topics.topic_state("disk").unwrap(), Some(TopicState::Open));
        assert_eq!(topics.topic_status("disk").unwrap().level, Level::Warning);

        let err = topics.restore_topic_from("cpu", &BrokenSource).unwrap_err();
        assert!(err.is_persistence());
        assert_eq!(topics.topic_state("cpu").unwrap(), Some(TopicState::Closed));
    }
}
