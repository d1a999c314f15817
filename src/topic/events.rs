use std::collections::BTreeMap;

use crate::error::{AlertError, AlertResult};
use crate::event::{Event, EventState};
use crate::level::Level;

use super::{TopicEntry, Topics};

impl TopicEntry {
    /// Applies an accepted event to the entry's state.
    ///
    /// # Errors
    ///
    /// Returns `TopicClosed` unless the topic is open.
    pub(crate) fn apply(&mut self, topic: &str, event: &Event) -> AlertResult<()> {
        if !self.state.accepts_events() {
            return Err(AlertError::TopicClosed {
                topic: topic.to_string(),
                state: self.state,
            });
        }
        let next = EventState::advance(self.events.get(&event.id), event);
        self.events.insert(event.id.clone(), next);
        self.collected += 1;
        Ok(())
    }
}

impl Topics {
    /// Installs a previously known state for an event, bypassing dispatch.
    ///
    /// Allowed in every lifecycle state; a missing topic is created.
    ///
    /// # Errors
    ///
    /// Returns a validation error for an empty topic name.
    pub fn update_event(&self, topic: &str, event_id: &str, state: EventState) -> AlertResult<()> {
        self.with_entry_mut(topic, true, |entry| {
            entry.events.insert(event_id.to_string(), state.clone());
            Ok(())
        })?;
        Ok(())
    }

    /// Current state of one event.
    ///
    /// `None` means the event was never seen on the current incarnation of
    /// the topic. A cleared event is still returned, with `live == false`.
    ///
    /// # Errors
    ///
    /// Returns an internal error if a lock is poisoned.
    pub fn topic_event_state(&self, topic: &str, event_id: &str) -> AlertResult<Option<EventState>> {
        Ok(self
            .with_entry(topic, |entry| entry.events.get(event_id).cloned())?
            .flatten())
    }

    /// Live events of a topic at or above `min_level`, keyed by event id.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` if the topic does not exist.
    pub fn topic_status_events(&self, topic: &str, min_level: Level) -> AlertResult<BTreeMap<String, EventState>> {
        self.with_entry(topic, |entry| {
            entry
                .events
                .iter()
                .filter(|(_, s)| s.live && s.level >= min_level)
                .map(|(id, s)| (id.clone(), s.clone()))
                .collect()
        })?
        .ok_or_else(|| AlertError::topic_not_found(topic))
    }

    /// Marks an event as no longer live without forgetting it.
    ///
    /// Returns whether the event existed.
    ///
    /// # Errors
    ///
    /// Returns an internal error if a lock is poisoned.
    pub fn clear_event(&self, topic: &str, event_id: &str) -> AlertResult<bool> {
        Ok(self
            .with_entry_mut(topic, false, |entry| {
                Ok(entry.events.get_mut(event_id).map(|s| s.live = false).is_some())
            })?
            .unwrap_or(false))
    }
}

#[cfg(test)]
mod tests {
    use chrono::{Duration, Utc};

    use super::*;
    use crate::topic::TopicState;

    fn collect(topics: &Topics, event: &Event) -> AlertResult<()> {
        topics
            .with_entry_mut(&event.topic, true, |entry| entry.apply(&event.topic, event))
            .map(|_| ())
    }

    #[test]
    fn test_last_write_wins() {
        let topics = Topics::new();
        collect(&topics, &Event::new("disk", "e1", Level::Critical).with_message("a")).unwrap();
        collect(&topics, &Event::new("disk", "e1", Level::Info).with_message("b")).unwrap();

        let state = topics.topic_event_state("disk", "e1").unwrap().unwrap();
        assert_eq!(state.level, Level::Info);
        assert_eq!(state.message, "b");
        assert!(state.live);
    }

    #[test]
    fn test_apply_refused_when_closed() {
        let topics = Topics::new();
        collect(&topics, &Event::new("disk", "e1", Level::Ok)).unwrap();
        topics
            .with_entry_mut("disk", false, |e| {
                e.state = TopicState::Closed;
                Ok(())
            })
            .unwrap();
        let err = collect(&topics, &Event::new("disk", "e1", Level::Critical)).unwrap_err();
        assert!(err.is_topic_closed());
        assert_eq!(topics.topic_event_state("disk", "e1").unwrap().unwrap().level, Level::Ok);
    }

    #[test]
    fn test_status_events_filters_and_orders() {
        let topics = Topics::new();
        collect(&topics, &Event::new("disk", "b", Level::Critical)).unwrap();
        collect(&topics, &Event::new("disk", "a", Level::Warning)).unwrap();
        collect(&topics, &Event::new("disk", "c", Level::Info)).unwrap();

        let events = topics.topic_status_events("disk", Level::Warning).unwrap();
        let ids: Vec<_> = events.keys().cloned().collect();
        assert_eq!(ids, vec!["a".to_string(), "b".to_string()]);

        assert!(topics.clear_event("disk", "b").unwrap());
        assert!(!topics.clear_event("disk", "zz").unwrap());
        let events = topics.topic_status_events("disk", Level::Unknown).unwrap();
        assert_eq!(events.len(), 2);
        assert!(!events.contains_key("b"));
        assert!(!topics.topic_event_state("disk", "b").unwrap().unwrap().live);
    }

    #[test]
    fn test_status_events_unknown_topic() {
        let topics = Topics::new();
        assert!(topics.topic_status_events("nope", Level::Ok).unwrap_err().is_not_found());
        assert!(topics.topic_event_state("nope", "e1").unwrap().is_none());
    }

    #[test]
    fn test_update_event_installs_state_verbatim() {
        let topics = Topics::new();
        let t0 = Utc::now() - Duration::hours(1);
        let state = EventState {
            level: Level::Warning,
            message: "restored".to_string(),
            details: serde_json::Value::Null,
            time: t0,
            last_change: t0 - Duration::minutes(5),
            live: true,
        };
        topics.update_event("disk", "e1", state.clone()).unwrap();
        assert_eq!(topics.topic_event_state("disk", "e1").unwrap(), Some(state));
    }
}
