use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::error::{lock_err, AlertError, AlertResult};
use crate::glob::Glob;
use crate::level::Level;

use super::{TopicEntry, TopicState, Topics};

/// Derived status of a topic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TopicStatus {
    /// Most severe level among live events; `Ok` when none are live.
    pub level: Level,
    /// Number of events collected since the topic was created.
    pub collected: u64,
}

impl TopicEntry {
    pub(crate) fn status(&self) -> TopicStatus {
        let level = self
            .events
            .values()
            .filter(|s| s.live)
            .map(|s| s.level)
            .max()
            .unwrap_or(Level::Ok);
        TopicStatus {
            level,
            collected: self.collected,
        }
    }
}

impl Topics {
    /// Status of one topic.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` if the topic does not exist.
    pub fn topic_status(&self, topic: &str) -> AlertResult<TopicStatus> {
        self.with_entry(topic, TopicEntry::status)?
            .ok_or_else(|| AlertError::topic_not_found(topic))
    }

    /// Status of every topic matching `pattern` whose level is at least `min_level`.
    ///
    /// # Errors
    ///
    /// Returns a validation error for an uncompilable pattern.
    pub fn list_topic_status(&self, pattern: &str, min_level: Level) -> AlertResult<BTreeMap<String, TopicStatus>> {
        let glob = Glob::new(pattern)?;
        let mut out = BTreeMap::new();
        for (name, entry) in self.entries()? {
            if !glob.matches(&name) {
                continue;
            }
            let guard = entry.read().map_err(|_| lock_err("topic.read"))?;
            if guard.state == TopicState::Deleted {
                continue;
            }
            let status = guard.status();
            if status.level >= min_level {
                out.insert(name, status);
            }
        }
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::Event;

    fn collect(topics: &Topics, topic: &str, id: &str, level: Level) {
        let event = Event::new(topic, id, level);
        topics
            .with_entry_mut(topic, true, |entry| entry.apply(topic, &event))
            .unwrap();
    }

    #[test]
    fn test_status_is_max_live_level() {
        let topics = Topics::new();
        collect(&topics, "disk", "e1", Level::Warning);
        collect(&topics, "disk", "e2", Level::Critical);
        assert_eq!(topics.topic_status("disk").unwrap().level, Level::Critical);

        collect(&topics, "disk", "e2", Level::Ok);
        let status = topics.topic_status("disk").unwrap();
        assert_eq!(status.level, Level::Warning);
        assert_eq!(status.collected, 3);

        topics.clear_event("disk", "e1").unwrap();
        assert_eq!(topics.topic_status("disk").unwrap().level, Level::Ok);
    }

    #[test]
    fn test_status_of_empty_topic_is_ok() {
        let topics = Topics::new();
        topics.with_entry_mut("idle", true, |_| Ok(())).unwrap();
        assert_eq!(topics.topic_status("idle").unwrap().level, Level::Ok);
        assert!(topics.topic_status("missing").unwrap_err().is_not_found());
    }

    #[test]
    fn test_list_topic_status_filters_pattern_and_level() {
        let topics = Topics::new();
        collect(&topics, "host-a:cpu", "e1", Level::Critical);
        collect(&topics, "host-b:cpu", "e1", Level::Info);
        collect(&topics, "host-a:mem", "e1", Level::Warning);

        let all = topics.list_topic_status("", Level::Unknown).unwrap();
        assert_eq!(all.len(), 3);

        let cpu = topics.list_topic_status("*:cpu", Level::Warning).unwrap();
        assert_eq!(cpu.len(), 1);
        assert_eq!(cpu["host-a:cpu"].level, Level::Critical);

        assert!(topics.list_topic_status("nothing*", Level::Ok).unwrap().is_empty());
    }
}
