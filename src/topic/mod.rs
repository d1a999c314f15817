//! Topic state: per-event states, derived topic status and lifecycle.
//!
//! Every topic owns one [`TopicEntry`] behind its own `RwLock`. The topic map
//! itself is only locked long enough to look up or insert an entry, so work on
//! unrelated topics never contends on the same lock.

/// EventState store operations.
mod events;
/// Close/delete/restore transitions.
pub mod lifecycle;
/// Topic status aggregation.
mod status;

use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};

use serde::{Deserialize, Serialize};

use crate::dispatch::HandlerSet;
use crate::error::{lock_err, AlertResult, ValidationError};
use crate::event::EventState;

pub use lifecycle::{RestoreHandle, TopicStateSource};
pub use status::TopicStatus;

/// Lifecycle state of a topic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TopicState {
    /// Accepting events.
    Open,
    /// State retained, events refused.
    Closed,
    /// Being repopulated from persisted state; events refused.
    Restoring,
    /// Removed. Only observed by operations racing with the deletion.
    Deleted,
}

impl TopicState {
    /// Whether `collect` may update this topic.
    #[must_use]
    pub const fn accepts_events(self) -> bool {
        matches!(self, Self::Open)
    }
}

impl fmt::Display for TopicState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Open => "open",
            Self::Closed => "closed",
            Self::Restoring => "restoring",
            Self::Deleted => "deleted",
        })
    }
}

/// Everything known about one topic.
#[derive(Debug)]
pub(crate) struct TopicEntry {
    pub(crate) state: TopicState,
    pub(crate) events: BTreeMap<String, EventState>,
    pub(crate) handlers: HandlerSet,
    pub(crate) collected: u64,
    pub(crate) restore_generation: u64,
}

impl TopicEntry {
    fn new() -> Self {
        Self {
            state: TopicState::Open,
            events: BTreeMap::new(),
            handlers: HandlerSet::default(),
            collected: 0,
            restore_generation: 0,
        }
    }
}

type SharedEntry = Arc<RwLock<TopicEntry>>;

/// Shared map of topic name to topic entry.
#[derive(Debug, Default)]
pub struct Topics {
    map: RwLock<HashMap<String, SharedEntry>>,
    /// Source of restore generations. Never reset, so a generation is unique
    /// across deletions and recreations of the same topic name.
    restore_seq: AtomicU64,
}

impl Topics {
    /// Creates an empty topic map.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn next_restore_generation(&self) -> u64 {
        self.restore_seq.fetch_add(1, Ordering::Relaxed) + 1
    }

    fn lookup(&self, topic: &str) -> AlertResult<Option<SharedEntry>> {
        let map = self.map.read().map_err(|_| lock_err("topics.lookup"))?;
        Ok(map.get(topic).cloned())
    }

    fn lookup_or_create(&self, topic: &str) -> AlertResult<SharedEntry> {
        if let Some(entry) = self.lookup(topic)? {
            return Ok(entry);
        }
        let mut map = self.map.write().map_err(|_| lock_err("topics.create"))?;
        Ok(Arc::clone(
            map.entry(topic.to_string())
                .or_insert_with(|| Arc::new(RwLock::new(TopicEntry::new()))),
        ))
    }

    /// Runs `f` against the topic's entry under its write lock.
    ///
    /// With `create` set, a missing topic is created in the open state.
    /// Returns `Ok(None)` if the topic does not exist and `create` is unset.
    /// An entry deleted while we waited for its lock is never handed to `f`:
    /// the lookup is retried so the caller sees a fresh topic or none.
    pub(crate) fn with_entry_mut<R>(
        &self,
        topic: &str,
        create: bool,
        mut f: impl FnMut(&mut TopicEntry) -> AlertResult<R>,
    ) -> AlertResult<Option<R>> {
        if topic.trim().is_empty() {
            return Err(ValidationError::EmptyTopic.into());
        }
        loop {
            let entry = if create {
                self.lookup_or_create(topic)?
            } else {
                match self.lookup(topic)? {
                    Some(entry) => entry,
                    None => return Ok(None),
                }
            };
            let mut guard = entry.write().map_err(|_| lock_err("topic.write"))?;
            if guard.state == TopicState::Deleted {
                continue;
            }
            return f(&mut guard).map(Some);
        }
    }

    /// Runs `f` against a consistent snapshot of the topic's entry.
    pub(crate) fn with_entry<R>(&self, topic: &str, f: impl FnOnce(&TopicEntry) -> R) -> AlertResult<Option<R>> {
        let Some(entry) = self.lookup(topic)? else {
            return Ok(None);
        };
        let guard = entry.read().map_err(|_| lock_err("topic.read"))?;
        if guard.state == TopicState::Deleted {
            return Ok(None);
        }
        Ok(Some(f(&guard)))
    }

    /// Removes a topic from the map and tombstones its entry.
    ///
    /// Returns the removed entry's event count, or `None` if the topic did not exist.
    pub(crate) fn remove(&self, topic: &str) -> AlertResult<Option<usize>> {
        let removed = {
            let mut map = self.map.write().map_err(|_| lock_err("topics.remove"))?;
            map.remove(topic)
        };
        let Some(entry) = removed else {
            return Ok(None);
        };
        let mut guard = entry.write().map_err(|_| lock_err("topic.write"))?;
        guard.state = TopicState::Deleted;
        guard.handlers.clear();
        let count = guard.events.len();
        guard.events.clear();
        Ok(Some(count))
    }

    /// Snapshot of every topic name with its entry, in name order.
    fn entries(&self) -> AlertResult<Vec<(String, SharedEntry)>> {
        let map = self.map.read().map_err(|_| lock_err("topics.entries"))?;
        let mut out: Vec<_> = map.iter().map(|(k, v)| (k.clone(), Arc::clone(v))).collect();
        out.sort_by(|a, b| a.0.cmp(&b.0));
        Ok(out)
    }

    /// Names of every existing topic, sorted.
    ///
    /// # Errors
    ///
    /// Returns an internal error if the topic map lock is poisoned.
    pub fn topic_names(&self) -> AlertResult<Vec<String>> {
        Ok(self.entries()?.into_iter().map(|(name, _)| name).collect())
    }

    /// Current lifecycle state of a topic, if it exists.
    ///
    /// # Errors
    ///
    /// Returns an internal error if a lock is poisoned.
    pub fn topic_state(&self, topic: &str) -> AlertResult<Option<TopicState>> {
        self.with_entry(topic, |e| e.state)
    }

    /// Number of handlers currently registered on a topic.
    ///
    /// # Errors
    ///
    /// Returns an internal error if a lock is poisoned.
    pub fn topic_handler_count(&self, topic: &str) -> AlertResult<usize> {
        Ok(self.with_entry(topic, |e| e.handlers.len())?.unwrap_or(0))
    }
}
