//! Handler registry: which handlers receive events of which topic.
//!
//! The per-topic handler set lives inside the topic entry so that dispatch,
//! registration and lifecycle changes on a topic are serialized by the same
//! lock. Anonymous handlers are keyed by the identity of their shared handle;
//! spec-backed handlers by their spec id.

use std::collections::{BTreeSet, HashMap};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, Weak};

use tracing::debug;

use crate::error::{lock_err, AlertResult};
use crate::event::Event;
use crate::handler::HandlerRef;
use crate::topic::Topics;

use super::worker::{handler_addr, HandlerKey, HandlerWorker};
use super::{DispatchConfig, DispatchStats};

/// Handlers registered on one topic.
#[derive(Debug, Default)]
pub(crate) struct HandlerSet {
    entries: Vec<Arc<HandlerWorker>>,
}

impl HandlerSet {
    pub(crate) fn len(&self) -> usize {
        self.entries.len()
    }

    pub(crate) fn clear(&mut self) {
        self.entries.clear();
    }

    fn position(&self, key: &HandlerKey) -> Option<usize> {
        self.entries.iter().position(|w| w.key() == key)
    }

    /// Adds the worker unless its key is already present.
    fn insert(&mut self, worker: &Arc<HandlerWorker>) -> bool {
        if self.position(worker.key()).is_some() {
            return false;
        }
        self.entries.push(Arc::clone(worker));
        true
    }

    /// Adds the worker, replacing any entry with the same key in place.
    fn upsert(&mut self, worker: &Arc<HandlerWorker>) {
        match self.position(worker.key()) {
            Some(idx) => self.entries[idx] = Arc::clone(worker),
            None => self.entries.push(Arc::clone(worker)),
        }
    }

    fn remove(&mut self, key: &HandlerKey) -> bool {
        match self.position(key) {
            Some(idx) => {
                self.entries.remove(idx);
                true
            }
            None => false,
        }
    }

    /// Enqueues the event on every registered handler.
    pub(crate) fn dispatch(&self, event: &Arc<Event>) {
        for worker in &self.entries {
            worker.enqueue(event);
        }
    }
}

/// Registry of live handlers across all topics.
#[derive(Debug)]
pub struct HandlerRegistry {
    topics: Arc<Topics>,
    cfg: DispatchConfig,
    stats: Arc<DispatchStats>,
    anon_workers: Mutex<HashMap<usize, Weak<HandlerWorker>>>,
    spawned: AtomicU64,
}

impl HandlerRegistry {
    /// Creates a registry over `topics`.
    #[must_use]
    pub fn new(topics: Arc<Topics>, cfg: DispatchConfig, stats: Arc<DispatchStats>) -> Self {
        Self {
            topics,
            cfg,
            stats,
            anon_workers: Mutex::new(HashMap::new()),
            spawned: AtomicU64::new(0),
        }
    }

    fn spawn(&self, key: HandlerKey, handler: HandlerRef) -> AlertResult<Arc<HandlerWorker>> {
        let seq = self.spawned.fetch_add(1, Ordering::Relaxed);
        HandlerWorker::spawn(key, handler, &self.cfg, seq, Arc::clone(&self.stats))
    }

    /// Worker for an anonymous handler, shared by every topic it is registered on.
    fn anon_worker(&self, handler: &HandlerRef) -> AlertResult<Arc<HandlerWorker>> {
        let addr = handler_addr(handler);
        let mut workers = self.anon_workers.lock().map_err(|_| lock_err("registry.anon_workers"))?;
        if let Some(worker) = workers.get(&addr).and_then(Weak::upgrade) {
            return Ok(worker);
        }
        workers.retain(|_, w| w.strong_count() > 0);
        let worker = self.spawn(HandlerKey::Anon(addr), Arc::clone(handler))?;
        workers.insert(addr, Arc::downgrade(&worker));
        Ok(worker)
    }

    /// Registers an anonymous handler on each topic.
    ///
    /// Registering the same handler twice on a topic is a no-op.
    ///
    /// # Errors
    ///
    /// Returns a validation error for an empty topic name, or an internal
    /// error if the worker thread cannot be started.
    pub fn register_anon(&self, topics: &[String], handler: &HandlerRef) -> AlertResult<()> {
        let worker = self.anon_worker(handler)?;
        for topic in topics {
            let added = self
                .topics
                .with_entry_mut(topic, true, |entry| Ok(entry.handlers.insert(&worker)))?
                .unwrap_or(false);
            if added {
                debug!(topic = %topic, handler = %worker.key(), "anonymous handler registered");
            }
        }
        Ok(())
    }

    /// Removes an anonymous handler from each topic. Absent entries are ignored.
    ///
    /// # Errors
    ///
    /// Returns an internal error if a lock is poisoned.
    pub fn deregister_anon(&self, topics: &[String], handler: &HandlerRef) -> AlertResult<()> {
        let key = HandlerKey::anon(handler);
        for topic in topics {
            if topic.trim().is_empty() {
                continue;
            }
            let removed = self
                .topics
                .with_entry_mut(topic, false, |entry| Ok(entry.handlers.remove(&key)))?
                .unwrap_or(false);
            if removed {
                debug!(topic = %topic, handler = %key, "anonymous handler deregistered");
            }
        }
        Ok(())
    }

    /// Starts the worker for a spec-backed handler without attaching it anywhere.
    pub(crate) fn prepare_spec(&self, id: &str, handler: HandlerRef) -> AlertResult<SpecWorker> {
        Ok(SpecWorker(self.spawn(HandlerKey::Spec(id.to_string()), handler)?))
    }

    /// Attaches a spec worker to `add`, then detaches the spec id from `remove`.
    ///
    /// Topics present in both keep an entry for the spec id at all times: the
    /// previous worker is swapped out in place.
    pub(crate) fn attach_spec(
        &self,
        worker: &SpecWorker,
        add: &BTreeSet<String>,
        remove: &BTreeSet<String>,
    ) -> AlertResult<()> {
        for topic in add {
            self.topics.with_entry_mut(topic, true, |entry| {
                entry.handlers.upsert(&worker.0);
                Ok(())
            })?;
        }
        let key = worker.0.key();
        for topic in remove.difference(add) {
            self.topics
                .with_entry_mut(topic, false, |entry| Ok(entry.handlers.remove(key)))?;
        }
        Ok(())
    }

    /// Detaches a spec id from every listed topic.
    pub(crate) fn detach_spec(&self, id: &str, topics: &BTreeSet<String>) -> AlertResult<()> {
        let key = HandlerKey::Spec(id.to_string());
        for topic in topics {
            self.topics
                .with_entry_mut(topic, false, |entry| Ok(entry.handlers.remove(&key)))?;
        }
        Ok(())
    }

    #[cfg(test)]
    pub(crate) fn has_spec(&self, topic: &str, id: &str) -> AlertResult<bool> {
        let key = HandlerKey::Spec(id.to_string());
        Ok(self
            .topics
            .with_entry(topic, |e| e.handlers.position(&key).is_some())?
            .unwrap_or(false))
    }
}

/// Started worker of a spec-backed handler, not yet attached to topics.
#[derive(Debug)]
pub(crate) struct SpecWorker(Arc<HandlerWorker>);
