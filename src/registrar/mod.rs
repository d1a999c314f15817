//! Handler spec registrar.
//!
//! Keeps the persisted form of each handler spec and its live, registered
//! form consistent. Spec mutations are serialized with each other; they never
//! block event collection beyond the per-topic registry updates.

/// Spec persistence trait and in-memory backend.
pub mod store;

use std::collections::BTreeSet;
use std::sync::{Arc, Mutex};

use tracing::{info, warn};

use crate::dispatch::HandlerRegistry;
use crate::error::{lock_err, AlertError, AlertResult, StorageError};
use crate::glob::Glob;
use crate::handler::{HandlerFactory, HandlerSpec};

pub use store::{HandlerSpecStore, InMemoryHandlerSpecStore};

fn store_err(err: StorageError, id: &str) -> AlertError {
    match err {
        StorageError::DuplicateKey(_) => AlertError::spec_exists(id),
        StorageError::KeyNotFound(_) => AlertError::spec_not_found(id),
        other @ StorageError::BackendError(_) => AlertError::Persistence(other),
    }
}

/// Turns persisted specs into live handlers.
pub struct SpecRegistrar {
    store: Arc<dyn HandlerSpecStore>,
    factory: Arc<dyn HandlerFactory>,
    registry: Arc<HandlerRegistry>,
    ops: Mutex<()>,
}

impl std::fmt::Debug for SpecRegistrar {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SpecRegistrar").finish_non_exhaustive()
    }
}

impl SpecRegistrar {
    /// Creates a registrar.
    #[must_use]
    pub fn new(
        store: Arc<dyn HandlerSpecStore>,
        factory: Arc<dyn HandlerFactory>,
        registry: Arc<HandlerRegistry>,
    ) -> Self {
        Self {
            store,
            factory,
            registry,
            ops: Mutex::new(()),
        }
    }

    /// Installs every persisted spec. Specs that can no longer be built are
    /// skipped and logged.
    ///
    /// Returns the number of installed specs.
    ///
    /// # Errors
    ///
    /// Returns `Persistence` if the store cannot be listed.
    pub fn load(&self) -> AlertResult<usize> {
        let _guard = self.ops.lock().map_err(|_| lock_err("registrar.ops"))?;
        let mut installed = 0;
        for spec in self.store.list()? {
            let worker = self
                .factory
                .build(&spec)
                .and_then(|handler| self.registry.prepare_spec(&spec.id, handler));
            match worker {
                Ok(worker) => {
                    self.registry.attach_spec(&worker, &spec.topic_set(), &BTreeSet::new())?;
                    installed += 1;
                }
                Err(err) => {
                    warn!(spec_id = %spec.id, error = %err, "skipping persisted handler spec");
                }
            }
        }
        info!(installed, "handler specs loaded");
        Ok(installed)
    }

    /// Validates, persists and installs a new spec.
    ///
    /// # Errors
    ///
    /// Returns a validation error, `AlreadyExists` for a duplicate id, or
    /// `Persistence` if the store fails. No handler is registered on error.
    pub fn register(&self, spec: HandlerSpec) -> AlertResult<()> {
        spec.validate()?;
        let _guard = self.ops.lock().map_err(|_| lock_err("registrar.ops"))?;
        if self.store.get(&spec.id)?.is_some() {
            return Err(AlertError::spec_exists(&spec.id));
        }
        let handler = self.factory.build(&spec)?;
        let worker = self.registry.prepare_spec(&spec.id, handler)?;
        let topics = spec.topic_set();
        let id = spec.id.clone();
        let kind = spec.kind.as_str();

        self.store.create(spec).map_err(|e| store_err(e, &id))?;
        if let Err(err) = self.registry.attach_spec(&worker, &topics, &BTreeSet::new()) {
            if let Err(rollback) = self.registry.detach_spec(&id, &topics) {
                warn!(spec_id = %id, error = %rollback, "failed to detach handler during rollback");
            }
            if let Err(rollback) = self.store.delete(&id) {
                warn!(spec_id = %id, error = %rollback, "failed to roll back handler spec");
            }
            return Err(err);
        }
        info!(spec_id = %id, kind, topics = topics.len(), "handler spec registered");
        Ok(())
    }

    /// Deletes a spec and removes its handler from every topic.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` if no such spec exists.
    pub fn deregister(&self, id: &str) -> AlertResult<()> {
        let _guard = self.ops.lock().map_err(|_| lock_err("registrar.ops"))?;
        let spec = self.store.get(id)?.ok_or_else(|| AlertError::spec_not_found(id))?;
        self.store.delete(id).map_err(|e| store_err(e, id))?;
        self.registry.detach_spec(id, &spec.topic_set())?;
        info!(spec_id = %id, "handler spec deregistered");
        Ok(())
    }

    /// Replaces `old` with `new`.
    ///
    /// When the id is unchanged, topics listed by both specs keep a handler
    /// for the id throughout; topics only in `new` gain it and topics only in
    /// the stored spec lose it.
    ///
    /// # Errors
    ///
    /// Returns a validation error for `new`, `NotFound` if `old` is not
    /// stored, `AlreadyExists` if `new` renames onto a taken id, or
    /// `Persistence` if the store fails.
    pub fn update(&self, old: &HandlerSpec, new: HandlerSpec) -> AlertResult<()> {
        new.validate()?;
        let _guard = self.ops.lock().map_err(|_| lock_err("registrar.ops"))?;
        let current = self
            .store
            .get(&old.id)?
            .ok_or_else(|| AlertError::spec_not_found(&old.id))?;
        if new.id != old.id && self.store.get(&new.id)?.is_some() {
            return Err(AlertError::spec_exists(&new.id));
        }
        let handler = self.factory.build(&new)?;
        let worker = self.registry.prepare_spec(&new.id, handler)?;
        let old_topics = current.topic_set();
        let new_topics = new.topic_set();
        let new_id = new.id.clone();

        self.store.replace(&old.id, new).map_err(|e| store_err(e, &old.id))?;
        let attached = if new_id == old.id {
            self.registry.attach_spec(&worker, &new_topics, &old_topics)
        } else {
            self.registry
                .attach_spec(&worker, &new_topics, &BTreeSet::new())
                .and_then(|()| self.registry.detach_spec(&old.id, &old_topics))
        };
        if let Err(err) = attached {
            self.rollback_update(current, &new_id, &new_topics);
            return Err(err);
        }
        info!(spec_id = %old.id, new_id = %new_id, topics = new_topics.len(), "handler spec updated");
        Ok(())
    }

    /// Puts `previous` back in the store and removes the new handler from
    /// topics `previous` did not list.
    fn rollback_update(&self, previous: HandlerSpec, new_id: &str, new_topics: &BTreeSet<String>) {
        let gained: BTreeSet<String> = if new_id == previous.id {
            new_topics.difference(&previous.topic_set()).cloned().collect()
        } else {
            new_topics.clone()
        };
        if let Err(err) = self.registry.detach_spec(new_id, &gained) {
            warn!(spec_id = %new_id, error = %err, "failed to detach handler during rollback");
        }
        let old_id = previous.id.clone();
        if let Err(err) = self.store.replace(new_id, previous) {
            warn!(spec_id = %old_id, error = %err, "failed to roll back handler spec update");
        }
    }

    /// Looks up a spec.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` if no such spec exists.
    pub fn get(&self, id: &str) -> AlertResult<HandlerSpec> {
        self.store.get(id)?.ok_or_else(|| AlertError::spec_not_found(id))
    }

    /// Specs whose id matches `pattern`, in id order.
    ///
    /// # Errors
    ///
    /// Returns a validation error for a bad pattern or `Persistence` if the
    /// store fails.
    pub fn list(&self, pattern: &str) -> AlertResult<Vec<HandlerSpec>> {
        let glob = Glob::new(pattern)?;
        let mut specs: Vec<_> = self.store.list()?.into_iter().filter(|s| glob.matches(&s.id)).collect();
        specs.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(specs)
    }
}
