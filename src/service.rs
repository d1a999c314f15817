//! The alert service: owns every registry and wires the components together.

use std::collections::BTreeMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::api::{AnonHandlerRegistrar, Events, HandlerSpecRegistrar, TopicPersister, TopicQueries};
use crate::dispatch::{DispatchConfig, DispatchCounts, DispatchStats, Dispatcher, HandlerRegistry};
use crate::error::AlertResult;
use crate::event::{Event, EventState};
use crate::handler::{DefaultHandlerFactory, HandlerFactory, HandlerRef, HandlerSpec};
use crate::level::Level;
use crate::registrar::{HandlerSpecStore, InMemoryHandlerSpecStore, SpecRegistrar};
use crate::topic::{RestoreHandle, TopicState, TopicStateSource, TopicStatus, Topics};

/// Service configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AlertServiceConfig {
    /// Handler dispatch settings.
    pub dispatch: DispatchConfig,
}

/// Alert routing service.
///
/// Every registry is owned by the service; dropping it stops all handler
/// workers once their queues drain.
#[derive(Debug)]
pub struct AlertService {
    topics: Arc<Topics>,
    registry: Arc<HandlerRegistry>,
    dispatcher: Dispatcher,
    registrar: SpecRegistrar,
    stats: Arc<DispatchStats>,
}

impl AlertService {
    /// Creates the service and installs every spec persisted in `store`.
    ///
    /// # Errors
    ///
    /// Returns `Persistence` if the stored specs cannot be listed.
    pub fn new(
        cfg: AlertServiceConfig,
        store: Arc<dyn HandlerSpecStore>,
        factory: Arc<dyn HandlerFactory>,
    ) -> AlertResult<Self> {
        let topics = Arc::new(Topics::new());
        let stats = Arc::new(DispatchStats::default());
        let registry = Arc::new(HandlerRegistry::new(Arc::clone(&topics), cfg.dispatch, Arc::clone(&stats)));
        let registrar = SpecRegistrar::new(store, factory, Arc::clone(&registry));
        registrar.load()?;
        Ok(Self {
            dispatcher: Dispatcher::new(Arc::clone(&topics)),
            topics,
            registry,
            registrar,
            stats,
        })
    }

    /// Service with an in-memory spec store and the built-in handler kinds.
    ///
    /// # Errors
    ///
    /// Infallible in practice; kept fallible to match [`AlertService::new`].
    pub fn with_defaults() -> AlertResult<Self> {
        Self::new(
            AlertServiceConfig::default(),
            Arc::new(InMemoryHandlerSpecStore::new()),
            Arc::new(DefaultHandlerFactory::default()),
        )
    }

    /// Delivery counters across all handlers.
    #[must_use]
    pub fn dispatch_counts(&self) -> DispatchCounts {
        self.stats.snapshot()
    }

    /// Lifecycle state of a topic, if it exists.
    ///
    /// # Errors
    ///
    /// Fails only on internal errors.
    pub fn topic_state(&self, topic: &str) -> AlertResult<Option<TopicState>> {
        self.topics.topic_state(topic)
    }

    /// Number of handlers registered on a topic.
    ///
    /// # Errors
    ///
    /// Fails only on internal errors.
    pub fn topic_handler_count(&self, topic: &str) -> AlertResult<usize> {
        self.topics.topic_handler_count(topic)
    }

    /// Restores a topic from `source` and reopens it. Returns the number of
    /// restored events.
    ///
    /// # Errors
    ///
    /// Returns `Persistence` if the source fails; the topic is then closed.
    pub fn restore_topic_from(&self, topic: &str, source: &dyn TopicStateSource) -> AlertResult<usize> {
        self.topics.restore_topic_from(topic, source)
    }
}

impl Events for AlertService {
    fn collect(&self, event: Event) -> AlertResult<()> {
        self.dispatcher.collect(event)
    }

    fn update_event(&self, topic: &str, event_id: &str, state: EventState) -> AlertResult<()> {
        self.topics.update_event(topic, event_id, state)
    }

    fn clear_event(&self, topic: &str, event_id: &str) -> AlertResult<bool> {
        self.topics.clear_event(topic, event_id)
    }
}

impl TopicQueries for AlertService {
    fn topic_status(&self, topic: &str) -> AlertResult<TopicStatus> {
        self.topics.topic_status(topic)
    }

    fn topic_status_events(&self, topic: &str, min_level: Level) -> AlertResult<BTreeMap<String, EventState>> {
        self.topics.topic_status_events(topic, min_level)
    }

    fn topic_event_state(&self, topic: &str, event_id: &str) -> AlertResult<Option<EventState>> {
        self.topics.topic_event_state(topic, event_id)
    }

    fn list_topic_status(&self, pattern: &str, min_level: Level) -> AlertResult<BTreeMap<String, TopicStatus>> {
        self.topics.list_topic_status(pattern, min_level)
    }
}

impl AnonHandlerRegistrar for AlertService {
    fn register_anon_handler(&self, topics: &[String], handler: &HandlerRef) -> AlertResult<()> {
        self.registry.register_anon(topics, handler)
    }

    fn deregister_anon_handler(&self, topics: &[String], handler: &HandlerRef) -> AlertResult<()> {
        self.registry.deregister_anon(topics, handler)
    }
}

impl TopicPersister for AlertService {
    fn close_topic(&self, topic: &str) -> AlertResult<()> {
        self.topics.close_topic(topic)
    }

    fn delete_topic(&self, topic: &str) -> AlertResult<()> {
        self.topics.delete_topic(topic)
    }

    fn restore_topic(&self, topic: &str) -> AlertResult<RestoreHandle> {
        self.topics.restore_topic(topic)
    }
}

impl HandlerSpecRegistrar for AlertService {
    fn register_handler_spec(&self, spec: HandlerSpec) -> AlertResult<()> {
        self.registrar.register(spec)
    }

    fn deregister_handler_spec(&self, id: &str) -> AlertResult<()> {
        self.registrar.deregister(id)
    }

    fn update_handler_spec(&self, old: &HandlerSpec, new: HandlerSpec) -> AlertResult<()> {
        self.registrar.update(old, new)
    }

    fn handler_spec(&self, id: &str) -> AlertResult<HandlerSpec> {
        self.registrar.get(id)
    }

    fn handler_specs(&self, pattern: &str) -> AlertResult<Vec<HandlerSpec>> {
        self.registrar.list(pattern)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_from_json() {
        let cfg: AlertServiceConfig = serde_json::from_str(r#"{"dispatch": {"backlog_warn_threshold": 16}}"#).unwrap();
        assert_eq!(cfg.dispatch.backlog_warn_threshold, 16);
        let cfg: AlertServiceConfig = serde_json::from_str("{}").unwrap();
        assert_eq!(cfg, AlertServiceConfig::default());
    }

    #[test]
    fn test_disk_scenario() {
        let svc = AlertService::with_defaults().unwrap();
        svc.collect(Event::new("disk", "e1", Level::Warning)).unwrap();
        svc.collect(Event::new("disk", "e2", Level::Critical)).unwrap();
        assert_eq!(svc.topic_status("disk").unwrap().level, Level::Critical);
        svc.collect(Event::new("disk", "e2", Level::Ok)).unwrap();
        assert_eq!(svc.topic_status("disk").unwrap().level, Level::Warning);
    }
}
