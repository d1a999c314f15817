//! Handler capability and durable handler specifications.
//!
//! Every handler, whatever delivers it, implements the single [`Handler`]
//! capability. Spec-backed handlers are described by a [`HandlerSpec`] whose
//! [`HandlerKind`] carries only the configuration that kind needs; a
//! [`HandlerFactory`] turns the description into a live instance.

use std::collections::BTreeSet;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::error::{AlertError, AlertResult, HandlerError, ValidationError};
use crate::event::Event;
use crate::post::{PostConfig, PostHandler, PostTransport};

/// Receives events dispatched for the topics it is registered on.
///
/// Implementations run on a dedicated worker thread and may block; their
/// latency is never observed by producers or by other handlers.
pub trait Handler: Send + Sync {
    /// Handles one event.
    ///
    /// # Errors
    ///
    /// Failures are recorded by the dispatcher and never propagated.
    fn handle(&self, event: &Event) -> Result<(), HandlerError>;

    /// Name used in logs.
    fn name(&self) -> &str {
        "anonymous"
    }
}

/// Shared handle to a live handler.
pub type HandlerRef = Arc<dyn Handler>;

/// Handler-type specific configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum HandlerKind {
    /// Forward events as HTTP POST requests.
    Post(PostConfig),
    /// Write events to the process log.
    Log {
        /// Prefix prepended to every logged message.
        #[serde(default)]
        prefix: String,
    },
}

impl HandlerKind {
    /// Short name of the kind.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Post(_) => "post",
            Self::Log { .. } => "log",
        }
    }

    /// Validates kind-specific configuration.
    ///
    /// # Errors
    ///
    /// Returns the first configuration problem found.
    pub fn validate(&self) -> Result<(), ValidationError> {
        match self {
            Self::Post(cfg) => cfg.validate(),
            Self::Log { .. } => Ok(()),
        }
    }
}

/// Durable description of a handler bound to one or more topics.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HandlerSpec {
    /// Unique identifier.
    pub id: String,
    /// Topics the handler subscribes to.
    pub topics: Vec<String>,
    /// Kind and configuration.
    #[serde(flatten)]
    pub kind: HandlerKind,
}

impl HandlerSpec {
    /// Creates a spec.
    #[must_use]
    pub fn new<I, S>(id: impl Into<String>, topics: I, kind: HandlerKind) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            id: id.into(),
            topics: topics.into_iter().map(Into::into).collect(),
            kind,
        }
    }

    /// Validates the spec.
    ///
    /// # Errors
    ///
    /// Returns an error for an empty id, an empty or blank topic list, or
    /// invalid kind configuration.
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.id.trim().is_empty() {
            return Err(ValidationError::MissingField {
                field: "id".to_string(),
            });
        }
        if self.topics.is_empty() {
            return Err(ValidationError::NoTopics { id: self.id.clone() });
        }
        if self.topics.iter().any(|t| t.trim().is_empty()) {
            return Err(ValidationError::EmptyTopic);
        }
        self.kind.validate()
    }

    /// Distinct topics, sorted.
    #[must_use]
    pub fn topic_set(&self) -> BTreeSet<String> {
        self.topics.iter().cloned().collect()
    }
}

/// Turns a spec into a live handler.
pub trait HandlerFactory: Send + Sync {
    /// Builds the handler described by `spec`.
    ///
    /// # Errors
    ///
    /// Returns an error if the spec cannot be instantiated.
    fn build(&self, spec: &HandlerSpec) -> AlertResult<HandlerRef>;
}

/// Factory for the built-in handler kinds.
#[derive(Default, Clone)]
pub struct DefaultHandlerFactory {
    transport: Option<Arc<dyn PostTransport>>,
}

impl DefaultHandlerFactory {
    /// Factory that can build `post` handlers on top of `transport`.
    #[must_use]
    pub fn with_transport(transport: Arc<dyn PostTransport>) -> Self {
        Self {
            transport: Some(transport),
        }
    }
}

impl std::fmt::Debug for DefaultHandlerFactory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DefaultHandlerFactory")
            .field("transport", &self.transport.is_some())
            .finish()
    }
}

impl HandlerFactory for DefaultHandlerFactory {
    fn build(&self, spec: &HandlerSpec) -> AlertResult<HandlerRef> {
        match &spec.kind {
            HandlerKind::Post(cfg) => {
                let transport = self.transport.clone().ok_or_else(|| {
                    AlertError::Validation(ValidationError::MissingField {
                        field: "post transport".to_string(),
                    })
                })?;
                Ok(Arc::new(PostHandler::new(spec.id.clone(), cfg.clone(), transport)))
            }
            HandlerKind::Log { prefix } => Ok(Arc::new(LogHandler {
                id: spec.id.clone(),
                prefix: prefix.clone(),
            })),
        }
    }
}

/// Logs every event it receives.
#[derive(Debug, Clone)]
pub struct LogHandler {
    id: String,
    prefix: String,
}

impl LogHandler {
    /// Creates a log handler.
    #[must_use]
    pub fn new(id: impl Into<String>, prefix: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            prefix: prefix.into(),
        }
    }
}

impl Handler for LogHandler {
    fn handle(&self, event: &Event) -> Result<(), HandlerError> {
        info!(
            handler = %self.id,
            topic = %event.topic,
            event_id = %event.id,
            level = %event.level,
            "{}{}",
            self.prefix,
            event.message
        );
        Ok(())
    }

    fn name(&self) -> &str {
        &self.id
    }
}
