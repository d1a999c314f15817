//! # alertroute - topic state and handler dispatch for alerting
//!
//! alertroute is the routing core of an alerting pipeline. It accepts alert
//! events, keeps the latest state of every event per topic, derives each
//! topic's status, and fans events out to the handlers registered on the
//! topic.
//!
//! ## Core Concepts
//!
//! - **Topic**: a named routing domain grouping related events
//! - **Event / EventState**: an occurrence with a severity `Level`, and the
//!   latest state remembered for it
//! - **TopicStatus**: the most severe level among a topic's live events
//! - **Handler**: anything that receives events; either backed by a durable
//!   `HandlerSpec` or registered anonymously for the life of the process
//!
//! ## Usage
//!
//! ```rust,ignore
//! use alertroute::{AlertService, Event, Events, Level, TopicQueries};
//!
//! let svc = AlertService::with_defaults()?;
//! svc.collect(Event::new("disk", "sda1", Level::Warning).with_message("85% full"))?;
//! assert_eq!(svc.topic_status("disk")?.level, Level::Warning);
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

// Core types
pub mod error;
pub mod event;
pub mod glob;
pub mod handler;
pub mod level;
pub mod post;

// State, dispatch and registration
pub mod api;
pub mod dispatch;
pub mod registrar;
pub mod service;
pub mod topic;

// Re-export primary types at crate root for convenience
pub use api::{AnonHandlerRegistrar, Events, HandlerSpecRegistrar, TopicPersister, TopicQueries};
pub use dispatch::{DispatchConfig, DispatchCounts, Dispatcher, HandlerRegistry};
pub use error::{AlertError, AlertResult, HandlerError, StorageError, ValidationError};
pub use event::{Event, EventState};
pub use handler::{DefaultHandlerFactory, Handler, HandlerFactory, HandlerKind, HandlerRef, HandlerSpec, LogHandler};
pub use level::Level;
pub use post::{PostConfig, PostConfigs, PostHandler, PostRequest, PostTransport};
pub use registrar::{HandlerSpecStore, InMemoryHandlerSpecStore, SpecRegistrar};
pub use service::{AlertService, AlertServiceConfig};
pub use topic::{RestoreHandle, TopicState, TopicStateSource, TopicStatus, Topics};
