//! Per-handler delivery worker.
//!
//! Each live handler instance gets one worker thread fed by its own unbounded
//! channel. Enqueueing never blocks and never loses an event; a backlog past
//! the configured threshold is logged. The thread exits once the last
//! `HandlerWorker` handle is dropped and its queue is drained.

use std::fmt;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::thread;

use crossbeam_channel::{unbounded, Receiver, Sender};
use tracing::{debug, warn};

use crate::error::{AlertError, AlertResult};
use crate::event::Event;
use crate::handler::HandlerRef;

use super::{DispatchConfig, DispatchStats};

/// Identity of a handler within a topic's handler set.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub(crate) enum HandlerKey {
    /// Spec-backed, keyed by spec id.
    Spec(String),
    /// Anonymous, keyed by the address of the shared handler.
    Anon(usize),
}

impl HandlerKey {
    pub(crate) fn anon(handler: &HandlerRef) -> Self {
        Self::Anon(handler_addr(handler))
    }
}

/// Identity of a shared handler: the address of its allocation.
pub(crate) fn handler_addr(handler: &HandlerRef) -> usize {
    Arc::as_ptr(handler).cast::<()>() as usize
}

impl fmt::Display for HandlerKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Spec(id) => write!(f, "spec:{id}"),
            Self::Anon(addr) => write!(f, "anon:{addr:#x}"),
        }
    }
}

pub(crate) struct HandlerWorker {
    key: HandlerKey,
    tx: Sender<Arc<Event>>,
    stats: Arc<DispatchStats>,
    backlog_warn: usize,
}

impl fmt::Debug for HandlerWorker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HandlerWorker")
            .field("key", &self.key)
            .field("queued", &self.tx.len())
            .finish()
    }
}

impl HandlerWorker {
    pub(crate) fn spawn(
        key: HandlerKey,
        handler: HandlerRef,
        cfg: &DispatchConfig,
        seq: u64,
        stats: Arc<DispatchStats>,
    ) -> AlertResult<Arc<Self>> {
        let (tx, rx) = unbounded::<Arc<Event>>();
        let thread_key = key.clone();
        let thread_stats = Arc::clone(&stats);
        thread::Builder::new()
            .name(format!("{}-{seq}", cfg.thread_name_prefix))
            .spawn(move || worker_loop(&thread_key, &handler, &rx, &thread_stats))
            .map_err(|e| AlertError::internal(format!("failed to spawn handler worker: {e}")))?;
        Ok(Arc::new(Self {
            key,
            tx,
            stats,
            backlog_warn: cfg.backlog_warn_threshold.max(1),
        }))
    }

    pub(crate) const fn key(&self) -> &HandlerKey {
        &self.key
    }

    /// Non-blocking, lossless enqueue.
    ///
    /// Only a worker whose thread has already stopped can refuse the event;
    /// that is counted as dropped.
    pub(crate) fn enqueue(&self, event: &Arc<Event>) {
        if self.tx.send(Arc::clone(event)).is_err() {
            self.stats.dropped.fetch_add(1, Ordering::Relaxed);
            warn!(
                handler = %self.key,
                topic = %event.topic,
                event_id = %event.id,
                "handler worker stopped, event dropped"
            );
            return;
        }
        let backlog = self.tx.len();
        if backlog == self.backlog_warn {
            warn!(handler = %self.key, backlog, "handler is falling behind");
        }
    }
}

fn worker_loop(key: &HandlerKey, handler: &HandlerRef, rx: &Receiver<Arc<Event>>, stats: &DispatchStats) {
    while let Ok(event) = rx.recv() {
        match catch_unwind(AssertUnwindSafe(|| handler.handle(&event))) {
            Ok(Ok(())) => {
                stats.delivered.fetch_add(1, Ordering::Relaxed);
            }
            Ok(Err(err)) => {
                stats.failed.fetch_add(1, Ordering::Relaxed);
                warn!(
                    handler = %key,
                    name = handler.name(),
                    topic = %event.topic,
                    event_id = %event.id,
                    error = %err,
                    "handler failed"
                );
            }
            Err(_) => {
                stats.failed.fetch_add(1, Ordering::Relaxed);
                warn!(
                    handler = %key,
                    name = handler.name(),
                    topic = %event.topic,
                    event_id = %event.id,
                    "handler panicked"
                );
            }
        }
    }
    debug!(handler = %key, "handler worker stopped");
}
