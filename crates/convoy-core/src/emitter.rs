//! Publish/subscribe bus with blocking and non-blocking dispatch.
//!
//! The [`Emitter`] is the synchronisation primitive every component builds
//! on. [`Emitter::emit_blocking`] awaits each handler in turn, which lets an
//! upstream component know that every interested downstream component has
//! finished reacting before it continues. [`Emitter::emit`] is
//! fire-and-forget: handler failures are logged and never reach the caller.
//!
//! # Ordering
//!
//! Handlers for one event are kept sorted by priority (ascending, lower runs
//! earlier); ties keep registration order.
//!
//! # Registration batches
//!
//! [`Emitter::begin_batch`] opens a window in which components attach their
//! handlers. Emissions made through [`Emitter::emit_deferred`] while a batch
//! is open are queued and flushed, in order, when the outermost batch closes.

use std::collections::{HashMap, VecDeque};
use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard};

use futures::future::BoxFuture;
use futures::FutureExt;
use tracing::{debug, warn};

use crate::error::{PipelineError, Result};
use crate::event::Payload;
use crate::metrics::METRICS;

/// Priority used when a handler is registered without one.
pub const DEFAULT_PRIORITY: i32 = 0;

/// Future returned by a handler.
pub type HandlerFuture = BoxFuture<'static, anyhow::Result<()>>;

/// A registered event handler.
pub type Handler = Arc<dyn Fn(Payload) -> HandlerFuture + Send + Sync>;

struct Registration {
    handler: Handler,
    priority: i32,
    blocking: bool,
}

#[derive(Default)]
struct EmitterState {
    handlers: HashMap<String, Vec<Registration>>,
    batch_depth: usize,
    deferred: VecDeque<(String, Payload)>,
}

/// Event bus shared by every component of one run.
///
/// Cloning is cheap; all clones address the same handler table.
#[derive(Clone, Default)]
pub struct Emitter {
    state: Arc<Mutex<EmitterState>>,
}

impl std::fmt::Debug for Emitter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.lock();
        f.debug_struct("Emitter")
            .field("events", &state.handlers.len())
            .field("batch_depth", &state.batch_depth)
            .finish()
    }
}

impl Emitter {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, EmitterState> {
        // Handlers never run while the lock is held, so a poisoned lock
        // still guards a consistent table.
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Register a non-blocking handler at [`DEFAULT_PRIORITY`].
    pub fn on<F, Fut>(&self, event: &str, handler: F)
    where
        F: Fn(Payload) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        self.register(event, DEFAULT_PRIORITY, false, handler);
    }

    /// Register a non-blocking handler with an explicit priority.
    pub fn on_with_priority<F, Fut>(&self, event: &str, priority: i32, handler: F)
    where
        F: Fn(Payload) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        self.register(event, priority, false, handler);
    }

    /// Register a blocking handler at [`DEFAULT_PRIORITY`].
    pub fn on_blocking<F, Fut>(&self, event: &str, handler: F)
    where
        F: Fn(Payload) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        self.register(event, DEFAULT_PRIORITY, true, handler);
    }

    /// Register a blocking handler with an explicit priority.
    pub fn on_blocking_with_priority<F, Fut>(&self, event: &str, priority: i32, handler: F)
    where
        F: Fn(Payload) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        self.register(event, priority, true, handler);
    }

    fn register<F, Fut>(&self, event: &str, priority: i32, blocking: bool, handler: F)
    where
        F: Fn(Payload) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        let handler: Handler = Arc::new(move |payload| handler(payload).boxed());
        let mut state = self.lock();
        let list = state.handlers.entry(event.to_string()).or_default();

        // Insert in priority order (stable: FIFO for same priority)
        let pos = list
            .iter()
            .position(|r| r.priority > priority)
            .unwrap_or(list.len());
        list.insert(
            pos,
            Registration {
                handler,
                priority,
                blocking,
            },
        );
        debug!(event = %event, priority, blocking, "handler registered");
    }

    /// Number of handlers (of either kind) registered for `event`.
    pub fn handler_count(&self, event: &str) -> usize {
        self.lock().handlers.get(event).map_or(0, Vec::len)
    }

    fn snapshot(&self, event: &str, include_blocking: bool) -> Vec<Handler> {
        self.lock()
            .handlers
            .get(event)
            .map(|list| {
                list.iter()
                    .filter(|r| include_blocking || !r.blocking)
                    .map(|r| r.handler.clone())
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Fire-and-forget dispatch to every non-blocking handler of `event`.
    ///
    /// Handlers are invoked in priority order; their futures are spawned on
    /// the current runtime and never awaited here.
    pub fn emit(&self, event: &str, payload: Payload) {
        METRICS.inc_events_dispatched();
        let handlers = self.snapshot(event, false);
        if handlers.is_empty() {
            return;
        }

        let runtime = match tokio::runtime::Handle::try_current() {
            Ok(handle) => handle,
            Err(e) => {
                warn!(event = %event, error = %e, "no runtime available, dropping emission");
                return;
            }
        };

        for handler in handlers {
            let fut = handler(payload.clone());
            let event = event.to_string();
            runtime.spawn(async move {
                if let Err(e) = fut.await {
                    METRICS.inc_handler_failures();
                    warn!(event = %event, error = %e, "non-blocking handler failed");
                }
            });
        }
    }

    /// Dispatch to every handler of `event`, awaiting each before the next.
    ///
    /// Resolves once the last handler settles. The first rejection stops the
    /// dispatch and is returned as [`PipelineError::BlockingRejection`].
    pub async fn emit_blocking(&self, event: &str, payload: Payload) -> Result<()> {
        METRICS.inc_events_dispatched();
        let handlers = self.snapshot(event, true);

        for handler in handlers {
            handler(payload.clone())
                .await
                .map_err(|source| PipelineError::BlockingRejection {
                    event: event.to_string(),
                    source,
                })?;
        }

        Ok(())
    }

    /// Non-blocking emission that waits for the open registration batch.
    ///
    /// Outside a batch this is the same as [`Emitter::emit`].
    pub fn emit_deferred(&self, event: &str, payload: Payload) {
        {
            let mut state = self.lock();
            if state.batch_depth > 0 {
                debug!(event = %event, "emission deferred until batch closes");
                state.deferred.push_back((event.to_string(), payload));
                return;
            }
        }
        self.emit(event, payload);
    }

    /// Open a registration batch. Batches nest.
    pub fn begin_batch(&self) -> RegistrationBatch {
        self.lock().batch_depth += 1;
        RegistrationBatch {
            emitter: self.clone(),
            open: true,
        }
    }

    fn end_batch(&self) {
        let drained: Vec<(String, Payload)> = {
            let mut state = self.lock();
            state.batch_depth = state.batch_depth.saturating_sub(1);
            if state.batch_depth > 0 {
                return;
            }
            state.deferred.drain(..).collect()
        };

        for (event, payload) in drained {
            self.emit(&event, payload);
        }
    }
}

/// Guard for an open registration batch; closing it flushes deferred
/// emissions once no outer batch remains.
#[must_use = "dropping the batch closes it immediately"]
pub struct RegistrationBatch {
    emitter: Emitter,
    open: bool,
}

impl RegistrationBatch {
    /// Close the batch explicitly.
    pub fn close(mut self) {
        self.open = false;
        self.emitter.end_batch();
    }
}

impl Drop for RegistrationBatch {
    fn drop(&mut self) {
        if self.open {
            self.open = false;
            self.emitter.end_batch();
        }
    }
}
