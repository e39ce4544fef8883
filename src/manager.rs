//! Dispatch manager: the engine façade.
//!
//! Owns the binding registry and the worker pools. Firing an event copies
//! the current bindings, queues a dispatch task and returns a
//! [`DispatchFuture`] without waiting for any handler.

use std::sync::Arc;

use crate::config::{DispatchConfig, MonitorPoolMode};
use crate::dispatch::task::DispatchTask;
use crate::dispatch::DispatchFuture;
use crate::error::DispatchResult;
use crate::event::{AnyEvent, Event};
use crate::listener::{Listener, ListenerBindings, ListenerId};
use crate::pool::WorkerPool;
use crate::registry::BindingRegistry;

/// Registration surface offered to consumers that observe or veto events.
pub trait EventRegistrar {
    /// Register a listener's bindings; returns the id used to unregister it.
    fn register_events(&self, bindings: ListenerBindings) -> DispatchResult<ListenerId>;

    /// Remove every binding of a listener. Returns false if none were found.
    fn unregister_listener(&self, id: ListenerId) -> bool;
}

/// In-process priority event dispatcher.
///
/// # Example
/// ```rust,ignore
/// let manager = DispatchManager::new(DispatchConfig::default())?;
/// let audit = manager.register_events(
///     ListenerBindings::builder()
///         .handler(Priority::Highest, |e: &TableDropped| {
///             if e.table == "teams" {
///                 e.cancel.set_cancelled(true);
///             }
///             Ok(())
///         })
///         .build()?,
/// )?;
///
/// let future = manager.fire_event(TableDropped::new("teams"))?;
/// let (outcome, monitors) = future.complete()?;
/// assert_eq!(outcome, Outcome::Cancelled);
/// manager.unregister_listener(audit);
/// ```
#[derive(Debug)]
pub struct DispatchManager {
    registry: BindingRegistry,
    dispatch_pool: Arc<WorkerPool>,
    monitor_pool: Arc<WorkerPool>,
}

impl DispatchManager {
    /// Create a manager and start its worker pools.
    pub fn new(config: DispatchConfig) -> DispatchResult<Self> {
        let prefix = config.thread_name_prefix.as_str();
        let dispatch_pool =
            Arc::new(WorkerPool::start("dispatch", prefix, config.dispatch_sizing())?);
        let monitor_pool = match config.monitor_pool {
            MonitorPoolMode::Shared => Arc::clone(&dispatch_pool),
            MonitorPoolMode::Dedicated => {
                Arc::new(WorkerPool::start("monitor", prefix, config.monitor_sizing())?)
            }
        };

        Ok(Self {
            registry: BindingRegistry::new(),
            dispatch_pool,
            monitor_pool,
        })
    }

    /// Register a listener's bindings.
    pub fn register_events(&self, bindings: ListenerBindings) -> DispatchResult<ListenerId> {
        let id = ListenerId::new();
        let name = bindings.name().map(str::to_string);
        let handlers = bindings.handler_count();
        let monitors = bindings.monitor_count();

        self.registry.register(id, bindings)?;

        tracing::debug!(listener = %id, name = ?name, handlers, monitors, "listener registered");
        Ok(id)
    }

    /// Register a listener that builds its own bindings.
    pub fn register_listener<L: Listener>(&self, listener: Arc<L>) -> DispatchResult<ListenerId> {
        let bindings = listener.bindings()?;
        self.register_events(bindings)
    }

    /// Remove every handler and monitor binding of `id`.
    ///
    /// Returns false (and changes nothing) if the listener had no bindings.
    pub fn unregister_listener(&self, id: ListenerId) -> bool {
        match self.registry.unregister(id) {
            Ok(0) => false,
            Ok(removed) => {
                tracing::debug!(listener = %id, removed, "listener unregistered");
                true
            }
            Err(err) => {
                tracing::error!(listener = %id, error = %err, "failed to unregister listener");
                false
            }
        }
    }

    /// Fire an event. Never blocks on handlers.
    ///
    /// With the default configuration this always returns a future: the
    /// queue is unbounded and the pool grows while every worker is busy, so
    /// a handler may fire a nested event and wait on it. It fails only when
    /// a configured `queue_capacity` is reached. Handler failures are
    /// reported through the returned future.
    pub fn fire_event<E: Event>(&self, event: E) -> DispatchResult<DispatchFuture<E>> {
        self.fire_shared(Arc::new(event))
    }

    /// Fire an event the caller keeps a handle to.
    pub fn fire_shared<E: Event>(&self, event: Arc<E>) -> DispatchResult<DispatchFuture<E>> {
        let handlers = self.registry.handler_snapshot()?;
        let monitors = self.registry.monitor_snapshot()?;

        let erased: Arc<dyn AnyEvent> = event.clone();
        let (task, state) = DispatchTask::new(erased, handlers);
        self.dispatch_pool.try_submit(Box::new(move || task.run()))?;

        tracing::trace!(
            event_id = %event.id(),
            event_type = std::any::type_name::<E>(),
            "event fired"
        );

        Ok(DispatchFuture::new(event, state, monitors, Arc::clone(&self.monitor_pool)))
    }

    /// Number of registered handler bindings.
    pub fn handler_count(&self) -> DispatchResult<usize> {
        self.registry.handler_count()
    }

    /// Number of registered monitor bindings.
    pub fn monitor_count(&self) -> DispatchResult<usize> {
        self.registry.monitor_count()
    }
}

impl EventRegistrar for DispatchManager {
    fn register_events(&self, bindings: ListenerBindings) -> DispatchResult<ListenerId> {
        Self::register_events(self, bindings)
    }

    fn unregister_listener(&self, id: ListenerId) -> bool {
        Self::unregister_listener(self, id)
    }
}
