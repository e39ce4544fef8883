//! Binding registry.
//!
//! Handler bindings are grouped by priority tier under one lock; monitor
//! bindings live in a flat list under a second, independent lock. Locks are
//! held only while the lists are mutated or copied, never while user code
//! runs. Dispatch works from snapshots: a registration that lands while an
//! event is in flight may or may not be seen by that event.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard};

use crate::error::{DispatchError, DispatchResult};
use crate::listener::{HandlerBinding, ListenerBindings, ListenerId, MonitorBinding};
use crate::priority::Priority;

fn lock_err(context: &'static str) -> DispatchError {
    DispatchError::internal(format!("poisoned lock: {context}"))
}

/// Immutable copy of the handler tiers, in invocation order.
#[derive(Debug, Clone)]
pub struct HandlerSnapshot {
    tiers: Arc<[(Priority, Vec<Arc<HandlerBinding>>)]>,
}

impl HandlerSnapshot {
    /// Tiers in ascending call order; empty tiers are omitted.
    pub fn tiers(&self) -> impl Iterator<Item = (Priority, &[Arc<HandlerBinding>])> + '_ {
        self.tiers.iter().map(|(p, b)| (*p, b.as_slice()))
    }

    /// Total number of handler bindings in the snapshot.
    #[must_use]
    pub fn len(&self) -> usize {
        self.tiers.iter().map(|(_, b)| b.len()).sum()
    }

    /// Returns true if the snapshot holds no handlers.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Immutable copy of the monitor bindings.
#[derive(Debug, Clone)]
pub struct MonitorSnapshot {
    monitors: Arc<[Arc<MonitorBinding>]>,
}

impl MonitorSnapshot {
    /// The monitor bindings.
    #[must_use]
    pub fn bindings(&self) -> &[Arc<MonitorBinding>] {
        &self.monitors
    }

    /// Number of monitor bindings in the snapshot.
    #[must_use]
    pub fn len(&self) -> usize {
        self.monitors.len()
    }

    /// Returns true if the snapshot holds no monitors.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.monitors.is_empty()
    }
}

/// Thread-safe storage of handler and monitor bindings.
#[derive(Debug)]
pub struct BindingRegistry {
    handlers: Mutex<BTreeMap<Priority, Vec<Arc<HandlerBinding>>>>,
    monitors: Mutex<Vec<Arc<MonitorBinding>>>,
}

impl Default for BindingRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl BindingRegistry {
    /// Creates a registry with every handler tier present and empty.
    #[must_use]
    pub fn new() -> Self {
        let handlers = Priority::HANDLER_TIERS.iter().map(|p| (*p, Vec::new())).collect();
        Self {
            handlers: Mutex::new(handlers),
            monitors: Mutex::new(Vec::new()),
        }
    }

    fn handlers(
        &self,
    ) -> DispatchResult<MutexGuard<'_, BTreeMap<Priority, Vec<Arc<HandlerBinding>>>>> {
        self.handlers.lock().map_err(|_| lock_err("handlers"))
    }

    fn monitors(&self) -> DispatchResult<MutexGuard<'_, Vec<Arc<MonitorBinding>>>> {
        self.monitors.lock().map_err(|_| lock_err("monitors"))
    }

    /// Insert every binding of one listener under `id`.
    ///
    /// Handlers are appended to their tier; same-tier order is insertion
    /// order but is not part of the dispatch contract.
    pub fn register(&self, id: ListenerId, bindings: ListenerBindings) -> DispatchResult<()> {
        let (handlers, monitors) = bindings.bind(id);

        if !handlers.is_empty() {
            let mut tiers = self.handlers()?;
            for binding in handlers {
                tiers.entry(binding.priority()).or_default().push(binding);
            }
        }

        if !monitors.is_empty() {
            self.monitors()?.extend(monitors);
        }

        Ok(())
    }

    /// Remove every handler and monitor binding owned by `id`.
    ///
    /// Returns the number of bindings removed; zero means the listener was
    /// unknown and nothing changed.
    pub fn unregister(&self, id: ListenerId) -> DispatchResult<usize> {
        let mut removed = 0;

        {
            let mut tiers = self.handlers()?;
            for bindings in tiers.values_mut() {
                let before = bindings.len();
                bindings.retain(|b| b.owner().id != id);
                removed += before - bindings.len();
            }
        }

        let mut monitors = self.monitors()?;
        let before = monitors.len();
        monitors.retain(|m| m.owner().id != id);
        removed += before - monitors.len();

        Ok(removed)
    }

    /// Copy the current handler tiers.
    pub fn handler_snapshot(&self) -> DispatchResult<HandlerSnapshot> {
        let tiers = self.handlers()?;
        let copied: Vec<(Priority, Vec<Arc<HandlerBinding>>)> = tiers
            .iter()
            .filter(|(p, b)| !p.is_monitor() && !b.is_empty())
            .map(|(p, b)| (*p, b.clone()))
            .collect();
        Ok(HandlerSnapshot {
            tiers: copied.into(),
        })
    }

    /// Copy the current monitor bindings.
    pub fn monitor_snapshot(&self) -> DispatchResult<MonitorSnapshot> {
        let monitors = self.monitors()?;
        Ok(MonitorSnapshot {
            monitors: monitors.as_slice().into(),
        })
    }

    /// Number of registered handler bindings.
    pub fn handler_count(&self) -> DispatchResult<usize> {
        Ok(self.handlers()?.values().map(Vec::len).sum())
    }

    /// Number of registered monitor bindings.
    pub fn monitor_count(&self) -> DispatchResult<usize> {
        Ok(self.monitors()?.len())
    }
}
