//! Listener bindings.
//!
//! A listener describes itself as a flat list of bindings: handlers (event
//! type, priority, ignore-cancelled flag, callback) and monitors (event type,
//! callback). Bindings are built explicitly with [`ListenerBindingsBuilder`];
//! nothing is discovered by scanning. Registration hands back a
//! [`ListenerId`] that is later used to remove every binding of that
//! listener.

use std::any::TypeId;
use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::ValidationError;
use crate::event::{AnyEvent, Event, EventView};
use crate::outcome::Outcome;
use crate::priority::Priority;

/// Error type returned by handler and monitor callbacks.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Result type returned by handler and monitor callbacks.
pub type CallbackResult = Result<(), BoxError>;

type HandlerFn = dyn Fn(&dyn AnyEvent) -> CallbackResult + Send + Sync;
type MonitorFn = dyn Fn(&dyn AnyEvent, Outcome) -> CallbackResult + Send + Sync;

/// Stable identifier of a registered listener.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ListenerId(Uuid);

impl ListenerId {
    /// Create a new random listener id.
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Wrap an existing UUID.
    #[must_use]
    pub const fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }
}

impl Default for ListenerId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ListenerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Which events a binding receives.
///
/// A binding can cover a family of event types with [`or`](Self::or):
/// `EventFilter::of::<RowInserted>().or::<RowDeleted>()`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EventFilter {
    /// Exactly one concrete event type.
    Exact {
        /// Type id of the event type.
        type_id: TypeId,
        /// Type name, for diagnostics.
        type_name: &'static str,
    },
    /// Any of several concrete event types.
    OneOf {
        /// Type ids of the accepted event types.
        type_ids: Arc<[TypeId]>,
        /// Type names, for diagnostics.
        type_names: Arc<[&'static str]>,
    },
    /// Every event.
    Any,
}

impl EventFilter {
    /// Filter matching the concrete type `E`.
    #[must_use]
    pub fn of<E: Event>() -> Self {
        Self::Exact {
            type_id: TypeId::of::<E>(),
            type_name: std::any::type_name::<E>(),
        }
    }

    /// Extend this filter to also match `E`.
    #[must_use]
    pub fn or<E: Event>(self) -> Self {
        let (mut ids, mut names) = match self {
            Self::Exact { type_id, type_name } => (vec![type_id], vec![type_name]),
            Self::OneOf {
                type_ids,
                type_names,
            } => (type_ids.to_vec(), type_names.to_vec()),
            Self::Any => return Self::Any,
        };
        let id = TypeId::of::<E>();
        if !ids.contains(&id) {
            ids.push(id);
            names.push(std::any::type_name::<E>());
        }
        Self::OneOf {
            type_ids: ids.into(),
            type_names: names.into(),
        }
    }

    pub(crate) fn matches(&self, event: &dyn AnyEvent) -> bool {
        match self {
            Self::Exact { type_id, .. } => event.as_any().type_id() == *type_id,
            Self::OneOf { type_ids, .. } => type_ids.contains(&event.as_any().type_id()),
            Self::Any => true,
        }
    }
}

impl fmt::Display for EventFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Exact { type_name, .. } => f.write_str(type_name),
            Self::OneOf { type_names, .. } => f.write_str(&type_names.join(" | ")),
            Self::Any => f.write_str("*"),
        }
    }
}

/// Identity of the listener that owns a binding.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Owner {
    /// Registered listener id.
    pub id: ListenerId,
    /// Optional human-readable listener name.
    pub name: Option<Arc<str>>,
}

impl fmt::Display for Owner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.name {
            Some(name) => write!(f, "{name} ({})", self.id),
            None => write!(f, "{}", self.id),
        }
    }
}

/// A registered handler: invoked during dispatch at its priority tier.
pub struct HandlerBinding {
    filter: EventFilter,
    priority: Priority,
    ignore_cancelled: bool,
    owner: Owner,
    invoke: Arc<HandlerFn>,
}

impl HandlerBinding {
    /// Event filter of this handler.
    #[must_use]
    pub const fn filter(&self) -> &EventFilter {
        &self.filter
    }

    /// Priority tier of this handler.
    #[must_use]
    pub const fn priority(&self) -> Priority {
        self.priority
    }

    /// Whether this handler is skipped while the event is cancelled.
    #[must_use]
    pub const fn ignores_cancelled(&self) -> bool {
        self.ignore_cancelled
    }

    /// The owning listener.
    #[must_use]
    pub const fn owner(&self) -> &Owner {
        &self.owner
    }

    pub(crate) fn matches(&self, event: &dyn AnyEvent) -> bool {
        self.filter.matches(event)
    }

    pub(crate) fn invoke(&self, event: &dyn AnyEvent) -> CallbackResult {
        (self.invoke)(event)
    }
}

impl fmt::Debug for HandlerBinding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HandlerBinding")
            .field("filter", &self.filter)
            .field("priority", &self.priority)
            .field("ignore_cancelled", &self.ignore_cancelled)
            .field("owner", &self.owner)
            .finish_non_exhaustive()
    }
}

/// A registered monitor: observes the final outcome after dispatch.
pub struct MonitorBinding {
    filter: EventFilter,
    owner: Owner,
    invoke: Arc<MonitorFn>,
}

impl MonitorBinding {
    /// Event filter of this monitor.
    #[must_use]
    pub const fn filter(&self) -> &EventFilter {
        &self.filter
    }

    /// The owning listener.
    #[must_use]
    pub const fn owner(&self) -> &Owner {
        &self.owner
    }

    pub(crate) fn matches(&self, event: &dyn AnyEvent) -> bool {
        self.filter.matches(event)
    }

    pub(crate) fn invoke(&self, event: &dyn AnyEvent, outcome: Outcome) -> CallbackResult {
        (self.invoke)(event, outcome)
    }
}

impl fmt::Debug for MonitorBinding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MonitorBinding")
            .field("filter", &self.filter)
            .field("owner", &self.owner)
            .finish_non_exhaustive()
    }
}

struct HandlerSpec {
    filter: EventFilter,
    priority: Priority,
    ignore_cancelled: bool,
    invoke: Arc<HandlerFn>,
}

struct MonitorSpec {
    filter: EventFilter,
    invoke: Arc<MonitorFn>,
}

/// Validated, not-yet-registered bindings of one listener.
pub struct ListenerBindings {
    name: Option<Arc<str>>,
    handlers: Vec<HandlerSpec>,
    monitors: Vec<MonitorSpec>,
}

impl ListenerBindings {
    /// Start building a listener's bindings.
    #[must_use]
    pub fn builder() -> ListenerBindingsBuilder {
        ListenerBindingsBuilder::default()
    }

    /// Listener name, if one was given.
    #[must_use]
    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    /// Number of handler bindings.
    #[must_use]
    pub fn handler_count(&self) -> usize {
        self.handlers.len()
    }

    /// Number of monitor bindings.
    #[must_use]
    pub fn monitor_count(&self) -> usize {
        self.monitors.len()
    }

    /// Attach the owner id, producing the bindings stored by the registry.
    pub(crate) fn bind(
        self,
        id: ListenerId,
    ) -> (Vec<Arc<HandlerBinding>>, Vec<Arc<MonitorBinding>>) {
        let owner = Owner { id, name: self.name };
        let handlers = self
            .handlers
            .into_iter()
            .map(|h| {
                Arc::new(HandlerBinding {
                    filter: h.filter,
                    priority: h.priority,
                    ignore_cancelled: h.ignore_cancelled,
                    owner: owner.clone(),
                    invoke: h.invoke,
                })
            })
            .collect();
        let monitors = self
            .monitors
            .into_iter()
            .map(|m| {
                Arc::new(MonitorBinding {
                    filter: m.filter,
                    owner: owner.clone(),
                    invoke: m.invoke,
                })
            })
            .collect();
        (handlers, monitors)
    }
}

impl fmt::Debug for ListenerBindings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ListenerBindings")
            .field("name", &self.name)
            .field("handlers", &self.handlers.len())
            .field("monitors", &self.monitors.len())
            .finish()
    }
}

/// Builder for [`ListenerBindings`].
///
/// Construction errors are deferred to [`build`](Self::build), which rejects
/// the whole listener.
///
/// # Example
/// ```rust,ignore
/// let bindings = ListenerBindings::builder()
///     .name("audit")
///     .handler(Priority::High, |e: &RowInserted| {
///         if e.table == "locked" {
///             e.cancel.set_cancelled(true);
///         }
///         Ok(())
///     })
///     .monitor(|e: &RowInserted, outcome| {
///         println!("{} -> {outcome}", e.id());
///         Ok(())
///     })
///     .build()?;
/// ```
#[derive(Default)]
pub struct ListenerBindingsBuilder {
    name: Option<String>,
    handlers: Vec<HandlerSpec>,
    monitors: Vec<MonitorSpec>,
    error: Option<ValidationError>,
}

impl ListenerBindingsBuilder {
    /// Name the listener (optional, used in diagnostics).
    #[must_use]
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Add a handler for events of type `E`.
    #[must_use]
    pub fn handler<E, F>(self, priority: Priority, f: F) -> Self
    where
        E: Event,
        F: Fn(&E) -> CallbackResult + Send + Sync + 'static,
    {
        self.push_handler(EventFilter::of::<E>(), priority, false, typed_handler(f))
    }

    /// Add a handler for events of type `E` that is skipped while the event
    /// is cancelled.
    #[must_use]
    pub fn handler_ignoring_cancelled<E, F>(self, priority: Priority, f: F) -> Self
    where
        E: Event,
        F: Fn(&E) -> CallbackResult + Send + Sync + 'static,
    {
        self.push_handler(EventFilter::of::<E>(), priority, true, typed_handler(f))
    }

    /// Add a handler for every event type `filter` accepts.
    #[must_use]
    pub fn handler_matching<F>(self, priority: Priority, filter: EventFilter, f: F) -> Self
    where
        F: Fn(EventView<'_>) -> CallbackResult + Send + Sync + 'static,
    {
        let invoke: Arc<HandlerFn> = Arc::new(move |event: &dyn AnyEvent| f(EventView::new(event)));
        self.push_handler(filter, priority, false, invoke)
    }

    /// Add a handler receiving every event.
    #[must_use]
    pub fn handler_any<F>(self, priority: Priority, f: F) -> Self
    where
        F: Fn(EventView<'_>) -> CallbackResult + Send + Sync + 'static,
    {
        self.handler_matching(priority, EventFilter::Any, f)
    }

    /// Add a monitor for events of type `E`.
    #[must_use]
    pub fn monitor<E, F>(mut self, f: F) -> Self
    where
        E: Event,
        F: Fn(&E, Outcome) -> CallbackResult + Send + Sync + 'static,
    {
        let invoke: Arc<MonitorFn> = Arc::new(move |event: &dyn AnyEvent, outcome| {
            event.as_any().downcast_ref::<E>().map_or(Ok(()), |e| f(e, outcome))
        });
        self.monitors.push(MonitorSpec {
            filter: EventFilter::of::<E>(),
            invoke,
        });
        self
    }

    /// Add a monitor for every event type `filter` accepts.
    #[must_use]
    pub fn monitor_matching<F>(mut self, filter: EventFilter, f: F) -> Self
    where
        F: Fn(EventView<'_>, Outcome) -> CallbackResult + Send + Sync + 'static,
    {
        let invoke: Arc<MonitorFn> =
            Arc::new(move |event: &dyn AnyEvent, outcome| f(EventView::new(event), outcome));
        self.monitors.push(MonitorSpec { filter, invoke });
        self
    }

    /// Add a monitor receiving every event.
    #[must_use]
    pub fn monitor_any<F>(self, f: F) -> Self
    where
        F: Fn(EventView<'_>, Outcome) -> CallbackResult + Send + Sync + 'static,
    {
        self.monitor_matching(EventFilter::Any, f)
    }

    fn push_handler(
        mut self,
        filter: EventFilter,
        priority: Priority,
        ignore_cancelled: bool,
        invoke: Arc<HandlerFn>,
    ) -> Self {
        if priority.is_monitor() {
            if self.error.is_none() {
                self.error = Some(ValidationError::MonitorPriorityForHandler { priority });
            }
            return self;
        }
        self.handlers.push(HandlerSpec {
            filter,
            priority,
            ignore_cancelled,
            invoke,
        });
        self
    }

    /// Validate and produce the bindings.
    ///
    /// Returns `ValidationError::MonitorPriorityForHandler` if any handler was
    /// declared at the monitor tier, and `ValidationError::EmptyListenerName`
    /// for a blank name.
    pub fn build(self) -> Result<ListenerBindings, ValidationError> {
        if let Some(err) = self.error {
            return Err(err);
        }

        let name = match self.name {
            Some(name) => {
                let name = name.trim();
                if name.is_empty() {
                    return Err(ValidationError::EmptyListenerName);
                }
                Some(Arc::from(name))
            }
            None => None,
        };

        Ok(ListenerBindings {
            name,
            handlers: self.handlers,
            monitors: self.monitors,
        })
    }
}

impl fmt::Debug for ListenerBindingsBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ListenerBindingsBuilder")
            .field("name", &self.name)
            .field("handlers", &self.handlers.len())
            .field("monitors", &self.monitors.len())
            .field("error", &self.error)
            .finish()
    }
}

fn typed_handler<E, F>(f: F) -> Arc<HandlerFn>
where
    E: Event,
    F: Fn(&E) -> CallbackResult + Send + Sync + 'static,
{
    Arc::new(move |event: &dyn AnyEvent| {
        event.as_any().downcast_ref::<E>().map_or(Ok(()), |e| f(e))
    })
}

/// A type that can describe its own bindings.
///
/// Implementors usually clone `self` into each callback so handlers can
/// reach listener state.
pub trait Listener: Send + Sync + 'static {
    /// Build this listener's bindings.
    fn bindings(self: Arc<Self>) -> Result<ListenerBindings, ValidationError>;
}
