//! Event identity and the cancellation capability.
//!
//! An event is an immutable notification carrying a unique [`EventId`].
//! Cancellation is an opt-in capability: an event that wants to be vetoable
//! exposes a [`Cancellable`] (usually a [`CancelFlag`] field) through
//! [`Event::cancellation`]. Events without it always report "not cancelled".

use std::any::Any;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Identifier of one logical event occurrence.
///
/// # Examples
///
/// ```
/// use eventfire::EventId;
///
/// let generated = EventId::new();
/// assert!(!generated.as_str().is_empty());
///
/// let chosen = EventId::from("row-insert-42");
/// assert_eq!(chosen.as_str(), "row-insert-42");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EventId(String);

impl EventId {
    /// Creates a new random (UUID v4) event id.
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    /// Returns the id as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for EventId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for EventId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<String> for EventId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

impl From<&str> for EventId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

/// Capability of an event to carry a mutable veto flag.
///
/// Takes `&self` because one event instance is shared between the dispatch
/// worker, the caller holding the future and the monitors.
pub trait Cancellable: Send + Sync {
    /// Returns the current cancellation state.
    fn is_cancelled(&self) -> bool;

    /// Sets the cancellation state.
    fn set_cancelled(&self, cancelled: bool);
}

/// Atomic cancellation flag, `false` by default.
#[derive(Debug, Default)]
pub struct CancelFlag(AtomicBool);

impl CancelFlag {
    /// Creates a flag with the given initial state.
    #[must_use]
    pub const fn new(cancelled: bool) -> Self {
        Self(AtomicBool::new(cancelled))
    }
}

impl Cancellable for CancelFlag {
    fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }

    fn set_cancelled(&self, cancelled: bool) {
        self.0.store(cancelled, Ordering::Release);
    }
}

impl Clone for CancelFlag {
    fn clone(&self) -> Self {
        Self::new(self.is_cancelled())
    }
}

/// An occurrence that can be fired through a
/// [`DispatchManager`](crate::DispatchManager).
///
/// # Examples
///
/// ```
/// use eventfire::{CancelFlag, Cancellable, Event, EventId};
///
/// struct TableDropped {
///     id: EventId,
///     table: String,
///     cancel: CancelFlag,
/// }
///
/// impl Event for TableDropped {
///     fn id(&self) -> &EventId {
///         &self.id
///     }
///
///     fn cancellation(&self) -> Option<&dyn Cancellable> {
///         Some(&self.cancel)
///     }
/// }
///
/// let event = TableDropped {
///     id: EventId::new(),
///     table: "teams".into(),
///     cancel: CancelFlag::default(),
/// };
/// assert!(!event.is_cancelled());
/// ```
pub trait Event: Send + Sync + 'static {
    /// Unique id of this occurrence.
    fn id(&self) -> &EventId;

    /// The cancellation capability, if this event opts into it.
    fn cancellation(&self) -> Option<&dyn Cancellable> {
        None
    }

    /// Returns true if the event is cancellable and currently cancelled.
    fn is_cancelled(&self) -> bool {
        self.cancellation().is_some_and(Cancellable::is_cancelled)
    }
}

/// Type-erased view used by the engine to filter and downcast events.
pub(crate) trait AnyEvent: Event {
    fn as_any(&self) -> &dyn Any;

    fn as_event(&self) -> &dyn Event;

    fn type_name(&self) -> &'static str;
}

impl<E: Event> AnyEvent for E {
    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_event(&self) -> &dyn Event {
        self
    }

    fn type_name(&self) -> &'static str {
        std::any::type_name::<E>()
    }
}

/// Borrowed view of an event delivered to a wildcard or multi-type binding.
///
/// Derefs to [`Event`]; [`downcast_ref`](Self::downcast_ref) recovers the
/// concrete type.
///
/// # Examples
///
/// ```rust,ignore
/// ListenerBindings::builder().handler_matching(
///     Priority::Normal,
///     EventFilter::of::<RowInserted>().or::<RowDeleted>(),
///     |event: EventView<'_>| {
///         if let Some(insert) = event.downcast_ref::<RowInserted>() {
///             check_quota(insert)?;
///         }
///         Ok(())
///     },
/// );
/// ```
#[derive(Clone, Copy)]
pub struct EventView<'a> {
    inner: &'a dyn AnyEvent,
}

impl<'a> EventView<'a> {
    pub(crate) fn new(inner: &'a dyn AnyEvent) -> Self {
        Self { inner }
    }

    /// The event as a trait object.
    #[must_use]
    pub fn event(self) -> &'a dyn Event {
        self.inner.as_event()
    }

    /// The concrete event, if it is an `E`.
    #[must_use]
    pub fn downcast_ref<E: Event>(self) -> Option<&'a E> {
        self.inner.as_any().downcast_ref::<E>()
    }

    /// Returns true if the event is an `E`.
    #[must_use]
    pub fn is<E: Event>(self) -> bool {
        self.inner.as_any().is::<E>()
    }

    /// Name of the concrete event type.
    #[must_use]
    pub fn type_name(self) -> &'static str {
        self.inner.type_name()
    }
}

impl std::ops::Deref for EventView<'_> {
    type Target = dyn Event;

    fn deref(&self) -> &Self::Target {
        self.inner.as_event()
    }
}

impl fmt::Debug for EventView<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventView")
            .field("id", self.inner.id())
            .field("type", &self.inner.type_name())
            .finish()
    }
}
