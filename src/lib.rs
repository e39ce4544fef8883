//! # eventfire - Priority Event Dispatch
//!
//! eventfire is an embeddable, in-process publish/dispatch engine. Producers
//! fire typed, optionally-cancellable events; consumers register handlers,
//! which run in strict priority order and may veto the event, and monitors,
//! which observe the final outcome afterwards, concurrently.
//!
//! ## Core Concepts
//!
//! - **Event**: an occurrence with a unique id, optionally [`Cancellable`]
//! - **Priority**: ordered handler tiers; `MONITOR` is reserved for monitors
//! - **Bindings**: handlers and monitors built explicitly per listener
//! - **DispatchFuture**: the caller's handle to one fired event
//! - **Outcome**: derived `SUCCESS` / `CANCELLED` / `ERROR`
//!
//! ## Usage
//!
//! ```rust,ignore
//! use eventfire::{CancelFlag, Cancellable, DispatchConfig, DispatchManager, Event, EventId};
//! use eventfire::{ListenerBindings, Outcome, Priority};
//!
//! struct RowInserted {
//!     id: EventId,
//!     table: String,
//!     cancel: CancelFlag,
//! }
//!
//! impl Event for RowInserted {
//!     fn id(&self) -> &EventId { &self.id }
//!     fn cancellation(&self) -> Option<&dyn Cancellable> { Some(&self.cancel) }
//! }
//!
//! let manager = DispatchManager::new(DispatchConfig::default())?;
//! manager.register_events(
//!     ListenerBindings::builder()
//!         .handler(Priority::High, |e: &RowInserted| {
//!             e.cancel.set_cancelled(e.table == "archive");
//!             Ok(())
//!         })
//!         .build()?,
//! )?;
//!
//! let future = manager.fire_event(RowInserted {
//!     id: EventId::new(),
//!     table: "archive".into(),
//!     cancel: CancelFlag::default(),
//! })?;
//! let (outcome, _monitors) = future.complete()?;
//! assert_eq!(outcome, Outcome::Cancelled);
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod config;
pub mod dispatch;
pub mod error;
pub mod event;
pub mod listener;
pub mod manager;
pub mod outcome;
pub mod priority;
pub mod registry;

mod completion;
mod pool;

// Re-export primary types at crate root for convenience
pub use config::{DispatchConfig, MonitorPoolMode};
pub use dispatch::{
    DispatchFuture, FailureCause, InvocationError, InvocationPhase, MonitorNotifyFuture,
};
pub use error::{DispatchError, DispatchResult, ExecutionError, ValidationError};
pub use event::{CancelFlag, Cancellable, Event, EventId, EventView};
pub use listener::{
    BoxError, CallbackResult, EventFilter, HandlerBinding, Listener, ListenerBindings,
    ListenerBindingsBuilder, ListenerId, MonitorBinding, Owner,
};
pub use manager::{DispatchManager, EventRegistrar};
pub use outcome::Outcome;
pub use priority::Priority;
pub use registry::{BindingRegistry, HandlerSnapshot, MonitorSnapshot};
