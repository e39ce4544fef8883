//! Failures raised by user callbacks.
//!
//! A failing handler or monitor never aborts the engine: the failure is
//! recorded as an [`InvocationError`] and exposed through the futures.

use std::any::Any;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::event::EventId;
use crate::listener::{CallbackResult, Owner};
use crate::priority::Priority;

/// Where a failure happened.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InvocationPhase {
    /// A handler at the given tier.
    Handler(Priority),
    /// A monitor.
    Monitor,
}

impl fmt::Display for InvocationPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Handler(p) => write!(f, "handler at {p}"),
            Self::Monitor => f.write_str("monitor"),
        }
    }
}

/// What went wrong inside the callback.
#[derive(Debug, Clone)]
pub enum FailureCause {
    /// The callback returned an error.
    Returned(Arc<dyn std::error::Error + Send + Sync>),
    /// The callback panicked; holds the panic message.
    Panicked(String),
}

impl FailureCause {
    /// Returns true if the callback panicked.
    #[must_use]
    pub const fn is_panic(&self) -> bool {
        matches!(self, Self::Panicked(_))
    }
}

impl fmt::Display for FailureCause {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Returned(err) => write!(f, "{err}"),
            Self::Panicked(msg) => write!(f, "panicked: {msg}"),
        }
    }
}

/// One recorded callback failure.
#[derive(Debug, Clone, Error)]
#[error("{phase} of listener {listener} failed on event {event_id}: {cause}")]
pub struct InvocationError {
    /// The listener owning the failed binding.
    pub listener: Owner,
    /// The event being dispatched or observed.
    pub event_id: EventId,
    /// Handler tier or monitor.
    pub phase: InvocationPhase,
    /// The failure itself.
    pub cause: FailureCause,
    /// When the failure was recorded.
    pub occurred_at: DateTime<Utc>,
}

impl InvocationError {
    pub(crate) fn new(
        listener: Owner,
        event_id: EventId,
        phase: InvocationPhase,
        cause: FailureCause,
    ) -> Self {
        Self {
            listener,
            event_id,
            phase,
            cause,
            occurred_at: Utc::now(),
        }
    }
}

/// Run a callback, turning both `Err` returns and panics into a cause.
pub(crate) fn invoke_guarded<F>(f: F) -> Result<(), FailureCause>
where
    F: FnOnce() -> CallbackResult,
{
    match panic::catch_unwind(AssertUnwindSafe(f)) {
        Ok(Ok(())) => Ok(()),
        Ok(Err(err)) => Err(FailureCause::Returned(Arc::from(err))),
        Err(payload) => Err(FailureCause::Panicked(panic_message(payload.as_ref()))),
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}
