//! Error types for eventfire.
//!
//! Engine errors are strongly typed using thiserror. Failures raised by user
//! callbacks are *not* engine errors: they are captured as
//! [`InvocationError`](crate::dispatch::InvocationError) values and exposed
//! through the futures, never returned from `fire_event`.

use thiserror::Error;

use crate::event::EventId;
use crate::priority::Priority;

/// Validation errors raised synchronously while building bindings or config.
#[derive(Debug, Error)]
pub enum ValidationError {
    #[error("Priority {priority} is reserved for monitors and cannot be used by a handler")]
    MonitorPriorityForHandler {
        priority: Priority,
    },

    #[error("Listener name cannot be empty")]
    EmptyListenerName,

    #[error("Invalid configuration: {reason}")]
    InvalidConfig {
        reason: String,
    },
}

/// Execution errors surfaced to a caller waiting on or submitting work.
#[derive(Debug, Error)]
pub enum ExecutionError {
    #[error("Operation timed out after {duration_ms}ms")]
    Timeout {
        duration_ms: u64,
    },

    #[error("Worker queue '{pool}' is full (capacity {capacity})")]
    QueueFull {
        pool: String,
        capacity: usize,
    },

    #[error("Worker pool '{pool}' is disconnected")]
    Disconnected {
        pool: String,
    },

    #[error("Task for event {event_id} was dropped before it completed")]
    Abandoned {
        event_id: EventId,
    },

    #[error("Monitors were already notified for event {event_id}")]
    MonitorsAlreadyNotified {
        event_id: EventId,
    },

    #[error("Failed to spawn worker thread '{name}': {message}")]
    WorkerSpawn {
        name: String,
        message: String,
    },
}

/// Top-level error type for eventfire.
#[derive(Debug, Error)]
pub enum DispatchError {
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    #[error("Execution error: {0}")]
    Execution(#[from] ExecutionError),

    #[error("Internal error: {message}")]
    Internal {
        message: String,
    },
}

impl DispatchError {
    /// Creates an internal error.
    #[must_use]
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    /// Returns true if this is a validation error.
    #[must_use]
    pub const fn is_validation(&self) -> bool {
        matches!(self, Self::Validation(_))
    }

    /// Returns true if this is an execution error.
    #[must_use]
    pub const fn is_execution(&self) -> bool {
        matches!(self, Self::Execution(_))
    }

    /// Returns true if this is a wait timeout.
    #[must_use]
    pub const fn is_timeout(&self) -> bool {
        matches!(self, Self::Execution(ExecutionError::Timeout { .. }))
    }

    /// Returns true if retrying the same call may succeed.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        match self {
            Self::Validation(_) | Self::Internal { .. } => false,
            Self::Execution(e) => matches!(
                e,
                ExecutionError::Timeout { .. } | ExecutionError::QueueFull { .. }
            ),
        }
    }
}

/// Result type alias for eventfire operations.
pub type DispatchResult<T> = Result<T, DispatchError>;

pub(crate) fn timeout_error(timeout: std::time::Duration) -> DispatchError {
    DispatchError::Execution(ExecutionError::Timeout {
        duration_ms: timeout.as_millis().min(u128::from(u64::MAX)) as u64,
    })
}
