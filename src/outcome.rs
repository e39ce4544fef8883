//! Tri-state outcome of a dispatch or a monitor notification.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Derived classification of a completed dispatch or notification.
///
/// Never stored: futures compute it on demand from the event's cancellation
/// state and the recorded failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Outcome {
    /// Every binding ran without failure and the event was not cancelled.
    Success,
    /// The event ended cancelled, by a handler or a top-level override.
    Cancelled,
    /// At least one binding failed.
    Error,
}

impl Outcome {
    /// Returns true for `Success`.
    #[must_use]
    pub const fn is_success(self) -> bool {
        matches!(self, Self::Success)
    }

    /// Returns true for `Cancelled`. Producers must not perform the
    /// mutation the event announced.
    #[must_use]
    pub const fn is_cancelled(self) -> bool {
        matches!(self, Self::Cancelled)
    }
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Success => "SUCCESS",
            Self::Cancelled => "CANCELLED",
            Self::Error => "ERROR",
        })
    }
}
