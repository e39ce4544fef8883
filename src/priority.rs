//! Priority ladder for handler invocation.
//!
//! Tiers are ordered by an explicit call order, not by variant declaration
//! order: lower call orders run first. `Monitor` sits above every handler
//! tier and is reserved for the monitor fan-out phase.

use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::ValidationError;

/// Invocation tier of a binding.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Priority {
    /// Runs first; gets the first say.
    Lowest,
    /// Runs after `Lowest`.
    Low,
    /// Default tier.
    #[default]
    Normal,
    /// Runs after `Normal`.
    High,
    /// Runs last among handlers; gets the final say.
    Highest,
    /// Reserved for monitors; never used during handler dispatch.
    Monitor,
}

impl Priority {
    /// Handler tiers in invocation order.
    pub const HANDLER_TIERS: [Self; 5] =
        [Self::Lowest, Self::Low, Self::Normal, Self::High, Self::Highest];

    /// Explicit invocation order of this tier.
    #[must_use]
    pub const fn call_order(self) -> u8 {
        match self {
            Self::Lowest => 0,
            Self::Low => 1,
            Self::Normal => 2,
            Self::High => 3,
            Self::Highest => 4,
            Self::Monitor => 5,
        }
    }

    /// Returns true for the monitor-only tier.
    #[must_use]
    pub const fn is_monitor(self) -> bool {
        matches!(self, Self::Monitor)
    }

    /// Upper-case name of the tier.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Lowest => "LOWEST",
            Self::Low => "LOW",
            Self::Normal => "NORMAL",
            Self::High => "HIGH",
            Self::Highest => "HIGHEST",
            Self::Monitor => "MONITOR",
        }
    }
}

impl Ord for Priority {
    fn cmp(&self, other: &Self) -> Ordering {
        self.call_order().cmp(&other.call_order())
    }
}

impl PartialOrd for Priority {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl fmt::Display for Priority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Priority {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "LOWEST" => Ok(Self::Lowest),
            "LOW" => Ok(Self::Low),
            "NORMAL" => Ok(Self::Normal),
            "HIGH" => Ok(Self::High),
            "HIGHEST" => Ok(Self::Highest),
            "MONITOR" => Ok(Self::Monitor),
            other => Err(ValidationError::InvalidConfig {
                reason: format!("unknown priority '{other}'"),
            }),
        }
    }
}
