//! Dispatch manager configuration.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{DispatchResult, ValidationError};
use crate::pool::PoolSizing;

/// Where monitor notifications run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MonitorPoolMode {
    /// A separate pool of `monitor_workers` threads.
    #[default]
    Dedicated,
    /// Reuse the dispatch pool.
    Shared,
}

/// Manager configuration.
///
/// Every field has a default, so a partial JSON document is accepted.
/// Zero worker counts and capacities are clamped to one.
///
/// By default the dispatch pool behaves like a cached thread pool: its queue
/// is unbounded and it starts another worker whenever every worker is busy,
/// so `fire_event` never fails for lack of capacity and a handler may fire
/// and wait on a nested event. Setting `queue_capacity` opts into
/// backpressure; `fire_event` then fails with `QueueFull` when the queue is
/// at capacity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DispatchConfig {
    /// Dispatch workers kept alive while idle.
    pub dispatch_workers: usize,
    /// Upper bound on dispatch workers; `None` grows without limit.
    pub max_dispatch_workers: Option<usize>,
    /// Idle time in milliseconds after which an extra dispatch worker retires.
    pub worker_keep_alive_ms: u64,
    /// Number of monitor workers (dedicated mode only).
    pub monitor_workers: usize,
    /// Maximum queued jobs per pool; `None` is unbounded.
    pub queue_capacity: Option<usize>,
    /// Monitor pool selection.
    pub monitor_pool: MonitorPoolMode,
    /// Prefix for worker thread names.
    pub thread_name_prefix: String,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            dispatch_workers: 4,
            max_dispatch_workers: None,
            worker_keep_alive_ms: 60_000,
            monitor_workers: 1,
            queue_capacity: None,
            monitor_pool: MonitorPoolMode::Dedicated,
            thread_name_prefix: "eventfire".to_string(),
        }
    }
}

impl DispatchConfig {
    /// Parse a configuration from JSON.
    pub fn from_json(json: &str) -> DispatchResult<Self> {
        let cfg: Self =
            serde_json::from_str(json).map_err(|e| ValidationError::InvalidConfig {
                reason: e.to_string(),
            })?;
        if cfg.thread_name_prefix.trim().is_empty() {
            return Err(ValidationError::InvalidConfig {
                reason: "thread_name_prefix cannot be empty".to_string(),
            }
            .into());
        }
        Ok(cfg)
    }

    pub(crate) fn dispatch_sizing(&self) -> PoolSizing {
        PoolSizing {
            core: self.dispatch_workers,
            max: self.max_dispatch_workers,
            queue_capacity: self.queue_capacity,
            keep_alive: Duration::from_millis(self.worker_keep_alive_ms),
        }
    }

    pub(crate) fn monitor_sizing(&self) -> PoolSizing {
        PoolSizing::fixed(self.monitor_workers, self.queue_capacity)
    }
}
