//! Dispatch subsystem.
//!
//! Firing an event queues a dispatch task that walks the handler tiers on a
//! worker thread. The caller gets a [`DispatchFuture`] immediately; once the
//! outcome is known it can fan out to monitors through
//! [`DispatchFuture::notify_monitors`], which returns a
//! [`MonitorNotifyFuture`] with its own aggregated result.

/// Recorded handler and monitor failures.
pub mod failure;
/// Caller-side handle of one fired event.
pub mod future;
/// Monitor fan-out task and aggregating future.
pub mod monitor;
/// Priority-ordered handler invocation.
pub(crate) mod task;

pub use failure::{FailureCause, InvocationError, InvocationPhase};
pub use future::DispatchFuture;
pub use monitor::MonitorNotifyFuture;
