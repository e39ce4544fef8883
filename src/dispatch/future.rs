use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use chrono::{DateTime, Utc};

use crate::error::{DispatchResult, ExecutionError};
use crate::event::{AnyEvent, Event, EventId};
use crate::outcome::Outcome;
use crate::pool::WorkerPool;
use crate::registry::MonitorSnapshot;

use super::failure::InvocationError;
use super::monitor::MonitorNotifyFuture;
use super::task::TaskState;

/// Handle to the in-flight or completed dispatch of one event.
///
/// Returned immediately by [`DispatchManager::fire_event`](crate::DispatchManager::fire_event).
/// Waiting blocks only the calling thread; timeouts never stop the
/// underlying dispatch.
///
/// # Example
/// ```rust,ignore
/// let future = manager.fire_event(RowInserted::new("teams"))?;
/// let event = future.get_timeout(Duration::from_secs(1))?;
/// match future.result() {
///     Some(Outcome::Cancelled) => return Ok(()), // vetoed: skip the mutation
///     _ => apply(&event),
/// }
/// future.notify_monitors(future.outcome()?)?;
/// ```
pub struct DispatchFuture<E: Event> {
    event: Arc<E>,
    state: Arc<TaskState>,
    fired_at: DateTime<Utc>,
    top_cancel: AtomicBool,
    notified: Mutex<bool>,
    monitors: MonitorSnapshot,
    monitor_pool: Arc<WorkerPool>,
}

impl<E: Event> DispatchFuture<E> {
    pub(crate) fn new(
        event: Arc<E>,
        state: Arc<TaskState>,
        monitors: MonitorSnapshot,
        monitor_pool: Arc<WorkerPool>,
    ) -> Self {
        Self {
            event,
            state,
            fired_at: Utc::now(),
            top_cancel: AtomicBool::new(false),
            notified: Mutex::new(false),
            monitors,
            monitor_pool,
        }
    }

    /// Id of the fired event.
    #[must_use]
    pub fn event_id(&self) -> &EventId {
        self.event.id()
    }

    /// When the event was fired.
    #[must_use]
    pub fn fired_at(&self) -> DateTime<Utc> {
        self.fired_at
    }

    /// Block until every handler has run and return the event.
    ///
    /// If [`cancel`](Self::cancel) was requested, a cancellable event is
    /// forced to cancelled before it is returned.
    pub fn get(&self) -> DispatchResult<Arc<E>> {
        self.state.done().wait()?;
        Ok(self.finish())
    }

    /// Like [`get`](Self::get), but gives up after `timeout` with
    /// `ExecutionError::Timeout`. The dispatch keeps running.
    pub fn get_timeout(&self, timeout: Duration) -> DispatchResult<Arc<E>> {
        self.state.done().wait_timeout(timeout)?;
        Ok(self.finish())
    }

    fn finish(&self) -> Arc<E> {
        if self.top_cancel.load(Ordering::Acquire) {
            if let Some(flag) = self.event.cancellation() {
                flag.set_cancelled(true);
            }
        }
        Arc::clone(&self.event)
    }

    /// Request a top-level cancellation override.
    ///
    /// Running handlers are not interrupted; the override is applied when
    /// the result is read.
    pub fn cancel(&self) {
        self.top_cancel.store(true, Ordering::Release);
    }

    /// Same as [`cancel`](Self::cancel); always succeeds.
    pub fn cancel_with(&self, _may_interrupt: bool) -> bool {
        self.cancel();
        true
    }

    /// True once every handler has run. Never blocks.
    #[must_use]
    pub fn is_done(&self) -> bool {
        self.state.done().is_released()
    }

    /// True if the override was requested, or the dispatch is done and the
    /// event ended cancelled. Returns `false` rather than blocking while the
    /// dispatch is still running.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        if self.top_cancel.load(Ordering::Acquire) {
            return true;
        }
        if !self.is_done() {
            return false;
        }
        match self.state.done().wait() {
            Ok(()) => self.event.is_cancelled(),
            Err(_) => false,
        }
    }

    /// True if any handler failed so far. Never blocks.
    #[must_use]
    pub fn has_error(&self) -> bool {
        self.state.has_error()
    }

    /// Handler failures recorded so far; may grow until [`is_done`](Self::is_done).
    #[must_use]
    pub fn exceptions(&self) -> Vec<InvocationError> {
        self.state.errors()
    }

    /// `None` while running; then `Cancelled`, else `Error`, else `Success`.
    #[must_use]
    pub fn result(&self) -> Option<Outcome> {
        if !self.is_done() {
            return None;
        }
        if self.is_cancelled() {
            return Some(Outcome::Cancelled);
        }
        if self.has_error() {
            return Some(Outcome::Error);
        }
        Some(Outcome::Success)
    }

    /// Block until done, then return the outcome.
    pub fn outcome(&self) -> DispatchResult<Outcome> {
        self.get()?;
        Ok(self.result().unwrap_or(Outcome::Error))
    }

    /// Notify every matching monitor of `outcome` on the monitor pool.
    ///
    /// Blocks on [`get`](Self::get) first. Monitors are notified at most once
    /// per dispatch: after a successful call, another returns
    /// `ExecutionError::MonitorsAlreadyNotified`. A call that fails to queue
    /// the notifications does not count.
    pub fn notify_monitors(&self, outcome: Outcome) -> DispatchResult<MonitorNotifyFuture> {
        let event = self.get()?;
        let mut notified = self.notified.lock().unwrap_or_else(PoisonError::into_inner);
        if *notified {
            return Err(ExecutionError::MonitorsAlreadyNotified {
                event_id: event.id().clone(),
            }
            .into());
        }
        let event: Arc<dyn AnyEvent> = event;
        let monitors =
            MonitorNotifyFuture::spawn(event, outcome, &self.monitors, &self.monitor_pool)?;
        *notified = true;
        Ok(monitors)
    }

    /// Wait for the dispatch, derive its outcome and notify monitors with it.
    pub fn complete(&self) -> DispatchResult<(Outcome, MonitorNotifyFuture)> {
        let outcome = self.outcome()?;
        let monitors = self.notify_monitors(outcome)?;
        Ok((outcome, monitors))
    }
}

impl<E: Event> fmt::Debug for DispatchFuture<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DispatchFuture")
            .field("event_id", self.event.id())
            .field("event_type", &std::any::type_name::<E>())
            .field("fired_at", &self.fired_at)
            .field("done", &self.is_done())
            .field("top_cancel", &self.top_cancel.load(Ordering::Relaxed))
            .field("monitors", &self.monitors.len())
            .finish_non_exhaustive()
    }
}
