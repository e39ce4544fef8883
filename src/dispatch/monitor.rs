use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::completion::{completion, CompletionSignal};
use crate::error::{timeout_error, DispatchResult};
use crate::event::{AnyEvent, EventId};
use crate::listener::MonitorBinding;
use crate::outcome::Outcome;
use crate::pool::WorkerPool;
use crate::registry::MonitorSnapshot;

use super::failure::{invoke_guarded, InvocationError, InvocationPhase};
use super::task::TaskState;

/// Delivers one `(event, outcome)` pair to one monitor binding.
struct MonitorNotifyTask {
    monitor: Arc<MonitorBinding>,
    event: Arc<dyn AnyEvent>,
    outcome: Outcome,
    state: Arc<TaskState>,
    signal: CompletionSignal,
}

impl MonitorNotifyTask {
    fn new(
        monitor: Arc<MonitorBinding>,
        event: Arc<dyn AnyEvent>,
        outcome: Outcome,
    ) -> (Self, Arc<TaskState>) {
        let (signal, done) = completion(event.id().clone());
        let state = Arc::new(TaskState::new(done));
        let task = Self {
            monitor,
            event,
            outcome,
            state: Arc::clone(&state),
            signal,
        };
        (task, state)
    }

    fn run(self) {
        let Self {
            monitor,
            event,
            outcome,
            state,
            signal,
        } = self;

        if let Err(cause) = invoke_guarded(|| monitor.invoke(event.as_ref(), outcome)) {
            tracing::warn!(
                event_id = %event.id(),
                listener = %monitor.owner(),
                %outcome,
                error = %cause,
                "event monitor failed"
            );
            state.record(InvocationError::new(
                monitor.owner().clone(),
                event.id().clone(),
                InvocationPhase::Monitor,
                cause,
            ));
        }

        signal.complete();
    }
}

/// Aggregated handle over the monitor notifications of one event.
///
/// Monitor notification cannot be cancelled. Each monitor's failure is kept
/// separately and never affects the other monitors.
#[derive(Debug)]
pub struct MonitorNotifyFuture {
    event_id: EventId,
    tasks: Vec<Arc<TaskState>>,
}

impl MonitorNotifyFuture {
    pub(crate) fn spawn(
        event: Arc<dyn AnyEvent>,
        outcome: Outcome,
        monitors: &MonitorSnapshot,
        pool: &WorkerPool,
    ) -> DispatchResult<Self> {
        let event_id = event.id().clone();
        let mut tasks = Vec::new();

        for monitor in monitors.bindings().iter().filter(|m| m.matches(event.as_ref())) {
            let (task, state) =
                MonitorNotifyTask::new(Arc::clone(monitor), Arc::clone(&event), outcome);
            pool.submit(Box::new(move || task.run()))?;
            tasks.push(state);
        }

        tracing::debug!(
            event_id = %event_id,
            %outcome,
            monitors = tasks.len(),
            pool = pool.name(),
            "notifying monitors"
        );

        Ok(Self { event_id, tasks })
    }

    /// Id of the observed event.
    #[must_use]
    pub fn event_id(&self) -> &EventId {
        &self.event_id
    }

    /// Number of monitors being notified.
    #[must_use]
    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    /// Returns true if no monitor matched the event.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    /// Block until every monitor has been notified.
    pub fn get(&self) -> DispatchResult<()> {
        for task in &self.tasks {
            task.done().wait()?;
        }
        Ok(())
    }

    /// Like [`get`](Self::get), with one deadline shared by all monitors.
    pub fn get_timeout(&self, timeout: Duration) -> DispatchResult<()> {
        let deadline = Instant::now() + timeout;
        for task in &self.tasks {
            let remaining = deadline.saturating_duration_since(Instant::now());
            task.done().wait_timeout(remaining).map_err(|err| {
                if err.is_timeout() {
                    timeout_error(timeout)
                } else {
                    err
                }
            })?;
        }
        Ok(())
    }

    /// Notifications cannot be cancelled; always returns `false`.
    pub fn cancel(&self) -> bool {
        false
    }

    /// Always `false`.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        false
    }

    /// True once every monitor has been notified. Never blocks.
    #[must_use]
    pub fn is_done(&self) -> bool {
        self.tasks.iter().all(|t| t.done().is_released())
    }

    /// True if any monitor failed so far.
    #[must_use]
    pub fn has_error(&self) -> bool {
        self.tasks.iter().any(|t| t.has_error())
    }

    /// Union of every monitor's failures.
    #[must_use]
    pub fn exceptions(&self) -> Vec<InvocationError> {
        self.tasks.iter().flat_map(|t| t.errors()).collect()
    }

    /// `None` while incomplete; then `Error` if any monitor failed, else `Success`.
    #[must_use]
    pub fn result(&self) -> Option<Outcome> {
        if !self.is_done() {
            return None;
        }
        if self.has_error() {
            return Some(Outcome::Error);
        }
        Some(Outcome::Success)
    }
}
