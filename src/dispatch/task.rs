use std::sync::{Arc, Mutex, PoisonError};

use crate::completion::{completion, Completion, CompletionSignal};
use crate::event::{AnyEvent, Cancellable};
use crate::registry::HandlerSnapshot;

use super::failure::{invoke_guarded, InvocationError, InvocationPhase};

/// State shared between a running task and the futures observing it.
///
/// Failures are appended only by the worker executing the task; readers see
/// a set that may still grow until the completion latch is released.
#[derive(Debug)]
pub(crate) struct TaskState {
    errors: Mutex<Vec<InvocationError>>,
    done: Completion,
}

impl TaskState {
    pub(crate) fn new(done: Completion) -> Self {
        Self {
            errors: Mutex::new(Vec::new()),
            done,
        }
    }

    pub(crate) fn done(&self) -> &Completion {
        &self.done
    }

    pub(crate) fn record(&self, error: InvocationError) {
        self.errors.lock().unwrap_or_else(PoisonError::into_inner).push(error);
    }

    pub(crate) fn has_error(&self) -> bool {
        !self.errors.lock().unwrap_or_else(PoisonError::into_inner).is_empty()
    }

    pub(crate) fn errors(&self) -> Vec<InvocationError> {
        self.errors.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }
}

/// One fired event walking its handler snapshot.
pub(crate) struct DispatchTask {
    event: Arc<dyn AnyEvent>,
    handlers: HandlerSnapshot,
    state: Arc<TaskState>,
    signal: CompletionSignal,
}

impl DispatchTask {
    pub(crate) fn new(
        event: Arc<dyn AnyEvent>,
        handlers: HandlerSnapshot,
    ) -> (Self, Arc<TaskState>) {
        let (signal, done) = completion(event.id().clone());
        let state = Arc::new(TaskState::new(done));
        let task = Self {
            event,
            handlers,
            state: Arc::clone(&state),
            signal,
        };
        (task, state)
    }

    /// Invoke every matching handler once, tier by tier.
    ///
    /// A failing handler is recorded and its cancellation side effect is
    /// rolled back; the remaining handlers still run.
    pub(crate) fn run(self) {
        let Self {
            event,
            handlers,
            state,
            signal,
        } = self;
        let event_id = event.id();

        tracing::debug!(
            event_id = %event_id,
            event_type = event.type_name(),
            handlers = handlers.len(),
            "dispatching event"
        );

        let cancellation = event.cancellation();
        let mut failures = 0usize;

        for (priority, bindings) in handlers.tiers() {
            for binding in bindings.iter().filter(|b| b.matches(event.as_ref())) {
                let before = cancellation.map(Cancellable::is_cancelled);

                if binding.ignores_cancelled() && before == Some(true) {
                    tracing::trace!(
                        event_id = %event_id,
                        listener = %binding.owner(),
                        %priority,
                        "skipping handler on cancelled event"
                    );
                    continue;
                }

                tracing::trace!(
                    event_id = %event_id,
                    listener = %binding.owner(),
                    %priority,
                    "invoking handler"
                );

                if let Err(cause) = invoke_guarded(|| binding.invoke(event.as_ref())) {
                    if let (Some(flag), Some(previous)) = (cancellation, before) {
                        flag.set_cancelled(previous);
                    }
                    tracing::warn!(
                        event_id = %event_id,
                        listener = %binding.owner(),
                        %priority,
                        error = %cause,
                        "event handler failed"
                    );
                    failures += 1;
                    state.record(InvocationError::new(
                        binding.owner().clone(),
                        event_id.clone(),
                        InvocationPhase::Handler(priority),
                        cause,
                    ));
                }
            }
        }

        tracing::debug!(
            event_id = %event_id,
            cancelled = event.is_cancelled(),
            failures,
            "event dispatch finished"
        );

        signal.complete();
    }
}
