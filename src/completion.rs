//! One-shot completion latch.
//!
//! The worker side holds a [`CompletionSignal`]; any number of waiters hold a
//! [`Completion`]. The latch is a zero-capacity channel nobody ever sends on:
//! dropping the signal disconnects it, which wakes every waiter at once.
//! Because the signal releases on drop, the latch opens on every exit path,
//! including unwinding. Waiters distinguish a normal finish from a task that
//! was dropped unrun through the `finished` flag.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use crossbeam_channel::{bounded, Receiver, RecvTimeoutError, Sender, TryRecvError};

use crate::error::{timeout_error, DispatchResult, ExecutionError};
use crate::event::EventId;

pub(crate) fn completion(event_id: EventId) -> (CompletionSignal, Completion) {
    let (tx, rx) = bounded::<()>(0);
    let finished = Arc::new(AtomicBool::new(false));
    (
        CompletionSignal {
            _tx: tx,
            finished: Arc::clone(&finished),
        },
        Completion { rx, finished, event_id },
    )
}

/// Worker-side half: releases the latch when dropped.
#[derive(Debug)]
pub(crate) struct CompletionSignal {
    _tx: Sender<()>,
    finished: Arc<AtomicBool>,
}

impl CompletionSignal {
    /// Mark the task as finished and release the latch.
    pub(crate) fn complete(self) {
        self.finished.store(true, Ordering::Release);
    }
}

/// Waiter-side half.
#[derive(Debug, Clone)]
pub(crate) struct Completion {
    rx: Receiver<()>,
    finished: Arc<AtomicBool>,
    event_id: EventId,
}

impl Completion {
    /// True once the latch is released. Never blocks.
    pub(crate) fn is_released(&self) -> bool {
        matches!(self.rx.try_recv(), Err(TryRecvError::Disconnected))
    }

    /// Block until the latch is released.
    pub(crate) fn wait(&self) -> DispatchResult<()> {
        // Nothing is ever sent, so `recv` only returns on disconnect.
        let _ = self.rx.recv();
        self.check_finished()
    }

    /// Block until the latch is released or `timeout` elapses.
    pub(crate) fn wait_timeout(&self, timeout: Duration) -> DispatchResult<()> {
        match self.rx.recv_timeout(timeout) {
            Err(RecvTimeoutError::Timeout) => Err(timeout_error(timeout)),
            Ok(()) | Err(RecvTimeoutError::Disconnected) => self.check_finished(),
        }
    }

    fn check_finished(&self) -> DispatchResult<()> {
        if self.finished.load(Ordering::Acquire) {
            Ok(())
        } else {
            Err(ExecutionError::Abandoned {
                event_id: self.event_id.clone(),
            }
            .into())
        }
    }
}
