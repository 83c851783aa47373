//! Per-owner execution lane
//!
//! A lane pairs the owner's mutation gate with the handle of its run task and
//! any step outcome that could not be persisted yet.

use sg_plan::ExecutionPlan;
use tokio::sync::{watch, Mutex};
use tokio_util::sync::CancellationToken;

/// Live run task: its cancellation token and a receiver whose sender the task
/// holds until it exits
#[derive(Debug)]
struct RunHandle {
    token: CancellationToken,
    done: watch::Receiver<()>,
}

impl RunHandle {
    fn is_finished(&self) -> bool {
        self.done.has_changed().is_err()
    }
}

#[derive(Debug, Default)]
pub(crate) struct Lane {
    gate: Mutex<()>,
    run: parking_lot::Mutex<Option<RunHandle>>,
    unsynced: parking_lot::Mutex<Option<ExecutionPlan>>,
}

impl Lane {
    /// Serializes every plan mutation for the owner
    pub(crate) fn gate(&self) -> &Mutex<()> {
        &self.gate
    }

    /// Signal the current run task, if any, to stop at its next checkpoint
    pub(crate) fn cancel(&self) {
        if let Some(run) = self.run.lock().as_ref() {
            run.token.cancel();
        }
    }

    /// Install a freshly spawned run task, cancelling any predecessor
    pub(crate) fn arm(&self, token: CancellationToken, done: watch::Receiver<()>) {
        let previous = self.run.lock().replace(RunHandle { token, done });
        if let Some(previous) = previous {
            previous.token.cancel();
        }
    }

    /// Completion signal of the installed run task, unless it already exited
    ///
    /// The handle stays installed so later cancels and re-arms still reach it.
    pub(crate) fn unfinished_run(&self) -> Option<watch::Receiver<()>> {
        self.run
            .lock()
            .as_ref()
            .filter(|run| !run.is_finished())
            .map(|run| run.done.clone())
    }

    pub(crate) fn is_running(&self) -> bool {
        self.run
            .lock()
            .as_ref()
            .is_some_and(|run| !run.token.is_cancelled() && !run.is_finished())
    }

    pub(crate) fn park(&self, plan: ExecutionPlan) {
        *self.unsynced.lock() = Some(plan);
    }

    pub(crate) fn parked(&self) -> Option<ExecutionPlan> {
        self.unsynced.lock().clone()
    }

    pub(crate) fn clear_parked(&self) {
        self.unsynced.lock().take();
    }
}
