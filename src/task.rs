//! Single-assignment task futures.
//!
//! A `Task` is the orchestration-side handle for one scheduled operation: an
//! activity call, a timer, a sub-orchestration call, or an external-event
//! wait. It is completed at most once, by the executor, from a matching
//! history event. The executor keeps the shared `TaskSlot` in the context's
//! pending-task map; user code holds the `Task` and awaits it.

use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Mutex};
use std::task::{Context, Poll};

use serde::de::DeserializeOwned;
use tracing::warn;

use crate::codec;

#[derive(Debug)]
enum TaskState {
    Pending,
    Succeeded(Option<String>),
    Failed(String),
}

/// Engine-side completion slot shared between the pending-task map and the
/// user-held `Task` future.
#[derive(Debug, Clone)]
pub(crate) struct TaskSlot {
    state: Arc<Mutex<TaskState>>,
}

impl TaskSlot {
    pub(crate) fn new() -> Self {
        Self {
            state: Arc::new(Mutex::new(TaskState::Pending)),
        }
    }

    /// Transition to `Succeeded`. A task never leaves a terminal state; a
    /// second completion attempt is logged and ignored.
    pub(crate) fn complete(&self, result: Option<String>) {
        let mut state = self.state.lock().unwrap();
        if !matches!(*state, TaskState::Pending) {
            warn!("ignoring completion of a task that already reached a terminal state");
            return;
        }
        *state = TaskState::Succeeded(result);
    }

    /// Transition to `Failed`, with the same terminal-state guard.
    pub(crate) fn fail(&self, message: String) {
        let mut state = self.state.lock().unwrap();
        if !matches!(*state, TaskState::Pending) {
            warn!("ignoring failure of a task that already reached a terminal state");
            return;
        }
        *state = TaskState::Failed(message);
    }
}

/// The outcome of one scheduled operation: the encoded result payload on
/// success (absent for timers and empty results), or a failure message.
pub type TaskResult = Result<Option<String>, String>;

/// A future resolving to the outcome of one scheduled operation.
///
/// Pending until the executor delivers the matching result event and resumes
/// the orchestration; the poll itself never blocks.
pub struct Task {
    slot: TaskSlot,
}

impl Task {
    pub(crate) fn pending(slot: TaskSlot) -> Self {
        Self { slot }
    }

    /// A task born in the `Succeeded` state, used when a buffered external
    /// event payload is consumed at subscription time.
    pub(crate) fn completed(result: Option<String>) -> Self {
        let slot = TaskSlot::new();
        slot.complete(result);
        Self { slot }
    }

    /// Await the task and decode its payload. An absent payload decodes as
    /// JSON `null`.
    pub async fn into_typed<T: DeserializeOwned>(self) -> Result<T, String> {
        match self.await {
            Ok(Some(text)) => codec::decode(&text),
            Ok(None) => codec::decode(""),
            Err(message) => Err(message),
        }
    }
}

impl Future for Task {
    type Output = TaskResult;

    fn poll(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<Self::Output> {
        let state = self.slot.state.lock().unwrap();
        match &*state {
            TaskState::Pending => Poll::Pending,
            TaskState::Succeeded(result) => Poll::Ready(Ok(result.clone())),
            TaskState::Failed(message) => Poll::Ready(Err(message.clone())),
        }
    }
}
