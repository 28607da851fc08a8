//! Per-pass runtime state for one orchestration instance.
//!
//! A fresh `OrchestrationContext` is created for every executor invocation
//! and discarded once the action batch has been extracted; only the event log
//! and the resulting actions are durable. The context is the single source of
//! replayable values (logical time, correlation ids) available to
//! orchestrator code.

use std::collections::{BTreeMap, VecDeque};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use crate::task::{Task, TaskSlot};
use crate::{
    non_empty, EventKind, FailureDetails, HistoryEvent, OrchestrationStatus, OrchestratorAction,
};

#[derive(Debug)]
struct CtxInner {
    instance_id: String,
    /// Logical clock, advanced only by `OrchestrationStarted` timestamps.
    current_time_ms: u64,
    /// Correlation-id source; strictly increasing, reset only by continue-as-new.
    sequence: u64,
    /// Actions requested this pass and not yet confirmed by history. Keyed by
    /// correlation id; ordered so emission is deterministic.
    pending_actions: BTreeMap<u64, OrchestratorAction>,
    /// In-flight operations awaiting a result event.
    pending_tasks: BTreeMap<u64, TaskSlot>,
    /// Tasks waiting for a named external event (consumer arrived first).
    /// Keys are case-folded.
    pending_events: BTreeMap<String, VecDeque<TaskSlot>>,
    /// Buffered external-event payloads (event arrived first). Keys are
    /// case-folded; each queue drains FIFO.
    received_events: BTreeMap<String, VecDeque<Option<String>>>,
    is_replaying: bool,
    is_complete: bool,
    completion_status: Option<OrchestrationStatus>,
    output: Option<String>,
    failure_details: Option<FailureDetails>,
    /// Continue-as-new: the next generation's input and whether buffered
    /// external events ride along.
    new_input: Option<String>,
    save_events: bool,
}

impl CtxInner {
    fn next_sequence(&mut self) -> u64 {
        self.sequence += 1;
        self.sequence
    }
}

/// Mutable state container threaded through one replay pass, exposed to
/// orchestrator code as its only scheduling capability.
#[derive(Clone)]
pub struct OrchestrationContext {
    inner: Arc<Mutex<CtxInner>>,
}

/// External event names match case-insensitively; the folded form is the
/// stored key.
fn fold_event_name(name: &str) -> String {
    name.to_lowercase()
}

impl OrchestrationContext {
    pub fn new(instance_id: impl Into<String>) -> Self {
        Self {
            inner: Arc::new(Mutex::new(CtxInner {
                instance_id: instance_id.into(),
                current_time_ms: 0,
                sequence: 0,
                pending_actions: BTreeMap::new(),
                pending_tasks: BTreeMap::new(),
                pending_events: BTreeMap::new(),
                received_events: BTreeMap::new(),
                is_replaying: false,
                is_complete: false,
                completion_status: None,
                output: None,
                failure_details: None,
                new_input: None,
                save_events: false,
            })),
        }
    }

    pub fn instance_id(&self) -> String {
        self.inner.lock().unwrap().instance_id.clone()
    }

    /// Logical time of the current turn. Never wall-clock; safe to use in
    /// orchestrator code.
    pub fn current_time_ms(&self) -> u64 {
        self.inner.lock().unwrap().current_time_ms
    }

    /// True while recorded history is being replayed, false once newly
    /// delivered events are applied. Gates user-visible side effects such as
    /// logging; correctness-critical transitions ignore it.
    pub fn is_replaying(&self) -> bool {
        self.inner.lock().unwrap().is_replaying
    }

    pub fn is_complete(&self) -> bool {
        self.inner.lock().unwrap().is_complete
    }

    pub fn completion_status(&self) -> Option<OrchestrationStatus> {
        self.inner.lock().unwrap().completion_status
    }

    /// Schedule an activity invocation and return the task for its result.
    pub fn call_activity(&self, name: impl Into<String>, input: impl Into<String>) -> Task {
        let name = name.into();
        let input = non_empty(input.into());
        let mut inner = self.inner.lock().unwrap();
        let id = inner.next_sequence();
        inner
            .pending_actions
            .insert(id, OrchestratorAction::ScheduleTask { id, name, input });
        let slot = TaskSlot::new();
        inner.pending_tasks.insert(id, slot.clone());
        Task::pending(slot)
    }

    /// Create a durable timer that fires after `delay` of logical time.
    pub fn create_timer(&self, delay: Duration) -> Task {
        let mut inner = self.inner.lock().unwrap();
        let id = inner.next_sequence();
        let fire_at_ms = inner.current_time_ms.saturating_add(delay.as_millis() as u64);
        inner
            .pending_actions
            .insert(id, OrchestratorAction::CreateTimer { id, fire_at_ms });
        let slot = TaskSlot::new();
        inner.pending_tasks.insert(id, slot.clone());
        Task::pending(slot)
    }

    /// Start a sub-orchestration with a deterministic child instance id
    /// derived from this instance and the correlation id.
    pub fn call_sub_orchestrator(&self, name: impl Into<String>, input: impl Into<String>) -> Task {
        let name = name.into();
        let input = input.into();
        let instance_id = {
            let inner = self.inner.lock().unwrap();
            format!("{}::sub::{}", inner.instance_id, inner.sequence + 1)
        };
        self.call_sub_orchestrator_with_id(name, instance_id, input)
    }

    /// Start a sub-orchestration under an explicit child instance id.
    pub fn call_sub_orchestrator_with_id(
        &self,
        name: impl Into<String>,
        instance_id: impl Into<String>,
        input: impl Into<String>,
    ) -> Task {
        let name = name.into();
        let instance_id = instance_id.into();
        let input = non_empty(input.into());
        let mut inner = self.inner.lock().unwrap();
        let id = inner.next_sequence();
        inner.pending_actions.insert(
            id,
            OrchestratorAction::CreateSubOrchestration {
                id,
                name,
                instance_id,
                input,
            },
        );
        let slot = TaskSlot::new();
        inner.pending_tasks.insert(id, slot.clone());
        Task::pending(slot)
    }

    /// Subscribe to a named external event. If a payload for that name is
    /// already buffered it is consumed FIFO and the returned task is already
    /// complete; otherwise the task waits for a future `EventRaised`.
    /// Produces no action.
    pub fn wait_for_event(&self, name: impl AsRef<str>) -> Task {
        let key = fold_event_name(name.as_ref());
        let mut inner = self.inner.lock().unwrap();
        if let Some(queue) = inner.received_events.get_mut(&key) {
            if let Some(payload) = queue.pop_front() {
                if queue.is_empty() {
                    inner.received_events.remove(&key);
                }
                return Task::completed(payload);
            }
        }
        let slot = TaskSlot::new();
        inner.pending_events.entry(key).or_default().push_back(slot.clone());
        Task::pending(slot)
    }

    /// Finish this execution and start a new generation with `new_input` as
    /// its input. Buffered-but-unconsumed external events are dropped.
    pub fn continue_as_new(&self, new_input: impl Into<String>) {
        self.set_continued_as_new(new_input.into(), false);
    }

    /// Like [`continue_as_new`](Self::continue_as_new), but carries
    /// buffered-but-unconsumed external events into the new generation.
    pub fn continue_as_new_preserving_events(&self, new_input: impl Into<String>) {
        self.set_continued_as_new(new_input.into(), true);
    }

    fn set_continued_as_new(&self, new_input: String, save_events: bool) {
        let mut inner = self.inner.lock().unwrap();
        if inner.is_complete {
            return;
        }
        inner.is_complete = true;
        inner.completion_status = Some(OrchestrationStatus::ContinuedAsNew);
        inner.new_input = non_empty(new_input);
        inner.save_events = save_events;
        // The new generation starts from a clean slate; only the input and
        // (optionally) buffered events carry forward.
        inner.pending_actions.clear();
        inner.pending_tasks.clear();
        inner.pending_events.clear();
        inner.sequence = 0;
    }

    /// Record the terminal outcome. Idempotent: the first call wins.
    pub fn set_complete(&self, result: Option<String>, status: OrchestrationStatus) {
        let mut inner = self.inner.lock().unwrap();
        if inner.is_complete {
            return;
        }
        inner.is_complete = true;
        inner.completion_status = Some(status);
        inner.output = result;
    }

    /// Map an uncaught orchestrator error into a `Failed` terminal status.
    pub fn set_failed(&self, details: FailureDetails) {
        let mut inner = self.inner.lock().unwrap();
        if inner.is_complete {
            return;
        }
        inner.is_complete = true;
        inner.completion_status = Some(OrchestrationStatus::Failed);
        inner.failure_details = Some(details);
    }

    /// Extract the ordered action batch for this pass: every action requested
    /// but not confirmed by history, plus the completion action once the
    /// instance is terminal. A continue-as-new pass collapses to a single
    /// completion action carrying the next generation's input.
    pub fn take_actions(&self) -> Vec<OrchestratorAction> {
        let mut inner = self.inner.lock().unwrap();
        if inner.completion_status == Some(OrchestrationStatus::ContinuedAsNew) {
            let carryover_events = if inner.save_events {
                let current_time_ms = inner.current_time_ms;
                inner
                    .received_events
                    .iter()
                    .flat_map(|(name, queue)| {
                        queue.iter().map(move |payload| {
                            HistoryEvent::new(
                                0,
                                current_time_ms,
                                EventKind::EventRaised {
                                    name: name.clone(),
                                    input: payload.clone(),
                                },
                            )
                        })
                    })
                    .collect()
            } else {
                Vec::new()
            };
            let id = inner.next_sequence();
            return vec![OrchestratorAction::CompleteOrchestration {
                id,
                status: OrchestrationStatus::ContinuedAsNew,
                result: inner.new_input.clone(),
                failure_details: None,
                carryover_events,
            }];
        }

        let mut actions: Vec<OrchestratorAction> = inner.pending_actions.values().cloned().collect();
        if inner.is_complete {
            let id = inner.next_sequence();
            let status = inner
                .completion_status
                .expect("complete orchestration always has a status");
            actions.push(OrchestratorAction::CompleteOrchestration {
                id,
                status,
                result: inner.output.clone(),
                failure_details: inner.failure_details.clone(),
                carryover_events: Vec::new(),
            });
        }
        actions
    }

    // Engine-side operations, driven only by the executor.

    pub(crate) fn set_replaying(&self, is_replaying: bool) {
        self.inner.lock().unwrap().is_replaying = is_replaying;
    }

    pub(crate) fn set_current_time_ms(&self, timestamp_ms: u64) {
        self.inner.lock().unwrap().current_time_ms = timestamp_ms;
    }

    /// Confirmation events pop the matching pending action; a miss here is
    /// the primary non-determinism detection point.
    pub(crate) fn pop_pending_action(&self, id: u64) -> Option<OrchestratorAction> {
        self.inner.lock().unwrap().pending_actions.remove(&id)
    }

    /// Result events pop the matching pending task; a miss is tolerated.
    pub(crate) fn pop_pending_task(&self, id: u64) -> Option<TaskSlot> {
        self.inner.lock().unwrap().pending_tasks.remove(&id)
    }

    /// Dequeue the oldest task waiting for the named external event, if any.
    pub(crate) fn take_event_waiter(&self, name: &str) -> Option<TaskSlot> {
        let key = fold_event_name(name);
        let mut inner = self.inner.lock().unwrap();
        let queue = inner.pending_events.get_mut(&key)?;
        let slot = queue.pop_front();
        if queue.is_empty() {
            inner.pending_events.remove(&key);
        }
        slot
    }

    /// Buffer an external-event payload for a future subscriber.
    pub(crate) fn buffer_external_event(&self, name: &str, payload: Option<String>) {
        let key = fold_event_name(name);
        let mut inner = self.inner.lock().unwrap();
        inner.received_events.entry(key).or_default().push_back(payload);
    }

    pub(crate) fn pending_task_count(&self) -> usize {
        self.inner.lock().unwrap().pending_tasks.len()
    }

    pub(crate) fn pending_event_count(&self) -> usize {
        self.inner.lock().unwrap().pending_events.values().map(VecDeque::len).sum()
    }
}
