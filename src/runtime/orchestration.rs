//! Replays history and derives the next action batch for one instance.
//!
//! The executor feeds every event through `process_event` in order: first the
//! old (replayed) events, then the newly delivered ones. Confirmation events
//! must pop a matching pending action — any mismatch is non-determinism and
//! fails the instance. Result events complete pending tasks and resume the
//! orchestrator future one step at a time.

use std::future::Future;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::pin::Pin;
use std::task::{Context as PollContext, Poll};

use futures::task::noop_waker;
use tracing::{debug, info, warn};

use crate::runtime::Registry;
use crate::{
    non_empty, EventKind, ExecutionError, FailureDetails, HistoryEvent, OrchestrationContext,
    OrchestrationStatus, OrchestratorAction,
};

/// The suspendable orchestration computation, advanced one poll at a time.
type OrchestratorTurn = Pin<Box<dyn Future<Output = Result<String, String>> + Send>>;

/// Drives one orchestration instance through one history batch.
///
/// An executor processes one batch at a time; per-pass state is reset at the
/// start of every [`execute`](Self::execute) call.
pub struct OrchestrationExecutor {
    registry: Registry,
    turn: Option<OrchestratorTurn>,
    is_suspended: bool,
    suspended_events: Vec<HistoryEvent>,
}

impl OrchestrationExecutor {
    pub fn new(registry: Registry) -> Self {
        Self {
            registry,
            turn: None,
            is_suspended: false,
            suspended_events: Vec::new(),
        }
    }

    /// Replay `old_events`, apply `new_events`, and return the ordered list of
    /// actions newly requested during this pass.
    ///
    /// # Errors
    ///
    /// Fails fast with `OrchestrationStateError` when `new_events` is empty —
    /// a caller contract violation. Every other error (non-determinism,
    /// unregistered orchestrator, orchestrator-logic failure) is converted
    /// into the instance's `Failed` terminal status and reflected in the
    /// returned completion action instead of propagating.
    pub fn execute(
        &mut self,
        instance_id: &str,
        old_events: &[HistoryEvent],
        new_events: &[HistoryEvent],
    ) -> Result<Vec<OrchestratorAction>, ExecutionError> {
        if new_events.is_empty() {
            return Err(ExecutionError::orchestration_state(
                "the new history event list must have at least one event in it",
            ));
        }

        self.turn = None;
        self.is_suspended = false;
        self.suspended_events.clear();

        let ctx = OrchestrationContext::new(instance_id);
        if let Err(err) = self.run_events(&ctx, old_events, new_events) {
            ctx.set_failed(err.to_failure_details());
        }

        if !ctx.is_complete() {
            info!(
                instance_id = %ctx.instance_id(),
                pending_tasks = ctx.pending_task_count(),
                pending_events = ctx.pending_event_count(),
                "waiting for pending work"
            );
        } else if let Some(status) = ctx.completion_status() {
            if status != OrchestrationStatus::ContinuedAsNew {
                info!(instance_id = %ctx.instance_id(), status = %status, "orchestration completed");
            }
        }

        Ok(ctx.take_actions())
    }

    fn run_events(
        &mut self,
        ctx: &OrchestrationContext,
        old_events: &[HistoryEvent],
        new_events: &[HistoryEvent],
    ) -> Result<(), ExecutionError> {
        debug!(
            instance_id = %ctx.instance_id(),
            event_count = old_events.len(),
            "rebuilding local state from history"
        );
        ctx.set_replaying(true);
        for event in old_events {
            self.process_event(ctx, event)?;
        }

        debug!(
            instance_id = %ctx.instance_id(),
            event_count = new_events.len(),
            "processing new events"
        );
        ctx.set_replaying(false);
        for event in new_events {
            self.process_event(ctx, event)?;
        }
        Ok(())
    }

    fn process_event(&mut self, ctx: &OrchestrationContext, event: &HistoryEvent) -> Result<(), ExecutionError> {
        // Suspension freezes task/timer/event delivery but not the resume and
        // terminate signals; everything else is deferred in arrival order.
        if self.is_suspended && is_suspendable(event) {
            self.suspended_events.push(event.clone());
            return Ok(());
        }

        match &event.kind {
            EventKind::OrchestrationStarted => {
                ctx.set_current_time_ms(event.timestamp_ms);
            }
            EventKind::ExecutionStarted { name, input } => {
                let handler = self
                    .registry
                    .get_orchestrator(name)
                    .ok_or_else(|| ExecutionError::orchestrator_not_registered(name.clone()))?;
                let handler_ctx = ctx.clone();
                let handler_input = input.clone().unwrap_or_default();
                self.turn = Some(Box::pin(async move {
                    handler.invoke(handler_ctx, handler_input).await
                }));
                self.resume(ctx);
            }
            EventKind::TimerCreated { .. } => match ctx.pop_pending_action(event.event_id) {
                None => return Err(missing_action_error(event.event_id, "create_timer")),
                Some(OrchestratorAction::CreateTimer { .. }) => {}
                Some(other) => return Err(wrong_action_kind_error(event.event_id, "create_timer", &other)),
            },
            EventKind::TimerFired { timer_id } => match ctx.pop_pending_task(*timer_id) {
                None => {
                    if !ctx.is_replaying() {
                        warn!(
                            instance_id = %ctx.instance_id(),
                            timer_id,
                            "ignoring unexpected TimerFired event"
                        );
                    }
                }
                Some(slot) => {
                    slot.complete(None);
                    self.resume(ctx);
                }
            },
            EventKind::TaskScheduled { name, .. } => match ctx.pop_pending_action(event.event_id) {
                None => return Err(missing_action_error(event.event_id, "call_activity")),
                Some(OrchestratorAction::ScheduleTask { name: requested, .. }) => {
                    if &requested != name {
                        return Err(wrong_action_target_error(
                            event.event_id,
                            "call_activity",
                            name,
                            &requested,
                        ));
                    }
                }
                Some(other) => return Err(wrong_action_kind_error(event.event_id, "call_activity", &other)),
            },
            EventKind::TaskCompleted {
                task_scheduled_id,
                result,
            } => match ctx.pop_pending_task(*task_scheduled_id) {
                None => {
                    if !ctx.is_replaying() {
                        warn!(
                            instance_id = %ctx.instance_id(),
                            task_id = task_scheduled_id,
                            "ignoring unexpected TaskCompleted event"
                        );
                    }
                }
                Some(slot) => {
                    slot.complete(result.clone());
                    self.resume(ctx);
                }
            },
            EventKind::TaskFailed {
                task_scheduled_id,
                failure,
            } => match ctx.pop_pending_task(*task_scheduled_id) {
                None => {
                    if !ctx.is_replaying() {
                        warn!(
                            instance_id = %ctx.instance_id(),
                            task_id = task_scheduled_id,
                            "ignoring unexpected TaskFailed event"
                        );
                    }
                }
                Some(slot) => {
                    slot.fail(format!(
                        "activity task #{task_scheduled_id} failed: {}",
                        failure.error_message
                    ));
                    self.resume(ctx);
                }
            },
            EventKind::SubOrchestrationCreated { name, .. } => match ctx.pop_pending_action(event.event_id) {
                None => return Err(missing_action_error(event.event_id, "call_sub_orchestrator")),
                Some(OrchestratorAction::CreateSubOrchestration { name: requested, .. }) => {
                    if &requested != name {
                        return Err(wrong_action_target_error(
                            event.event_id,
                            "call_sub_orchestrator",
                            name,
                            &requested,
                        ));
                    }
                }
                Some(other) => {
                    return Err(wrong_action_kind_error(event.event_id, "call_sub_orchestrator", &other))
                }
            },
            EventKind::SubOrchestrationCompleted {
                task_scheduled_id,
                result,
            } => match ctx.pop_pending_task(*task_scheduled_id) {
                None => {
                    if !ctx.is_replaying() {
                        warn!(
                            instance_id = %ctx.instance_id(),
                            task_id = task_scheduled_id,
                            "ignoring unexpected SubOrchestrationCompleted event"
                        );
                    }
                }
                Some(slot) => {
                    slot.complete(result.clone());
                    self.resume(ctx);
                }
            },
            EventKind::SubOrchestrationFailed {
                task_scheduled_id,
                failure,
            } => match ctx.pop_pending_task(*task_scheduled_id) {
                None => {
                    if !ctx.is_replaying() {
                        warn!(
                            instance_id = %ctx.instance_id(),
                            task_id = task_scheduled_id,
                            "ignoring unexpected SubOrchestrationFailed event"
                        );
                    }
                }
                Some(slot) => {
                    slot.fail(format!(
                        "sub-orchestration task #{task_scheduled_id} failed: {}",
                        failure.error_message
                    ));
                    self.resume(ctx);
                }
            },
            EventKind::EventRaised { name, input } => {
                if !ctx.is_replaying() {
                    info!(instance_id = %ctx.instance_id(), event = %name, "event raised");
                }
                match ctx.take_event_waiter(name) {
                    Some(slot) => {
                        slot.complete(input.clone());
                        self.resume(ctx);
                    }
                    None => {
                        ctx.buffer_external_event(name, input.clone());
                        if !ctx.is_replaying() {
                            info!(
                                instance_id = %ctx.instance_id(),
                                event = %name,
                                "buffered external event with no task waiting for it"
                            );
                        }
                    }
                }
            }
            EventKind::ExecutionSuspended => {
                if !self.is_suspended && !ctx.is_replaying() {
                    info!(instance_id = %ctx.instance_id(), "execution suspended");
                }
                self.is_suspended = true;
            }
            EventKind::ExecutionResumed => {
                if self.is_suspended {
                    if !ctx.is_replaying() {
                        info!(instance_id = %ctx.instance_id(), "resuming execution");
                    }
                    self.is_suspended = false;
                    let buffered = std::mem::take(&mut self.suspended_events);
                    for deferred in buffered {
                        self.process_event(ctx, &deferred)?;
                    }
                } else {
                    debug!(instance_id = %ctx.instance_id(), "ignoring ExecutionResumed while not suspended");
                }
            }
            EventKind::ExecutionTerminated { input } => {
                if !ctx.is_replaying() {
                    info!(instance_id = %ctx.instance_id(), "execution terminating");
                }
                // Short-circuits the computation: the payload is already
                // encoded and the orchestrator future is never resumed.
                ctx.set_complete(input.clone(), OrchestrationStatus::Terminated);
            }
        }
        Ok(())
    }

    /// Advance the orchestrator future one step. No-op once the instance is
    /// terminal or before `ExecutionStarted` has produced a computation.
    fn resume(&mut self, ctx: &OrchestrationContext) {
        if ctx.is_complete() {
            return;
        }
        let polled = match self.turn.as_mut() {
            Some(turn) => {
                let waker = noop_waker();
                let mut poll_cx = PollContext::from_waker(&waker);
                catch_unwind(AssertUnwindSafe(|| turn.as_mut().poll(&mut poll_cx)))
            }
            None => return,
        };
        match polled {
            Ok(Poll::Pending) => {}
            Ok(Poll::Ready(Ok(output))) => {
                self.turn = None;
                ctx.set_complete(non_empty(output), OrchestrationStatus::Completed);
            }
            Ok(Poll::Ready(Err(message))) => {
                self.turn = None;
                ctx.set_failed(FailureDetails::new("OrchestrationFailed", message));
            }
            Err(payload) => {
                self.turn = None;
                ctx.set_failed(FailureDetails::new("OrchestrationPanicked", panic_message(payload)));
            }
        }
    }
}

/// Everything except the resume and terminate signals is deferred while the
/// instance is suspended.
fn is_suspendable(event: &HistoryEvent) -> bool {
    !matches!(
        event.kind,
        EventKind::ExecutionResumed | EventKind::ExecutionTerminated { .. }
    )
}

fn missing_action_error(event_id: u64, method_name: &str) -> ExecutionError {
    ExecutionError::non_determinism(format!(
        "a previous execution called {method_name} with id={event_id}, but the current execution \
         produced no action with that id; the orchestration logic is non-deterministic, or its \
         code changed after this instance started running"
    ))
}

fn wrong_action_kind_error(event_id: u64, expected_method: &str, actual: &OrchestratorAction) -> ExecutionError {
    ExecutionError::non_determinism(format!(
        "failed to restore orchestration state: a previous execution called {expected_method} \
         with id={event_id}, but the current execution called {actual_method} at that position; \
         the orchestration logic is non-deterministic, or its code changed after this instance \
         started running",
        actual_method = actual.method_name()
    ))
}

fn wrong_action_target_error(
    event_id: u64,
    method_name: &str,
    recorded_name: &str,
    requested_name: &str,
) -> ExecutionError {
    ExecutionError::non_determinism(format!(
        "failed to restore orchestration state: a previous execution called {method_name} with \
         name='{recorded_name}' and id={event_id}, but the current execution is calling \
         '{requested_name}'; the orchestration logic is non-deterministic, or its code changed \
         after this instance started running"
    ))
}

fn panic_message(payload: Box<dyn std::any::Any + Send>) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "orchestration panicked".to_string()
    }
}
