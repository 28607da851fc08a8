//! Worker-side execution core for durable orchestrations.
//!
//! An orchestration is a resumable computation whose state is never kept in
//! memory between turns: it is rebuilt every time by replaying the recorded
//! `HistoryEvent` log through the user's orchestrator function. Given the old
//! history plus a batch of newly delivered events, the executor re-derives the
//! orchestration's state and returns the next batch of `OrchestratorAction`s
//! for the host to persist and dispatch. It provides:
//!
//! - Public data model: `HistoryEvent`/`EventKind`, `OrchestratorAction`,
//!   `OrchestrationStatus`, `FailureDetails`
//! - An `OrchestrationContext` with single-assignment `Task` futures to
//!   schedule activities, timers, sub-orchestrations, and external-event waits
//! - `runtime::OrchestrationExecutor`, which replays history, detects
//!   non-determinism, and handles suspend/resume and termination
//! - `runtime::ActivityExecutor`, which invokes registered activity functions
//!
//! The crate persists nothing and speaks no transport; history storage and
//! dispatch belong to the hosting process.

use serde::{Deserialize, Serialize};

pub mod codec;
mod context;
pub mod runtime;
mod task;

pub use context::OrchestrationContext;
pub use runtime::{
    ActivityContext, ActivityExecutor, ActivityHandler, OrchestrationExecutor, OrchestrationHandler, Registry,
    RegistryBuilder,
};
pub use task::{Task, TaskResult};

/// One recorded fact about an orchestration's past, consumed during replay.
///
/// `event_id` is the correlation id for confirmation events (`TimerCreated`,
/// `TaskScheduled`, `SubOrchestrationCreated`); result events carry the id of
/// the event they answer inside their kind. `timestamp_ms` drives the logical
/// clock, and only `OrchestrationStarted` timestamps are ever consulted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryEvent {
    pub event_id: u64,
    pub timestamp_ms: u64,
    pub kind: EventKind,
}

impl HistoryEvent {
    pub fn new(event_id: u64, timestamp_ms: u64, kind: EventKind) -> Self {
        Self {
            event_id,
            timestamp_ms,
            kind,
        }
    }
}

/// The discriminated payload of a `HistoryEvent`. Exactly one kind per event.
///
/// Payload fields are opaque encoded text; absent and empty are equivalent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum EventKind {
    /// A new turn began; the event's timestamp advances the logical clock.
    OrchestrationStarted,
    /// The instance was started by orchestrator name with optional input.
    ExecutionStarted { name: String, input: Option<String> },
    /// Confirms a timer was durably created (correlates via `event_id`).
    TimerCreated { fire_at_ms: u64 },
    /// A previously created timer fired.
    TimerFired { timer_id: u64 },
    /// Confirms an activity invocation was durably scheduled (correlates via `event_id`).
    TaskScheduled { name: String, input: Option<String> },
    /// An activity completed with an optional encoded result.
    TaskCompleted {
        task_scheduled_id: u64,
        result: Option<String>,
    },
    /// An activity failed.
    TaskFailed {
        task_scheduled_id: u64,
        failure: FailureDetails,
    },
    /// Confirms a sub-orchestration was durably created (correlates via `event_id`).
    SubOrchestrationCreated {
        name: String,
        instance_id: String,
        input: Option<String>,
    },
    /// A sub-orchestration completed and returned a result to the parent.
    SubOrchestrationCompleted {
        task_scheduled_id: u64,
        result: Option<String>,
    },
    /// A sub-orchestration failed.
    SubOrchestrationFailed {
        task_scheduled_id: u64,
        failure: FailureDetails,
    },
    /// An external event was raised against the instance by name.
    EventRaised { name: String, input: Option<String> },
    /// Operator froze delivery of ordinary events.
    ExecutionSuspended,
    /// Operator lifted a suspension; deferred events replay in order.
    ExecutionResumed,
    /// Operator force-terminated the instance with an optional encoded output.
    ExecutionTerminated { input: Option<String> },
}

/// Declarative decisions produced by one execution pass. The host is
/// responsible for persisting them and materializing the confirming events.
#[derive(Debug, Clone, PartialEq)]
pub enum OrchestratorAction {
    /// Schedule an activity invocation.
    ScheduleTask {
        id: u64,
        name: String,
        input: Option<String>,
    },
    /// Create a durable timer that fires at the given logical time.
    CreateTimer { id: u64, fire_at_ms: u64 },
    /// Start a sub-orchestration whose result routes back to this instance.
    CreateSubOrchestration {
        id: u64,
        name: String,
        instance_id: String,
        input: Option<String>,
    },
    /// Record the terminal outcome of this execution. For continue-as-new the
    /// result carries the next generation's input and `carryover_events` the
    /// buffered external events the orchestration chose to retain.
    CompleteOrchestration {
        id: u64,
        status: OrchestrationStatus,
        result: Option<String>,
        failure_details: Option<FailureDetails>,
        carryover_events: Vec<HistoryEvent>,
    },
}

impl OrchestratorAction {
    pub fn id(&self) -> u64 {
        match self {
            OrchestratorAction::ScheduleTask { id, .. }
            | OrchestratorAction::CreateTimer { id, .. }
            | OrchestratorAction::CreateSubOrchestration { id, .. }
            | OrchestratorAction::CompleteOrchestration { id, .. } => *id,
        }
    }

    /// Context method that produces this action, as named in diagnostics.
    pub(crate) fn method_name(&self) -> &'static str {
        match self {
            OrchestratorAction::ScheduleTask { .. } => "call_activity",
            OrchestratorAction::CreateTimer { .. } => "create_timer",
            OrchestratorAction::CreateSubOrchestration { .. } => "call_sub_orchestrator",
            OrchestratorAction::CompleteOrchestration { .. } => "complete_orchestration",
        }
    }
}

/// Terminal outcome of an orchestration execution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OrchestrationStatus {
    Completed,
    Failed,
    Terminated,
    ContinuedAsNew,
}

impl std::fmt::Display for OrchestrationStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            OrchestrationStatus::Completed => "Completed",
            OrchestrationStatus::Failed => "Failed",
            OrchestrationStatus::Terminated => "Terminated",
            OrchestrationStatus::ContinuedAsNew => "ContinuedAsNew",
        };
        f.write_str(s)
    }
}

/// Error payload recorded in history events and failed completion actions.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FailureDetails {
    pub error_type: String,
    pub error_message: String,
}

impl FailureDetails {
    pub fn new(error_type: impl Into<String>, error_message: impl Into<String>) -> Self {
        Self {
            error_type: error_type.into(),
            error_message: error_message.into(),
        }
    }
}

impl std::fmt::Display for FailureDetails {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.error_type, self.error_message)
    }
}

/// Errors surfaced by the executors.
///
/// Non-determinism and unregistered-orchestrator errors fail the instance's
/// execution pass (they become a `Failed` completion action); an empty
/// new-event batch fails the call itself. Activity-side errors are returned
/// to the activity dispatcher, which owns retry policy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExecutionError {
    /// Structural contract violation, e.g. an empty new-event batch.
    OrchestrationState { message: String },
    /// Replayed history and the current code disagree about what was scheduled.
    NonDeterminism { message: String },
    /// No orchestrator function registered under the requested name.
    OrchestratorNotRegistered { name: String },
    /// No activity function registered under the requested name.
    ActivityNotRegistered { name: String },
    /// The activity function itself returned an error.
    ActivityFailed { details: FailureDetails },
}

impl ExecutionError {
    pub fn orchestration_state(message: impl Into<String>) -> Self {
        ExecutionError::OrchestrationState {
            message: message.into(),
        }
    }

    pub fn non_determinism(message: impl Into<String>) -> Self {
        ExecutionError::NonDeterminism {
            message: message.into(),
        }
    }

    pub fn orchestrator_not_registered(name: impl Into<String>) -> Self {
        ExecutionError::OrchestratorNotRegistered { name: name.into() }
    }

    pub fn activity_not_registered(name: impl Into<String>) -> Self {
        ExecutionError::ActivityNotRegistered { name: name.into() }
    }

    /// Stable error-type tag carried into `FailureDetails`.
    pub fn error_type(&self) -> &'static str {
        match self {
            ExecutionError::OrchestrationState { .. } => "OrchestrationStateError",
            ExecutionError::NonDeterminism { .. } => "NonDeterminismError",
            ExecutionError::OrchestratorNotRegistered { .. } => "OrchestratorNotRegisteredError",
            ExecutionError::ActivityNotRegistered { .. } => "ActivityNotRegisteredError",
            ExecutionError::ActivityFailed { .. } => "ActivityFailedError",
        }
    }

    pub(crate) fn to_failure_details(&self) -> FailureDetails {
        match self {
            ExecutionError::ActivityFailed { details } => details.clone(),
            other => FailureDetails::new(other.error_type(), other.to_string()),
        }
    }
}

impl std::fmt::Display for ExecutionError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ExecutionError::OrchestrationState { message } => write!(f, "{message}"),
            ExecutionError::NonDeterminism { message } => write!(f, "{message}"),
            ExecutionError::OrchestratorNotRegistered { name } => {
                write!(f, "an orchestrator named '{name}' is not registered")
            }
            ExecutionError::ActivityNotRegistered { name } => {
                write!(f, "an activity named '{name}' is not registered")
            }
            ExecutionError::ActivityFailed { details } => write!(f, "{details}"),
        }
    }
}

impl std::error::Error for ExecutionError {}

/// Payload normalization: absent and empty encoded text are equivalent.
pub(crate) fn non_empty(text: String) -> Option<String> {
    if text.is_empty() {
        None
    } else {
        Some(text)
    }
}
