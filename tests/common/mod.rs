//! Shared helpers for executor integration tests: event builders, registry
//! construction, and assertions over returned action batches.
#![allow(dead_code)]

use durawork::{
    EventKind, FailureDetails, HistoryEvent, OrchestrationContext, OrchestrationExecutor, OrchestrationStatus,
    OrchestratorAction, Registry,
};

pub const INSTANCE: &str = "test-instance";
pub const TEST_ORCH: &str = "TestOrchestration";
pub const START_TIME_MS: u64 = 1_000;

pub fn init_tracing() {
    use tracing_subscriber::EnvFilter;
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

// ============================================================================
// Event builders
// ============================================================================

pub fn orchestration_started(timestamp_ms: u64) -> HistoryEvent {
    HistoryEvent::new(0, timestamp_ms, EventKind::OrchestrationStarted)
}

pub fn execution_started() -> HistoryEvent {
    execution_started_with_input(None)
}

pub fn execution_started_with_input(input: Option<&str>) -> HistoryEvent {
    HistoryEvent::new(
        0,
        START_TIME_MS,
        EventKind::ExecutionStarted {
            name: TEST_ORCH.to_string(),
            input: input.map(str::to_string),
        },
    )
}

pub fn task_scheduled(event_id: u64, name: &str) -> HistoryEvent {
    HistoryEvent::new(
        event_id,
        START_TIME_MS,
        EventKind::TaskScheduled {
            name: name.to_string(),
            input: None,
        },
    )
}

pub fn task_completed(task_scheduled_id: u64, result: &str) -> HistoryEvent {
    HistoryEvent::new(
        0,
        START_TIME_MS,
        EventKind::TaskCompleted {
            task_scheduled_id,
            result: Some(result.to_string()),
        },
    )
}

pub fn task_failed(task_scheduled_id: u64, message: &str) -> HistoryEvent {
    HistoryEvent::new(
        0,
        START_TIME_MS,
        EventKind::TaskFailed {
            task_scheduled_id,
            failure: FailureDetails::new("ActivityFailed", message),
        },
    )
}

pub fn timer_created(event_id: u64, fire_at_ms: u64) -> HistoryEvent {
    HistoryEvent::new(event_id, START_TIME_MS, EventKind::TimerCreated { fire_at_ms })
}

pub fn timer_fired(timer_id: u64) -> HistoryEvent {
    HistoryEvent::new(0, START_TIME_MS, EventKind::TimerFired { timer_id })
}

pub fn sub_orchestration_created(event_id: u64, name: &str, instance_id: &str) -> HistoryEvent {
    HistoryEvent::new(
        event_id,
        START_TIME_MS,
        EventKind::SubOrchestrationCreated {
            name: name.to_string(),
            instance_id: instance_id.to_string(),
            input: None,
        },
    )
}

pub fn sub_orchestration_completed(task_scheduled_id: u64, result: &str) -> HistoryEvent {
    HistoryEvent::new(
        0,
        START_TIME_MS,
        EventKind::SubOrchestrationCompleted {
            task_scheduled_id,
            result: Some(result.to_string()),
        },
    )
}

pub fn sub_orchestration_failed(task_scheduled_id: u64, message: &str) -> HistoryEvent {
    HistoryEvent::new(
        0,
        START_TIME_MS,
        EventKind::SubOrchestrationFailed {
            task_scheduled_id,
            failure: FailureDetails::new("OrchestrationFailed", message),
        },
    )
}

pub fn event_raised(name: &str, payload: &str) -> HistoryEvent {
    HistoryEvent::new(
        0,
        START_TIME_MS,
        EventKind::EventRaised {
            name: name.to_string(),
            input: Some(payload.to_string()),
        },
    )
}

pub fn execution_suspended() -> HistoryEvent {
    HistoryEvent::new(0, START_TIME_MS, EventKind::ExecutionSuspended)
}

pub fn execution_resumed() -> HistoryEvent {
    HistoryEvent::new(0, START_TIME_MS, EventKind::ExecutionResumed)
}

pub fn execution_terminated(payload: &str) -> HistoryEvent {
    HistoryEvent::new(
        0,
        START_TIME_MS,
        EventKind::ExecutionTerminated {
            input: Some(payload.to_string()),
        },
    )
}

// ============================================================================
// Registry and execution helpers
// ============================================================================

/// Build a registry with a single orchestrator registered under `TEST_ORCH`.
pub fn registry_with<F, Fut>(orchestrator: F) -> Registry
where
    F: Fn(OrchestrationContext, String) -> Fut + Send + Sync + 'static,
    Fut: std::future::Future<Output = Result<String, String>> + Send + 'static,
{
    Registry::builder()
        .register_orchestrator(TEST_ORCH, orchestrator)
        .build()
        .expect("registry build")
}

/// Run one execution pass with a fresh executor.
pub fn run(registry: &Registry, old_events: &[HistoryEvent], new_events: &[HistoryEvent]) -> Vec<OrchestratorAction> {
    let mut executor = OrchestrationExecutor::new(registry.clone());
    executor
        .execute(INSTANCE, old_events, new_events)
        .expect("execute pass")
}

// ============================================================================
// Assertions
// ============================================================================

/// Extract the completion action; panics if the batch holds none.
pub fn completion(actions: &[OrchestratorAction]) -> (OrchestrationStatus, Option<String>, Option<FailureDetails>) {
    actions
        .iter()
        .find_map(|action| match action {
            OrchestratorAction::CompleteOrchestration {
                status,
                result,
                failure_details,
                ..
            } => Some((*status, result.clone(), failure_details.clone())),
            _ => None,
        })
        .unwrap_or_else(|| panic!("expected a completion action, got {actions:?}"))
}

pub fn assert_completed(actions: &[OrchestratorAction], expected: Option<&str>) {
    let (status, result, _) = completion(actions);
    assert_eq!(status, OrchestrationStatus::Completed, "unexpected status in {actions:?}");
    assert_eq!(result.as_deref(), expected, "unexpected completion output");
}

/// Assert the batch carries a `Failed` completion and return its details.
pub fn assert_failed(actions: &[OrchestratorAction]) -> FailureDetails {
    let (status, _, failure_details) = completion(actions);
    assert_eq!(status, OrchestrationStatus::Failed, "unexpected status in {actions:?}");
    failure_details.expect("failed completion carries failure details")
}

pub fn assert_no_completion(actions: &[OrchestratorAction]) {
    assert!(
        !actions
            .iter()
            .any(|a| matches!(a, OrchestratorAction::CompleteOrchestration { .. })),
        "expected no completion action, got {actions:?}"
    );
}
