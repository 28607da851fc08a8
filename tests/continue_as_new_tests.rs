//! Continue-as-new: the terminal signal that starts a fresh logical
//! generation carrying only what the orchestration chose to keep.

mod common;

use common::*;
use durawork::{EventKind, OrchestrationContext, OrchestrationStatus, OrchestratorAction};

#[test]
fn continue_as_new_collapses_to_single_completion_action() {
    let registry = registry_with(|ctx: OrchestrationContext, input: String| async move {
        ctx.continue_as_new("next-input");
        Ok(input)
    });

    let actions = run(
        &registry,
        &[],
        &[orchestration_started(START_TIME_MS), execution_started()],
    );

    assert_eq!(actions.len(), 1);
    match &actions[0] {
        OrchestratorAction::CompleteOrchestration {
            status,
            result,
            carryover_events,
            ..
        } => {
            assert_eq!(*status, OrchestrationStatus::ContinuedAsNew);
            assert_eq!(result.as_deref(), Some("next-input"));
            assert!(carryover_events.is_empty());
        }
        other => panic!("expected completion action, got {other:?}"),
    }
}

/// The continue-as-new signal wins over the function's own return value.
#[test]
fn return_value_after_continue_as_new_is_ignored() {
    let registry = registry_with(|ctx: OrchestrationContext, _input: String| async move {
        ctx.continue_as_new("again");
        Ok("this output is discarded".to_string())
    });

    let actions = run(
        &registry,
        &[],
        &[orchestration_started(START_TIME_MS), execution_started()],
    );

    let (status, result, _) = completion(&actions);
    assert_eq!(status, OrchestrationStatus::ContinuedAsNew);
    assert_eq!(result.as_deref(), Some("again"));
}

/// Buffered-but-unconsumed external events ride along when the orchestration
/// opts in.
#[test]
fn preserving_variant_carries_buffered_events() {
    let registry = registry_with(|ctx: OrchestrationContext, _input: String| async move {
        let result = ctx.call_activity("Step", "run").await?;
        ctx.continue_as_new_preserving_events("again");
        Ok(result.unwrap_or_default())
    });

    let old = vec![
        orchestration_started(START_TIME_MS),
        execution_started(),
        task_scheduled(1, "Step"),
    ];
    let new = vec![event_raised("later", "evt-payload"), task_completed(1, "done")];

    let actions = run(&registry, &old, &new);
    assert_eq!(actions.len(), 1);
    match &actions[0] {
        OrchestratorAction::CompleteOrchestration {
            status,
            carryover_events,
            ..
        } => {
            assert_eq!(*status, OrchestrationStatus::ContinuedAsNew);
            assert_eq!(carryover_events.len(), 1);
            assert_eq!(
                carryover_events[0].kind,
                EventKind::EventRaised {
                    name: "later".to_string(),
                    input: Some("evt-payload".to_string()),
                }
            );
        }
        other => panic!("expected completion action, got {other:?}"),
    }
}

/// Without the preserving variant, buffered events are dropped.
#[test]
fn plain_variant_drops_buffered_events() {
    let registry = registry_with(|ctx: OrchestrationContext, _input: String| async move {
        let result = ctx.call_activity("Step", "run").await?;
        ctx.continue_as_new(result.unwrap_or_default());
        Ok(String::new())
    });

    let old = vec![
        orchestration_started(START_TIME_MS),
        execution_started(),
        task_scheduled(1, "Step"),
    ];
    let new = vec![event_raised("later", "evt-payload"), task_completed(1, "done")];

    let actions = run(&registry, &old, &new);
    match &actions[0] {
        OrchestratorAction::CompleteOrchestration {
            result,
            carryover_events,
            ..
        } => {
            assert_eq!(result.as_deref(), Some("done"));
            assert!(carryover_events.is_empty());
        }
        other => panic!("expected completion action, got {other:?}"),
    }
}
