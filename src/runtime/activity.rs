//! Runs one activity work item to completion.

use tracing::debug;

use crate::runtime::Registry;
use crate::{non_empty, ExecutionError, FailureDetails};

/// Minimal per-call context handed to an activity function.
#[derive(Debug, Clone)]
pub struct ActivityContext {
    orchestration_id: String,
    task_id: u64,
}

impl ActivityContext {
    pub fn new(orchestration_id: impl Into<String>, task_id: u64) -> Self {
        Self {
            orchestration_id: orchestration_id.into(),
            task_id,
        }
    }

    /// Instance id of the orchestration that scheduled this activity.
    pub fn orchestration_id(&self) -> &str {
        &self.orchestration_id
    }

    /// Correlation id of the scheduling event.
    pub fn task_id(&self) -> u64 {
        self.task_id
    }
}

/// Looks up and invokes registered activity functions.
///
/// No retry and no timeout here; those policies belong to the dispatcher
/// that hands work items to this executor.
pub struct ActivityExecutor {
    registry: Registry,
}

impl ActivityExecutor {
    pub fn new(registry: Registry) -> Self {
        Self { registry }
    }

    /// Execute the named activity and return its encoded output, if any.
    ///
    /// # Errors
    ///
    /// `ActivityNotRegisteredError` when no function is registered under
    /// `name`; `ActivityFailedError` when the function itself returns an
    /// error. Both are surfaced to the caller rather than swallowed.
    pub async fn execute(
        &self,
        orchestration_id: &str,
        name: &str,
        task_id: u64,
        encoded_input: Option<String>,
    ) -> Result<Option<String>, ExecutionError> {
        debug!(
            instance_id = %orchestration_id,
            task_id,
            activity = %name,
            "executing activity"
        );
        let handler = self
            .registry
            .get_activity(name)
            .ok_or_else(|| ExecutionError::activity_not_registered(name))?;

        let ctx = ActivityContext::new(orchestration_id, task_id);
        let output = handler
            .invoke(ctx, encoded_input.unwrap_or_default())
            .await
            .map_err(|message| ExecutionError::ActivityFailed {
                details: FailureDetails::new("ActivityFailed", message),
            })?;

        let encoded_output = non_empty(output);
        debug!(
            instance_id = %orchestration_id,
            task_id,
            activity = %name,
            output_chars = encoded_output.as_ref().map_or(0, |s| s.len()),
            "activity completed"
        );
        Ok(encoded_output)
    }
}
