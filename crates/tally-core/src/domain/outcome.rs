//! Outcome notifications sent by the synthesis service when a task ends.
//!
//! The wire shape is owned by the service; `TaskOutcome` is the validated
//! form the reconciler works with.

use serde::{Deserialize, Serialize};

use super::errors::TallyError;
use super::ids::TaskId;

const COMPLETED: &str = "COMPLETED";

/// Raw notification, correlated to a task by the external task id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OutcomeNotification {
    pub task_id: TaskId,
    /// e.g. `COMPLETED` / `FAILED`.
    pub task_status: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output_uri: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

/// What actually happened to a task.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TaskOutcome {
    Succeeded { output_uri: String },
    Failed { reason: String },
}

impl OutcomeNotification {
    pub fn completed(task_id: TaskId, output_uri: impl Into<String>) -> Self {
        Self {
            task_id,
            task_status: COMPLETED.to_string(),
            output_uri: Some(output_uri.into()),
            reason: None,
        }
    }

    pub fn failed(task_id: TaskId, reason: impl Into<String>) -> Self {
        Self {
            task_id,
            task_status: "FAILED".to_string(),
            output_uri: None,
            reason: Some(reason.into()),
        }
    }

    pub fn from_json(raw: &str) -> Result<Self, TallyError> {
        serde_json::from_str(raw).map_err(|e| TallyError::InvalidNotification(e.to_string()))
    }

    /// Anything other than `COMPLETED` is a failure.
    pub fn outcome(&self) -> Result<TaskOutcome, TallyError> {
        if self.task_status.eq_ignore_ascii_case(COMPLETED) {
            let output_uri = self.output_uri.clone().ok_or_else(|| {
                TallyError::InvalidNotification(format!(
                    "task {} completed without an output uri",
                    self.task_id
                ))
            })?;
            Ok(TaskOutcome::Succeeded { output_uri })
        } else {
            let reason = self
                .reason
                .clone()
                .unwrap_or_else(|| format!("Task ended with status {}", self.task_status));
            Ok(TaskOutcome::Failed { reason })
        }
    }
}
