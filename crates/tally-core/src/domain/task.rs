//! Task record: the lifecycle of one asynchronous unit of synthesis work.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::ids::{SetId, TaskId};
use super::set::CounterField;

/// Task status.
///
/// State transitions:
/// - (initial) -> Submitted -> Succeeded
/// - (initial) -> Submitted -> Failed
/// - (initial) -> Rejected (dispatch refused; counted as a failure)
///
/// Everything except `Submitted` is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskStatus {
    Submitted,
    Rejected,
    Succeeded,
    Failed,
}

impl TaskStatus {
    pub fn is_terminal(self) -> bool {
        !matches!(self, TaskStatus::Submitted)
    }

    pub fn is_failure(self) -> bool {
        matches!(self, TaskStatus::Rejected | TaskStatus::Failed)
    }

    /// Which aggregate counter a terminal status is credited to.
    pub fn counter_field(self) -> Option<CounterField> {
        match self {
            TaskStatus::Submitted => None,
            TaskStatus::Succeeded => Some(CounterField::Successes),
            TaskStatus::Rejected | TaskStatus::Failed => Some(CounterField::Failures),
        }
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            TaskStatus::Submitted => "submitted",
            TaskStatus::Rejected => "rejected",
            TaskStatus::Succeeded => "succeeded",
            TaskStatus::Failed => "failed",
        };
        f.write_str(s)
    }
}

/// One record per work item.
///
/// `completion_time` is only ever set together with a terminal status; the
/// constructors and `mark_*` methods are the only way to produce one.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskRecord {
    pub task_id: TaskId,
    pub set_id: SetId,
    pub status: TaskStatus,

    /// Caller-requested destination key.
    pub output_key: String,

    /// Where the external service said it would write, when accepted.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output_uri: Option<String>,

    pub message: String,
    pub created_at: DateTime<Utc>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completion_time: Option<DateTime<Utc>>,

    pub expires_at: DateTime<Utc>,
}

impl TaskRecord {
    pub fn submitted(
        task_id: TaskId,
        set_id: SetId,
        output_key: impl Into<String>,
        output_uri: Option<String>,
        now: DateTime<Utc>,
        expires_at: DateTime<Utc>,
    ) -> Self {
        Self {
            task_id,
            set_id,
            status: TaskStatus::Submitted,
            output_key: output_key.into(),
            output_uri,
            message: "Task submitted".to_string(),
            created_at: now,
            completion_time: None,
            expires_at,
        }
    }

    pub fn rejected(
        task_id: TaskId,
        set_id: SetId,
        output_key: impl Into<String>,
        reason: impl Into<String>,
        now: DateTime<Utc>,
        expires_at: DateTime<Utc>,
    ) -> Self {
        Self {
            task_id,
            set_id,
            status: TaskStatus::Rejected,
            output_key: output_key.into(),
            output_uri: None,
            message: reason.into(),
            created_at: now,
            completion_time: Some(now),
            expires_at,
        }
    }

    pub fn mark_succeeded(&mut self, at: DateTime<Utc>) {
        self.status = TaskStatus::Succeeded;
        self.message = "Task completed".to_string();
        self.completion_time = Some(at);
    }

    pub fn mark_failed(&mut self, reason: impl Into<String>, at: DateTime<Utc>) {
        self.status = TaskStatus::Failed;
        self.message = reason.into();
        self.completion_time = Some(at);
    }
}
