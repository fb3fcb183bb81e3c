//! Events - セット単位の終端通知
//!
//! ユーザーに見える唯一のシグナル。完了と停滞の 2 種類のみ。

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::ids::SetId;
use super::progress::SetProgress;

/// Terminal set-level notification published on the notification channel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum SetNotification {
    Completed {
        set_id: SetId,
        display_name: String,
        description: String,
        successes: u64,
        failures: u64,
        location: String,
    },
    Stalled {
        set_id: SetId,
        display_name: String,
        description: String,
        not_updated_since: DateTime<Utc>,
    },
}

impl SetNotification {
    /// `work_bucket` is where `output_location` lives.
    pub fn completed(progress: &SetProgress, work_bucket: &str) -> Self {
        SetNotification::Completed {
            set_id: progress.set_id.clone(),
            display_name: progress.metadata.display_name.clone(),
            description: progress.metadata.description.clone(),
            successes: progress.successes,
            failures: progress.failures,
            location: format!("s3://{}/{}/", work_bucket, progress.metadata.output_location),
        }
    }

    pub fn stalled(progress: &SetProgress) -> Self {
        SetNotification::Stalled {
            set_id: progress.set_id.clone(),
            display_name: progress.metadata.display_name.clone(),
            description: progress.metadata.description.clone(),
            not_updated_since: progress.updated_at,
        }
    }

    pub fn set_id(&self) -> &SetId {
        match self {
            SetNotification::Completed { set_id, .. } | SetNotification::Stalled { set_id, .. } => {
                set_id
            }
        }
    }

    pub fn subject(&self) -> String {
        match self {
            SetNotification::Completed { display_name, .. } => {
                format!("Batch set {display_name} completed")
            }
            SetNotification::Stalled { display_name, .. } => {
                format!("Problem with batch set {display_name}")
            }
        }
    }

    pub fn message(&self) -> String {
        match self {
            SetNotification::Completed {
                display_name,
                description,
                successes,
                failures,
                location,
                ..
            } => format!(
                "Batch set {} completed with {successes} successful tasks and {failures} failures. The requested files are in {location}.",
                label(display_name, description)
            ),
            SetNotification::Stalled {
                display_name,
                description,
                not_updated_since,
                ..
            } => format!(
                "There is a problem with batch set {}. No updates have been made since {}.",
                label(display_name, description),
                not_updated_since.to_rfc3339()
            ),
        }
    }
}

fn label(display_name: &str, description: &str) -> String {
    if description.is_empty() {
        display_name.to_string()
    } else {
        format!("{display_name} ({description})")
    }
}
