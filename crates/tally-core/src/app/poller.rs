//! Completion poller: reads a set's aggregate, classifies it, and publishes
//! exactly one terminal notification when the set completes or stalls.

use std::sync::Arc;
use std::time::Duration as StdDuration;

use chrono::Duration;
use tracing::{Instrument, info, warn};

use crate::config::TallyConfig;
use crate::domain::{SetId, SetNotification, SetProgress, SetStatus, TallyError};
use crate::observability::set_span;
use crate::ports::{Clock, NotificationChannel};

use super::aggregate_store::AggregateStore;

/// Knobs the poller reads from configuration.
#[derive(Debug, Clone, PartialEq)]
pub struct PollerSettings {
    pub stall_threshold: Duration,
    pub poll_interval: StdDuration,
    pub topic: String,
    pub work_bucket: String,
}

impl From<&TallyConfig> for PollerSettings {
    fn from(config: &TallyConfig) -> Self {
        Self {
            stall_threshold: config.stall_threshold,
            poll_interval: config.poll_interval,
            topic: config.set_topic.clone(),
            work_bucket: config.work_bucket.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PollDecision {
    /// Work remains and the set is still moving; poll again after `next_poll`.
    Continue {
        progress: SetProgress,
        next_poll: StdDuration,
    },
    /// A terminal notification was published. Polling for this set is over.
    Stop {
        status: SetStatus,
        notification: SetNotification,
    },
}

pub struct CompletionPoller {
    aggregates: AggregateStore,
    notifier: Arc<dyn NotificationChannel>,
    clock: Arc<dyn Clock>,
    settings: PollerSettings,
}

impl CompletionPoller {
    pub fn new(
        aggregates: AggregateStore,
        notifier: Arc<dyn NotificationChannel>,
        clock: Arc<dyn Clock>,
        settings: PollerSettings,
    ) -> Self {
        Self {
            aggregates,
            notifier,
            clock,
            settings,
        }
    }

    pub fn poll_interval(&self) -> StdDuration {
        self.settings.poll_interval
    }

    /// Current counters and idle time for a set.
    pub async fn progress(&self, set_id: &SetId) -> Result<SetProgress, TallyError> {
        let aggregate = self.aggregates.get(set_id).await?;
        let progress = SetProgress::from_aggregate(&aggregate, self.clock.now());
        if progress.over_counted() {
            warn!(
                %set_id,
                processed = progress.processed(),
                total_items = progress.total_items,
                "set counters exceed total items"
            );
        }
        Ok(progress)
    }

    /// One poll: classify the set and, on a terminal status, publish its
    /// notification.
    ///
    /// # Errors
    /// `NotFound` for an unknown set, or the channel's error if publishing
    /// fails. A failed publish may be retried by polling again.
    pub async fn poll(&self, set_id: &SetId) -> Result<PollDecision, TallyError> {
        let span = set_span("poll", set_id.as_str());
        self.classify_and_notify(set_id).instrument(span).await
    }

    async fn classify_and_notify(&self, set_id: &SetId) -> Result<PollDecision, TallyError> {
        let progress = self.progress(set_id).await?;
        let status = progress.classify(self.settings.stall_threshold);

        let notification = match status {
            SetStatus::InProgress => {
                info!(
                    successes = progress.successes,
                    failures = progress.failures,
                    remaining = progress.remaining,
                    "set still in progress"
                );
                return Ok(PollDecision::Continue {
                    progress,
                    next_poll: self.settings.poll_interval,
                });
            }
            SetStatus::Complete => SetNotification::completed(&progress, &self.settings.work_bucket),
            SetStatus::Stalled => {
                warn!(
                    seconds_since_update = progress.seconds_since_update,
                    remaining = progress.remaining,
                    "set stalled"
                );
                SetNotification::stalled(&progress)
            }
        };

        self.notifier.publish(&self.settings.topic, &notification).await?;
        info!(%status, "published set notification");
        Ok(PollDecision::Stop {
            status,
            notification,
        })
    }
}
