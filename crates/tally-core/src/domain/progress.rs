//! Set progress snapshot and the completion classification derived from it.

use std::fmt;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use super::ids::SetId;
use super::set::{SetAggregate, SetMetadata};

/// Logical state of a set, recomputed from the aggregate on every poll.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SetStatus {
    InProgress,
    Complete,
    Stalled,
}

impl SetStatus {
    pub fn is_terminal(self) -> bool {
        !matches!(self, SetStatus::InProgress)
    }
}

impl fmt::Display for SetStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            SetStatus::InProgress => "IN_PROGRESS",
            SetStatus::Complete => "COMPLETE",
            SetStatus::Stalled => "STALLED",
        })
    }
}

/// Point-in-time view of a set, as handed from the poller to the
/// notification step.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SetProgress {
    pub set_id: SetId,
    #[serde(flatten)]
    pub metadata: SetMetadata,
    pub total_items: u64,
    pub successes: u64,
    pub failures: u64,
    pub remaining: u64,
    pub updated_at: DateTime<Utc>,
    /// Seconds since the last counter update, as observed by the poller.
    pub seconds_since_update: i64,
}

impl SetProgress {
    pub fn from_aggregate(aggregate: &SetAggregate, now: DateTime<Utc>) -> Self {
        Self {
            set_id: aggregate.set_id.clone(),
            metadata: aggregate.metadata.clone(),
            total_items: aggregate.total_items,
            successes: aggregate.success_count,
            failures: aggregate.failure_count,
            remaining: aggregate.remaining(),
            updated_at: aggregate.updated_at,
            seconds_since_update: (now - aggregate.updated_at).num_seconds(),
        }
    }

    pub fn processed(&self) -> u64 {
        self.successes + self.failures
    }

    pub fn over_counted(&self) -> bool {
        self.processed() > self.total_items
    }

    /// Complete wins over stalled; a stall is only possible while work remains.
    pub fn classify(&self, stall_threshold: Duration) -> SetStatus {
        if self.processed() >= self.total_items {
            SetStatus::Complete
        } else if self.seconds_since_update > stall_threshold.num_seconds() {
            SetStatus::Stalled
        } else {
            SetStatus::InProgress
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use rstest::rstest;

    fn progress(total: u64, successes: u64, failures: u64, idle_minutes: i64) -> SetProgress {
        let now = Utc.with_ymd_and_hms(2024, 1, 1, 12, 0, 0).unwrap();
        let mut agg = SetAggregate::new(
            SetId::new("s"),
            total,
            SetMetadata::new("s", "s"),
            now - Duration::hours(2),
            now + Duration::days(30),
        );
        agg.success_count = successes;
        agg.failure_count = failures;
        agg.updated_at = now - Duration::minutes(idle_minutes);
        SetProgress::from_aggregate(&agg, now)
    }

    #[rstest]
    #[case::complete(10, 7, 3, 0, SetStatus::Complete)]
    #[case::complete_even_if_idle(10, 7, 3, 600, SetStatus::Complete)]
    #[case::stalled(10, 5, 2, 31, SetStatus::Stalled)]
    #[case::in_progress(10, 5, 2, 1, SetStatus::InProgress)]
    #[case::exactly_at_threshold(10, 5, 2, 30, SetStatus::InProgress)]
    #[case::empty_set(0, 0, 0, 0, SetStatus::Complete)]
    #[case::over_counted(10, 8, 3, 0, SetStatus::Complete)]
    fn classification(
        #[case] total: u64,
        #[case] successes: u64,
        #[case] failures: u64,
        #[case] idle_minutes: i64,
        #[case] expected: SetStatus,
    ) {
        let p = progress(total, successes, failures, idle_minutes);
        assert_eq!(p.classify(Duration::minutes(30)), expected);
    }

    #[test]
    fn snapshot_reports_remaining_and_idle_time() {
        let p = progress(10, 5, 2, 3);
        assert_eq!(p.remaining, 3);
        assert_eq!(p.seconds_since_update, 180);
        assert!(!p.over_counted());
    }
}
