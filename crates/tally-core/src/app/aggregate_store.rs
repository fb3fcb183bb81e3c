//! Aggregate counter store: set records and their contention-safe counters.
//!
//! Writers are many short-lived, independent invocations with no shared
//! memory, so increments are serialized with read / write-if-unchanged and a
//! bounded retry instead of a lock.

use std::sync::Arc;

use chrono::Duration;
use tracing::{debug, error, info, warn};

use crate::domain::{CounterField, RecordKind, RetryPolicy, SetAggregate, SetId, SetMetadata, TallyError};
use crate::observability::OpsCounters;
use crate::ports::{Clock, ConditionalWrite, CounterValues, InsertOutcome, SetTable};

#[derive(Clone)]
pub struct AggregateStore {
    table: Arc<dyn SetTable>,
    clock: Arc<dyn Clock>,
    retry: RetryPolicy,
    record_ttl: Duration,
    ops: Arc<OpsCounters>,
}

impl AggregateStore {
    pub fn new(table: Arc<dyn SetTable>, clock: Arc<dyn Clock>) -> Self {
        Self {
            table,
            clock,
            retry: RetryPolicy::counter_default(),
            record_ttl: Duration::days(30),
            ops: Arc::new(OpsCounters::new()),
        }
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_record_ttl(mut self, record_ttl: Duration) -> Self {
        self.record_ttl = record_ttl;
        self
    }

    pub fn with_ops(mut self, ops: Arc<OpsCounters>) -> Self {
        self.ops = ops;
        self
    }

    /// Creates the aggregate with both counters at zero.
    ///
    /// # Errors
    /// `AlreadyExists` if the set was created before.
    pub async fn create(
        &self,
        set_id: SetId,
        total_items: u64,
        metadata: SetMetadata,
    ) -> Result<SetAggregate, TallyError> {
        let now = self.clock.now();
        let aggregate = SetAggregate::new(set_id, total_items, metadata, now, now + self.record_ttl);

        match self.table.insert_if_absent(aggregate.clone()).await? {
            InsertOutcome::Inserted => {
                info!(set_id = %aggregate.set_id, total_items, "created set aggregate");
                Ok(aggregate)
            }
            InsertOutcome::AlreadyPresent => Err(TallyError::AlreadyExists {
                kind: RecordKind::Set,
                id: aggregate.set_id.to_string(),
            }),
        }
    }

    /// # Errors
    /// `NotFound` if the set does not exist.
    pub async fn get(&self, set_id: &SetId) -> Result<SetAggregate, TallyError> {
        self.table
            .get(set_id)
            .await?
            .ok_or_else(|| TallyError::set_not_found(set_id))
    }

    /// Atomically adds `amount` to `field` and refreshes `updated_at`.
    ///
    /// Each attempt reads both counters and writes only if neither changed
    /// since the read, so the total-items check made on the read still holds
    /// at write time. A lost race sleeps for the policy delay and tries again.
    ///
    /// # Errors
    /// - `CounterRaceExhausted` once the retry budget is spent. The increment
    ///   did not apply; the event is logged and counted, and callers are
    ///   expected to carry on with sibling work.
    /// - `CounterOverflow` if the increment would take the set past
    ///   `total_items` (including an `amount` that overflows `u64`).
    /// - `NotFound` if the set does not exist.
    pub async fn increment_counter(
        &self,
        set_id: &SetId,
        field: CounterField,
        amount: u64,
    ) -> Result<SetAggregate, TallyError> {
        let max_attempts = self.retry.max_attempts.max(1);

        for attempt in 1..=max_attempts {
            let current = self.get(set_id).await?;
            current.check_increment(field, amount).inspect_err(|_| {
                warn!(%set_id, %field, amount, total_items = current.total_items, "refusing increment past total items");
            })?;

            let expected = CounterValues::from(&current);
            let write = self
                .table
                .add_if_unchanged(set_id, field, expected, amount, self.clock.now())
                .await?;

            match write {
                ConditionalWrite::Applied(updated) => {
                    debug!(%set_id, %field, attempt, value = updated.counter(field), "incremented counter");
                    return Ok(updated);
                }
                ConditionalWrite::ConditionFailed { current } => {
                    debug!(%set_id, %field, attempt, ?expected, ?current, "lost counter race");
                    if attempt < max_attempts {
                        tokio::time::sleep(self.retry.next_delay(attempt)).await;
                    }
                }
            }
        }

        self.ops.record_counter_race_exhausted();
        error!(%set_id, %field, attempts = max_attempts, "failed to increment counter; count not applied");
        Err(TallyError::CounterRaceExhausted {
            set_id: set_id.clone(),
            field,
            attempts: max_attempts,
        })
    }

    pub async fn post_success(&self, set_id: &SetId) -> Result<SetAggregate, TallyError> {
        self.increment_counter(set_id, CounterField::Successes, 1).await
    }

    pub async fn post_failure(&self, set_id: &SetId) -> Result<SetAggregate, TallyError> {
        self.increment_counter(set_id, CounterField::Failures, 1).await
    }
}
