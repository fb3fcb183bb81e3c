//! Outcome reconciler: consumes per-task completion notifications, moves the
//! artifact to its final key, marks the task terminal and counts it.
//!
//! # 不変条件
//! - 成功はアーティファクトの移動が完了してから数える
//! - 終端済みタスクへの重複通知は何も数えない

use std::sync::Arc;

use serde::Serialize;
use tracing::{Instrument, error, info, warn};

use crate::domain::{
    CounterField, OutcomeNotification, TallyError, TaskId, TaskOutcome, TaskRecord, TaskStatus,
};
use crate::observability::{OpsCounters, set_span};
use crate::ports::{Clock, ObjectStore};

use super::aggregate_store::AggregateStore;
use super::task_store::TaskRecordStore;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reconciliation {
    /// The task moved to `status`. `counted` is false when the counter
    /// increment could not be applied.
    Applied {
        task_id: TaskId,
        status: TaskStatus,
        counted: bool,
    },
    /// The task was already terminal; nothing changed.
    Duplicate { task_id: TaskId, status: TaskStatus },
}

/// Per-batch totals from [`OutcomeReconciler::handle_batch`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct BatchReport {
    pub reconciled: usize,
    pub duplicates: usize,
    pub uncounted: usize,
    pub failed: usize,
}

pub struct OutcomeReconciler {
    tasks: TaskRecordStore,
    aggregates: AggregateStore,
    objects: Arc<dyn ObjectStore>,
    clock: Arc<dyn Clock>,
    work_bucket: String,
    ops: Arc<OpsCounters>,
}

impl OutcomeReconciler {
    pub fn new(
        tasks: TaskRecordStore,
        aggregates: AggregateStore,
        objects: Arc<dyn ObjectStore>,
        clock: Arc<dyn Clock>,
        work_bucket: impl Into<String>,
        ops: Arc<OpsCounters>,
    ) -> Self {
        Self {
            tasks,
            aggregates,
            objects,
            clock,
            work_bucket: work_bucket.into(),
            ops,
        }
    }

    /// Reconciles one outcome notification.
    ///
    /// # Errors
    /// - `InvalidNotification` for a malformed outcome.
    /// - `NotFound` if no task record matches the notification.
    /// - `Relocation` if the artifact could not be moved. The task stays
    ///   submitted and nothing is counted.
    pub async fn handle(&self, notification: &OutcomeNotification) -> Result<Reconciliation, TallyError> {
        let outcome = notification.outcome()?;
        let record = self.tasks.get(&notification.task_id).await.inspect_err(|e| {
            error!(task_id = %notification.task_id, error = %e, "outcome for unknown task");
        })?;

        let span = set_span("reconcile", record.set_id.as_str());
        self.apply(record, outcome).instrument(span).await
    }

    async fn apply(&self, mut record: TaskRecord, outcome: TaskOutcome) -> Result<Reconciliation, TallyError> {
        if record.status.is_terminal() {
            return Ok(self.duplicate(record.task_id, record.status));
        }
        let read_status = record.status;

        let now = self.clock.now();
        let field = match outcome {
            TaskOutcome::Succeeded { output_uri } => {
                self.relocate(&output_uri, &record.output_key).await?;
                record.output_uri = Some(output_uri);
                record.mark_succeeded(now);
                CounterField::Successes
            }
            TaskOutcome::Failed { reason } => {
                record.mark_failed(reason, now);
                CounterField::Failures
            }
        };

        let (task_id, set_id, status) = (record.task_id.clone(), record.set_id.clone(), record.status);
        // a concurrent delivery of the same outcome may have won since the read
        match self.tasks.replace(read_status, record).await {
            Ok(()) => {}
            Err(TallyError::TerminalTask { task_id, status }) => return Ok(self.duplicate(task_id, status)),
            Err(e) => return Err(e),
        }

        let counted = match self.aggregates.increment_counter(&set_id, field, 1).await {
            Ok(_) => true,
            Err(e @ (TallyError::CounterRaceExhausted { .. } | TallyError::CounterOverflow { .. })) => {
                warn!(%task_id, error = %e, "task marked terminal but not counted");
                false
            }
            Err(e) => return Err(e),
        };

        info!(%task_id, %status, counted, "reconciled task outcome");
        Ok(Reconciliation::Applied {
            task_id,
            status,
            counted,
        })
    }

    fn duplicate(&self, task_id: TaskId, status: TaskStatus) -> Reconciliation {
        self.ops.record_duplicate_outcome();
        warn!(%task_id, %status, "ignoring outcome for terminal task");
        Reconciliation::Duplicate { task_id, status }
    }

    /// Reconciles a batch; one bad notification never stops the rest.
    pub async fn handle_batch(&self, notifications: &[OutcomeNotification]) -> BatchReport {
        let mut report = BatchReport::default();
        for notification in notifications {
            match self.handle(notification).await {
                Ok(Reconciliation::Applied { counted, .. }) => {
                    report.reconciled += 1;
                    if !counted {
                        report.uncounted += 1;
                    }
                }
                Ok(Reconciliation::Duplicate { .. }) => report.duplicates += 1,
                Err(e) => {
                    warn!(task_id = %notification.task_id, error = %e, "failed to reconcile outcome");
                    report.failed += 1;
                }
            }
        }
        report
    }

    /// Copies the provisional artifact to `target_key`, then deletes the
    /// original.
    async fn relocate(&self, output_uri: &str, target_key: &str) -> Result<(), TallyError> {
        let source_key = self.object_key(output_uri);
        if source_key == target_key {
            return Ok(());
        }

        let moved = match self.objects.copy_object(source_key, target_key).await {
            Ok(()) => self.objects.delete_object(source_key).await,
            Err(e) => Err(e),
        };
        moved.map_err(|e| {
            self.ops.record_relocation_failure();
            error!(%source_key, %target_key, error = %e, "failed to relocate artifact");
            TallyError::Relocation {
                source_key: source_key.to_string(),
                target_key: target_key.to_string(),
                reason: e.to_string(),
            }
        })
    }

    /// `s3://<work_bucket>/<key>` to `<key>`; anything else is taken as a key.
    fn object_key<'a>(&self, output_uri: &'a str) -> &'a str {
        output_uri
            .strip_prefix("s3://")
            .and_then(|rest| rest.strip_prefix(self.work_bucket.as_str()))
            .and_then(|rest| rest.strip_prefix('/'))
            .unwrap_or(output_uri)
    }
}
