//! Submission coordinator: creates the set aggregate, fans items out to the
//! work queue, and turns each queued item into a dispatched or rejected task.
//!
//! # フロー
//! 1. `submit_set` で集計レコードを作成（カウンタは 0）
//! 2. 各アイテムをキューへ送信（送信失敗は即座に rejected として記録）
//! 3. `dispatch_item` で外部サービスへ投入し、タスクレコードを作成

use std::sync::Arc;

use serde::Serialize;
use tracing::{Instrument, info, warn};

use crate::domain::{CounterField, SetId, SetSubmission, TallyError, TaskId, WorkMessage};
use crate::observability::{OpsCounters, set_span};
use crate::ports::{IdGenerator, InsertOutcome, SynthesisDispatcher, WorkQueue};

use super::aggregate_store::AggregateStore;
use super::task_store::TaskRecordStore;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SubmitReport {
    pub set_id: SetId,
    pub queued: usize,
    pub rejected: usize,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DispatchResult {
    Submitted(TaskId),
    /// The item never reached the service; a terminal record was written
    /// under a locally generated id.
    Rejected { task_id: TaskId, reason: String },
}

pub struct SubmissionCoordinator {
    aggregates: AggregateStore,
    tasks: TaskRecordStore,
    queue: Arc<dyn WorkQueue>,
    dispatcher: Arc<dyn SynthesisDispatcher>,
    ids: Arc<dyn IdGenerator>,
    ops: Arc<OpsCounters>,
}

impl SubmissionCoordinator {
    pub fn new(
        aggregates: AggregateStore,
        tasks: TaskRecordStore,
        queue: Arc<dyn WorkQueue>,
        dispatcher: Arc<dyn SynthesisDispatcher>,
        ids: Arc<dyn IdGenerator>,
        ops: Arc<OpsCounters>,
    ) -> Self {
        Self {
            aggregates,
            tasks,
            queue,
            dispatcher,
            ids,
            ops,
        }
    }

    /// Creates the set with `total_items` equal to the number of items, then
    /// queues every item.
    ///
    /// A queue failure for one item is recorded as a rejection and does not
    /// stop its siblings.
    pub async fn submit_set(&self, submission: &SetSubmission) -> Result<SubmitReport, TallyError> {
        let span = set_span("submit_set", submission.set_id.as_str());
        self.queue_items(submission).instrument(span).await
    }

    async fn queue_items(&self, submission: &SetSubmission) -> Result<SubmitReport, TallyError> {
        self.aggregates
            .create(
                submission.set_id.clone(),
                submission.items.len() as u64,
                submission.metadata.clone(),
            )
            .await?;

        let mut report = SubmitReport {
            set_id: submission.set_id.clone(),
            queued: 0,
            rejected: 0,
        };
        for message in submission.messages() {
            let set_id = message.set_id.clone();
            let output_key = message.item.output_key.clone();
            match self.queue.send(message).await {
                Ok(()) => report.queued += 1,
                Err(e) => {
                    warn!(%output_key, error = %e, "failed to queue item");
                    let reason = TallyError::DispatchRejected(e.to_string()).to_string();
                    self.record_rejection(&set_id, &output_key, &reason).await?;
                    report.rejected += 1;
                }
            }
        }

        info!(queued = report.queued, rejected = report.rejected, "submitted set");
        Ok(report)
    }

    /// Starts one synthesis task for a queued item and records the result.
    pub async fn dispatch_item(&self, message: &WorkMessage) -> Result<DispatchResult, TallyError> {
        let span = set_span("dispatch_item", message.set_id.as_str());
        self.start_task(message).instrument(span).await
    }

    async fn start_task(&self, message: &WorkMessage) -> Result<DispatchResult, TallyError> {
        let output_key = &message.item.output_key;
        match self.dispatcher.start_task(&message.set_id, &message.item).await {
            Ok(receipt) => {
                self.tasks
                    .create_submitted(
                        receipt.task_id.clone(),
                        message.set_id.clone(),
                        output_key,
                        receipt.output_uri,
                    )
                    .await?;
                info!(task_id = %receipt.task_id, %output_key, "dispatched item");
                Ok(DispatchResult::Submitted(receipt.task_id))
            }
            Err(e) => {
                warn!(%output_key, error = %e, "synthesis service rejected item");
                let reason = TallyError::DispatchRejected(e.to_string()).to_string();
                let task_id = self.record_rejection(&message.set_id, output_key, &reason).await?;
                Ok(DispatchResult::Rejected { task_id, reason })
            }
        }
    }

    /// Writes one rejected record and counts it as one failure.
    ///
    /// The failure is counted only when the record is new. A lost counter
    /// race is logged and left uncounted rather than failing the caller.
    async fn record_rejection(
        &self,
        set_id: &SetId,
        output_key: &str,
        reason: &str,
    ) -> Result<TaskId, TallyError> {
        self.ops.record_dispatch_rejection();
        let task_id = self.ids.generate_task_id();

        let inserted = self
            .tasks
            .create_rejected(task_id.clone(), set_id.clone(), output_key, reason)
            .await?;
        if inserted == InsertOutcome::Inserted {
            match self
                .aggregates
                .increment_counter(set_id, CounterField::Failures, 1)
                .await
            {
                Ok(_) => {}
                Err(e @ (TallyError::CounterRaceExhausted { .. } | TallyError::CounterOverflow { .. })) => {
                    warn!(%task_id, error = %e, "rejection recorded but not counted");
                }
                Err(e) => return Err(e),
            }
        }
        Ok(task_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{SetMetadata, TaskStatus, WorkItem};
    use crate::impls::{InMemorySetTable, InMemoryTaskTable, InMemoryWorkQueue};
    use crate::ports::UlidGenerator;
    use crate::testing::{FailingQueue, ScriptedDispatcher, fixed_clock};
    use std::time::Duration;

    struct Fixture {
        coordinator: SubmissionCoordinator,
        aggregates: AggregateStore,
        tasks: InMemoryTaskTable,
        queue: Arc<InMemoryWorkQueue>,
        ops: Arc<OpsCounters>,
    }

    fn fixture(queue_fails: bool, dispatcher: ScriptedDispatcher) -> Fixture {
        let clock = fixed_clock();
        let ops = Arc::new(OpsCounters::new());
        let aggregates =
            AggregateStore::new(Arc::new(InMemorySetTable::new()), clock.clone()).with_ops(ops.clone());
        let tasks = InMemoryTaskTable::new();
        let task_store = TaskRecordStore::new(Arc::new(tasks.clone()), clock.clone());
        let queue = Arc::new(InMemoryWorkQueue::new());
        let sink: Arc<dyn WorkQueue> = if queue_fails {
            Arc::new(FailingQueue)
        } else {
            queue.clone()
        };
        let coordinator = SubmissionCoordinator::new(
            aggregates.clone(),
            task_store,
            sink,
            Arc::new(dispatcher),
            Arc::new(UlidGenerator::new(clock)),
            ops.clone(),
        );
        Fixture {
            coordinator,
            aggregates,
            tasks,
            queue,
            ops,
        }
    }

    fn submission(n: usize) -> SetSubmission {
        let items = (0..n)
            .map(|i| WorkItem::new(format!("line {i}"), format!("out/greetings/{i}.mp3")))
            .collect();
        SetSubmission::new(
            SetId::new("greetings-1"),
            SetMetadata::new("greetings", "out/greetings"),
            items,
        )
    }

    #[tokio::test]
    async fn submit_creates_the_aggregate_and_queues_every_item() {
        let f = fixture(false, ScriptedDispatcher::new("work"));
        let report = f.coordinator.submit_set(&submission(3)).await.unwrap();

        assert_eq!(report.queued, 3);
        assert_eq!(report.rejected, 0);
        assert_eq!(f.queue.pending(), 3);

        let agg = f.aggregates.get(&SetId::new("greetings-1")).await.unwrap();
        assert_eq!(agg.total_items, 3);
        assert_eq!(agg.processed(), 0);
    }

    #[tokio::test]
    async fn queue_failures_are_recorded_as_rejections() {
        let f = fixture(true, ScriptedDispatcher::new("work"));
        let report = f.coordinator.submit_set(&submission(2)).await.unwrap();

        assert_eq!(report.rejected, 2);
        let agg = f.aggregates.get(&SetId::new("greetings-1")).await.unwrap();
        assert_eq!(agg.failure_count, 2);

        let records = f.tasks.all().await;
        assert_eq!(records.len(), 2);
        assert!(records.iter().all(|r| r.status == TaskStatus::Rejected));
        assert!(records[0].message.contains("queue unavailable"));
    }

    #[tokio::test]
    async fn resubmitting_a_set_is_refused() {
        let f = fixture(false, ScriptedDispatcher::new("work"));
        f.coordinator.submit_set(&submission(1)).await.unwrap();

        let err = f.coordinator.submit_set(&submission(1)).await.unwrap_err();
        assert!(matches!(err, TallyError::AlreadyExists { .. }));
        assert_eq!(f.queue.pending(), 1);
    }

    #[tokio::test]
    async fn accepted_item_gets_a_submitted_record() {
        let f = fixture(false, ScriptedDispatcher::new("work"));
        f.coordinator.submit_set(&submission(1)).await.unwrap();
        let message = f.queue.receive(Duration::from_millis(50)).await.unwrap().unwrap();

        let result = f.coordinator.dispatch_item(&message).await.unwrap();
        let DispatchResult::Submitted(task_id) = result else {
            panic!("expected submission, got {result:?}");
        };

        let records = f.tasks.all().await;
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].task_id, task_id);
        assert_eq!(records[0].status, TaskStatus::Submitted);
        assert_eq!(
            records[0].output_uri.as_deref(),
            Some("s3://work/tmp/task-0001.mp3")
        );
        assert_eq!(
            f.aggregates.get(&SetId::new("greetings-1")).await.unwrap().processed(),
            0
        );
    }

    #[tokio::test]
    async fn rejected_item_writes_one_record_and_one_failure() {
        let f = fixture(
            false,
            ScriptedDispatcher::new("work").rejecting("out/greetings/1.mp3"),
        );
        f.coordinator.submit_set(&submission(3)).await.unwrap();

        let mut rejected = Vec::new();
        while let Some(message) = f.queue.receive(Duration::from_millis(20)).await.unwrap() {
            if let DispatchResult::Rejected { task_id, reason } =
                f.coordinator.dispatch_item(&message).await.unwrap()
            {
                assert!(reason.contains("quota exceeded"));
                rejected.push(task_id);
            }
        }

        assert_eq!(rejected.len(), 1);
        assert!(rejected[0].as_str().starts_with("local-"));

        let records = f.tasks.all().await;
        let rejected_records: Vec<_> = records
            .iter()
            .filter(|r| r.status == TaskStatus::Rejected)
            .collect();
        assert_eq!(rejected_records.len(), 1);
        assert_eq!(rejected_records[0].output_key, "out/greetings/1.mp3");

        let agg = f.aggregates.get(&SetId::new("greetings-1")).await.unwrap();
        assert_eq!(agg.failure_count, 1);
        assert_eq!(agg.success_count, 0);
        assert_eq!(f.ops.snapshot().dispatch_rejections, 1);
    }

    #[tokio::test]
    async fn rejection_on_a_full_set_is_recorded_but_not_counted() {
        let f = fixture(
            false,
            ScriptedDispatcher::new("work").rejecting("out/greetings/0.mp3"),
        );
        let set_id = SetId::new("greetings-1");
        f.coordinator.submit_set(&submission(1)).await.unwrap();
        f.aggregates.post_success(&set_id).await.unwrap();
        let message = f.queue.receive(Duration::from_millis(50)).await.unwrap().unwrap();

        let result = f.coordinator.dispatch_item(&message).await.unwrap();

        assert!(matches!(result, DispatchResult::Rejected { .. }));
        let agg = f.aggregates.get(&set_id).await.unwrap();
        assert_eq!((agg.success_count, agg.failure_count), (1, 0));
        assert_eq!(f.tasks.all().await.len(), 1);
    }
}
