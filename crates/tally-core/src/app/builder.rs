//! AppBuilder - ports のワイヤリング
//!
//! # Fail-fast 設計
//! - 必須の port が 1 つでも欠けていれば build() は BuildError を返す
//! - 欠けている port はまとめて報告する（1 つずつ直させない）

use std::sync::Arc;

use crate::config::TallyConfig;
use crate::observability::OpsCounters;
use crate::ports::{
    Clock, IdGenerator, NotificationChannel, ObjectStore, SetTable, SynthesisDispatcher, SystemClock,
    TaskTable, UlidGenerator, WorkQueue,
};

use super::aggregate_store::AggregateStore;
use super::coordinator::SubmissionCoordinator;
use super::poller::{CompletionPoller, PollerSettings};
use super::reconciler::OutcomeReconciler;
use super::task_store::TaskRecordStore;
use super::waiter_loop::WaiterLoop;

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum BuildError {
    #[error("Missing ports: {0:?}. These must be provided before build().")]
    MissingPorts(Vec<&'static str>),
}

/// # 使用例
/// ```ignore
/// let app = AppBuilder::new()
///     .config(TallyConfig::from_env()?)
///     .set_table(Arc::new(InMemorySetTable::new()))
///     .task_table(Arc::new(InMemoryTaskTable::new()))
///     .work_queue(queue.clone())
///     .dispatcher(Arc::new(MyDispatcher))
///     .object_store(Arc::new(InMemoryObjectStore::new()))
///     .notifier(Arc::new(RecordingNotifier::new()))
///     .build()?;
/// ```
#[derive(Default)]
pub struct AppBuilder {
    config: TallyConfig,
    set_table: Option<Arc<dyn SetTable>>,
    task_table: Option<Arc<dyn TaskTable>>,
    work_queue: Option<Arc<dyn WorkQueue>>,
    dispatcher: Option<Arc<dyn SynthesisDispatcher>>,
    object_store: Option<Arc<dyn ObjectStore>>,
    notifier: Option<Arc<dyn NotificationChannel>>,
    clock: Option<Arc<dyn Clock>>,
    ids: Option<Arc<dyn IdGenerator>>,
}

impl AppBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn config(mut self, config: TallyConfig) -> Self {
        self.config = config;
        self
    }

    pub fn set_table(mut self, table: Arc<dyn SetTable>) -> Self {
        self.set_table = Some(table);
        self
    }

    pub fn task_table(mut self, table: Arc<dyn TaskTable>) -> Self {
        self.task_table = Some(table);
        self
    }

    pub fn work_queue(mut self, queue: Arc<dyn WorkQueue>) -> Self {
        self.work_queue = Some(queue);
        self
    }

    pub fn dispatcher(mut self, dispatcher: Arc<dyn SynthesisDispatcher>) -> Self {
        self.dispatcher = Some(dispatcher);
        self
    }

    pub fn object_store(mut self, store: Arc<dyn ObjectStore>) -> Self {
        self.object_store = Some(store);
        self
    }

    pub fn notifier(mut self, notifier: Arc<dyn NotificationChannel>) -> Self {
        self.notifier = Some(notifier);
        self
    }

    /// Defaults to [`SystemClock`].
    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = Some(clock);
        self
    }

    /// Defaults to a [`UlidGenerator`] on the configured clock.
    pub fn id_generator(mut self, ids: Arc<dyn IdGenerator>) -> Self {
        self.ids = Some(ids);
        self
    }

    pub fn build(self) -> Result<App, BuildError> {
        let (
            Some(set_table),
            Some(task_table),
            Some(work_queue),
            Some(dispatcher),
            Some(object_store),
            Some(notifier),
        ) = (
            self.set_table.clone(),
            self.task_table.clone(),
            self.work_queue.clone(),
            self.dispatcher.clone(),
            self.object_store.clone(),
            self.notifier.clone(),
        )
        else {
            return Err(BuildError::MissingPorts(self.missing_ports()));
        };

        let config = self.config;
        let clock = self.clock.unwrap_or_else(|| Arc::new(SystemClock));
        let ids = self
            .ids
            .unwrap_or_else(|| Arc::new(UlidGenerator::new(clock.clone())));
        let ops = Arc::new(OpsCounters::new());

        let aggregates = AggregateStore::new(set_table, clock.clone())
            .with_retry(config.counter_retry.clone())
            .with_record_ttl(config.record_ttl)
            .with_ops(ops.clone());
        let tasks = TaskRecordStore::new(task_table, clock.clone()).with_record_ttl(config.record_ttl);

        let coordinator = SubmissionCoordinator::new(
            aggregates.clone(),
            tasks.clone(),
            work_queue,
            dispatcher,
            ids,
            ops.clone(),
        );
        let reconciler = OutcomeReconciler::new(
            tasks.clone(),
            aggregates.clone(),
            object_store,
            clock.clone(),
            config.work_bucket.clone(),
            ops.clone(),
        );
        let poller = CompletionPoller::new(
            aggregates.clone(),
            notifier,
            clock,
            PollerSettings::from(&config),
        );

        Ok(App {
            config,
            aggregates,
            tasks,
            coordinator: Arc::new(coordinator),
            reconciler: Arc::new(reconciler),
            poller: Arc::new(poller),
            ops,
        })
    }

    fn missing_ports(&self) -> Vec<&'static str> {
        [
            ("set_table", self.set_table.is_none()),
            ("task_table", self.task_table.is_none()),
            ("work_queue", self.work_queue.is_none()),
            ("dispatcher", self.dispatcher.is_none()),
            ("object_store", self.object_store.is_none()),
            ("notifier", self.notifier.is_none()),
        ]
        .into_iter()
        .filter_map(|(name, missing)| missing.then_some(name))
        .collect()
    }
}

/// Wired components sharing one set of stores and ops counters.
pub struct App {
    config: TallyConfig,
    aggregates: AggregateStore,
    tasks: TaskRecordStore,
    coordinator: Arc<SubmissionCoordinator>,
    reconciler: Arc<OutcomeReconciler>,
    poller: Arc<CompletionPoller>,
    ops: Arc<OpsCounters>,
}

impl App {
    pub fn config(&self) -> &TallyConfig {
        &self.config
    }

    pub fn aggregates(&self) -> &AggregateStore {
        &self.aggregates
    }

    pub fn tasks(&self) -> &TaskRecordStore {
        &self.tasks
    }

    pub fn coordinator(&self) -> Arc<SubmissionCoordinator> {
        self.coordinator.clone()
    }

    pub fn reconciler(&self) -> Arc<OutcomeReconciler> {
        self.reconciler.clone()
    }

    pub fn poller(&self) -> Arc<CompletionPoller> {
        self.poller.clone()
    }

    pub fn waiter(&self) -> WaiterLoop {
        WaiterLoop::new(self.poller.clone())
    }

    pub fn ops(&self) -> Arc<OpsCounters> {
        self.ops.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::app::{DispatchResult, PollDecision, Reconciliation};
    use crate::domain::{
        OutcomeNotification, RetryPolicy, SetId, SetMetadata, SetNotification, SetStatus,
        SetSubmission, TaskStatus, WorkItem,
    };
    use crate::impls::{
        InMemoryObjectStore, InMemorySetTable, InMemoryTaskTable, InMemoryWorkQueue,
        RecordingNotifier,
    };
    use crate::testing::{ScriptedDispatcher, fixed_clock};
    use std::time::Duration;

    #[test]
    fn build_reports_every_missing_port() {
        let err = AppBuilder::new()
            .set_table(Arc::new(InMemorySetTable::new()))
            .notifier(Arc::new(RecordingNotifier::new()))
            .build()
            .err()
            .unwrap();
        assert_eq!(
            err,
            BuildError::MissingPorts(vec!["task_table", "work_queue", "dispatcher", "object_store"])
        );
    }

    #[tokio::test]
    async fn end_to_end_set_lifecycle() {
        let config = TallyConfig {
            work_bucket: "work".to_string(),
            counter_retry: RetryPolicy::fixed(10, Duration::from_millis(1)),
            ..TallyConfig::default()
        };
        let queue = Arc::new(InMemoryWorkQueue::new());
        let objects = InMemoryObjectStore::new();
        let notifier = RecordingNotifier::new();
        let app = AppBuilder::new()
            .config(config)
            .clock(fixed_clock())
            .set_table(Arc::new(InMemorySetTable::new()))
            .task_table(Arc::new(InMemoryTaskTable::new()))
            .work_queue(queue.clone())
            .dispatcher(Arc::new(
                ScriptedDispatcher::new("work").rejecting("out/greetings/2.mp3"),
            ))
            .object_store(Arc::new(objects.clone()))
            .notifier(Arc::new(notifier.clone()))
            .build()
            .unwrap();

        let set_id = SetId::new("greetings-1");
        let items = (0..3)
            .map(|i| WorkItem::new(format!("line {i}"), format!("out/greetings/{i}.mp3")))
            .collect();
        app.coordinator()
            .submit_set(&SetSubmission::new(
                set_id.clone(),
                SetMetadata::new("greetings", "out/greetings"),
                items,
            ))
            .await
            .unwrap();

        let mut outcomes = Vec::new();
        while let Some(message) = queue.receive(Duration::from_millis(20)).await.unwrap() {
            if let DispatchResult::Submitted(task_id) =
                app.coordinator().dispatch_item(&message).await.unwrap()
            {
                let record = app.tasks().get(&task_id).await.unwrap();
                let uri = record.output_uri.unwrap();
                let key = uri.trim_start_matches("s3://work/").to_string();
                objects.put_object(key, b"audio".to_vec()).unwrap();
                outcomes.push(OutcomeNotification::completed(task_id, uri));
            }
        }
        assert_eq!(outcomes.len(), 2);

        let poller = app.poller();
        assert!(matches!(
            poller.poll(&set_id).await.unwrap(),
            PollDecision::Continue { .. }
        ));

        for outcome in &outcomes {
            let result = app.reconciler().handle(outcome).await.unwrap();
            assert!(matches!(
                result,
                Reconciliation::Applied { status: TaskStatus::Succeeded, counted: true, .. }
            ));
        }
        assert!(objects.contains("out/greetings/0.mp3"));
        assert!(objects.contains("out/greetings/1.mp3"));

        let (_tx, mut rx) = tokio::sync::watch::channel(false);
        let waited = app.waiter().run(&set_id, &mut rx).await.unwrap();
        assert_eq!(waited.status, SetStatus::Complete);
        assert!(matches!(
            waited.notification,
            Some(SetNotification::Completed { successes: 2, failures: 1, .. })
        ));
        assert_eq!(notifier.published().len(), 1);
        assert_eq!(notifier.published()[0].0, "tally-set-events");
        assert_eq!(app.ops().snapshot().dispatch_rejections, 1);
    }
}
