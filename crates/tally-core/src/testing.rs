//! Test doubles shared across the app tests.

use std::collections::HashSet;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use tokio::sync::{Barrier, Notify};

use crate::domain::{
    CounterField, SetAggregate, SetId, TallyError, TaskId, TaskRecord, TaskStatus, WorkItem,
    WorkMessage,
};
use crate::impls::{InMemorySetTable, InMemoryTaskTable};
use crate::ports::{
    ConditionalWrite, CounterValues, DispatchError, DispatchReceipt, FixedClock, InsertOutcome,
    ObjectStore, ObjectStoreError, QueueError, SetTable, StatusWrite, SynthesisDispatcher,
    TaskTable, WorkQueue,
};

pub(crate) fn epoch() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 1, 1, 12, 0, 0).unwrap()
}

pub(crate) fn fixed_clock() -> Arc<FixedClock> {
    Arc::new(FixedClock::new(epoch()))
}

/// Accepts every item except those whose output key was marked for
/// rejection. Accepted tasks get sequential ids and a provisional uri in
/// `work_bucket`.
pub(crate) struct ScriptedDispatcher {
    work_bucket: String,
    rejected_keys: HashSet<String>,
    next: AtomicU64,
}

impl ScriptedDispatcher {
    pub(crate) fn new(work_bucket: &str) -> Self {
        Self {
            work_bucket: work_bucket.to_string(),
            rejected_keys: HashSet::new(),
            next: AtomicU64::new(1),
        }
    }

    pub(crate) fn rejecting(mut self, output_key: &str) -> Self {
        self.rejected_keys.insert(output_key.to_string());
        self
    }
}

#[async_trait]
impl SynthesisDispatcher for ScriptedDispatcher {
    async fn start_task(
        &self,
        _set_id: &SetId,
        item: &WorkItem,
    ) -> Result<DispatchReceipt, DispatchError> {
        if self.rejected_keys.contains(&item.output_key) {
            return Err(DispatchError::Quota("too many concurrent tasks".to_string()));
        }
        let n = self.next.fetch_add(1, Ordering::SeqCst);
        let task_id = TaskId::new(format!("task-{n:04}"));
        Ok(DispatchReceipt {
            output_uri: Some(format!("s3://{}/tmp/{}.mp3", self.work_bucket, task_id)),
            task_id,
        })
    }
}

pub(crate) struct FailingQueue;

#[async_trait]
impl WorkQueue for FailingQueue {
    async fn send(&self, _message: WorkMessage) -> Result<(), QueueError> {
        Err(QueueError::OperationFailed("queue unavailable".to_string()))
    }
}

/// Reads succeed; copy or delete fail depending on the flag.
pub(crate) struct FailingObjectStore {
    pub(crate) fail_copy: bool,
}

#[async_trait]
impl ObjectStore for FailingObjectStore {
    async fn get_object(&self, key: &str) -> Result<Vec<u8>, ObjectStoreError> {
        Ok(key.as_bytes().to_vec())
    }

    async fn copy_object(&self, _source: &str, _target: &str) -> Result<(), ObjectStoreError> {
        if self.fail_copy {
            Err(ObjectStoreError::Backend("access denied".to_string()))
        } else {
            Ok(())
        }
    }

    async fn delete_object(&self, _key: &str) -> Result<(), ObjectStoreError> {
        Err(ObjectStoreError::Backend("access denied".to_string()))
    }
}

#[derive(Debug, Default)]
struct Gate {
    participants: usize,
    arrived: usize,
    generation: u64,
}

impl Gate {
    fn release(&mut self) {
        self.arrived = 0;
        self.generation += 1;
    }
}

/// Set table that makes every contender read before any of them writes.
///
/// `get` reads, then blocks until all registered participants have read in
/// the current round. A participant leaves once its conditional write applies; with no
/// participants left, reads pass straight through.
pub(crate) struct LockstepSetTable {
    inner: InMemorySetTable,
    gate: Mutex<Gate>,
    released: Notify,
}

impl LockstepSetTable {
    pub(crate) fn new(participants: usize) -> Self {
        Self {
            inner: InMemorySetTable::new(),
            gate: Mutex::new(Gate {
                participants,
                ..Gate::default()
            }),
            released: Notify::new(),
        }
    }

    /// Reads without taking part in the barrier.
    pub(crate) async fn snapshot(&self, set_id: &SetId) -> Option<SetAggregate> {
        self.inner.get(set_id).await.ok().flatten()
    }

    fn generation(&self) -> u64 {
        self.gate.lock().unwrap().generation
    }

    async fn arrive(&self) {
        let generation = {
            let mut gate = self.gate.lock().unwrap();
            if gate.participants == 0 {
                return;
            }
            gate.arrived += 1;
            if gate.arrived >= gate.participants {
                gate.release();
                self.released.notify_waiters();
                return;
            }
            gate.generation
        };

        loop {
            let notified = self.released.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();
            if self.generation() != generation {
                return;
            }
            notified.await;
        }
    }

    fn depart(&self) {
        let mut gate = self.gate.lock().unwrap();
        gate.participants = gate.participants.saturating_sub(1);
        if gate.participants > 0 && gate.arrived >= gate.participants {
            gate.release();
            self.released.notify_waiters();
        }
    }
}

#[async_trait]
impl SetTable for LockstepSetTable {
    async fn insert_if_absent(&self, aggregate: SetAggregate) -> Result<InsertOutcome, TallyError> {
        self.inner.insert_if_absent(aggregate).await
    }

    async fn get(&self, set_id: &SetId) -> Result<Option<SetAggregate>, TallyError> {
        // read first so every contender in a round sees the same value
        let current = self.inner.get(set_id).await;
        self.arrive().await;
        current
    }

    async fn add_if_unchanged(
        &self,
        set_id: &SetId,
        field: CounterField,
        expected: CounterValues,
        amount: u64,
        updated_at: DateTime<Utc>,
    ) -> Result<ConditionalWrite, TallyError> {
        let write = self
            .inner
            .add_if_unchanged(set_id, field, expected, amount, updated_at)
            .await?;
        if matches!(write, ConditionalWrite::Applied(_)) {
            self.depart();
        }
        Ok(write)
    }
}

/// Task table whose first `readers` reads all return before any of them
/// proceeds. Later reads pass straight through.
pub(crate) struct BarrierTaskTable {
    inner: InMemoryTaskTable,
    barrier: Barrier,
    remaining: AtomicUsize,
}

impl BarrierTaskTable {
    pub(crate) fn new(readers: usize) -> Self {
        Self {
            inner: InMemoryTaskTable::new(),
            barrier: Barrier::new(readers),
            remaining: AtomicUsize::new(readers),
        }
    }
}

#[async_trait]
impl TaskTable for BarrierTaskTable {
    async fn insert_if_absent(&self, record: TaskRecord) -> Result<InsertOutcome, TallyError> {
        self.inner.insert_if_absent(record).await
    }

    async fn get(&self, task_id: &TaskId) -> Result<Option<TaskRecord>, TallyError> {
        let current = self.inner.get(task_id).await;
        let gated = self
            .remaining
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if gated {
            self.barrier.wait().await;
        }
        current
    }

    async fn put_if_status(
        &self,
        record: TaskRecord,
        expected: TaskStatus,
    ) -> Result<StatusWrite, TallyError> {
        self.inner.put_if_status(record, expected).await
    }
}
