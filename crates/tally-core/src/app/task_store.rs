//! Per-task records: one row per dispatched or rejected item.

use std::sync::Arc;

use chrono::Duration;
use tracing::debug;

use crate::domain::{SetId, TallyError, TaskId, TaskRecord, TaskStatus};
use crate::ports::{Clock, InsertOutcome, StatusWrite, TaskTable};

#[derive(Clone)]
pub struct TaskRecordStore {
    table: Arc<dyn TaskTable>,
    clock: Arc<dyn Clock>,
    record_ttl: Duration,
}

impl TaskRecordStore {
    pub fn new(table: Arc<dyn TaskTable>, clock: Arc<dyn Clock>) -> Self {
        Self {
            table,
            clock,
            record_ttl: Duration::days(30),
        }
    }

    pub fn with_record_ttl(mut self, record_ttl: Duration) -> Self {
        self.record_ttl = record_ttl;
        self
    }

    /// Records a task the service accepted. A second call with the same id
    /// leaves the first record in place.
    pub async fn create_submitted(
        &self,
        task_id: TaskId,
        set_id: SetId,
        output_key: &str,
        output_uri: Option<String>,
    ) -> Result<InsertOutcome, TallyError> {
        let now = self.clock.now();
        let record = TaskRecord::submitted(
            task_id,
            set_id,
            output_key,
            output_uri,
            now,
            now + self.record_ttl,
        );
        self.insert(record).await
    }

    /// Records an item that never reached the service under a locally
    /// generated id. The record is terminal from the start.
    pub async fn create_rejected(
        &self,
        task_id: TaskId,
        set_id: SetId,
        output_key: &str,
        reason: &str,
    ) -> Result<InsertOutcome, TallyError> {
        let now = self.clock.now();
        let record = TaskRecord::rejected(task_id, set_id, output_key, reason, now, now + self.record_ttl);
        self.insert(record).await
    }

    async fn insert(&self, record: TaskRecord) -> Result<InsertOutcome, TallyError> {
        let task_id = record.task_id.clone();
        let status = record.status;
        let outcome = self.table.insert_if_absent(record).await?;
        if outcome == InsertOutcome::AlreadyPresent {
            debug!(%task_id, %status, "task already recorded");
        }
        Ok(outcome)
    }

    pub async fn get(&self, task_id: &TaskId) -> Result<TaskRecord, TallyError> {
        self.table
            .get(task_id)
            .await?
            .ok_or_else(|| TallyError::task_not_found(task_id))
    }

    /// Overwrites the record if the stored one still has status `expected`.
    /// Of two writers that read the same status, only one gets through.
    ///
    /// # Errors
    /// - `NotFound` if there is nothing to replace.
    /// - `TerminalTask` if the stored record has moved on from `expected`
    ///   (or `expected` itself is terminal).
    pub async fn replace(&self, expected: TaskStatus, record: TaskRecord) -> Result<(), TallyError> {
        if expected.is_terminal() {
            return Err(TallyError::TerminalTask {
                task_id: record.task_id,
                status: expected,
            });
        }

        let task_id = record.task_id.clone();
        match self.table.put_if_status(record, expected).await? {
            StatusWrite::Applied => Ok(()),
            StatusWrite::StatusChanged { current } => {
                debug!(%task_id, %expected, %current, "task changed under a replace");
                Err(TallyError::TerminalTask {
                    task_id,
                    status: current,
                })
            }
        }
    }
}
