//! InMemoryTaskTable - 開発・テスト用のタスクテーブル

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::Mutex;

use crate::domain::{TallyError, TaskId, TaskRecord, TaskStatus};
use crate::ports::{InsertOutcome, StatusWrite, TaskTable};

#[derive(Debug, Default, Clone)]
pub struct InMemoryTaskTable {
    records: Arc<Mutex<HashMap<TaskId, TaskRecord>>>,
}

impl InMemoryTaskTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.records.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.records.lock().await.is_empty()
    }

    /// Snapshot of every record, ordered by task id.
    pub async fn all(&self) -> Vec<TaskRecord> {
        let records = self.records.lock().await;
        let mut all: Vec<TaskRecord> = records.values().cloned().collect();
        all.sort_by(|a, b| a.task_id.cmp(&b.task_id));
        all
    }
}

#[async_trait]
impl TaskTable for InMemoryTaskTable {
    async fn insert_if_absent(&self, record: TaskRecord) -> Result<InsertOutcome, TallyError> {
        let mut records = self.records.lock().await;
        if records.contains_key(&record.task_id) {
            return Ok(InsertOutcome::AlreadyPresent);
        }
        records.insert(record.task_id.clone(), record);
        Ok(InsertOutcome::Inserted)
    }

    async fn get(&self, task_id: &TaskId) -> Result<Option<TaskRecord>, TallyError> {
        Ok(self.records.lock().await.get(task_id).cloned())
    }

    async fn put_if_status(
        &self,
        record: TaskRecord,
        expected: TaskStatus,
    ) -> Result<StatusWrite, TallyError> {
        let mut records = self.records.lock().await;
        let Some(stored) = records.get_mut(&record.task_id) else {
            return Err(TallyError::task_not_found(&record.task_id));
        };

        if stored.status != expected {
            return Ok(StatusWrite::StatusChanged {
                current: stored.status,
            });
        }
        *stored = record;
        Ok(StatusWrite::Applied)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::SetId;
    use chrono::{TimeZone, Utc};

    fn submitted(id: &str) -> TaskRecord {
        let now = Utc.with_ymd_and_hms(2024, 1, 1, 12, 0, 0).unwrap();
        TaskRecord::submitted(TaskId::new(id), SetId::new("s"), "out/0.mp3", None, now, now)
    }

    #[tokio::test]
    async fn status_guarded_write_applies_once() {
        let table = InMemoryTaskTable::new();
        table.insert_if_absent(submitted("t-1")).await.unwrap();

        let mut failed = submitted("t-1");
        failed.mark_failed("voice unavailable", failed.created_at);
        let first = table
            .put_if_status(failed.clone(), TaskStatus::Submitted)
            .await
            .unwrap();
        assert_eq!(first, StatusWrite::Applied);

        // same expectation, stale by now
        let second = table
            .put_if_status(failed, TaskStatus::Submitted)
            .await
            .unwrap();
        assert_eq!(
            second,
            StatusWrite::StatusChanged {
                current: TaskStatus::Failed
            }
        );
        let stored = table.get(&TaskId::new("t-1")).await.unwrap().unwrap();
        assert_eq!(stored.status, TaskStatus::Failed);
    }

    #[tokio::test]
    async fn status_guarded_write_on_missing_record_is_not_found() {
        let table = InMemoryTaskTable::new();
        let err = table
            .put_if_status(submitted("ghost"), TaskStatus::Submitted)
            .await
            .unwrap_err();
        assert!(matches!(err, TallyError::NotFound { .. }));
    }
}
