//! TaskTable port - タスクレコードのキーバリューテーブル
//!
//! 同じ通知が並行して再配送されることがあるため、終端への書き込みは
//! 「保存済みのステータスが期待どおりなら置き換える」条件付き更新で行います。

use async_trait::async_trait;

use crate::domain::{TallyError, TaskId, TaskRecord, TaskStatus};
use crate::ports::InsertOutcome;

/// Result of a status-guarded overwrite.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusWrite {
    Applied,
    /// The stored record no longer had the expected status.
    StatusChanged { current: TaskStatus },
}

#[async_trait]
pub trait TaskTable: Send + Sync {
    /// Existing records are left untouched.
    async fn insert_if_absent(&self, record: TaskRecord) -> Result<InsertOutcome, TallyError>;

    async fn get(&self, task_id: &TaskId) -> Result<Option<TaskRecord>, TallyError>;

    /// Overwrites the record only if the stored status still equals
    /// `expected`. A missing record is `NotFound`.
    async fn put_if_status(
        &self,
        record: TaskRecord,
        expected: TaskStatus,
    ) -> Result<StatusWrite, TallyError>;
}
