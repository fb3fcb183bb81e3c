//! Errors - エラー型と運用分類
//!
//! `TallyError` は呼び出し側がポリシーを選べるように種類ごとに分かれています。
//! - NotFound / AlreadyExists: 上流のロジック不整合。必ず呼び出し元へ返す
//! - CounterRaceExhausted: ローカルで回復（ログ + 運用カウンタ）
//! - DispatchRejected: 失敗タスクとして記録し、集計に反映
//! - Relocation: その通知は失敗扱い（成果物の配置前に加算しない）

use std::fmt;

use thiserror::Error;

use super::ids::{SetId, TaskId};
use super::set::CounterField;
use super::task::TaskStatus;

/// ErrorKind は実行エラーの運用上の分類
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// 一時的なエラー（再実行で解消しうる）
    Transient,
    /// 恒久的なエラー（再実行しても無意味）
    Permanent,
    /// インフラ障害（テーブル、オブジェクトストア、通知チャネル）
    Infrastructure,
}

/// Which table a missing or duplicated record belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordKind {
    Set,
    Task,
}

impl fmt::Display for RecordKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RecordKind::Set => f.write_str("set"),
            RecordKind::Task => f.write_str("task"),
        }
    }
}

#[derive(Debug, Error)]
pub enum TallyError {
    #[error("{kind} {id} not found")]
    NotFound { kind: RecordKind, id: String },

    #[error("{kind} {id} already exists")]
    AlreadyExists { kind: RecordKind, id: String },

    #[error("gave up incrementing {field} for set {set_id} after {attempts} attempts")]
    CounterRaceExhausted {
        set_id: SetId,
        field: CounterField,
        attempts: u32,
    },

    #[error("incrementing {field} by {amount} would exceed {total_items} items in set {set_id}")]
    CounterOverflow {
        set_id: SetId,
        field: CounterField,
        amount: u64,
        total_items: u64,
    },

    #[error("dispatch rejected: {0}")]
    DispatchRejected(String),

    #[error("failed to relocate {source_key} to {target_key}: {reason}")]
    Relocation {
        source_key: String,
        target_key: String,
        reason: String,
    },

    #[error("task {task_id} is already {status}; terminal records are immutable")]
    TerminalTask { task_id: TaskId, status: TaskStatus },

    #[error("invalid outcome notification: {0}")]
    InvalidNotification(String),

    #[error("failed to publish notification: {0}")]
    Notification(String),

    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("storage error: {0}")]
    Store(String),
}

impl TallyError {
    pub fn set_not_found(set_id: &SetId) -> Self {
        Self::NotFound {
            kind: RecordKind::Set,
            id: set_id.to_string(),
        }
    }

    pub fn task_not_found(task_id: &TaskId) -> Self {
        Self::NotFound {
            kind: RecordKind::Task,
            id: task_id.to_string(),
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            TallyError::CounterRaceExhausted { .. } => ErrorKind::Transient,
            TallyError::Relocation { .. }
            | TallyError::Notification(_)
            | TallyError::Store(_) => ErrorKind::Infrastructure,
            TallyError::NotFound { .. }
            | TallyError::AlreadyExists { .. }
            | TallyError::CounterOverflow { .. }
            | TallyError::DispatchRejected(_)
            | TallyError::TerminalTask { .. }
            | TallyError::InvalidNotification(_)
            | TallyError::Config(_) => ErrorKind::Permanent,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn race_exhaustion_is_transient_and_not_found_is_permanent() {
        let race = TallyError::CounterRaceExhausted {
            set_id: SetId::new("s-1"),
            field: CounterField::Successes,
            attempts: 10,
        };
        assert_eq!(race.kind(), ErrorKind::Transient);
        assert!(race.to_string().contains("after 10 attempts"));

        let missing = TallyError::task_not_found(&TaskId::new("t-9"));
        assert_eq!(missing.kind(), ErrorKind::Permanent);
        assert_eq!(missing.to_string(), "task t-9 not found");
    }
}
