//! SynthesisDispatcher port - 外部の非同期合成サービスへの投入
//!
//! 投入に成功すると外部の task id が返り、結果は後で通知として届きます。
//! 通知先（topic など）は実装側の設定です。

use async_trait::async_trait;
use thiserror::Error;

use crate::domain::{SetId, TaskId, WorkItem};

/// What the service hands back when it accepts a job.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DispatchReceipt {
    pub task_id: TaskId,
    /// Provisional location the service will write to.
    pub output_uri: Option<String>,
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum DispatchError {
    #[error("validation failed: {0}")]
    Validation(String),

    #[error("quota exceeded: {0}")]
    Quota(String),

    #[error("service unavailable: {0}")]
    Unavailable(String),
}

/// Retries, if any, belong to the implementation's transport layer.
#[async_trait]
pub trait SynthesisDispatcher: Send + Sync {
    async fn start_task(
        &self,
        set_id: &SetId,
        item: &WorkItem,
    ) -> Result<DispatchReceipt, DispatchError>;
}
