//! WorkQueue port - submission と dispatch の間の配送キュー
//!
//! 配送保証はこのコアの関心外。send の成否だけを受理/拒否のシグナルとして扱います。

use async_trait::async_trait;
use thiserror::Error;

use crate::domain::WorkMessage;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum QueueError {
    #[error("queue operation failed: {0}")]
    OperationFailed(String),
}

#[async_trait]
pub trait WorkQueue: Send + Sync {
    /// Messages in the same group are delivered in order; messages with a
    /// dedup id already seen are accepted but not delivered twice.
    async fn send(&self, message: WorkMessage) -> Result<(), QueueError>;
}
