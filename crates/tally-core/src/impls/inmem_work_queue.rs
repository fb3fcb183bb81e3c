//! InMemoryWorkQueue - 開発用の配送キュー
//!
//! # 実装詳細
//! - グループごとの FIFO（BTreeMap<String, VecDeque<WorkMessage>>）
//! - dedup id で重複送信を握りつぶす（受理はするが二度は配らない）
//! - dedup の記録はセット単位で、そのセットのメッセージがキューから
//!   無くなった時点で捨てる（記録はキューの長さ以上に増えない）
//! - Mutex + Condvar による timeout 付き blocking receive（spawn_blocking 経由）

use std::collections::{BTreeMap, HashMap, HashSet, VecDeque};
use std::sync::{Arc, Condvar, Mutex};
use std::time::Duration;

use async_trait::async_trait;

use crate::domain::{SetId, WorkMessage};
use crate::ports::{QueueError, WorkQueue};

#[derive(Default)]
struct QueueState {
    /// BTreeMap keeps receive order deterministic across groups.
    groups: BTreeMap<String, VecDeque<WorkMessage>>,
    /// Dedup ids per set, kept while the set has messages queued.
    seen: HashMap<SetId, HashSet<String>>,
}

impl QueueState {
    fn pop(&mut self) -> Option<WorkMessage> {
        let message = self.groups.values_mut().find_map(VecDeque::pop_front)?;
        let drained = !self
            .groups
            .values()
            .flatten()
            .any(|queued| queued.set_id == message.set_id);
        if drained {
            self.seen.remove(&message.set_id);
        }
        Some(message)
    }
}

/// InMemoryWorkQueue は開発用の配送キュー
///
/// # 使用例
/// ```ignore
/// let queue = InMemoryWorkQueue::new();
/// queue.send(message).await?;
/// let next = queue.receive(Duration::from_secs(5)).await?;
/// ```
#[derive(Default)]
pub struct InMemoryWorkQueue {
    state: Arc<Mutex<QueueState>>,
    condvar: Arc<Condvar>,
}

impl InMemoryWorkQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Waits up to `timeout` for a message from any group.
    pub async fn receive(&self, timeout: Duration) -> Result<Option<WorkMessage>, QueueError> {
        let state = self.state.clone();
        let condvar = self.condvar.clone();
        tokio::task::spawn_blocking(move || {
            let start = std::time::Instant::now();
            let mut guard = state
                .lock()
                .map_err(|_| QueueError::OperationFailed("queue lock poisoned".to_string()))?;
            loop {
                if let Some(message) = guard.pop() {
                    return Ok(Some(message));
                }
                let elapsed = start.elapsed();
                if elapsed >= timeout {
                    return Ok(None);
                }
                let (next, _) = condvar
                    .wait_timeout(guard, timeout.saturating_sub(elapsed))
                    .map_err(|_| QueueError::OperationFailed("queue lock poisoned".to_string()))?;
                guard = next;
            }
        })
        .await
        .map_err(|e| QueueError::OperationFailed(format!("receive failed: {e}")))?
    }

    pub fn pending(&self) -> usize {
        self.state
            .lock()
            .map(|s| s.groups.values().map(VecDeque::len).sum())
            .unwrap_or(0)
    }
}

#[async_trait]
impl WorkQueue for InMemoryWorkQueue {
    async fn send(&self, message: WorkMessage) -> Result<(), QueueError> {
        let state = self.state.clone();
        let condvar = self.condvar.clone();
        tokio::task::spawn_blocking(move || {
            let mut guard = state
                .lock()
                .map_err(|_| QueueError::OperationFailed("queue lock poisoned".to_string()))?;
            let fresh = guard
                .seen
                .entry(message.set_id.clone())
                .or_default()
                .insert(message.dedup_id.clone());
            if !fresh {
                return Ok(());
            }
            guard
                .groups
                .entry(message.group.clone())
                .or_default()
                .push_back(message);
            condvar.notify_one();
            Ok(())
        })
        .await
        .map_err(|e| QueueError::OperationFailed(format!("send failed: {e}")))?
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::WorkItem;
    use tokio::time::Instant;

    fn message(group: &str, key: &str) -> WorkMessage {
        WorkMessage {
            set_id: SetId::new("s-1"),
            group: group.to_string(),
            dedup_id: key.to_string(),
            item: WorkItem::new("text", key),
        }
    }

    #[tokio::test]
    async fn groups_are_fifo() {
        let queue = InMemoryWorkQueue::new();
        queue.send(message("neural", "a")).await.unwrap();
        queue.send(message("neural", "b")).await.unwrap();

        let first = queue.receive(Duration::from_secs(1)).await.unwrap().unwrap();
        let second = queue.receive(Duration::from_secs(1)).await.unwrap().unwrap();
        assert_eq!(first.dedup_id, "a");
        assert_eq!(second.dedup_id, "b");
    }

    #[tokio::test]
    async fn duplicate_sends_are_delivered_once() {
        let queue = InMemoryWorkQueue::new();
        queue.send(message("standard-0", "a")).await.unwrap();
        queue.send(message("standard-1", "a")).await.unwrap();
        assert_eq!(queue.pending(), 1);
    }

    #[tokio::test]
    async fn dedup_ids_are_forgotten_once_a_set_drains() {
        let queue = InMemoryWorkQueue::new();
        queue.send(message("neural", "a")).await.unwrap();
        queue.send(message("neural", "b")).await.unwrap();

        queue.receive(Duration::from_secs(1)).await.unwrap().unwrap();
        // "b" is still queued, so "a" is still a duplicate
        queue.send(message("neural", "a")).await.unwrap();
        assert_eq!(queue.pending(), 1);

        queue.receive(Duration::from_secs(1)).await.unwrap().unwrap();
        assert!(queue.state.lock().unwrap().seen.is_empty());

        queue.send(message("neural", "a")).await.unwrap();
        assert_eq!(queue.pending(), 1);
    }

    #[tokio::test]
    async fn receive_times_out_when_empty() {
        let queue = InMemoryWorkQueue::new();
        let start = Instant::now();
        let got = queue.receive(Duration::from_millis(200)).await.unwrap();
        assert!(start.elapsed() >= Duration::from_millis(200));
        assert_eq!(got, None);
    }

    #[tokio::test]
    async fn send_wakes_receive() {
        let queue = Arc::new(InMemoryWorkQueue::new());
        let waiter = tokio::spawn({
            let queue = queue.clone();
            async move { queue.receive(Duration::from_secs(5)).await.unwrap() }
        });

        tokio::time::sleep(Duration::from_millis(100)).await;
        queue.send(message("neural", "late")).await.unwrap();

        let got = waiter.await.unwrap().unwrap();
        assert_eq!(got.dedup_id, "late");
    }
}
