//! SetTable port - セット集計レコードのキーバリューテーブル
//!
//! 提供するのは「読む」「無ければ作る」「値が変わっていなければ加算する」の
//! 3 つだけです。リトライや競合の扱いは app::AggregateStore 側の責務です。

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::domain::{CounterField, SetAggregate, SetId, TallyError};
use crate::ports::InsertOutcome;

/// Both counters of a set as one writer saw them.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CounterValues {
    pub success_count: u64,
    pub failure_count: u64,
}

impl From<&SetAggregate> for CounterValues {
    fn from(aggregate: &SetAggregate) -> Self {
        Self {
            success_count: aggregate.success_count,
            failure_count: aggregate.failure_count,
        }
    }
}

/// Result of a conditional counter write.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConditionalWrite {
    /// The counters still held the expected values; returns the updated record.
    Applied(SetAggregate),
    /// Another writer got there first.
    ConditionFailed { current: CounterValues },
}

/// SetTable は並行ライター間で共有される唯一の可変リソース
///
/// # 設計原則
/// - ロックは持たない（呼び出しはそれぞれ独立した短命のプロセス）
/// - 直列化は `add_if_unchanged` の条件付き書き込みだけで行う
#[async_trait]
pub trait SetTable: Send + Sync {
    async fn insert_if_absent(&self, aggregate: SetAggregate) -> Result<InsertOutcome, TallyError>;

    async fn get(&self, set_id: &SetId) -> Result<Option<SetAggregate>, TallyError>;

    /// Adds `amount` to `field` and sets `updated_at`, only if both counters
    /// still equal `expected`.
    ///
    /// # Errors
    /// - `NotFound` for a missing set.
    /// - `CounterOverflow` if the increment would pass `total_items`.
    async fn add_if_unchanged(
        &self,
        set_id: &SetId,
        field: CounterField,
        expected: CounterValues,
        amount: u64,
        updated_at: DateTime<Utc>,
    ) -> Result<ConditionalWrite, TallyError>;
}
