//! InMemorySetTable - 開発・テスト用のセット集計テーブル
//!
//! 条件付き書き込みの意味論は本番テーブルと同じ:
//! 比較と加算は同じロックの中で行い、途中の状態は外から見えない。

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::Mutex;

use crate::domain::{CounterField, SetAggregate, SetId, TallyError};
use crate::ports::{ConditionalWrite, CounterValues, InsertOutcome, SetTable};

#[derive(Debug, Default, Clone)]
pub struct InMemorySetTable {
    sets: Arc<Mutex<HashMap<SetId, SetAggregate>>>,
}

impl InMemorySetTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Overwrites a record without any precondition (fixtures only).
    pub async fn put(&self, aggregate: SetAggregate) {
        let mut sets = self.sets.lock().await;
        sets.insert(aggregate.set_id.clone(), aggregate);
    }
}

#[async_trait]
impl SetTable for InMemorySetTable {
    async fn insert_if_absent(&self, aggregate: SetAggregate) -> Result<InsertOutcome, TallyError> {
        let mut sets = self.sets.lock().await;
        if sets.contains_key(&aggregate.set_id) {
            return Ok(InsertOutcome::AlreadyPresent);
        }
        sets.insert(aggregate.set_id.clone(), aggregate);
        Ok(InsertOutcome::Inserted)
    }

    async fn get(&self, set_id: &SetId) -> Result<Option<SetAggregate>, TallyError> {
        let sets = self.sets.lock().await;
        Ok(sets.get(set_id).cloned())
    }

    async fn add_if_unchanged(
        &self,
        set_id: &SetId,
        field: CounterField,
        expected: CounterValues,
        amount: u64,
        updated_at: DateTime<Utc>,
    ) -> Result<ConditionalWrite, TallyError> {
        let mut sets = self.sets.lock().await;
        let Some(aggregate) = sets.get_mut(set_id) else {
            return Err(TallyError::set_not_found(set_id));
        };

        let current = CounterValues::from(&*aggregate);
        if current != expected {
            return Ok(ConditionalWrite::ConditionFailed { current });
        }
        aggregate.apply_increment(field, amount, updated_at)?;
        Ok(ConditionalWrite::Applied(aggregate.clone()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::SetMetadata;
    use chrono::{Duration, TimeZone};

    fn aggregate() -> SetAggregate {
        let now = Utc.with_ymd_and_hms(2024, 1, 1, 12, 0, 0).unwrap();
        SetAggregate::new(
            SetId::new("s-1"),
            4,
            SetMetadata::new("s", "s"),
            now,
            now + Duration::days(30),
        )
    }

    #[tokio::test]
    async fn insert_is_idempotent() {
        let table = InMemorySetTable::new();
        assert_eq!(
            table.insert_if_absent(aggregate()).await.unwrap(),
            InsertOutcome::Inserted
        );
        assert_eq!(
            table.insert_if_absent(aggregate()).await.unwrap(),
            InsertOutcome::AlreadyPresent
        );
    }

    fn counters(success_count: u64, failure_count: u64) -> CounterValues {
        CounterValues {
            success_count,
            failure_count,
        }
    }

    #[tokio::test]
    async fn conditional_add_applies_only_on_expected_values() {
        let table = InMemorySetTable::new();
        table.insert_if_absent(aggregate()).await.unwrap();
        let set_id = SetId::new("s-1");
        let at = Utc.with_ymd_and_hms(2024, 1, 1, 12, 5, 0).unwrap();

        let first = table
            .add_if_unchanged(&set_id, CounterField::Failures, counters(0, 0), 1, at)
            .await
            .unwrap();
        let ConditionalWrite::Applied(updated) = first else {
            panic!("expected the first write to apply");
        };
        assert_eq!(updated.failure_count, 1);
        assert_eq!(updated.updated_at, at);

        // stale read
        let second = table
            .add_if_unchanged(&set_id, CounterField::Failures, counters(0, 0), 1, at)
            .await
            .unwrap();
        assert_eq!(
            second,
            ConditionalWrite::ConditionFailed {
                current: counters(0, 1)
            }
        );

        // a write to the other counter invalidates the read too
        let third = table
            .add_if_unchanged(&set_id, CounterField::Successes, counters(0, 0), 1, at)
            .await
            .unwrap();
        assert!(matches!(third, ConditionalWrite::ConditionFailed { .. }));

        let fourth = table
            .add_if_unchanged(&set_id, CounterField::Successes, counters(0, 1), 1, at)
            .await
            .unwrap();
        assert!(matches!(fourth, ConditionalWrite::Applied(_)));
    }

    #[tokio::test]
    async fn conditional_add_never_passes_total_items() {
        let table = InMemorySetTable::new();
        table.insert_if_absent(aggregate()).await.unwrap();
        let set_id = SetId::new("s-1");

        let err = table
            .add_if_unchanged(&set_id, CounterField::Successes, counters(0, 0), 5, Utc::now())
            .await
            .unwrap_err();
        assert!(matches!(err, TallyError::CounterOverflow { total_items: 4, .. }));

        let stored = table.get(&set_id).await.unwrap().unwrap();
        assert_eq!(stored.processed(), 0);
    }

    #[tokio::test]
    async fn conditional_add_on_missing_set_is_not_found() {
        let table = InMemorySetTable::new();
        let err = table
            .add_if_unchanged(&SetId::new("nope"), CounterField::Successes, counters(0, 0), 1, Utc::now())
            .await
            .unwrap_err();
        assert!(matches!(err, TallyError::NotFound { .. }));
    }
}
