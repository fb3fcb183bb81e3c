//! Set aggregate: the per-batch rollup that completion is detected from.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::errors::TallyError;
use super::ids::SetId;

/// The two counters a set exposes. Each is mutated only by a conditional
/// increment that expects both counters unchanged.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CounterField {
    Successes,
    Failures,
}

impl fmt::Display for CounterField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CounterField::Successes => f.write_str("successes"),
            CounterField::Failures => f.write_str("failures"),
        }
    }
}

/// Immutable, human-facing description of a set.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SetMetadata {
    pub display_name: String,
    #[serde(default)]
    pub description: String,
    /// Key prefix under the work bucket where the set's files end up.
    pub output_location: String,
}

impl SetMetadata {
    pub fn new(display_name: impl Into<String>, output_location: impl Into<String>) -> Self {
        Self {
            display_name: display_name.into(),
            description: String::new(),
            output_location: output_location.into(),
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }
}

/// One aggregate record per set.
///
/// Invariant: `success_count + failure_count <= total_items`; equality means
/// the set is complete.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SetAggregate {
    pub set_id: SetId,
    #[serde(flatten)]
    pub metadata: SetMetadata,
    pub total_items: u64,
    pub success_count: u64,
    pub failure_count: u64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl SetAggregate {
    pub fn new(
        set_id: SetId,
        total_items: u64,
        metadata: SetMetadata,
        now: DateTime<Utc>,
        expires_at: DateTime<Utc>,
    ) -> Self {
        Self {
            set_id,
            metadata,
            total_items,
            success_count: 0,
            failure_count: 0,
            created_at: now,
            updated_at: now,
            expires_at,
        }
    }

    pub fn counter(&self, field: CounterField) -> u64 {
        match field {
            CounterField::Successes => self.success_count,
            CounterField::Failures => self.failure_count,
        }
    }

    /// Items with a recorded outcome, successful or not.
    pub fn processed(&self) -> u64 {
        self.success_count.saturating_add(self.failure_count)
    }

    pub fn remaining(&self) -> u64 {
        self.total_items.saturating_sub(self.processed())
    }

    /// # Errors
    /// `CounterOverflow` if adding `amount` would record more outcomes than
    /// `total_items`.
    pub fn check_increment(&self, field: CounterField, amount: u64) -> Result<(), TallyError> {
        let within_total = self
            .processed()
            .checked_add(amount)
            .is_some_and(|after| after <= self.total_items);
        if within_total {
            Ok(())
        } else {
            Err(TallyError::CounterOverflow {
                set_id: self.set_id.clone(),
                field,
                amount,
                total_items: self.total_items,
            })
        }
    }

    /// Applies an increment in place; a refused increment leaves the record
    /// unchanged.
    ///
    /// # Errors
    /// See [`SetAggregate::check_increment`].
    pub fn apply_increment(
        &mut self,
        field: CounterField,
        amount: u64,
        at: DateTime<Utc>,
    ) -> Result<(), TallyError> {
        self.check_increment(field, amount)?;
        // bounded by total_items after the check
        match field {
            CounterField::Successes => self.success_count += amount,
            CounterField::Failures => self.failure_count += amount,
        }
        self.updated_at = at;
        Ok(())
    }
}
