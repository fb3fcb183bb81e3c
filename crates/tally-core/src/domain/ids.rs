//! Domain identifiers (strongly-typed string IDs).
//!
//! Task IDs are assigned by the external synthesis service, so unlike a
//! locally-minted ULID they are opaque strings. `Id<T>` keeps the phantom-type
//! pattern so a `SetId` can never be passed where a `TaskId` is expected.

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::marker::PhantomData;

/// IdMarker は各 ID 型のマーカー trait
pub trait IdMarker: Send + Sync + 'static {
    /// Prefix used when an ID of this kind is minted locally.
    fn prefix() -> &'static str;
}

/// ジェネリック ID 型（中身は不透明な文字列）
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Id<T: IdMarker> {
    value: String,
    _marker: PhantomData<T>,
}

impl<T: IdMarker> Id<T> {
    pub fn new(value: impl Into<String>) -> Self {
        Self {
            value: value.into(),
            _marker: PhantomData,
        }
    }

    pub fn as_str(&self) -> &str {
        &self.value
    }
}

impl<T: IdMarker> fmt::Display for Id<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.value)
    }
}

impl<T: IdMarker> Serialize for Id<T> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.value)
    }
}

impl<'de, T: IdMarker> Deserialize<'de> for Id<T> {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        String::deserialize(deserializer).map(Self::new)
    }
}

/// Set のマーカー型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Set {}

impl IdMarker for Set {
    fn prefix() -> &'static str {
        ""
    }
}

/// Task のマーカー型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Task {}

impl IdMarker for Task {
    fn prefix() -> &'static str {
        "local-"
    }
}

/// Identifier of a Set (one batch, one aggregate record).
pub type SetId = Id<Set>;

/// Identifier of a Task (one asynchronous unit of synthesis work).
pub type TaskId = Id<Task>;

const MAX_SLUG_LEN: usize = 40;

/// Turns a human set name into something safe to embed in a set id.
///
/// Lowercases ASCII alphanumerics, collapses every other run into a single
/// `-`, and truncates to 40 characters.
pub fn slug(name: &str) -> String {
    let mut out = String::with_capacity(name.len().min(MAX_SLUG_LEN));
    let mut pending_dash = false;
    for c in name.chars() {
        if c.is_ascii_alphanumeric() {
            if pending_dash && !out.is_empty() {
                out.push('-');
            }
            pending_dash = false;
            out.push(c.to_ascii_lowercase());
        } else {
            pending_dash = true;
        }
        if out.len() >= MAX_SLUG_LEN {
            break;
        }
    }
    out.truncate(MAX_SLUG_LEN);
    let trimmed = out.trim_end_matches('-');
    if trimmed.is_empty() {
        "unnamed-set".to_string()
    } else {
        trimmed.to_string()
    }
}
