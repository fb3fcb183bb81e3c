//! IdGenerator port - ローカルで発番する ID の抽象化
//!
//! Task ID は通常外部サービスが払い出します。ローカル発番が必要なのは
//! セット ID と、dispatch 時に拒否された item の Task ID だけです。

use crate::domain::ids::{IdMarker, SetId, Task, TaskId, slug};
use crate::ports::Clock;
use ulid::Ulid;

pub trait IdGenerator: Send + Sync {
    /// `<slug(name)>-<ulid>`
    fn generate_set_id(&self, name: &str) -> SetId;

    /// `local-<ulid>`, used for items the dispatcher refused.
    fn generate_task_id(&self) -> TaskId;
}

/// UlidGenerator は ULID ベースの ID 生成器
///
/// Clock を使うので FixedClock を渡せば timestamp 部分が決定的になります。
pub struct UlidGenerator<C> {
    clock: C,
}

impl<C: Clock> UlidGenerator<C> {
    pub fn new(clock: C) -> Self {
        Self { clock }
    }

    fn next_ulid(&self) -> Ulid {
        let timestamp_ms = self.clock.now().timestamp_millis() as u64;
        Ulid::from_parts(timestamp_ms, rand::random())
    }
}

impl<C: Clock> IdGenerator for UlidGenerator<C> {
    fn generate_set_id(&self, name: &str) -> SetId {
        let suffix = self.next_ulid().to_string().to_lowercase();
        SetId::new(format!("{}-{}", slug(name), suffix))
    }

    fn generate_task_id(&self) -> TaskId {
        TaskId::new(format!("{}{}", Task::prefix(), self.next_ulid()))
    }
}
