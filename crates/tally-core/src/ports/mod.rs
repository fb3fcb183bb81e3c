//! Ports - 抽象化レイヤー
//!
//! Hexagonal Architecture の「ポート」を定義します。
//! 2 つのテーブルと、外部コラボレーター（合成サービス、配送キュー、
//! オブジェクトストア、通知チャネル）、そして時刻と ID 生成。
//!
//! # 設計原則
//! - コンポーネントはすべてステートレス。共有状態はテーブルにしか無い
//! - 共有される可変状態は SetTable のレコードだけ

pub mod clock;
pub mod dispatch;
pub mod id_generator;
pub mod notification;
pub mod object_store;
pub mod set_table;
pub mod task_table;
pub mod work_queue;

pub use self::clock::{Clock, FixedClock, SystemClock};
pub use self::dispatch::{DispatchError, DispatchReceipt, SynthesisDispatcher};
pub use self::id_generator::{IdGenerator, UlidGenerator};
pub use self::notification::NotificationChannel;
pub use self::object_store::{ObjectStore, ObjectStoreError};
pub use self::set_table::{ConditionalWrite, CounterValues, SetTable};
pub use self::task_table::{StatusWrite, TaskTable};
pub use self::work_queue::{QueueError, WorkQueue};

/// Outcome of an idempotent create.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InsertOutcome {
    Inserted,
    AlreadyPresent,
}
