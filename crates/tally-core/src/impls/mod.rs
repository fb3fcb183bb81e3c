//! Impls - ports の実装（開発用・テスト用）
//!
//! # 含まれる実装
//! - **InMemorySetTable**: 条件付き加算つきのセット集計テーブル
//! - **InMemoryTaskTable**: タスクテーブル
//! - **InMemoryWorkQueue**: グループ付き FIFO 配送キュー
//! - **InMemoryObjectStore**: copy / delete だけのオブジェクトストア
//! - **RecordingNotifier**: 通知を記録するだけのチャネル
//!
//! 本番用の実装（DynamoDB, SQS, S3, SNS など）は別クレートに置きます。

pub mod inmem_object_store;
pub mod inmem_set_table;
pub mod inmem_task_table;
pub mod inmem_work_queue;
pub mod recording_notifier;

pub use self::inmem_object_store::InMemoryObjectStore;
pub use self::inmem_set_table::InMemorySetTable;
pub use self::inmem_task_table::InMemoryTaskTable;
pub use self::inmem_work_queue::InMemoryWorkQueue;
pub use self::recording_notifier::RecordingNotifier;
