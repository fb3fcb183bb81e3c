//! tally-core
//!
//! Completion accounting for batches of asynchronous work items.
//!
//! # モジュール構成
//! - **domain**: ドメインモデル（ids, set, task, outcome, progress, events, errors）
//! - **ports**: 抽象化レイヤー（SetTable, TaskTable, WorkQueue, ObjectStore, NotificationChannel など）
//! - **app**: アプリケーションロジック（aggregate_store, coordinator, reconciler, poller, builder）
//! - **impls**: 実装（InMemorySetTable など開発用）
//! - **config**: 環境変数からの設定
//! - **observability**: ログ初期化と運用カウンタ

pub mod app;
pub mod config;
pub mod domain;
pub mod impls;
pub mod observability;
pub mod ports;

#[cfg(test)]
pub(crate) mod testing;
