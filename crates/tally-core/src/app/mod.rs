//! App - アプリケーション層
//!
//! このモジュールは、ports を組み合わせてアプリケーションロジックを実装します。
//!
//! # 主要コンポーネント
//! - **AggregateStore**: セット集計と条件付き加算（リトライつき）
//! - **TaskRecordStore**: タスクごとのレコード
//! - **SubmissionCoordinator**: セット作成 → キュー投入 → 外部サービスへの投入
//! - **OutcomeReconciler**: 完了通知の反映（成果物の移動 → 終端化 → 加算）
//! - **CompletionPoller**: 完了 / 停滞の判定と通知
//! - **WaiterLoop**: ローカル実行用の待機ループ
//! - **AppBuilder**: アプリケーションの構築とワイヤリング

pub mod aggregate_store;
pub mod builder;
pub mod coordinator;
pub mod poller;
pub mod reconciler;
pub mod task_store;
pub mod waiter_loop;

// 主要な型を再エクスポート
pub use self::aggregate_store::AggregateStore;
pub use self::builder::{App, AppBuilder, BuildError};
pub use self::coordinator::{DispatchResult, SubmissionCoordinator, SubmitReport};
pub use self::poller::{CompletionPoller, PollDecision, PollerSettings};
pub use self::reconciler::{BatchReport, OutcomeReconciler, Reconciliation};
pub use self::task_store::TaskRecordStore;
pub use self::waiter_loop::{WaitOutcome, WaiterLoop};
