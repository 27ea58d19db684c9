//! App - アプリケーション層
//!
//! このモジュールは、ports を組み合わせてアプリケーションロジックを実装します。
//!
//! # 主要コンポーネント
//! - **AppBuilder / App**: 構築とワイヤリング、drain モード
//! - **Dispatcher**: seller の列挙と Task の配布（1 cycle）
//! - **Worker**: 1 seller 分の取り込み
//! - **WorkerPool**: WorkQueue を読む常駐 worker 群
//! - **Scheduler**: 一定間隔で Dispatcher を起動
//! - **Status**: 状態別件数と queue の深さ

pub mod builder;
pub mod dispatcher;
pub mod scheduler;
pub mod status;
pub mod worker;
pub mod worker_pool;

// 主要な型を再エクスポート
pub use self::builder::{App, AppBuilder, BuildError, DrainReport};
pub use self::dispatcher::{CycleReport, Dispatcher};
pub use self::scheduler::Scheduler;
pub use self::status::StatusView;
pub use self::worker::{RunOutcome, TaskRunReport, Worker};
pub use self::worker_pool::WorkerPool;
