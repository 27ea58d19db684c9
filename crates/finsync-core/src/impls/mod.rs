//! Impls - ports の実装（開発用・テスト用）
//!
//! # 含まれる実装
//! - **InMemoryTaskStore**: Task 台帳（CAS 付き）
//! - **InMemoryShipmentStore**: 財務イベントの冪等ストア
//! - **InMemoryWorkQueue**: Dispatcher → Worker の配送キュー
//! - **InMemoryCredentialStore**: seller credential の一覧（ページング付き）
//! - **StaticRoleAssumer**: 拒否リスト付きの role 引き受け
//! - **ScriptedFinancialApi**: 障害注入できる upstream
//! - **RecordingEventBus**: publish を記録する bus
//! - **Unlimited / MinIntervalLimiter**: 呼び出しレート制御
//!
//! # 本番用実装
//! DynamoDB / EventBridge / STS / Lambda invoke 向けの実装はこのクレートの
//! 対象外です。ports の trait を実装すれば差し替えられます。

pub mod inmem_credentials;
pub mod inmem_shipment_store;
pub mod inmem_task_store;
pub mod inmem_work_queue;
pub mod limiters;
pub mod recording_bus;
pub mod scripted_upstream;
pub mod static_roles;

// 主要な型を再エクスポート
pub use self::inmem_credentials::InMemoryCredentialStore;
pub use self::inmem_shipment_store::InMemoryShipmentStore;
pub use self::inmem_task_store::InMemoryTaskStore;
pub use self::inmem_work_queue::InMemoryWorkQueue;
pub use self::limiters::{MinIntervalLimiter, Unlimited};
pub use self::recording_bus::RecordingEventBus;
pub use self::scripted_upstream::{Fault, FaultKind, ScriptedFinancialApi};
pub use self::static_roles::StaticRoleAssumer;
