//! Ports - 抽象化レイヤー
//!
//! Hexagonal Architecture の「ポート」です。各 trait は外部システム
//! （credential store, STS, upstream API, DynamoDB 相当の store, event bus,
//! invoke 経路）へのインターフェースを提供し、実装の詳細を隠蔽します。
//!
//! # 設計原則
//! - TaskStore が「この seller はいま処理中か」の唯一の判定者
//! - ShipmentEventStore は複合キーで冪等
//! - 3 つのストア（Task / Event / Bus）をまたぐトランザクションは無い。
//!   store → publish → cursor 前進 の順序で重複を「最後の checkpoint 以降」に抑える

pub mod clock;
pub mod credential_store;
pub mod event_bus;
pub mod financial_api;
pub mod id_generator;
pub mod limiter;
pub mod role_assumer;
pub mod shipment_store;
pub mod task_store;
pub mod work_queue;

// 主要な trait を再エクスポート
pub use self::clock::{Clock, FixedClock, SystemClock};
pub use self::credential_store::{CredentialError, CredentialStore, SellerPage};
pub use self::event_bus::{EventBus, EventBusError};
pub use self::financial_api::{FinancialApi, FinancialPage, UpstreamError};
pub use self::id_generator::{IdGenerator, UlidGenerator};
pub use self::limiter::InvocationLimiter;
pub use self::role_assumer::{RoleAssumer, RoleError};
pub use self::shipment_store::{ShipmentEventStore, ShipmentStoreError, UpsertOutcome};
pub use self::task_store::{TaskCounts, TaskStore, TaskStoreError};
pub use self::work_queue::{QueueError, WorkItem, WorkQueue};
