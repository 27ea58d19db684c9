//! finsync-core
//!
//! Scheduled fan-out ingestion of seller financial events.
//!
//! # モジュール構成
//! - **domain**: ドメインモデル（ids, seller, task, shipment, events, errors）
//! - **ports**: 抽象化レイヤー（CredentialStore, TaskStore, ShipmentEventStore, EventBus, WorkQueue, など）
//! - **app**: アプリケーションロジック（dispatcher, worker, worker_pool, scheduler, builder, status）
//! - **impls**: 実装（InMemoryTaskStore など開発用）
//! - **config**: 実行時設定（TOML）

pub mod app;
pub mod config;
pub mod domain;
pub mod impls;
pub mod ports;

pub use self::app::{App, AppBuilder, BuildError};
pub use self::config::{ConfigError, FinsyncConfig};
pub use self::domain::{ErrorKind, FinsyncError};
