//! EventBus port - ドメインイベントの配送
//!
//! 下流の consumer は重複を受け取りうる（at-least-once）。正本は store 側。

use async_trait::async_trait;
use thiserror::Error;

use crate::domain::BusMessage;

#[derive(Debug, Error)]
pub enum EventBusError {
    #[error("event rejected by bus: {0}")]
    Rejected(String),

    #[error("event bus unavailable: {0}")]
    Unavailable(String),
}

#[async_trait]
pub trait EventBus: Send + Sync {
    async fn publish(&self, message: &BusMessage) -> Result<(), EventBusError>;
}
