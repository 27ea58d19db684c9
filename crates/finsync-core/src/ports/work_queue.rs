//! WorkQueue port - Dispatcher から Worker への配送キュー
//!
//! WorkQueue は「どの seller の Task を実行するか」だけを流します
//! （状態や cursor は TaskStore が正本）。
//!
//! # 設計原則
//! - Dispatcher は push したら待たない（fire-and-forget）
//! - blocking pop（timeout 付き）

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::domain::{SellerRef, TaskId};

#[derive(Debug, Error)]
pub enum QueueError {
    #[error("work queue closed")]
    Closed,

    #[error("queue operation failed: {0}")]
    OperationFailed(String),
}

/// One Worker invocation: `(sellerKey, sellerId)` plus the row it was created for.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkItem {
    pub task_id: TaskId,
    pub seller: SellerRef,
}

#[async_trait]
pub trait WorkQueue: Send + Sync {
    async fn push(&self, item: WorkItem) -> Result<(), QueueError>;

    /// Wait up to `timeout` for an item. A closed and drained queue
    /// returns `QueueError::Closed`.
    async fn pop(&self, timeout: Duration) -> Result<Option<WorkItem>, QueueError>;

    async fn len(&self) -> usize;
}
