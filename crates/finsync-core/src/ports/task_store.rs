//! TaskStore port - seller ごとの冪等性・進捗台帳（source of truth）
//!
//! TaskStore は以下を管理します：
//! - seller ごとの現在の Task 行（(sellerKey, sellerId) がキー）
//! - 置き換えられた過去の行（監査・再開用の履歴。削除しない）
//!
//! # 設計原則
//! - 「active な Task は seller ごとに高々 1 つ」はここで保証する
//! - すべての更新は期待する version を条件にした compare-and-swap
//! - プロセス内ロックではなく store の条件付き書き込みで排他する
//!   （Dispatcher は複数プロセスで同時に動きうる）

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::domain::{CycleId, ErrorKind, SellerRef, TaskId, TaskRecord, TaskStatus};

#[derive(Debug, Error)]
pub enum TaskStoreError {
    /// Conditional write lost: an active row exists, or the row moved on.
    #[error("conflict on task for {seller}: {reason}")]
    Conflict { seller: SellerRef, reason: String },

    #[error("no task row for {0}")]
    NotFound(SellerRef),

    #[error("task store unavailable: {0}")]
    Unavailable(String),
}

impl TaskStoreError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            TaskStoreError::Conflict { .. } => ErrorKind::Conflict,
            TaskStoreError::NotFound(_) => ErrorKind::NotFound,
            TaskStoreError::Unavailable(_) => ErrorKind::Infrastructure,
        }
    }

    pub fn is_conflict(&self) -> bool {
        matches!(self, TaskStoreError::Conflict { .. })
    }
}

/// Current rows by status.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskCounts {
    pub pending: usize,
    pub running: usize,
    pub succeeded: usize,
    pub failed: usize,
}

impl TaskCounts {
    pub fn record(&mut self, status: TaskStatus) {
        match status {
            TaskStatus::Pending => self.pending += 1,
            TaskStatus::Running => self.running += 1,
            TaskStatus::Succeeded => self.succeeded += 1,
            TaskStatus::Failed => self.failed += 1,
        }
    }

    pub fn active(&self) -> usize {
        self.pending + self.running
    }

    pub fn total(&self) -> usize {
        self.pending + self.running + self.succeeded + self.failed
    }
}

#[async_trait]
pub trait TaskStore: Send + Sync {
    /// Conditionally create a Pending row for `seller`.
    ///
    /// Fails with `Conflict` if the current row is active. A terminal current
    /// row is superseded (moved to history) and its cursor carried over.
    async fn create_pending(
        &self,
        seller: &SellerRef,
        task_id: TaskId,
        cycle_id: CycleId,
        now: DateTime<Utc>,
    ) -> Result<TaskRecord, TaskStoreError>;

    async fn get(&self, seller: &SellerRef) -> Result<Option<TaskRecord>, TaskStoreError>;

    /// Replace the current row with `next` if the current row has the same
    /// `task_id` and `expected_version`. Returns the stored row with its
    /// version bumped.
    async fn compare_and_swap(
        &self,
        expected_version: u64,
        next: TaskRecord,
    ) -> Result<TaskRecord, TaskStoreError>;

    /// Superseded rows, oldest first (current row excluded).
    async fn history(&self, seller: &SellerRef) -> Result<Vec<TaskRecord>, TaskStoreError>;

    async fn counts_by_status(&self) -> Result<TaskCounts, TaskStoreError>;
}
