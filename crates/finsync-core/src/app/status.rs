//! Status - 運用向けのステータスビュー
//!
//! Task の状態別件数と queue の深さ、保存済みイベント数をまとめて返す。

use std::time::Duration;

use serde::Serialize;

use crate::app::builder::App;
use crate::domain::FinsyncError;
use crate::ports::TaskCounts;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct StatusView {
    pub tasks: TaskCounts,
    pub queue_depth: usize,
    pub stored_events: usize,
}

impl StatusView {
    /// Nothing queued and no task Pending or Running.
    pub fn is_idle(&self) -> bool {
        self.queue_depth == 0 && self.tasks.active() == 0
    }
}

impl App {
    pub async fn status(&self) -> Result<StatusView, FinsyncError> {
        Ok(StatusView {
            tasks: self.tasks.counts_by_status().await?,
            queue_depth: self.queue.len().await,
            stored_events: self.shipments.count().await?,
        })
    }

    /// Poll `status()` every `poll` until the app is idle.
    pub async fn wait_idle(&self, poll: Duration) -> Result<StatusView, FinsyncError> {
        loop {
            let status = self.status().await?;
            if status.is_idle() {
                return Ok(status);
            }
            tokio::time::sleep(poll).await;
        }
    }
}
