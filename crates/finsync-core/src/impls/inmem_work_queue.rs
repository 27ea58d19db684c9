//! InMemoryWorkQueue - 開発用の配送キュー
//!
//! - `tokio::sync::Mutex<VecDeque<WorkItem>>` で FIFO を保持
//! - `Notify` で push 時に待機中の pop を起こす
//! - `close()` 後の push はエラー、pop は残りを返し切ったら `QueueError::Closed`

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::{Mutex, Notify};

use crate::ports::{QueueError, WorkItem, WorkQueue};

#[derive(Default)]
struct QueueState {
    items: VecDeque<WorkItem>,
    closed: bool,
}

#[derive(Default, Clone)]
pub struct InMemoryWorkQueue {
    state: Arc<Mutex<QueueState>>,
    notify: Arc<Notify>,
}

impl InMemoryWorkQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Refuse further pushes and wake every waiting pop.
    pub async fn close(&self) {
        self.state.lock().await.closed = true;
        self.notify.notify_waiters();
    }
}

#[async_trait]
impl WorkQueue for InMemoryWorkQueue {
    async fn push(&self, item: WorkItem) -> Result<(), QueueError> {
        {
            let mut state = self.state.lock().await;
            if state.closed {
                return Err(QueueError::Closed);
            }
            state.items.push_back(item);
        }
        // ロックを離してから通知する
        self.notify.notify_one();
        Ok(())
    }

    async fn pop(&self, timeout: Duration) -> Result<Option<WorkItem>, QueueError> {
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            // notified() を先に作っておき、確認と待機の間の push を取りこぼさない
            let notified = self.notify.notified();
            {
                let mut state = self.state.lock().await;
                if let Some(item) = state.items.pop_front() {
                    return Ok(Some(item));
                }
                if state.closed {
                    return Err(QueueError::Closed);
                }
            }

            tokio::select! {
                _ = notified => {}
                _ = tokio::time::sleep_until(deadline) => return Ok(None),
            }
        }
    }

    async fn len(&self) -> usize {
        self.state.lock().await.items.len()
    }
}
