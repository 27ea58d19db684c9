//! WorkerPool - WorkQueue を読む常駐 worker 群
//!
//! - `request_shutdown()` は新しい item を取らなくなるだけで、実行中の
//!   `run_task` は止めない（Worker に外からのキャンセルは無い）
//! - queue が閉じられて空になったら各 worker は自分で抜ける

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;

use crate::app::worker::Worker;
use crate::ports::{QueueError, WorkQueue};

/// How long one pop waits before re-checking for shutdown.
const POP_TIMEOUT: Duration = Duration::from_secs(1);

/// Worker group handle.
/// - `shutdown_tx` を drop するとワーカー全体が止まる
/// - `shutdown_and_join()` で全ワーカーの終了を待てる
pub struct WorkerPool {
    shutdown_tx: watch::Sender<bool>,
    joins: Vec<JoinHandle<()>>,
}

impl WorkerPool {
    /// Spawn `n` workers.
    pub fn spawn(n: usize, queue: Arc<dyn WorkQueue>, worker: Arc<Worker>) -> Self {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        let mut joins = Vec::with_capacity(n);
        for worker_id in 0..n {
            let queue = Arc::clone(&queue);
            let worker = Arc::clone(&worker);
            let mut rx = shutdown_rx.clone();

            joins.push(tokio::spawn(async move {
                worker_loop(worker_id, queue, worker, &mut rx).await;
            }));
        }
        tracing::info!(workers = n, "worker pool started");

        Self { shutdown_tx, joins }
    }

    pub fn size(&self) -> usize {
        self.joins.len()
    }

    /// Stop taking new items. In-flight tasks run to completion.
    pub fn request_shutdown(&self) {
        // receivers may already be dropped
        let _ = self.shutdown_tx.send(true);
    }

    pub async fn shutdown_and_join(self) {
        self.request_shutdown();
        self.join().await;
    }

    /// Wait for every worker to exit on its own (queue closed and drained).
    pub async fn join(self) {
        for join in self.joins {
            if let Err(e) = join.await {
                tracing::error!(error = %e, "worker panicked");
            }
        }
        tracing::info!("worker pool stopped");
    }
}

async fn worker_loop(
    worker_id: usize,
    queue: Arc<dyn WorkQueue>,
    worker: Arc<Worker>,
    shutdown_rx: &mut watch::Receiver<bool>,
) {
    loop {
        if *shutdown_rx.borrow() {
            break;
        }

        let popped = tokio::select! {
            changed = shutdown_rx.changed() => {
                // sender dropped
                if changed.is_err() {
                    break;
                }
                continue;
            }
            popped = queue.pop(POP_TIMEOUT) => popped,
        };

        let item = match popped {
            Ok(Some(item)) => item,
            Ok(None) => continue,
            Err(QueueError::Closed) => break,
            Err(e) => {
                tracing::error!(worker_id, error = %e, "pop failed");
                tokio::time::sleep(POP_TIMEOUT).await;
                continue;
            }
        };

        tracing::debug!(worker_id, task_id = %item.task_id, seller = %item.seller, "picked up task");
        if let Err(e) = worker.run_task(&item.seller).await {
            tracing::error!(
                worker_id,
                seller_key = %item.seller.seller_key,
                seller_id = %item.seller.seller_id,
                error = %e,
                "task store failure; row left for the stale reaper"
            );
        }
    }
    tracing::debug!(worker_id, "worker stopped");
}
