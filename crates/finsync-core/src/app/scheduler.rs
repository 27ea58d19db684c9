//! Scheduler - 一定間隔で Dispatcher を起動する
//!
//! - 各 firing は独立した tokio task として走る（前の cycle の完了を待たない）
//! - 取りこぼした tick はまとめて撃たない（`MissedTickBehavior::Skip`）
//! - 停止要求後は新しい cycle を起動せず、実行中の cycle の終了だけ待つ

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::{JoinError, JoinHandle, JoinSet};
use tokio::time::MissedTickBehavior;

use crate::app::dispatcher::{CycleReport, Dispatcher};

pub struct Scheduler {
    shutdown_tx: watch::Sender<bool>,
    join: JoinHandle<u64>,
}

impl Scheduler {
    /// Fire `dispatcher.run_cycle()` every `period`, the first one
    /// immediately. Stops by itself after `max_cycles` firings if given.
    pub fn spawn(dispatcher: Arc<Dispatcher>, period: Duration, max_cycles: Option<u64>) -> Self {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let join = tokio::spawn(schedule_loop(dispatcher, period, max_cycles, shutdown_rx));
        tracing::info!(period_secs = period.as_secs(), ?max_cycles, "scheduler started");
        Self { shutdown_tx, join }
    }

    pub fn request_shutdown(&self) {
        let _ = self.shutdown_tx.send(true);
    }

    /// Wait for the scheduler to stop. Returns the number of cycles fired.
    pub async fn join(self) -> u64 {
        match self.join.await {
            Ok(fired) => fired,
            Err(e) => {
                tracing::error!(error = %e, "scheduler panicked");
                0
            }
        }
    }

    pub async fn shutdown_and_join(self) -> u64 {
        self.request_shutdown();
        self.join().await
    }
}

async fn schedule_loop(
    dispatcher: Arc<Dispatcher>,
    period: Duration,
    max_cycles: Option<u64>,
    mut shutdown_rx: watch::Receiver<bool>,
) -> u64 {
    let mut ticker = tokio::time::interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    let mut in_flight: JoinSet<CycleReport> = JoinSet::new();
    let mut fired = 0u64;

    loop {
        if *shutdown_rx.borrow() || max_cycles.is_some_and(|max| fired >= max) {
            break;
        }

        tokio::select! {
            changed = shutdown_rx.changed() => {
                if changed.is_err() {
                    break;
                }
            }
            _ = ticker.tick() => {
                fired += 1;
                let dispatcher = Arc::clone(&dispatcher);
                in_flight.spawn(async move { dispatcher.run_cycle().await });
            }
            Some(done) = in_flight.join_next() => log_cycle_end(done),
        }
    }

    while let Some(done) = in_flight.join_next().await {
        log_cycle_end(done);
    }
    tracing::info!(fired, "scheduler stopped");
    fired
}

fn log_cycle_end(done: Result<CycleReport, JoinError>) {
    match done {
        Ok(report) if report.listing_failed => {
            tracing::warn!(cycle_id = %report.cycle_id, "cycle ended early: seller listing failed");
        }
        Ok(_) => {}
        Err(e) => tracing::error!(error = %e, "dispatch cycle panicked"),
    }
}
