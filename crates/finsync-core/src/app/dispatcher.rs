//! Dispatcher - 1 回のスケジューリング cycle
//!
//! # フロー
//! 1. CredentialStore から seller をページ単位で列挙
//! 2. seller ごとに TaskStore::create_pending()（active な Task があれば Conflict → スキップ）
//! 3. 作れたら InvocationLimiter を通して WorkQueue に push（待たない）
//!
//! # 設計
//! - 予算（dispatch budget）は seller と seller の間でだけ確認する。途中の seller は切らない
//! - seller 単位の失敗はログに残してスキップ。cycle 全体は止めない
//! - push に失敗した Pending 行は Failed にして、次の cycle で再び拾えるようにする
//! - Conflict の相手が stale（worker が落ちた等）なら Failed にして回収する

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::time::Instant;
use tracing::Instrument;

use crate::domain::{CycleId, ErrorKind, SellerCredential, SellerRef};
use crate::ports::{
    Clock, CredentialStore, IdGenerator, InvocationLimiter, TaskStore, WorkItem, WorkQueue,
};

/// What one cycle did.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CycleReport {
    pub cycle_id: CycleId,
    /// Credential entries looked at.
    pub enumerated: usize,
    /// Pending rows created and pushed.
    pub dispatched: usize,
    /// An active task already existed.
    pub skipped_active: usize,
    /// Entry unusable (blank identity, no role).
    pub skipped_invalid: usize,
    /// Stale active rows marked Failed this cycle.
    pub reaped_stale: usize,
    /// Store or queue failures.
    pub failed: usize,
    /// The budget ran out before every seller was seen.
    pub truncated: bool,
    /// Listing the credential store failed; the rest of the list was not seen.
    pub listing_failed: bool,
}

impl CycleReport {
    fn new(cycle_id: CycleId) -> Self {
        Self {
            cycle_id,
            enumerated: 0,
            dispatched: 0,
            skipped_active: 0,
            skipped_invalid: 0,
            reaped_stale: 0,
            failed: 0,
            truncated: false,
            listing_failed: false,
        }
    }
}

pub struct Dispatcher {
    credentials: Arc<dyn CredentialStore>,
    tasks: Arc<dyn TaskStore>,
    queue: Arc<dyn WorkQueue>,
    limiter: Arc<dyn InvocationLimiter>,
    clock: Arc<dyn Clock>,
    ids: Arc<dyn IdGenerator>,
    budget: Duration,
    stale_after: chrono::Duration,
    default_role: Option<String>,
}

impl Dispatcher {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        credentials: Arc<dyn CredentialStore>,
        tasks: Arc<dyn TaskStore>,
        queue: Arc<dyn WorkQueue>,
        limiter: Arc<dyn InvocationLimiter>,
        clock: Arc<dyn Clock>,
        ids: Arc<dyn IdGenerator>,
        budget: Duration,
        stale_after: chrono::Duration,
        default_role: Option<String>,
    ) -> Self {
        Self {
            credentials,
            tasks,
            queue,
            limiter,
            clock,
            ids,
            budget,
            stale_after,
            default_role,
        }
    }

    /// Run one dispatch cycle. Never fails as a whole; see the report.
    pub async fn run_cycle(&self) -> CycleReport {
        let cycle_id = self.ids.generate_cycle_id();
        let span = tracing::info_span!("run_cycle", cycle_id = %cycle_id);
        self.enumerate(cycle_id).instrument(span).await
    }

    async fn enumerate(&self, cycle_id: CycleId) -> CycleReport {
        let deadline = Instant::now() + self.budget;
        let mut report = CycleReport::new(cycle_id);
        let mut page_token: Option<String> = None;

        'pages: loop {
            let page = match self.credentials.list_sellers(page_token.as_deref()).await {
                Ok(page) => page,
                Err(e) => {
                    tracing::error!(error = %e, "seller listing failed");
                    report.listing_failed = true;
                    break;
                }
            };

            for credential in &page.sellers {
                if Instant::now() >= deadline {
                    report.truncated = true;
                    break 'pages;
                }
                report.enumerated += 1;
                self.dispatch_one(cycle_id, credential, &mut report).await;
            }

            match page.next_page_token {
                Some(token) if Instant::now() < deadline => page_token = Some(token),
                Some(_) => {
                    report.truncated = true;
                    break;
                }
                None => break,
            }
        }

        if report.truncated {
            tracing::warn!(
                enumerated = report.enumerated,
                budget_secs = self.budget.as_secs(),
                "dispatch budget spent before the seller list ended"
            );
        }
        tracing::info!(
            enumerated = report.enumerated,
            dispatched = report.dispatched,
            skipped_active = report.skipped_active,
            skipped_invalid = report.skipped_invalid,
            reaped_stale = report.reaped_stale,
            failed = report.failed,
            "cycle finished"
        );
        report
    }

    async fn dispatch_one(
        &self,
        cycle_id: CycleId,
        credential: &SellerCredential,
        report: &mut CycleReport,
    ) {
        let seller = credential.seller();
        if let Some(defect) = credential.defect(self.default_role.as_deref()) {
            tracing::warn!(
                seller_key = %seller.seller_key,
                seller_id = %seller.seller_id,
                defect,
                "skipping invalid credential entry"
            );
            report.skipped_invalid += 1;
            return;
        }

        let now = self.clock.now();
        let task_id = self.ids.generate_task_id();
        let row = match self.tasks.create_pending(&seller, task_id, cycle_id, now).await {
            Ok(row) => row,
            Err(e) if e.is_conflict() => {
                tracing::debug!(
                    seller_key = %seller.seller_key,
                    seller_id = %seller.seller_id,
                    "active task exists; skipping"
                );
                report.skipped_active += 1;
                if self.reap_if_stale(&seller, now).await {
                    report.reaped_stale += 1;
                }
                return;
            }
            Err(e) => {
                tracing::error!(
                    seller_key = %seller.seller_key,
                    seller_id = %seller.seller_id,
                    error = %e,
                    "failed to create task"
                );
                report.failed += 1;
                return;
            }
        };

        self.limiter.acquire().await;
        let item = WorkItem {
            task_id: row.task_id,
            seller: seller.clone(),
        };
        match self.queue.push(item).await {
            Ok(()) => {
                tracing::debug!(
                    seller_key = %seller.seller_key,
                    seller_id = %seller.seller_id,
                    task_id = %row.task_id,
                    cursor = ?row.last_cursor,
                    "task dispatched"
                );
                report.dispatched += 1;
            }
            Err(e) => {
                tracing::error!(
                    seller_key = %seller.seller_key,
                    seller_id = %seller.seller_id,
                    task_id = %row.task_id,
                    error = %e,
                    "failed to hand task to a worker"
                );
                report.failed += 1;
                let failed = row.fail(
                    ErrorKind::Infrastructure,
                    format!("dispatch failed: {e}"),
                    self.clock.now(),
                );
                if let Err(e) = self.tasks.compare_and_swap(row.version, failed).await {
                    tracing::warn!(task_id = %row.task_id, error = %e, "could not close undispatched task");
                }
            }
        }
    }

    /// Mark the seller's active row Failed if nothing has touched it for
    /// longer than the stale threshold.
    async fn reap_if_stale(&self, seller: &SellerRef, now: DateTime<Utc>) -> bool {
        let current = match self.tasks.get(seller).await {
            Ok(Some(row)) => row,
            Ok(None) => return false,
            Err(e) => {
                tracing::warn!(seller_id = %seller.seller_id, error = %e, "stale check failed");
                return false;
            }
        };
        if !current.is_stale(now, self.stale_after) {
            return false;
        }

        let reaped = current.fail(ErrorKind::Infrastructure, "abandoned", now);
        match self.tasks.compare_and_swap(current.version, reaped).await {
            Ok(_) => {
                tracing::warn!(
                    seller_key = %seller.seller_key,
                    seller_id = %seller.seller_id,
                    task_id = %current.task_id,
                    status = %current.status,
                    since = %current.updated_at,
                    "reaped stale task"
                );
                true
            }
            Err(e) => {
                // worker が先に書いた
                tracing::debug!(task_id = %current.task_id, error = %e, "stale task moved on");
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{SecretMaterial, SellerId, SellerKey, TaskRecord, TaskStatus};
    use crate::impls::{InMemoryCredentialStore, InMemoryTaskStore, InMemoryWorkQueue, Unlimited};
    use crate::ports::{FixedClock, UlidGenerator};
    use chrono::TimeZone;

    fn credential(key: &str, id: &str) -> SellerCredential {
        SellerCredential {
            seller_key: SellerKey::new(key),
            seller_id: SellerId::new(id),
            material: SecretMaterial::new("refresh"),
            role_arn: format!("arn:aws:iam::1:role/{id}"),
        }
    }

    struct Fixture {
        dispatcher: Dispatcher,
        tasks: InMemoryTaskStore,
        queue: InMemoryWorkQueue,
        clock: Arc<FixedClock>,
    }

    fn fixture(sellers: Vec<SellerCredential>, page_size: usize, budget: Duration) -> Fixture {
        let tasks = InMemoryTaskStore::new();
        let queue = InMemoryWorkQueue::new();
        let clock = Arc::new(FixedClock::new(
            Utc.with_ymd_and_hms(2024, 5, 1, 0, 0, 0).unwrap(),
        ));
        let dispatcher = Dispatcher::new(
            Arc::new(InMemoryCredentialStore::new(sellers, page_size)),
            Arc::new(tasks.clone()),
            Arc::new(queue.clone()),
            Arc::new(Unlimited),
            clock.clone(),
            Arc::new(UlidGenerator::new(clock.clone())),
            budget,
            chrono::Duration::seconds(1200),
            None,
        );
        Fixture {
            dispatcher,
            tasks,
            queue,
            clock,
        }
    }

    #[tokio::test]
    async fn dispatches_every_seller_across_pages() {
        let sellers = (0..5).map(|i| credential("tenant", &format!("S{i}"))).collect();
        let fx = fixture(sellers, 2, Duration::from_secs(100));

        let report = fx.dispatcher.run_cycle().await;

        assert_eq!(report.enumerated, 5);
        assert_eq!(report.dispatched, 5);
        assert!(!report.truncated);
        assert_eq!(fx.queue.len().await, 5);
        assert_eq!(fx.tasks.counts_by_status().await.unwrap().pending, 5);
    }

    #[tokio::test]
    async fn second_cycle_skips_active_sellers() {
        let fx = fixture(vec![credential("tenant", "S1")], 10, Duration::from_secs(100));

        fx.dispatcher.run_cycle().await;
        let report = fx.dispatcher.run_cycle().await;

        assert_eq!(report.dispatched, 0);
        assert_eq!(report.skipped_active, 1);
        assert_eq!(report.reaped_stale, 0);
        assert_eq!(fx.queue.len().await, 1);
    }

    #[tokio::test]
    async fn invalid_entries_are_skipped_without_stopping_the_cycle() {
        let mut no_role = credential("tenant", "S2");
        no_role.role_arn.clear();
        let sellers = vec![
            credential("", "S0"),
            credential("tenant", "S1"),
            no_role,
            credential("tenant", " "),
        ];
        let fx = fixture(sellers, 10, Duration::from_secs(100));

        let report = fx.dispatcher.run_cycle().await;

        assert_eq!(report.enumerated, 4);
        assert_eq!(report.skipped_invalid, 3);
        assert_eq!(report.dispatched, 1);
    }

    #[tokio::test]
    async fn push_failure_closes_the_pending_row() {
        let fx = fixture(vec![credential("tenant", "S1")], 10, Duration::from_secs(100));
        fx.queue.close().await;

        let report = fx.dispatcher.run_cycle().await;

        assert_eq!(report.failed, 1);
        assert_eq!(report.dispatched, 0);
        let row = fx.tasks.get(&SellerRef::new("tenant", "S1")).await.unwrap().unwrap();
        assert_eq!(row.status, TaskStatus::Failed);
        assert_eq!(row.last_error.unwrap().kind, ErrorKind::Infrastructure);
    }

    #[tokio::test]
    async fn stale_active_row_is_reaped_then_redispatched() {
        let fx = fixture(vec![credential("tenant", "S1")], 10, Duration::from_secs(100));
        let seller = SellerRef::new("tenant", "S1");
        let stuck = TaskRecord::pending(
            fx.dispatcher.ids.generate_task_id(),
            fx.dispatcher.ids.generate_cycle_id(),
            seller.clone(),
            None,
            fx.clock.now(),
        )
        .start(fx.clock.now());
        fx.tasks.seed(stuck.clone()).await;

        fx.clock.advance(chrono::Duration::seconds(1201));
        let reaping = fx.dispatcher.run_cycle().await;
        assert_eq!(reaping.skipped_active, 1);
        assert_eq!(reaping.reaped_stale, 1);

        let row = fx.tasks.get(&seller).await.unwrap().unwrap();
        assert_eq!(row.task_id, stuck.task_id);
        assert_eq!(row.status, TaskStatus::Failed);

        let next = fx.dispatcher.run_cycle().await;
        assert_eq!(next.dispatched, 1);
        let row = fx.tasks.get(&seller).await.unwrap().unwrap();
        assert_ne!(row.task_id, stuck.task_id);
        assert_eq!(row.status, TaskStatus::Pending);
    }

    #[tokio::test(start_paused = true)]
    async fn zero_budget_truncates_before_first_seller() {
        let fx = fixture(vec![credential("tenant", "S1")], 10, Duration::ZERO);

        let report = fx.dispatcher.run_cycle().await;

        assert!(report.truncated);
        assert_eq!(report.enumerated, 0);
        assert_eq!(fx.queue.len().await, 0);
    }

    #[tokio::test]
    async fn default_role_makes_roleless_entries_dispatchable() {
        let mut no_role = credential("tenant", "S1");
        no_role.role_arn.clear();
        let mut fx = fixture(vec![no_role], 10, Duration::from_secs(100));
        fx.dispatcher.default_role = Some("arn:aws:iam::1:role/spapi".to_string());

        let report = fx.dispatcher.run_cycle().await;

        assert_eq!(report.skipped_invalid, 0);
        assert_eq!(report.dispatched, 1);
    }
}
