//! Worker - 1 seller 分の取り込み
//!
//! # フロー
//! 1. TaskStore で Pending → Running（CAS。Pending でなければ何もしない）
//! 2. CredentialStore から credential を取得し、RoleAssumer で seller 用の権限を得る
//! 3. `last_cursor` からページを読み、正規化して ShipmentEventStore に upsert
//! 4. ページ全体が永続化されてから DomainEvent を publish し、published を記録
//! 5. cursor を CAS で前進（checkpoint）
//! 6. 読み切ったら Succeeded(Exhausted)、予算切れなら Succeeded(Partial)、
//!    失敗したら最後の checkpoint のまま Failed
//!
//! # 設計
//! - リトライはしない。Failed の Task は次の cycle が拾い直す
//! - CAS に負けた（reaper に回収された等）ら黙って手を引く
//! - 予算は tokio の単調時計で測る。fetch も永続化・publish も `timeout_at` の内側

use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tokio::time::Instant;
use tracing::Instrument;

use crate::domain::{
    BusMessage, Completion, Cursor, DomainEvent, ErrorKind, FinsyncError, RawFinancialRecord,
    SellerId, SellerRef, ShipmentFinancialEvent, TaskId, TaskRecord, TaskStatus, normalize,
};
use crate::ports::{
    Clock, CredentialError, CredentialStore, EventBus, FinancialApi, RoleAssumer,
    ShipmentEventStore, TaskStore, UpsertOutcome,
};

/// How a `run_task` call ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum RunOutcome {
    /// No Pending row; nothing was done.
    NotPending,
    Succeeded(Completion),
    Failed(ErrorKind),
    /// Another writer moved the row on; this run stopped without writing.
    LostOwnership,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TaskRunReport {
    pub seller: SellerRef,
    pub task_id: Option<TaskId>,
    pub outcome: RunOutcome,
    pub pages: u32,
    /// Rows newly stored.
    pub persisted: u64,
    pub published: u64,
    /// Records whose row already existed.
    pub duplicates: u64,
    /// Records that could not be normalized and were skipped.
    pub malformed: u64,
    pub last_cursor: Option<Cursor>,
}

impl TaskRunReport {
    fn new(seller: SellerRef) -> Self {
        Self {
            seller,
            task_id: None,
            outcome: RunOutcome::NotPending,
            pages: 0,
            persisted: 0,
            published: 0,
            duplicates: 0,
            malformed: 0,
            last_cursor: None,
        }
    }
}

pub struct Worker {
    credentials: Arc<dyn CredentialStore>,
    roles: Arc<dyn RoleAssumer>,
    upstream: Arc<dyn FinancialApi>,
    tasks: Arc<dyn TaskStore>,
    shipments: Arc<dyn ShipmentEventStore>,
    bus: Arc<dyn EventBus>,
    clock: Arc<dyn Clock>,
    budget: Duration,
    event_bus_name: String,
    default_role: Option<String>,
}

impl Worker {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        credentials: Arc<dyn CredentialStore>,
        roles: Arc<dyn RoleAssumer>,
        upstream: Arc<dyn FinancialApi>,
        tasks: Arc<dyn TaskStore>,
        shipments: Arc<dyn ShipmentEventStore>,
        bus: Arc<dyn EventBus>,
        clock: Arc<dyn Clock>,
        budget: Duration,
        event_bus_name: impl Into<String>,
        default_role: Option<String>,
    ) -> Self {
        Self {
            credentials,
            roles,
            upstream,
            tasks,
            shipments,
            bus,
            clock,
            budget,
            event_bus_name: event_bus_name.into(),
            default_role,
        }
    }

    /// Run the Pending task of `seller`, if there is one.
    ///
    /// Ingestion failures close the task as Failed and still return `Ok`.
    /// `Err` means the Task Store itself could not be read or written.
    pub async fn run_task(&self, seller: &SellerRef) -> Result<TaskRunReport, FinsyncError> {
        let span = tracing::info_span!(
            "run_task",
            seller_key = %seller.seller_key,
            seller_id = %seller.seller_id,
        );
        self.run_task_inner(seller).instrument(span).await
    }

    async fn run_task_inner(&self, seller: &SellerRef) -> Result<TaskRunReport, FinsyncError> {
        let deadline = Instant::now() + self.budget;
        let mut report = TaskRunReport::new(seller.clone());

        let Some(row) = self.tasks.get(seller).await? else {
            tracing::debug!("no task row; nothing to do");
            return Ok(report);
        };
        report.task_id = Some(row.task_id);
        if row.status != TaskStatus::Pending {
            tracing::debug!(task_id = %row.task_id, status = %row.status, "task not pending; nothing to do");
            return Ok(report);
        }

        let mut row = match self
            .tasks
            .compare_and_swap(row.version, row.start(self.clock.now()))
            .await
        {
            Ok(row) => row,
            Err(e) if e.is_conflict() => {
                tracing::debug!(error = %e, "another invocation claimed the task");
                report.outcome = RunOutcome::LostOwnership;
                return Ok(report);
            }
            Err(e) => return Err(e.into()),
        };
        report.last_cursor = row.last_cursor.clone();
        tracing::info!(task_id = %row.task_id, cursor = ?row.last_cursor, "task started");

        let result = self.ingest(&mut row, deadline, &mut report).await;
        report.last_cursor = row.last_cursor.clone();

        let now = self.clock.now();
        let (next, outcome) = match result {
            Ok(completion) => (row.succeed(completion, now), RunOutcome::Succeeded(completion)),
            Err(e) if e.kind() == ErrorKind::Conflict => {
                tracing::warn!(task_id = %row.task_id, error = %e, "task row moved on; abandoning run");
                report.outcome = RunOutcome::LostOwnership;
                return Ok(report);
            }
            Err(e) => {
                let kind = e.kind();
                tracing::warn!(
                    task_id = %row.task_id,
                    cursor = ?row.last_cursor,
                    kind = ?kind,
                    error = %e,
                    "task failed"
                );
                (row.fail(kind, e.to_string(), now), RunOutcome::Failed(kind))
            }
        };

        match self.tasks.compare_and_swap(row.version, next).await {
            Ok(_) => {
                tracing::info!(
                    task_id = %row.task_id,
                    outcome = ?outcome,
                    pages = report.pages,
                    persisted = report.persisted,
                    published = report.published,
                    malformed = report.malformed,
                    cursor = ?row.last_cursor,
                    "task finished"
                );
                report.outcome = outcome;
                Ok(report)
            }
            Err(e) if e.is_conflict() => {
                tracing::warn!(task_id = %row.task_id, error = %e, "task row moved on before close");
                report.outcome = RunOutcome::LostOwnership;
                Ok(report)
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Page through the upstream from `row.last_cursor`, checkpointing after
    /// every page. `row` always holds the latest stored version.
    async fn ingest(
        &self,
        row: &mut TaskRecord,
        deadline: Instant,
        report: &mut TaskRunReport,
    ) -> Result<Completion, FinsyncError> {
        let seller = row.seller.clone();
        let credential = self.credentials.get(&seller).await?;
        let Some(role_arn) = credential.role(self.default_role.as_deref()) else {
            return Err(CredentialError::NotFound(seller.clone()).into());
        };
        let scoped = self.roles.assume(role_arn, &seller).await?;

        loop {
            let fetch = self
                .upstream
                .fetch_page(&scoped, &seller.seller_id, row.last_cursor.as_ref());
            let page = match tokio::time::timeout_at(deadline, fetch).await {
                Ok(page) => page?,
                Err(_) => {
                    tracing::info!(cursor = ?row.last_cursor, "budget spent waiting for a page");
                    return Ok(Completion::Partial);
                }
            };
            report.pages += 1;

            // 途中で打ち切っても checkpoint は前のまま。未 publish の行は次の run が拾う
            let persist = self.persist_page(&seller.seller_id, &page.records, report);
            let persisted = match tokio::time::timeout_at(deadline, persist).await {
                Ok(persisted) => persisted?,
                Err(_) => {
                    tracing::info!(cursor = ?row.last_cursor, "budget spent persisting a page");
                    return Ok(Completion::Partial);
                }
            };

            let checkpoint = row.checkpoint(page.cursor.clone(), persisted, self.clock.now());
            *row = self.tasks.compare_and_swap(row.version, checkpoint).await?;
            tracing::debug!(cursor = %page.cursor, persisted, "checkpoint");

            if !page.has_more {
                return Ok(Completion::Exhausted);
            }
            if Instant::now() >= deadline {
                tracing::info!(cursor = %page.cursor, "budget spent; more records remain");
                return Ok(Completion::Partial);
            }
        }
    }

    /// Upsert every record of one page, then publish the rows that still
    /// need it. Returns the number of newly stored rows.
    async fn persist_page(
        &self,
        seller_id: &SellerId,
        records: &[RawFinancialRecord],
        report: &mut TaskRunReport,
    ) -> Result<u64, FinsyncError> {
        let ingested_at = self.clock.now();
        let mut persisted = 0;
        let mut to_publish: Vec<ShipmentFinancialEvent> = Vec::new();

        for raw in records {
            let event = match normalize(raw, seller_id, ingested_at) {
                Ok(event) => event,
                Err(e) => {
                    tracing::warn!(
                        amazon_order_id = %raw.amazon_order_id,
                        error = %e,
                        "skipping malformed record"
                    );
                    report.malformed += 1;
                    continue;
                }
            };

            let key = event.key.clone();
            let outcome = self.shipments.upsert(event.clone()).await?;
            match outcome {
                UpsertOutcome::Inserted => persisted += 1,
                UpsertOutcome::AlreadyStored { diverged, .. } => {
                    report.duplicates += 1;
                    if diverged {
                        tracing::warn!(
                            amazon_order_id = %key.amazon_order_id,
                            "re-delivered record differs from the stored row; keeping the stored row"
                        );
                    }
                }
            }
            // 同じページ内の重複は 1 回だけ publish する
            if !outcome.needs_publish() || to_publish.iter().any(|queued| queued.key == key) {
                continue;
            }
            // 既存行の再送では store 側の行が正
            let row = match outcome {
                UpsertOutcome::Inserted => event,
                UpsertOutcome::AlreadyStored { .. } => {
                    self.shipments.get(&key).await?.unwrap_or(event)
                }
            };
            to_publish.push(row);
        }
        report.persisted += persisted;

        for row in &to_publish {
            let message = BusMessage::new(&self.event_bus_name, DomainEvent::ingested(row));
            self.bus.publish(&message).await?;
            self.shipments.mark_published(&row.key, self.clock.now()).await?;
            report.published += 1;
        }
        Ok(persisted)
    }
}
