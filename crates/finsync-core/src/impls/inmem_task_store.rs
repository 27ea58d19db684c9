//! InMemoryTaskStore - 開発・テスト用の Task 台帳
//!
//! 条件付き書き込みは 1 つの `tokio::sync::Mutex` の中で判定と書き込みを
//! 行うことで原子的にしています（await をロック内で跨がない）。

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::Mutex;

use crate::config::DEFAULT_TASK_TABLE;
use crate::domain::{CycleId, SellerRef, TaskId, TaskRecord};
use crate::ports::{TaskCounts, TaskStore, TaskStoreError};

#[derive(Default)]
struct TaskTable {
    /// Current row per seller.
    current: HashMap<SellerRef, TaskRecord>,
    /// Superseded rows per seller, oldest first.
    history: HashMap<SellerRef, Vec<TaskRecord>>,
}

#[derive(Clone)]
pub struct InMemoryTaskStore {
    name: Arc<str>,
    table: Arc<Mutex<TaskTable>>,
}

impl Default for InMemoryTaskStore {
    fn default() -> Self {
        Self::named(DEFAULT_TASK_TABLE)
    }
}

impl InMemoryTaskStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn named(name: &str) -> Self {
        Self {
            name: Arc::from(name),
            table: Arc::new(Mutex::new(TaskTable::default())),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Put a row in place as-is (seeding for tests and the simulator).
    pub async fn seed(&self, row: TaskRecord) {
        let mut table = self.table.lock().await;
        if let Some(previous) = table.current.insert(row.seller.clone(), row) {
            table
                .history
                .entry(previous.seller.clone())
                .or_default()
                .push(previous);
        }
    }
}

#[async_trait]
impl TaskStore for InMemoryTaskStore {
    async fn create_pending(
        &self,
        seller: &SellerRef,
        task_id: TaskId,
        cycle_id: CycleId,
        now: DateTime<Utc>,
    ) -> Result<TaskRecord, TaskStoreError> {
        let mut table = self.table.lock().await;

        let resume_from = match table.current.get(seller) {
            Some(existing) if existing.status.is_active() => {
                return Err(TaskStoreError::Conflict {
                    seller: seller.clone(),
                    reason: format!("{} is {}", existing.task_id, existing.status),
                });
            }
            Some(existing) => existing.last_cursor.clone(),
            None => None,
        };

        let row = TaskRecord::pending(task_id, cycle_id, seller.clone(), resume_from, now);
        tracing::trace!(table = %self.name, %seller, task_id = %row.task_id, "pending row created");
        if let Some(previous) = table.current.insert(seller.clone(), row.clone()) {
            table.history.entry(seller.clone()).or_default().push(previous);
        }
        Ok(row)
    }

    async fn get(&self, seller: &SellerRef) -> Result<Option<TaskRecord>, TaskStoreError> {
        let table = self.table.lock().await;
        Ok(table.current.get(seller).cloned())
    }

    async fn compare_and_swap(
        &self,
        expected_version: u64,
        mut next: TaskRecord,
    ) -> Result<TaskRecord, TaskStoreError> {
        let mut table = self.table.lock().await;

        let Some(current) = table.current.get_mut(&next.seller) else {
            return Err(TaskStoreError::NotFound(next.seller.clone()));
        };
        if current.task_id != next.task_id {
            return Err(TaskStoreError::Conflict {
                seller: next.seller.clone(),
                reason: format!("{} superseded by {}", next.task_id, current.task_id),
            });
        }
        if current.version != expected_version {
            return Err(TaskStoreError::Conflict {
                seller: next.seller.clone(),
                reason: format!(
                    "expected version {expected_version}, found {}",
                    current.version
                ),
            });
        }

        next.version = expected_version + 1;
        *current = next.clone();
        Ok(next)
    }

    async fn history(&self, seller: &SellerRef) -> Result<Vec<TaskRecord>, TaskStoreError> {
        let table = self.table.lock().await;
        Ok(table.history.get(seller).cloned().unwrap_or_default())
    }

    async fn counts_by_status(&self) -> Result<TaskCounts, TaskStoreError> {
        let table = self.table.lock().await;
        let mut counts = TaskCounts::default();
        for row in table.current.values() {
            counts.record(row.status);
        }
        Ok(counts)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{Completion, Cursor, ErrorKind, TaskStatus};
    use ulid::Ulid;

    fn ids() -> (TaskId, CycleId) {
        (TaskId::from_ulid(Ulid::new()), CycleId::from_ulid(Ulid::new()))
    }

    #[test]
    fn store_is_named_after_its_table() {
        assert_eq!(InMemoryTaskStore::new().name(), "sp_api_task");
        assert_eq!(InMemoryTaskStore::named("task_staging").name(), "task_staging");
    }

    #[tokio::test]
    async fn create_pending_rejects_second_active_row() {
        let store = InMemoryTaskStore::new();
        let seller = SellerRef::new("tenant", "S1");
        let (task_id, cycle_id) = ids();

        let row = store
            .create_pending(&seller, task_id, cycle_id, Utc::now())
            .await
            .unwrap();
        assert_eq!(row.status, TaskStatus::Pending);
        assert_eq!(row.version, 0);

        let (task_id2, cycle_id2) = ids();
        let err = store
            .create_pending(&seller, task_id2, cycle_id2, Utc::now())
            .await
            .unwrap_err();
        assert!(err.is_conflict());

        let current = store.get(&seller).await.unwrap().unwrap();
        assert_eq!(current.task_id, task_id);
    }

    #[tokio::test]
    async fn terminal_row_is_superseded_and_cursor_carried_over() {
        let store = InMemoryTaskStore::new();
        let seller = SellerRef::new("tenant", "S1");
        let now = Utc::now();
        let (task_id, cycle_id) = ids();

        let row = store.create_pending(&seller, task_id, cycle_id, now).await.unwrap();
        let running = store.compare_and_swap(row.version, row.start(now)).await.unwrap();
        let done = running
            .checkpoint(Cursor::new("7"), 7, now)
            .succeed(Completion::Exhausted, now);
        store.compare_and_swap(running.version, done).await.unwrap();

        let (task_id2, cycle_id2) = ids();
        let next = store.create_pending(&seller, task_id2, cycle_id2, now).await.unwrap();

        assert_eq!(next.last_cursor, Some(Cursor::new("7")));
        assert_eq!(next.records_ingested, 0);
        let history = store.history(&seller).await.unwrap();
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].task_id, task_id);
        assert_eq!(history[0].status, TaskStatus::Succeeded);
    }

    #[tokio::test]
    async fn stale_version_loses_the_swap() {
        let store = InMemoryTaskStore::new();
        let seller = SellerRef::new("tenant", "S1");
        let now = Utc::now();
        let (task_id, cycle_id) = ids();
        let row = store.create_pending(&seller, task_id, cycle_id, now).await.unwrap();

        let first = store.compare_and_swap(row.version, row.start(now)).await.unwrap();
        assert_eq!(first.version, 1);

        let err = store
            .compare_and_swap(row.version, row.fail(ErrorKind::Transient, "late", now))
            .await
            .unwrap_err();
        assert!(err.is_conflict());
        assert_eq!(store.get(&seller).await.unwrap().unwrap().status, TaskStatus::Running);
    }

    #[tokio::test]
    async fn swap_on_superseded_task_conflicts() {
        let store = InMemoryTaskStore::new();
        let seller = SellerRef::new("tenant", "S1");
        let now = Utc::now();
        let (task_id, cycle_id) = ids();
        let old = store.create_pending(&seller, task_id, cycle_id, now).await.unwrap();
        let failed = store
            .compare_and_swap(old.version, old.fail(ErrorKind::Infrastructure, "x", now))
            .await
            .unwrap();

        let (task_id2, cycle_id2) = ids();
        store.create_pending(&seller, task_id2, cycle_id2, now).await.unwrap();

        let err = store
            .compare_and_swap(failed.version, failed.start(now))
            .await
            .unwrap_err();
        assert!(err.is_conflict());
    }

    #[tokio::test]
    async fn swap_without_row_is_not_found() {
        let store = InMemoryTaskStore::new();
        let (task_id, cycle_id) = ids();
        let ghost = TaskRecord::pending(task_id, cycle_id, SellerRef::new("t", "S9"), None, Utc::now());

        let err = store.compare_and_swap(0, ghost).await.unwrap_err();
        assert!(matches!(err, TaskStoreError::NotFound(_)));
    }

    #[tokio::test]
    async fn concurrent_creates_admit_exactly_one() {
        let store = InMemoryTaskStore::new();
        let seller = SellerRef::new("tenant", "S1");

        let mut joins = Vec::new();
        for _ in 0..32 {
            let store = store.clone();
            let seller = seller.clone();
            joins.push(tokio::spawn(async move {
                let (task_id, cycle_id) = ids();
                store.create_pending(&seller, task_id, cycle_id, Utc::now()).await.is_ok()
            }));
        }

        let mut created = 0;
        for j in joins {
            if j.await.unwrap() {
                created += 1;
            }
        }
        assert_eq!(created, 1);
        let counts = store.counts_by_status().await.unwrap();
        assert_eq!(counts.pending, 1);
        assert_eq!(counts.total(), 1);
    }
}
