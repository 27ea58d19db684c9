//! Task record: one dispatch unit for one seller, one scheduling cycle.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::errors::ErrorKind;
use super::ids::{CycleId, TaskId};
use super::seller::SellerRef;

/// Task status.
///
/// State transitions:
/// - Pending -> Running -> Succeeded
/// - Pending -> Running -> Failed
/// - Pending -> Failed (dispatch could not hand the task to a worker)
/// - Pending | Running -> Failed (stale task reaped)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TaskStatus {
    Pending,
    Running,
    Succeeded,
    Failed,
}

impl TaskStatus {
    /// Counts against the "one active task per seller" rule.
    pub fn is_active(self) -> bool {
        matches!(self, TaskStatus::Pending | TaskStatus::Running)
    }

    pub fn is_terminal(self) -> bool {
        !self.is_active()
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// Opaque pointer into the upstream data stream.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Cursor(String);

impl Cursor {
    pub fn new(s: impl Into<String>) -> Self {
        Self(s.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Cursor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// How a Succeeded task ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Completion {
    /// The upstream sequence was drained.
    Exhausted,
    /// The time budget ran out first; the next cycle continues from the cursor.
    Partial,
}

/// Why a task ended Failed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskFailure {
    pub kind: ErrorKind,
    pub message: String,
}

/// A Task row.
///
/// Transition methods return the next row; the Task Store persists it with
/// a compare-and-swap on `version`, so a caller holding a stale copy loses.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskRecord {
    pub task_id: TaskId,
    pub cycle_id: CycleId,
    pub seller: SellerRef,
    pub status: TaskStatus,
    pub last_cursor: Option<Cursor>,

    /// Bumped by the store on every successful conditional write.
    pub version: u64,

    /// Records persisted by this task (all pages, this run only).
    pub records_ingested: u64,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completion: Option<Completion>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_error: Option<TaskFailure>,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl TaskRecord {
    /// A fresh Pending row. `resume_from` is the cursor of the superseded row.
    pub fn pending(
        task_id: TaskId,
        cycle_id: CycleId,
        seller: SellerRef,
        resume_from: Option<Cursor>,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            task_id,
            cycle_id,
            seller,
            status: TaskStatus::Pending,
            last_cursor: resume_from,
            version: 0,
            records_ingested: 0,
            completion: None,
            last_error: None,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn start(&self, now: DateTime<Utc>) -> Self {
        let mut next = self.clone();
        next.status = TaskStatus::Running;
        next.updated_at = now;
        next
    }

    /// Advance the cursor after a page was durably stored and published.
    pub fn checkpoint(&self, cursor: Cursor, persisted: u64, now: DateTime<Utc>) -> Self {
        let mut next = self.clone();
        next.last_cursor = Some(cursor);
        next.records_ingested += persisted;
        next.updated_at = now;
        next
    }

    pub fn succeed(&self, completion: Completion, now: DateTime<Utc>) -> Self {
        let mut next = self.clone();
        next.status = TaskStatus::Succeeded;
        next.completion = Some(completion);
        next.last_error = None;
        next.updated_at = now;
        next
    }

    /// Close as Failed, keeping the cursor of the last durable checkpoint.
    pub fn fail(&self, kind: ErrorKind, message: impl Into<String>, now: DateTime<Utc>) -> Self {
        let mut next = self.clone();
        next.status = TaskStatus::Failed;
        next.completion = None;
        next.last_error = Some(TaskFailure {
            kind,
            message: message.into(),
        });
        next.updated_at = now;
        next
    }

    /// Active for longer than `threshold` without any write.
    pub fn is_stale(&self, now: DateTime<Utc>, threshold: chrono::Duration) -> bool {
        self.status.is_active() && now - self.updated_at > threshold
    }
}
