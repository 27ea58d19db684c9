//! ShipmentEventStore port - 正規化済み財務イベントの重複排除ストア
//!
//! # 設計原則
//! - (amazonOrderId, sellerId) をキーにした冪等 upsert
//! - 最初に永続化された行が正本。再配送で金額は変わらない
//! - `published_at` で「bus に受理済みか」を記録し、store と publish の間で
//!   落ちた行を次の実行で再送できるようにする（at-least-once）

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::domain::{SellerId, ShipmentEventKey, ShipmentFinancialEvent};

#[derive(Debug, Error)]
pub enum ShipmentStoreError {
    #[error("no stored event {0}")]
    NotFound(ShipmentEventKey),

    #[error("shipment store unavailable: {0}")]
    Unavailable(String),
}

/// What an upsert did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpsertOutcome {
    /// New row.
    Inserted,
    /// A row with this identity already exists and was left untouched.
    AlreadyStored {
        published: bool,
        /// The re-delivered payload differs from the stored one.
        diverged: bool,
    },
}

impl UpsertOutcome {
    /// A DomainEvent still has to be published for this row.
    pub fn needs_publish(self) -> bool {
        match self {
            UpsertOutcome::Inserted => true,
            UpsertOutcome::AlreadyStored { published, .. } => !published,
        }
    }
}

#[async_trait]
pub trait ShipmentEventStore: Send + Sync {
    async fn upsert(&self, event: ShipmentFinancialEvent) -> Result<UpsertOutcome, ShipmentStoreError>;

    async fn mark_published(
        &self,
        key: &ShipmentEventKey,
        at: DateTime<Utc>,
    ) -> Result<(), ShipmentStoreError>;

    async fn get(&self, key: &ShipmentEventKey) -> Result<Option<ShipmentFinancialEvent>, ShipmentStoreError>;

    async fn list_for_seller(&self, seller_id: &SellerId) -> Result<Vec<ShipmentFinancialEvent>, ShipmentStoreError>;

    async fn count(&self) -> Result<usize, ShipmentStoreError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn publish_needed_for_new_and_unpublished_rows() {
        assert!(UpsertOutcome::Inserted.needs_publish());
        assert!(UpsertOutcome::AlreadyStored { published: false, diverged: false }.needs_publish());
        assert!(!UpsertOutcome::AlreadyStored { published: true, diverged: true }.needs_publish());
    }
}
