//! InMemoryShipmentStore - 開発・テスト用の財務イベントストア

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::Mutex;

use crate::config::DEFAULT_FINANCES_TABLE;
use crate::domain::{SellerId, ShipmentEventKey, ShipmentFinancialEvent};
use crate::ports::{ShipmentEventStore, ShipmentStoreError, UpsertOutcome};

#[derive(Clone)]
pub struct InMemoryShipmentStore {
    name: Arc<str>,
    rows: Arc<Mutex<BTreeMap<ShipmentEventKey, ShipmentFinancialEvent>>>,
}

impl Default for InMemoryShipmentStore {
    fn default() -> Self {
        Self::named(DEFAULT_FINANCES_TABLE)
    }
}

impl InMemoryShipmentStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn named(name: &str) -> Self {
        Self {
            name: Arc::from(name),
            rows: Arc::new(Mutex::new(BTreeMap::new())),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Every row, ordered by key.
    pub async fn snapshot(&self) -> Vec<ShipmentFinancialEvent> {
        self.rows.lock().await.values().cloned().collect()
    }
}

#[async_trait]
impl ShipmentEventStore for InMemoryShipmentStore {
    async fn upsert(
        &self,
        event: ShipmentFinancialEvent,
    ) -> Result<UpsertOutcome, ShipmentStoreError> {
        let mut rows = self.rows.lock().await;
        match rows.get(&event.key) {
            Some(stored) => Ok(UpsertOutcome::AlreadyStored {
                published: stored.published_at.is_some(),
                diverged: !stored.same_payload(&event),
            }),
            None => {
                tracing::trace!(
                    table = %self.name,
                    amazon_order_id = %event.key.amazon_order_id,
                    seller_id = %event.key.seller_id,
                    "row stored"
                );
                rows.insert(event.key.clone(), event);
                Ok(UpsertOutcome::Inserted)
            }
        }
    }

    async fn mark_published(
        &self,
        key: &ShipmentEventKey,
        at: DateTime<Utc>,
    ) -> Result<(), ShipmentStoreError> {
        let mut rows = self.rows.lock().await;
        let row = rows
            .get_mut(key)
            .ok_or_else(|| ShipmentStoreError::NotFound(key.clone()))?;
        if row.published_at.is_none() {
            row.published_at = Some(at);
        }
        Ok(())
    }

    async fn get(
        &self,
        key: &ShipmentEventKey,
    ) -> Result<Option<ShipmentFinancialEvent>, ShipmentStoreError> {
        Ok(self.rows.lock().await.get(key).cloned())
    }

    async fn list_for_seller(
        &self,
        seller_id: &SellerId,
    ) -> Result<Vec<ShipmentFinancialEvent>, ShipmentStoreError> {
        let rows = self.rows.lock().await;
        Ok(rows
            .values()
            .filter(|row| &row.key.seller_id == seller_id)
            .cloned()
            .collect())
    }

    async fn count(&self) -> Result<usize, ShipmentStoreError> {
        Ok(self.rows.lock().await.len())
    }
}
