//! Events - ドメインイベント
//!
//! ShipmentFinancialEvent が永続化された後に Event Bus へ送る通知です。
//! 財務データの正本は store 側にあり、イベントは参照に必要な identity だけを運びます。

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::ids::{AmazonOrderId, SellerId};
use super::shipment::{FinancialEventType, ShipmentFinancialEvent};

pub const EVENT_SOURCE: &str = "finsync.finances";
pub const EVENT_DETAIL_TYPE: &str = "ShipmentFinancialEventIngested";

/// Wire schema: `{amazonOrderId, sellerId, eventType, occurredAt}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DomainEvent {
    pub amazon_order_id: AmazonOrderId,
    pub seller_id: SellerId,
    pub event_type: FinancialEventType,
    pub occurred_at: DateTime<Utc>,
}

impl DomainEvent {
    pub fn ingested(row: &ShipmentFinancialEvent) -> Self {
        Self {
            amazon_order_id: row.key.amazon_order_id.clone(),
            seller_id: row.key.seller_id.clone(),
            event_type: row.event_type.clone(),
            occurred_at: row.posted_at,
        }
    }
}

/// Bus envelope: routing metadata around one DomainEvent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BusMessage {
    pub event_bus_name: String,
    pub source: String,
    pub detail_type: String,
    pub detail: DomainEvent,
}

impl BusMessage {
    pub fn new(event_bus_name: impl Into<String>, detail: DomainEvent) -> Self {
        Self {
            event_bus_name: event_bus_name.into(),
            source: EVENT_SOURCE.to_string(),
            detail_type: EVENT_DETAIL_TYPE.to_string(),
            detail,
        }
    }
}
