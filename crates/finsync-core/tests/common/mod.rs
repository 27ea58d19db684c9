#![allow(dead_code)]

use chrono::{TimeZone, Utc};
use finsync_core::domain::{
    AmountKind, RawAmount, RawFinancialRecord, SecretMaterial, SellerCredential, SellerId,
    SellerKey, SellerRef,
};
use finsync_core::impls::{
    InMemoryCredentialStore, InMemoryShipmentStore, InMemoryTaskStore, RecordingEventBus,
    ScriptedFinancialApi, StaticRoleAssumer,
};
use finsync_core::{App, AppBuilder, FinsyncConfig};
use rust_decimal::Decimal;

pub struct Harness {
    pub app: App,
    pub credentials: InMemoryCredentialStore,
    pub roles: StaticRoleAssumer,
    pub upstream: ScriptedFinancialApi,
    pub tasks: InMemoryTaskStore,
    pub shipments: InMemoryShipmentStore,
    pub bus: RecordingEventBus,
}

pub fn role_for(seller_id: &str) -> String {
    format!("arn:aws:iam::123456789012:role/spapi-{seller_id}")
}

pub fn credential(seller_key: &str, seller_id: &str) -> SellerCredential {
    SellerCredential {
        seller_key: SellerKey::new(seller_key),
        seller_id: SellerId::new(seller_id),
        material: SecretMaterial::new(format!("refresh-{seller_id}")),
        role_arn: role_for(seller_id),
    }
}

/// Sellers are `(sellerKey, sellerId)` pairs.
pub fn harness(config: FinsyncConfig, sellers: &[(&str, &str)], upstream: ScriptedFinancialApi) -> Harness {
    let credentials = InMemoryCredentialStore::new(
        sellers.iter().map(|(k, id)| credential(k, id)).collect(),
        config.seller_page_size,
    );
    let roles = StaticRoleAssumer::new();
    let tasks = InMemoryTaskStore::new();
    let shipments = InMemoryShipmentStore::new();
    let bus = RecordingEventBus::new();

    let app = AppBuilder::new(config)
        .credentials(credentials.clone())
        .roles(roles.clone())
        .upstream(upstream.clone())
        .task_store(tasks.clone())
        .shipment_store(shipments.clone())
        .event_bus(bus.clone())
        .build()
        .expect("complete wiring");

    Harness {
        app,
        credentials,
        roles,
        upstream,
        tasks,
        shipments,
        bus,
    }
}

pub fn seller(seller_key: &str, seller_id: &str) -> SellerRef {
    SellerRef::new(seller_key, seller_id)
}

/// A shipment record worth `amount` USD posted on day `day` of March 2024.
pub fn shipment(order: &str, day: u32, amount: Decimal) -> RawFinancialRecord {
    RawFinancialRecord {
        amazon_order_id: order.to_string(),
        event_type: "ShipmentEvent".to_string(),
        posted_date: Some(Utc.with_ymd_and_hms(2024, 3, day, 9, 30, 0).unwrap()),
        marketplace_name: Some("Amazon.com".to_string()),
        components: vec![
            RawAmount {
                kind: AmountKind::Charge,
                label: "Principal".to_string(),
                currency_code: "USD".to_string(),
                amount,
            },
            RawAmount {
                kind: AmountKind::Fee,
                label: "Commission".to_string(),
                currency_code: "USD".to_string(),
                amount: -amount / Decimal::from(10),
            },
        ],
    }
}

pub fn shipments(prefix: &str, n: usize) -> Vec<RawFinancialRecord> {
    (0..n)
        .map(|i| shipment(&format!("{prefix}-{i:03}"), 1 + (i % 28) as u32, Decimal::from(10 + i as i64)))
        .collect()
}
