//! Shipment financial events: the raw upstream shape and the normalized row.
//!
//! Normalization is a pure function; the Worker decides what to do with a
//! record that does not normalize.

use std::fmt;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::ids::{AmazonOrderId, SellerId};

/// Whether an amount line is a charge to the buyer or a fee to the seller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AmountKind {
    Charge,
    Fee,
}

/// One amount component as the upstream API reports it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawAmount {
    pub kind: AmountKind,
    pub label: String,
    pub currency_code: String,
    pub amount: Decimal,
}

/// One financial/shipment record as fetched from the upstream source.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawFinancialRecord {
    pub amazon_order_id: String,
    pub event_type: String,
    #[serde(default)]
    pub posted_date: Option<DateTime<Utc>>,
    #[serde(default)]
    pub marketplace_name: Option<String>,
    #[serde(default)]
    pub components: Vec<RawAmount>,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum FinancialEventType {
    Shipment,
    Refund,
    GuaranteeClaim,
    Chargeback,
    Adjustment,
    Other(String),
}

impl From<String> for FinancialEventType {
    fn from(s: String) -> Self {
        match s.trim_end_matches("Event") {
            "Shipment" => FinancialEventType::Shipment,
            "Refund" => FinancialEventType::Refund,
            "GuaranteeClaim" => FinancialEventType::GuaranteeClaim,
            "Chargeback" => FinancialEventType::Chargeback,
            "Adjustment" => FinancialEventType::Adjustment,
            _ => FinancialEventType::Other(s),
        }
    }
}

impl From<FinancialEventType> for String {
    fn from(t: FinancialEventType) -> Self {
        t.to_string()
    }
}

impl fmt::Display for FinancialEventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FinancialEventType::Shipment => f.write_str("ShipmentEvent"),
            FinancialEventType::Refund => f.write_str("RefundEvent"),
            FinancialEventType::GuaranteeClaim => f.write_str("GuaranteeClaimEvent"),
            FinancialEventType::Chargeback => f.write_str("ChargebackEvent"),
            FinancialEventType::Adjustment => f.write_str("AdjustmentEvent"),
            FinancialEventType::Other(s) => f.write_str(s),
        }
    }
}

/// Composite identity of a stored event row.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ShipmentEventKey {
    pub amazon_order_id: AmazonOrderId,
    pub seller_id: SellerId,
}

impl fmt::Display for ShipmentEventKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.amazon_order_id, self.seller_id)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AmountLine {
    pub kind: AmountKind,
    pub label: String,
    pub amount: Decimal,
}

/// A normalized, persisted financial event row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ShipmentFinancialEvent {
    #[serde(flatten)]
    pub key: ShipmentEventKey,
    pub event_type: FinancialEventType,
    pub posted_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub marketplace: Option<String>,
    pub currency: String,
    pub lines: Vec<AmountLine>,
    pub net_amount: Decimal,
    pub ingested_at: DateTime<Utc>,

    /// Set once the bus accepted the DomainEvent for this row.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub published_at: Option<DateTime<Utc>>,
}

impl ShipmentFinancialEvent {
    /// Same financial content, ignoring bookkeeping timestamps.
    pub fn same_payload(&self, other: &Self) -> bool {
        self.key == other.key
            && self.event_type == other.event_type
            && self.posted_at == other.posted_at
            && self.currency == other.currency
            && self.lines == other.lines
            && self.net_amount == other.net_amount
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum NormalizationError {
    #[error("record has no amazonOrderId")]
    MissingOrderId,

    #[error("record {0} has no postedDate")]
    MissingPostedDate(String),

    #[error("record {order} mixes currencies {first} and {other}")]
    MixedCurrencies {
        order: String,
        first: String,
        other: String,
    },

    #[error("record {0} has a net amount out of range")]
    AmountOverflow(String),
}

/// Normalize one raw record fetched for `seller_id`.
///
/// A record with no amount components normalizes to a zero net amount in
/// an empty currency.
pub fn normalize(
    raw: &RawFinancialRecord,
    seller_id: &SellerId,
    ingested_at: DateTime<Utc>,
) -> Result<ShipmentFinancialEvent, NormalizationError> {
    let order = raw.amazon_order_id.trim();
    if order.is_empty() {
        return Err(NormalizationError::MissingOrderId);
    }
    let posted_at = raw
        .posted_date
        .ok_or_else(|| NormalizationError::MissingPostedDate(order.to_string()))?;

    let mut currency: Option<&str> = None;
    let mut lines = Vec::with_capacity(raw.components.len());
    let mut net_amount = Decimal::ZERO;

    for component in &raw.components {
        let code = component.currency_code.trim();
        match currency {
            None => currency = Some(code),
            Some(first) if !first.eq_ignore_ascii_case(code) => {
                return Err(NormalizationError::MixedCurrencies {
                    order: order.to_string(),
                    first: first.to_string(),
                    other: code.to_string(),
                });
            }
            Some(_) => {}
        }
        net_amount = net_amount
            .checked_add(component.amount)
            .ok_or_else(|| NormalizationError::AmountOverflow(order.to_string()))?;
        lines.push(AmountLine {
            kind: component.kind,
            label: component.label.clone(),
            amount: component.amount,
        });
    }

    Ok(ShipmentFinancialEvent {
        key: ShipmentEventKey {
            amazon_order_id: AmazonOrderId::new(order),
            seller_id: seller_id.clone(),
        },
        event_type: FinancialEventType::from(raw.event_type.clone()),
        posted_at,
        marketplace: raw.marketplace_name.clone(),
        currency: currency.unwrap_or_default().to_ascii_uppercase(),
        lines,
        net_amount,
        ingested_at,
        published_at: None,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use rstest::rstest;
    use rust_decimal_macros::dec;

    fn raw(order: &str, components: Vec<RawAmount>) -> RawFinancialRecord {
        RawFinancialRecord {
            amazon_order_id: order.to_string(),
            event_type: "ShipmentEvent".to_string(),
            posted_date: Some(Utc.with_ymd_and_hms(2024, 3, 1, 8, 0, 0).unwrap()),
            marketplace_name: Some("Amazon.com".to_string()),
            components,
        }
    }

    fn amount(kind: AmountKind, currency: &str, value: Decimal) -> RawAmount {
        RawAmount {
            kind,
            label: "Principal".to_string(),
            currency_code: currency.to_string(),
            amount: value,
        }
    }

    #[test]
    fn net_amount_sums_charges_and_fees() {
        let record = raw(
            "111-2222222-3333333",
            vec![
                amount(AmountKind::Charge, "USD", dec!(25.00)),
                amount(AmountKind::Charge, "usd", dec!(2.50)),
                amount(AmountKind::Fee, "USD", dec!(-3.75)),
            ],
        );
        let now = Utc::now();

        let event = normalize(&record, &SellerId::new("S1"), now).unwrap();

        assert_eq!(event.net_amount, dec!(23.75));
        assert_eq!(event.currency, "USD");
        assert_eq!(event.lines.len(), 3);
        assert_eq!(event.key.amazon_order_id.as_str(), "111-2222222-3333333");
        assert_eq!(event.key.seller_id.as_str(), "S1");
        assert_eq!(event.event_type, FinancialEventType::Shipment);
        assert_eq!(event.ingested_at, now);
        assert!(event.published_at.is_none());
    }

    #[test]
    fn rejects_blank_order_id() {
        let record = raw("  ", vec![]);
        let err = normalize(&record, &SellerId::new("S1"), Utc::now()).unwrap_err();
        assert_eq!(err, NormalizationError::MissingOrderId);
    }

    #[test]
    fn rejects_missing_posted_date() {
        let mut record = raw("O-1", vec![]);
        record.posted_date = None;
        let err = normalize(&record, &SellerId::new("S1"), Utc::now()).unwrap_err();
        assert_eq!(err, NormalizationError::MissingPostedDate("O-1".to_string()));
    }

    #[test]
    fn rejects_mixed_currencies() {
        let record = raw(
            "O-1",
            vec![
                amount(AmountKind::Charge, "USD", dec!(1)),
                amount(AmountKind::Fee, "EUR", dec!(-1)),
            ],
        );
        let err = normalize(&record, &SellerId::new("S1"), Utc::now()).unwrap_err();
        assert!(matches!(err, NormalizationError::MixedCurrencies { .. }));
    }

    #[test]
    fn rejects_net_amount_overflow() {
        let record = raw(
            "O-1",
            vec![
                amount(AmountKind::Charge, "USD", Decimal::MAX),
                amount(AmountKind::Charge, "USD", Decimal::ONE),
            ],
        );
        let err = normalize(&record, &SellerId::new("S1"), Utc::now()).unwrap_err();
        assert_eq!(err, NormalizationError::AmountOverflow("O-1".to_string()));
    }

    #[rstest]
    #[case("ShipmentEvent", FinancialEventType::Shipment)]
    #[case("Refund", FinancialEventType::Refund)]
    #[case("ChargebackEvent", FinancialEventType::Chargeback)]
    #[case("ServiceFeeEvent", FinancialEventType::Other("ServiceFeeEvent".to_string()))]
    fn event_type_parsing(#[case] input: &str, #[case] expected: FinancialEventType) {
        assert_eq!(FinancialEventType::from(input.to_string()), expected);
    }

    #[test]
    fn same_payload_ignores_bookkeeping() {
        let record = raw("O-1", vec![amount(AmountKind::Charge, "USD", dec!(10))]);
        let first = normalize(&record, &SellerId::new("S1"), Utc::now()).unwrap();
        let mut second = first.clone();
        second.ingested_at = first.ingested_at + chrono::Duration::minutes(1);
        second.published_at = Some(Utc::now());
        assert!(first.same_payload(&second));

        second.net_amount = dec!(11);
        assert!(!first.same_payload(&second));
    }
}
