//! Errors - エラー型と分類
//!
//! 各 port は自分のエラー型を持ち（`CredentialError`, `UpstreamError` など）、
//! ここでは横断的な分類 `ErrorKind` と集約型 `FinsyncError` を定義します。
//!
//! # 分類と扱い
//! - NotFound: credential / role が無い → その seller をスキップ
//! - AccessDenied: role 引き受け失敗 → Task を Failed（Worker 内でリトライしない）
//! - RateLimited / Transient: upstream の throttling → 最後の checkpoint で Failed、
//!   次の cycle が自然なリトライになる
//! - Conflict: Task Store の条件付き書き込みに負けた → 黙って諦める
//! - Infrastructure: store / bus / queue の障害

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::ports::{
    CredentialError, EventBusError, QueueError, RoleError, ShipmentStoreError, TaskStoreError,
    UpstreamError,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ErrorKind {
    NotFound,
    AccessDenied,
    RateLimited,
    Transient,
    Conflict,
    Infrastructure,
}

#[derive(Debug, Error)]
pub enum FinsyncError {
    #[error(transparent)]
    Credential(#[from] CredentialError),

    #[error(transparent)]
    Role(#[from] RoleError),

    #[error(transparent)]
    Upstream(#[from] UpstreamError),

    #[error(transparent)]
    TaskStore(#[from] TaskStoreError),

    #[error(transparent)]
    ShipmentStore(#[from] ShipmentStoreError),

    #[error(transparent)]
    EventBus(#[from] EventBusError),

    #[error(transparent)]
    Queue(#[from] QueueError),
}

impl FinsyncError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            FinsyncError::Credential(e) => e.kind(),
            FinsyncError::Role(e) => e.kind(),
            FinsyncError::Upstream(e) => e.kind(),
            FinsyncError::TaskStore(e) => e.kind(),
            FinsyncError::ShipmentStore(_) => ErrorKind::Infrastructure,
            FinsyncError::EventBus(_) => ErrorKind::Infrastructure,
            FinsyncError::Queue(_) => ErrorKind::Infrastructure,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::SellerRef;
    use rstest::rstest;

    #[rstest]
    #[case::not_found(
        FinsyncError::from(CredentialError::NotFound(SellerRef::new("tenant", "S1"))),
        ErrorKind::NotFound
    )]
    #[case::access_denied(
        FinsyncError::from(RoleError::AccessDenied { role_arn: "arn".into(), reason: "nope".into() }),
        ErrorKind::AccessDenied
    )]
    #[case::rate_limited(
        FinsyncError::from(UpstreamError::RateLimited { retry_after: None }),
        ErrorKind::RateLimited
    )]
    #[case::transient(
        FinsyncError::from(UpstreamError::Transient("reset".into())),
        ErrorKind::Transient
    )]
    #[case::conflict(
        FinsyncError::from(TaskStoreError::Conflict { seller: SellerRef::new("tenant", "S1"), reason: "version".into() }),
        ErrorKind::Conflict
    )]
    #[case::bus(
        FinsyncError::from(EventBusError::Rejected("full".into())),
        ErrorKind::Infrastructure
    )]
    fn kind_follows_source(#[case] err: FinsyncError, #[case] kind: ErrorKind) {
        assert_eq!(err.kind(), kind);
    }

    #[test]
    fn kind_serializes_as_variant_name() {
        let s = serde_json::to_string(&ErrorKind::RateLimited).unwrap();
        assert_eq!(s, "\"RateLimited\"");
    }
}
