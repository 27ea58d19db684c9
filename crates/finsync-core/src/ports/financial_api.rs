//! FinancialApi port - upstream の財務 API（paginated read）
//!
//! # 設計原則
//! - cursor でパラメータ化されたページ読み取り
//! - RateLimited / Transient は core 内でリトライしない（Task の失敗として伝播）

use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;

use crate::domain::{Cursor, ErrorKind, RawFinancialRecord, ScopedCredentials, SellerId};

#[derive(Debug, Error)]
pub enum UpstreamError {
    #[error("upstream rate limited (retry_after={retry_after:?})")]
    RateLimited { retry_after: Option<Duration> },

    #[error("transient upstream failure: {0}")]
    Transient(String),
}

impl UpstreamError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            UpstreamError::RateLimited { .. } => ErrorKind::RateLimited,
            UpstreamError::Transient(_) => ErrorKind::Transient,
        }
    }
}

/// One page of raw records.
#[derive(Debug, Clone)]
pub struct FinancialPage {
    pub records: Vec<RawFinancialRecord>,
    /// Position after the last record of this page. Resuming here never
    /// re-reads this page.
    pub cursor: Cursor,
    /// More records are available right now past `cursor`.
    pub has_more: bool,
}

#[async_trait]
pub trait FinancialApi: Send + Sync {
    async fn fetch_page(
        &self,
        credentials: &ScopedCredentials,
        seller_id: &SellerId,
        cursor: Option<&Cursor>,
    ) -> Result<FinancialPage, UpstreamError>;
}
