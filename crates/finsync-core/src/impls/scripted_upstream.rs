//! ScriptedFinancialApi - 開発・テスト用の upstream
//!
//! seller ごとに raw record の列を持ち、cursor は次に読む index を文字列にしたもの。
//! 障害注入（特定の位置で RateLimited / Transient）とページ取得の遅延を設定できます。

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::Mutex;

use crate::domain::{Cursor, RawFinancialRecord, ScopedCredentials, SellerId};
use crate::ports::{FinancialApi, FinancialPage, UpstreamError};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FaultKind {
    RateLimited,
    Transient,
}

/// Fail the fetch that starts at record index `at`.
#[derive(Debug, Clone, Copy)]
pub struct Fault {
    pub at: usize,
    pub kind: FaultKind,
    /// How many fetches fail before the fault clears. `None` = forever.
    pub remaining: Option<u32>,
}

impl Fault {
    fn is_armed(&self) -> bool {
        self.remaining != Some(0)
    }

    fn to_error(self) -> UpstreamError {
        match self.kind {
            FaultKind::RateLimited => UpstreamError::RateLimited {
                retry_after: Some(Duration::from_secs(2)),
            },
            FaultKind::Transient => UpstreamError::Transient("connection reset".to_string()),
        }
    }
}

#[derive(Default)]
struct UpstreamState {
    streams: HashMap<SellerId, Vec<RawFinancialRecord>>,
    faults: HashMap<SellerId, Fault>,
    fetches: usize,
}

#[derive(Clone)]
pub struct ScriptedFinancialApi {
    state: Arc<Mutex<UpstreamState>>,
    page_size: usize,
    latency: Duration,
}

impl ScriptedFinancialApi {
    pub fn new(page_size: usize) -> Self {
        Self {
            state: Arc::new(Mutex::new(UpstreamState::default())),
            page_size: page_size.max(1),
            latency: Duration::ZERO,
        }
    }

    /// Sleep this long inside every fetch.
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    /// Append records to a seller's stream.
    pub async fn append(&self, seller_id: &SellerId, records: Vec<RawFinancialRecord>) {
        let mut state = self.state.lock().await;
        state.streams.entry(seller_id.clone()).or_default().extend(records);
    }

    pub async fn inject_fault(&self, seller_id: &SellerId, fault: Fault) {
        self.state.lock().await.faults.insert(seller_id.clone(), fault);
    }

    pub async fn clear_fault(&self, seller_id: &SellerId) {
        self.state.lock().await.faults.remove(seller_id);
    }

    /// Number of fetch calls served so far (including failed ones).
    pub async fn fetch_count(&self) -> usize {
        self.state.lock().await.fetches
    }
}

fn parse_offset(cursor: Option<&Cursor>) -> Result<usize, UpstreamError> {
    match cursor {
        None => Ok(0),
        Some(c) => c
            .as_str()
            .parse()
            .map_err(|_| UpstreamError::Transient(format!("invalid cursor {c}"))),
    }
}

#[async_trait]
impl FinancialApi for ScriptedFinancialApi {
    async fn fetch_page(
        &self,
        _credentials: &ScopedCredentials,
        seller_id: &SellerId,
        cursor: Option<&Cursor>,
    ) -> Result<FinancialPage, UpstreamError> {
        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }
        let offset = parse_offset(cursor)?;

        let mut state = self.state.lock().await;
        state.fetches += 1;

        let fault = state.faults.get_mut(seller_id).filter(|f| f.is_armed());
        let mut stop_at = usize::MAX;
        if let Some(fault) = fault {
            if fault.at == offset {
                if let Some(n) = fault.remaining.as_mut() {
                    *n -= 1;
                }
                return Err(fault.to_error());
            }
            if fault.at > offset {
                stop_at = fault.at;
            }
        }

        let stream = state.streams.get(seller_id).map(Vec::as_slice).unwrap_or(&[]);
        let start = offset.min(stream.len());
        let end = (start + self.page_size).min(stream.len()).min(stop_at);
        let records = stream[start..end].to_vec();

        Ok(FinancialPage {
            records,
            cursor: Cursor::new(end.to_string()),
            has_more: end < stream.len(),
        })
    }
}
