//! InvocationLimiter の実装
//!
//! - **Unlimited**: 何もしない（デフォルト）
//! - **MinIntervalLimiter**: 呼び出し間隔の下限を保証する

use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::Mutex;
use tokio::time::Instant;

use crate::ports::InvocationLimiter;

#[derive(Debug, Default, Clone, Copy)]
pub struct Unlimited;

#[async_trait]
impl InvocationLimiter for Unlimited {
    async fn acquire(&self) {}
}

/// Spaces invocations at least `interval` apart.
///
/// The next slot is reserved under the lock and the wait happens outside it,
/// so concurrent callers queue up one interval apart.
#[derive(Debug)]
pub struct MinIntervalLimiter {
    interval: Duration,
    next_slot: Mutex<Option<Instant>>,
}

impl MinIntervalLimiter {
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            next_slot: Mutex::new(None),
        }
    }
}

#[async_trait]
impl InvocationLimiter for MinIntervalLimiter {
    async fn acquire(&self) {
        let slot = {
            let mut next = self.next_slot.lock().await;
            let now = Instant::now();
            let slot = match *next {
                Some(at) if at > now => at,
                _ => now,
            };
            *next = Some(slot + self.interval);
            slot
        };
        tokio::time::sleep_until(slot).await;
    }
}
