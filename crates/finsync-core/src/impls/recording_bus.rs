//! RecordingEventBus - 受理したメッセージをメモリに残す Event Bus
//!
//! テストでは「何件・どの順で publish されたか」を検証し、CLI では
//! tracing に出すだけの bus として使います。`fail_next()` で障害注入、
//! `with_latency()` で publish の遅延を設定できます。

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::Mutex;

use crate::domain::BusMessage;
use crate::ports::{EventBus, EventBusError};

#[derive(Default)]
struct BusState {
    accepted: Vec<BusMessage>,
    failures_left: u32,
}

#[derive(Default, Clone)]
pub struct RecordingEventBus {
    state: Arc<Mutex<BusState>>,
    latency: Duration,
}

impl RecordingEventBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sleep this long inside every publish.
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    /// Reject the next `n` publishes with `Unavailable`.
    pub async fn fail_next(&self, n: u32) {
        self.state.lock().await.failures_left = n;
    }

    pub async fn messages(&self) -> Vec<BusMessage> {
        self.state.lock().await.accepted.clone()
    }

    pub async fn len(&self) -> usize {
        self.state.lock().await.accepted.len()
    }
}

#[async_trait]
impl EventBus for RecordingEventBus {
    async fn publish(&self, message: &BusMessage) -> Result<(), EventBusError> {
        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }
        let mut state = self.state.lock().await;
        if state.failures_left > 0 {
            state.failures_left -= 1;
            return Err(EventBusError::Unavailable(format!(
                "bus {} unavailable",
                message.event_bus_name
            )));
        }

        tracing::debug!(
            bus = %message.event_bus_name,
            detail_type = %message.detail_type,
            amazon_order_id = %message.detail.amazon_order_id,
            seller_id = %message.detail.seller_id,
            "event published"
        );
        state.accepted.push(message.clone());
        Ok(())
    }
}
