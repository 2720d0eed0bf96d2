use fieldproto::model::Reading;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::Mutex;

/// The node's shared batch and `clientReady` flag (spec.md §9 "must become a
/// small number of explicit components with injected locks — not
/// module-level variables"). Sensor workers append under `batch`'s lock only
/// while `client_ready` is set; the connection task copies (never drains)
/// the batch to serialize it, and clears it only after `DATA_RECEIVED`.
#[derive(Debug, Default)]
pub struct NodeBufferState {
    batch: Mutex<Vec<Reading>>,
    client_ready: AtomicBool,
}

impl NodeBufferState {
    pub fn new() -> Self {
        Self {
            batch: Mutex::new(Vec::new()),
            client_ready: AtomicBool::new(false),
        }
    }

    pub fn is_client_ready(&self) -> bool {
        self.client_ready.load(Ordering::Acquire)
    }

    pub fn set_client_ready(&self, ready: bool) {
        self.client_ready.store(ready, Ordering::Release);
    }

    /// Appends a reading if the client is ready; otherwise drops it (spec.md
    /// §4.6 — sensor workers only append once registration has completed).
    pub async fn push_if_ready(&self, reading: Reading) {
        if !self.is_client_ready() {
            return;
        }
        self.batch.lock().await.push(reading);
    }

    /// Copies the batch without clearing it (spec.md §4.5 step 4).
    pub async fn snapshot(&self) -> Vec<Reading> {
        self.batch.lock().await.clone()
    }

    /// Clears the batch; only called after `DATA_RECEIVED` (spec.md §4.5
    /// step 6).
    pub async fn clear(&self) {
        self.batch.lock().await.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fieldproto::model::{SensorKind, Value};

    fn reading() -> Reading {
        Reading {
            sensor: SensorKind::RainGauge,
            value: Value::Float(0.2794),
            station_id: Some(1),
            lat_deg: None,
            lon_deg: None,
        }
    }

    #[tokio::test]
    async fn readings_are_dropped_until_client_ready() {
        let state = NodeBufferState::new();
        state.push_if_ready(reading()).await;
        assert!(state.snapshot().await.is_empty());

        state.set_client_ready(true);
        state.push_if_ready(reading()).await;
        assert_eq!(state.snapshot().await.len(), 1);
    }

    #[tokio::test]
    async fn snapshot_does_not_clear_the_batch() {
        let state = NodeBufferState::new();
        state.set_client_ready(true);
        state.push_if_ready(reading()).await;

        let first = state.snapshot().await;
        let second = state.snapshot().await;
        assert_eq!(first.len(), 1);
        assert_eq!(second.len(), 1);

        state.clear().await;
        assert!(state.snapshot().await.is_empty());
    }
}
