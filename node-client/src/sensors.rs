//! Sensor acquisition is opaque per spec.md §1 Non-goals (`read() -> value`);
//! this trait is the seam the rest of the node depends on, with a
//! deterministic stand-in so the buffer/connection pipeline is exercisable
//! and testable without real GPIO hardware.

use async_trait::async_trait;
use fieldproto::model::{SensorKind, Value};
use std::time::Duration;

#[async_trait]
pub trait SensorSource: Send {
    fn kind(&self) -> SensorKind;
    async fn read(&mut self) -> anyhow::Result<Value>;
}

/// Deterministic mock standing in for a real GPIO-backed sensor. Cycles a
/// small fixed sequence per kind rather than reading hardware.
pub struct MockSensor {
    kind: SensorKind,
    bucket_size_mm: f64,
    tick: u64,
}

impl MockSensor {
    pub fn new(kind: SensorKind, bucket_size_mm: f64) -> Self {
        Self {
            kind,
            bucket_size_mm,
            tick: 0,
        }
    }
}

#[async_trait]
impl SensorSource for MockSensor {
    fn kind(&self) -> SensorKind {
        self.kind
    }

    async fn read(&mut self) -> anyhow::Result<Value> {
        self.tick += 1;
        let value = match self.kind {
            SensorKind::RainGauge => {
                // One bucket tip every third cycle, otherwise dry.
                if self.tick % 3 == 0 {
                    Value::Float(self.bucket_size_mm)
                } else {
                    Value::Float(0.0)
                }
            }
            SensorKind::FloodSensor => Value::Int(0),
            SensorKind::TempHumidity => Value::FloatPair(21.5, 48.0),
        };
        Ok(value)
    }
}

/// Runs one sensor worker forever: read on a fixed cycle, append to the
/// buffer only while the client is registered (spec.md §4.6). A cycle that
/// overruns its target never stalls the next one — the append is simply
/// skipped for that tick.
pub async fn run_worker(
    mut sensor: Box<dyn SensorSource>,
    buffer: std::sync::Arc<crate::buffer::NodeBufferState>,
    config: std::sync::Arc<crate::config::Config>,
    shutdown: crate::shutdown::Shutdown,
    cycle: Duration,
) {
    loop {
        if shutdown.is_set() {
            return;
        }
        let started = tokio::time::Instant::now();

        match sensor.read().await {
            Ok(value) => {
                let reading = fieldproto::model::Reading {
                    sensor: sensor.kind(),
                    value,
                    station_id: config.station_id,
                    lat_deg: config.gps_lat,
                    lon_deg: config.gps_lon,
                };
                buffer.push_if_ready(reading).await;
            }
            Err(err) => {
                tracing::warn!(sensor = %sensor.kind(), error = %err, "sensor read failed");
            }
        }

        let elapsed = started.elapsed();
        if elapsed < cycle {
            tokio::time::sleep(cycle - elapsed).await;
        } else {
            tracing::debug!(sensor = %sensor.kind(), "cycle overran target; skipping sleep");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn mock_rain_gauge_ticks_a_bucket_every_third_read() {
        let mut sensor = MockSensor::new(SensorKind::RainGauge, 0.2794);
        let values: Vec<Value> = futures_values(&mut sensor, 3).await;
        assert_eq!(values[2], Value::Float(0.2794));
    }

    async fn futures_values(sensor: &mut MockSensor, n: usize) -> Vec<Value> {
        let mut out = Vec::with_capacity(n);
        for _ in 0..n {
            out.push(sensor.read().await.unwrap());
        }
        out
    }
}
