mod buffer;
mod client;
mod config;
mod sensors;
mod shutdown;

use crate::buffer::NodeBufferState;
use crate::config::Config;
use crate::sensors::MockSensor;
use crate::shutdown::Shutdown;
use anyhow::Result;
use fieldproto::model::SensorKind;
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

/// Cycle target for sensor workers, leaving slack against the one-minute
/// pulse (spec.md §4.6).
const SENSOR_CYCLE: Duration = Duration::from_secs(55);

fn init_tracing() {
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "info,node_client=info".into());
    let fmt_layer = tracing_subscriber::fmt::layer().with_target(true);
    tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt_layer)
        .init();
}

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();

    let config = Arc::new(Config::from_env()?);
    tracing::info!(node_id = %config.node_id, collector = %config.collector_addr(), "starting node client");

    let buffer = Arc::new(NodeBufferState::new());
    let shutdown = Shutdown::new();

    let sensor_kinds = [
        SensorKind::RainGauge,
        SensorKind::FloodSensor,
        SensorKind::TempHumidity,
    ];
    let mut sensor_tasks = Vec::new();
    for kind in sensor_kinds {
        let sensor: Box<dyn sensors::SensorSource> =
            Box::new(MockSensor::new(kind, config.bucket_size_mm));
        let buffer = Arc::clone(&buffer);
        let config = Arc::clone(&config);
        let shutdown = shutdown.clone();
        sensor_tasks.push(tokio::spawn(sensors::run_worker(
            sensor, buffer, config, shutdown, SENSOR_CYCLE,
        )));
    }

    let client_task = tokio::spawn(client::run(
        Arc::clone(&config),
        Arc::clone(&buffer),
        shutdown.clone(),
    ));

    tokio::signal::ctrl_c().await?;
    tracing::info!("shutdown signal received");
    shutdown.set();

    let _ = client_task.await;
    for task in sensor_tasks {
        let _ = task.await;
    }
    tracing::info!("node client shut down cleanly");
    Ok(())
}
