//! Connect loop and per-connection steady state (spec.md §4.5).

use crate::buffer::NodeBufferState;
use crate::config::Config;
use crate::shutdown::Shutdown;
use anyhow::{Context, Result};
use fieldproto::error::ProtocolError;
use fieldproto::framing::{self, CONNECTED, DATA_RECEIVED, ID_RECEIVED, READY_TO_INDEX};
use rand::Rng;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt};
use tokio::net::TcpStream;

const PULSE_DEADLINE: Duration = Duration::from_secs(90);
const RESIDUAL_DRAIN_DEADLINE: Duration = Duration::from_millis(100);
const ACK_DEADLINE: Duration = Duration::from_secs(50);
const SHORT_RETRY_SLEEP: Duration = Duration::from_secs(20);
const LONG_RETRY_SLEEP: Duration = Duration::from_secs(180);
const SHORT_RETRY_LIMIT: u32 = 4;

/// Maintains exactly one healthy connection to the collector, reconnecting
/// per spec.md §4.5's counter/backoff rule until shutdown.
pub async fn run(config: Arc<Config>, buffer: Arc<NodeBufferState>, shutdown: Shutdown) {
    let mut retry: u32 = 0;

    loop {
        if shutdown.is_set() {
            return;
        }

        match TcpStream::connect(config.collector_addr()).await {
            Ok(mut stream) => {
                tracing::info!(addr = %config.collector_addr(), "connected to collector");
                retry = 0;
                if let Err(err) = run_connection(&mut stream, &config, &buffer, &shutdown).await {
                    tracing::warn!(error = %err, "connection ended");
                }
                buffer.set_client_ready(false);
                let _ = stream.shutdown().await;
            }
            Err(err) => {
                tracing::warn!(error = %err, addr = %config.collector_addr(), "connect failed");
            }
        }

        if shutdown.is_set() {
            return;
        }

        retry += 1;
        let sleep_for = if retry < SHORT_RETRY_LIMIT {
            SHORT_RETRY_SLEEP + Duration::from_millis(rand::thread_rng().gen_range(0..5000))
        } else {
            retry = 0;
            LONG_RETRY_SLEEP
        };
        if !sleep_interruptible(sleep_for, &shutdown).await {
            return;
        }
    }
}

async fn sleep_interruptible(duration: Duration, shutdown: &Shutdown) -> bool {
    let mut remaining = duration;
    while remaining > Duration::ZERO {
        if shutdown.is_set() {
            return false;
        }
        let step = remaining.min(Duration::from_secs(1));
        tokio::time::sleep(step).await;
        remaining = remaining.saturating_sub(step);
    }
    !shutdown.is_set()
}

async fn run_connection<S>(
    stream: &mut S,
    config: &Config,
    buffer: &NodeBufferState,
    shutdown: &Shutdown,
) -> Result<()>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    framing::expect_literal(stream, CONNECTED, PULSE_DEADLINE)
        .await
        .context("expected CONNECTED")?;

    framing::write_all_deadline(stream, format!("{}\n", config.node_id).as_bytes(), PULSE_DEADLINE)
        .await
        .context("send declared node id")?;
    framing::expect_literal(stream, ID_RECEIVED, PULSE_DEADLINE)
        .await
        .context("expected ID_RECEIVED")?;
    buffer.set_client_ready(true);
    tracing::info!(node_id = %config.node_id, "registered with collector");

    loop {
        if shutdown.is_set() {
            return Ok(());
        }

        framing::expect_literal(stream, READY_TO_INDEX, PULSE_DEADLINE)
            .await
            .context("expected READY_TO_INDEX")?;
        drain_residual(stream).await;

        let readings = buffer.snapshot().await;
        let payload = fieldproto::model::encode_body(&readings);
        let mut frame = Vec::with_capacity(framing::LENGTH_PREFIX_LEN + payload.len());
        frame.extend_from_slice(&framing::encode_length_prefix(payload.len()));
        frame.extend_from_slice(payload.as_bytes());
        framing::write_all_deadline(stream, &frame, PULSE_DEADLINE)
            .await
            .context("send batch frame")?;

        match framing::expect_literal(stream, DATA_RECEIVED, ACK_DEADLINE).await {
            Ok(()) => {
                buffer.clear().await;
            }
            Err(ProtocolError::UnexpectedLiteral { got, .. })
                if got.as_slice() == &READY_TO_INDEX[..DATA_RECEIVED.len()] =>
            {
                anyhow::bail!("desync: received READY_TO_INDEX while awaiting DATA_RECEIVED");
            }
            Err(err) => return Err(err).context("expected DATA_RECEIVED"),
        }
    }
}

/// Absorbs any bytes the collector sends eagerly ahead of schedule, per
/// spec.md §4.5 step 3. A timeout (the expected case) just means there was
/// nothing to drain.
async fn drain_residual<S>(stream: &mut S)
where
    S: AsyncRead + Unpin,
{
    let mut scratch = [0u8; 64];
    loop {
        match tokio::time::timeout(RESIDUAL_DRAIN_DEADLINE, tokio::io::AsyncReadExt::read(stream, &mut scratch)).await
        {
            Ok(Ok(0)) | Err(_) => return,
            Ok(Ok(_)) => continue,
            Ok(Err(_)) => return,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fieldproto::model::SensorKind;

    fn test_config() -> Config {
        Config {
            receiver_host: "127.0.0.1".into(),
            receiver_port: 4040,
            node_id: "NODE_a".into(),
            station_id: Some(7),
            gps_lat: Some(60.79),
            gps_lon: Some(-161.78),
            bucket_size_mm: 0.2794,
            rainfall_sensor_channel: None,
            flood_sensor_channel: None,
            temp_humid_sensor_channel: None,
        }
    }

    #[tokio::test]
    async fn full_cycle_sends_snapshot_and_clears_on_ack() {
        let (mut server, mut client) = tokio::io::duplex(4096);
        let config = test_config();
        let buffer = Arc::new(NodeBufferState::new());
        buffer.set_client_ready(true);
        let reading = fieldproto::model::Reading {
            sensor: SensorKind::RainGauge,
            value: fieldproto::model::Value::Float(0.2794),
            station_id: config.station_id,
            lat_deg: config.gps_lat,
            lon_deg: config.gps_lon,
        };
        buffer.push_if_ready(reading.clone()).await;

        let shutdown = Shutdown::new();
        let buffer_for_client = Arc::clone(&buffer);
        let client_task = tokio::spawn(async move {
            // only drive the handshake + one pulse cycle, then force an error
            // to return from run_connection cleanly for the test
            let _ = run_connection(&mut client, &config, &buffer_for_client, &shutdown).await;
        });

        tokio::io::AsyncWriteExt::write_all(&mut server, CONNECTED).await.unwrap();
        let mut id_buf = vec![0u8; 16];
        let n = tokio::io::AsyncReadExt::read(&mut server, &mut id_buf).await.unwrap();
        assert_eq!(&id_buf[..n - 1], b"NODE_a");
        tokio::io::AsyncWriteExt::write_all(&mut server, ID_RECEIVED).await.unwrap();

        tokio::io::AsyncWriteExt::write_all(&mut server, READY_TO_INDEX).await.unwrap();

        let mut prefix = [0u8; framing::LENGTH_PREFIX_LEN];
        tokio::io::AsyncReadExt::read_exact(&mut server, &mut prefix).await.unwrap();
        let len = framing::parse_length_prefix(&prefix).unwrap();
        let mut body = vec![0u8; len];
        tokio::io::AsyncReadExt::read_exact(&mut server, &mut body).await.unwrap();
        let decoded = fieldproto::model::decode_body(&body).unwrap();
        assert_eq!(decoded, vec![reading]);

        tokio::io::AsyncWriteExt::write_all(&mut server, DATA_RECEIVED).await.unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(buffer.snapshot().await.is_empty());

        drop(server);
        let _ = client_task.await;
    }
}
