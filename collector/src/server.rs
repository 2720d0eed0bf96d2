//! TCP accept loop and per-connection state machine (spec.md §4.1).

use crate::config::Config;
use crate::queue::BatchQueue;
use crate::registry::{ConnToken, Registry};
use crate::shutdown::Shutdown;
use chrono::{Timelike, Utc};
use fieldproto::error::ProtocolError;
use fieldproto::framing::{
    self, CONNECTED, DATA_RECEIVED, ID_RECEIVED, PROTOCOL_ERROR, READY_TO_INDEX,
};
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};

static NEXT_TOKEN: AtomicU64 = AtomicU64::new(1);

fn next_token() -> ConnToken {
    NEXT_TOKEN.fetch_add(1, Ordering::Relaxed)
}

/// Accepts connections until shutdown, re-polling every
/// `config.accept_poll_interval` so the loop can observe the shutdown flag
/// without blocking forever inside `accept()` (spec.md §4.1 "The server
/// itself re-accepts with a 1 s poll").
pub async fn run(
    listener: TcpListener,
    registry: Arc<Registry>,
    queue: Arc<BatchQueue>,
    config: Arc<Config>,
    shutdown: Shutdown,
) {
    loop {
        if shutdown.is_set() {
            tracing::info!("accept loop observed shutdown; exiting");
            return;
        }
        let accept = tokio::time::timeout(config.accept_poll_interval, listener.accept()).await;
        let (stream, remote_addr) = match accept {
            Ok(Ok(pair)) => pair,
            Ok(Err(err)) => {
                tracing::warn!(error=%err, "accept failed");
                continue;
            }
            Err(_elapsed) => continue,
        };

        let registry = Arc::clone(&registry);
        let queue = Arc::clone(&queue);
        let config = Arc::clone(&config);
        let shutdown = shutdown.clone();
        tokio::spawn(async move {
            if let Err(err) =
                handle_connection(stream, remote_addr, registry, queue, config, shutdown).await
            {
                tracing::debug!(error=%err, peer=%remote_addr, "connection closed");
            }
        });
    }
}

/// Seconds to sleep so the next wake lands on (or just after) the next
/// whole-minute boundary, per spec.md §4.1 state *Registered*: `60 - second -
/// microsecond/1e6`, plus another 60 s if that would be under 5 s away (so a
/// pulse that just fired doesn't double-fire a moment later).
fn seconds_until_next_pulse(now: chrono::DateTime<Utc>) -> f64 {
    let second = now.second() as f64;
    let micros = now.timestamp_subsec_micros() as f64;
    let mut wait = 60.0 - second - micros / 1_000_000.0;
    if wait < 5.0 {
        wait += 60.0;
    }
    wait
}

/// Sleeps in short interruptible increments so a shutdown request is
/// observed promptly. Returns `false` if shutdown fired during the sleep.
async fn sleep_until_next_pulse(shutdown: &Shutdown) -> bool {
    let mut remaining = Duration::from_secs_f64(seconds_until_next_pulse(Utc::now()).max(0.0));
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

async fn handle_connection(
    mut stream: TcpStream,
    remote_addr: SocketAddr,
    registry: Arc<Registry>,
    queue: Arc<BatchQueue>,
    config: Arc<Config>,
    shutdown: Shutdown,
) -> anyhow::Result<()> {
    let token = next_token();
    let node_id = match handshake(&mut stream, remote_addr, &config).await {
        Ok(id) => id,
        Err(err) => {
            tracing::debug!(error=%err, peer=%remote_addr, "handshake failed");
            return Ok(());
        }
    };
    registry.insert(node_id.clone(), token).await;
    tracing::info!(node_id = %node_id, "node registered");

    let result = registered_loop(&mut stream, &node_id, &queue, &config, &shutdown).await;
    registry.remove_if_current(&node_id, token).await;
    if let Err(err) = &result {
        tracing::info!(node_id = %node_id, error = %err, "connection closed");
    } else {
        tracing::info!(node_id = %node_id, "connection closed (shutdown)");
    }
    let _ = stream.shutdown().await;
    Ok(())
}

/// States *Accepted* → *AwaitingId* → registry insert, returning the
/// qualified node id on success.
async fn handshake<S>(
    stream: &mut S,
    remote_addr: SocketAddr,
    config: &Config,
) -> anyhow::Result<String>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    framing::write_all_deadline(stream, CONNECTED, config.handshake_timeout).await?;

    let declared = match framing::read_declared_id(stream, config.handshake_timeout).await {
        Ok(id) => id,
        Err(ProtocolError::OversizedId) => {
            let _ =
                framing::write_all_deadline(stream, PROTOCOL_ERROR, config.handshake_timeout).await;
            anyhow::bail!("oversized declared id from {remote_addr}");
        }
        Err(err) => return Err(err.into()),
    };
    if declared.trim().is_empty() {
        anyhow::bail!("empty declared id");
    }

    framing::write_all_deadline(stream, ID_RECEIVED, config.handshake_timeout).await?;
    Ok(format!("{declared}-{}", remote_addr.port()))
}

/// State *Registered* ↔ *AwaitingLength* ↔ *AwaitingBody*, looping once per
/// minute pulse until the connection or shutdown ends it.
async fn registered_loop<S>(
    stream: &mut S,
    node_id: &str,
    queue: &BatchQueue,
    config: &Config,
    shutdown: &Shutdown,
) -> anyhow::Result<()>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    loop {
        if !sleep_until_next_pulse(shutdown).await {
            return Ok(());
        }

        framing::write_all_deadline(stream, READY_TO_INDEX, config.ready_send_timeout).await?;

        let mut prefix = [0u8; framing::LENGTH_PREFIX_LEN];
        let read_result = framing::read_exact_deadline(stream, &mut prefix, config.body_timeout).await;
        if let Err(err) = read_result {
            return Err(err.into());
        }

        let len = match framing::parse_length_prefix(&prefix) {
            Ok(len) if len <= framing::MAX_BODY_LEN => len,
            _ => {
                let _ = framing::write_all_deadline(stream, PROTOCOL_ERROR, config.body_timeout).await;
                anyhow::bail!("bad length prefix from {node_id}");
            }
        };

        // Sends the acknowledgment before the body is read or parsed,
        // preserving the upstream wire behavior documented in spec.md §9 —
        // the name promises more than TCP-level receipt guarantees.
        framing::write_all_deadline(stream, DATA_RECEIVED, config.body_timeout).await?;

        let body = framing::read_body_deadline(stream, len, config.body_timeout).await?;
        if body == b"NO_DATA" {
            continue;
        }
        match fieldproto::model::decode_body(&body) {
            Ok(readings) if readings.is_empty() => {}
            Ok(readings) => queue.push_back((readings, node_id.to_string())).await,
            Err(err) => {
                tracing::warn!(node_id = %node_id, error = %err, "dropping undecodable batch");
            }
        }
    }
}
