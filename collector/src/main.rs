mod active_file;
mod config;
mod csv_row;
mod csv_writer;
mod flood_job;
mod queue;
mod registry;
mod rotation;
mod server;
mod shutdown;
mod template;
mod uploader;

use crate::active_file::ActiveFile;
use crate::config::Config;
use crate::queue::BatchQueue;
use crate::registry::Registry;
use crate::rotation::{create_with_header, next_hour_path};
use crate::shutdown::Shutdown;
use crate::uploader::{HttpUploader, Uploader};
use anyhow::{Context, Result};
use chrono::Utc;
use std::process::ExitCode;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

fn init_tracing() {
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "info,collector=info".into());
    let fmt_layer = tracing_subscriber::fmt::layer().with_target(true);
    tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt_layer)
        .init();
}

#[tokio::main]
async fn main() -> ExitCode {
    init_tracing();

    match run().await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            tracing::error!(error = %err, "collector exited with a fatal error");
            ExitCode::FAILURE
        }
    }
}

async fn run() -> Result<()> {
    let config = Config::from_env().context("load configuration")?;

    // Fatal startup per spec.md §6 exit codes: an unwritable template file
    // means the uploader can never be satisfied, so there's no point
    // accepting connections.
    template::write_template(&config.template_path).context("materialize sensor template")?;

    let listener = TcpListener::bind(&config.bind_addr)
        .await
        .with_context(|| format!("bind {}", config.bind_addr))?;
    tracing::info!(addr = %config.bind_addr, "collector listening");
    tracing::warn!(
        "protocol note: DATA_RECEIVED is sent before the body is read or parsed \
         (spec-preserved wire behavior); a dropped/undecodable body is not reflected \
         in the ack the node just received"
    );

    let initial_path = next_hour_path(&config.data_dir, Utc::now());
    rotation_bootstrap(&initial_path).await?;

    let config = Arc::new(config);
    let registry = Arc::new(Registry::new());
    let queue = Arc::new(BatchQueue::new());
    let active = Arc::new(ActiveFile::new(initial_path));
    let shutdown = Shutdown::new();

    let uploader: Option<Arc<dyn Uploader>> = if config.enable_upload {
        HttpUploader::from_config(&config).map(|u| Arc::new(u) as Arc<dyn Uploader>)
    } else {
        None
    };
    if config.enable_upload && uploader.is_none() {
        tracing::warn!("COLLECTOR_ENABLE_UPLOAD set but BASE_URL/CKAN_URL missing; uploads disabled");
    }

    let accept_task = tokio::spawn(server::run(
        listener,
        Arc::clone(&registry),
        Arc::clone(&queue),
        Arc::clone(&config),
        shutdown.clone(),
    ));
    let writer_task = tokio::spawn(csv_writer::run(
        Arc::clone(&queue),
        Arc::clone(&active),
        Arc::clone(&config),
        uploader,
        shutdown.clone(),
    ));

    tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("shutdown signal received");
        }
    }
    shutdown.set();

    let _ = accept_task.await;
    let _ = writer_task.await;
    tracing::info!("collector shut down cleanly");
    Ok(())
}

/// Creates the first active file if it doesn't already exist (a restart
/// mid-hour should not clobber an in-progress file).
async fn rotation_bootstrap(path: &std::path::Path) -> Result<()> {
    if tokio::fs::metadata(path).await.is_ok() {
        return Ok(());
    }
    create_with_header(path).await
}
