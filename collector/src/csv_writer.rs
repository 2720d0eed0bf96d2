//! Single background worker consuming `(batch, nodeId)` pairs (spec.md §4.2).

use crate::active_file::ActiveFile;
use crate::config::Config;
use crate::csv_row::flatten;
use crate::flood_job;
use crate::queue::BatchQueue;
use crate::rotation::rotate;
use crate::shutdown::Shutdown;
use crate::uploader::Uploader;
use std::sync::Arc;
use std::time::{Duration, Instant};

const ROTATION_CHECK_INTERVAL: Duration = Duration::from_secs(1);
const ROTATION_PERIOD: Duration = Duration::from_secs(3600);
const WRITE_RETRY_SLEEP: Duration = Duration::from_secs(10);

/// Drives the writer until shutdown, then drains whatever is left in the
/// queue before returning (spec.md §5 "the writer drains remaining queue
/// items and exits").
pub async fn run(
    queue: Arc<BatchQueue>,
    active: Arc<ActiveFile>,
    config: Arc<Config>,
    uploader: Option<Arc<dyn Uploader>>,
    shutdown: Shutdown,
) {
    let mut last_rotation = Instant::now();

    loop {
        if shutdown.is_set() {
            break;
        }
        match queue.pop_front_timeout(ROTATION_CHECK_INTERVAL).await {
            Some(item) => {
                if process_item(item, &queue, &active).await {
                    flood_job::spawn((*config).clone());
                }
            }
            None => {
                if last_rotation.elapsed() >= ROTATION_PERIOD {
                    if let Err(err) = rotate(&active, &config, uploader.clone()).await {
                        tracing::error!(error = %err, "hourly rotation failed");
                    }
                    last_rotation = Instant::now();
                }
            }
        }
    }

    tracing::info!("writer draining remaining queue items before exit");
    for item in queue.drain().await {
        if process_item(item, &queue, &active).await {
            flood_job::spawn((*config).clone());
        }
    }
}

/// Appends the batch's flattened row, if any, and reports whether it
/// observed `Flooding == 1` so the caller can trigger §4.4.
async fn process_item(item: crate::queue::BatchItem, queue: &BatchQueue, active: &ActiveFile) -> bool {
    let (readings, node_id) = item;
    let Some(row) = flatten(&readings, &node_id) else {
        return false;
    };

    let path = active.snapshot().await;
    match append_line(&path, &row.to_csv_line()).await {
        Ok(()) => row.flooding == Some(1),
        Err(err) => {
            tracing::error!(
                error = %err,
                path = %path.display(),
                node_id = %node_id,
                "append failed; re-enqueuing batch"
            );
            queue.push_front((readings, node_id)).await;
            tokio::time::sleep(WRITE_RETRY_SLEEP).await;
            false
        }
    }
}

async fn append_line(path: &std::path::Path, line: &str) -> anyhow::Result<()> {
    use tokio::io::AsyncWriteExt;
    let mut file = tokio::fs::OpenOptions::new()
        .append(true)
        .open(path)
        .await?;
    file.write_all(line.as_bytes()).await?;
    file.write_all(b"\n").await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::csv_row::HEADER;
    use fieldproto::model::{Reading, SensorKind, Value};

    #[tokio::test]
    async fn appends_flattened_row_to_active_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("metrics_data_20260728_130000.csv");
        tokio::fs::write(&path, format!("{HEADER}\n")).await.unwrap();
        let active = ActiveFile::new(path.clone());
        let queue = BatchQueue::new();

        let reading = Reading {
            sensor: SensorKind::RainGauge,
            value: Value::Float(0.5),
            station_id: Some(1),
            lat_deg: None,
            lon_deg: None,
        };
        process_item((vec![reading], "NODE_a-1".to_string()), &queue, &active).await;

        let contents = tokio::fs::read_to_string(&path).await.unwrap();
        assert_eq!(contents.lines().count(), 2);
        assert!(contents.lines().nth(1).unwrap().starts_with("0.5,,,"));
    }

    #[tokio::test]
    async fn empty_batch_writes_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("metrics_data_20260728_130000.csv");
        tokio::fs::write(&path, format!("{HEADER}\n")).await.unwrap();
        let active = ActiveFile::new(path.clone());
        let queue = BatchQueue::new();

        process_item((vec![], "NODE_a-1".to_string()), &queue, &active).await;

        let contents = tokio::fs::read_to_string(&path).await.unwrap();
        assert_eq!(contents.lines().count(), 1);
    }
}
