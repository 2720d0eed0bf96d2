//! Hourly rotation and upload hand-off (spec.md §4.3).

use crate::active_file::ActiveFile;
use crate::config::Config;
use crate::csv_row::HEADER;
use crate::uploader::Uploader;
use anyhow::{Context, Result};
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use std::path::{Path, PathBuf};
use std::sync::Arc;

const UTF8_BOM: &[u8] = b"\xEF\xBB\xBF";

/// `metrics_data_YYYYMMDD_HH0000.csv` for the hour strictly after `from`
/// (spec.md §4.3 step 2 — "the *next* file path").
pub fn next_hour_path(data_dir: &Path, from: DateTime<Utc>) -> PathBuf {
    let next_hour_start = (from + ChronoDuration::hours(1))
        .date_naive()
        .and_hms_opt(from_hour_after(from), 0, 0)
        .unwrap_or_else(|| from.naive_utc());
    let stamp = next_hour_start.format("%Y%m%d_%H0000");
    data_dir.join(format!("metrics_data_{stamp}.csv"))
}

fn from_hour_after(from: DateTime<Utc>) -> u32 {
    (from.format("%H").to_string().parse::<u32>().unwrap_or(0) + 1) % 24
}

/// Creates `path` (and parent dirs) with a BOM-prefixed CSV header, per
/// spec.md §6 ("UTF-8 with BOM").
pub(crate) async fn create_with_header(path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent)
            .await
            .with_context(|| format!("create dir {}", parent.display()))?;
    }
    let mut contents = Vec::with_capacity(UTF8_BOM.len() + HEADER.len() + 1);
    contents.extend_from_slice(UTF8_BOM);
    contents.extend_from_slice(HEADER.as_bytes());
    contents.push(b'\n');
    tokio::fs::write(path, contents)
        .await
        .with_context(|| format!("create {}", path.display()))?;
    Ok(())
}

/// Runs the rotation sequence: snapshot the current path, create and install
/// the successor, then hand the snapshot to the uploader in its own task so
/// a slow or failing upload never blocks the writer (spec.md §4.3: "steps
/// 2–3 happen even if step 4 is going to fail").
pub async fn rotate(
    active: &ActiveFile,
    config: &Config,
    uploader: Option<Arc<dyn Uploader>>,
) -> Result<()> {
    let snapshot_path = active.snapshot().await;

    let next_path = next_hour_path(&config.data_dir, Utc::now());
    create_with_header(&next_path).await?;
    active.swap(next_path).await;

    tracing::info!(
        closed = %snapshot_path.display(),
        "rotated active file"
    );

    let Some(uploader) = uploader else {
        tracing::debug!("no uploader configured; leaving closed file on disk");
        return Ok(());
    };
    let template_path = config.template_path.clone();
    let campaign_id = config.campaign_id.clone().unwrap_or_default();
    let station_id = config.station_id();

    tokio::spawn(async move {
        match uploader
            .upload(&snapshot_path, &template_path, &campaign_id, &station_id)
            .await
        {
            Ok(()) => {
                if let Err(err) = tokio::fs::remove_file(&snapshot_path).await {
                    tracing::warn!(error=%err, path=%snapshot_path.display(), "failed to remove uploaded snapshot");
                }
            }
            Err(err) => {
                tracing::error!(
                    error=%err,
                    path=%snapshot_path.display(),
                    "upload failed; leaving snapshot on disk for manual retry"
                );
            }
        }
    });

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn next_hour_path_rolls_into_following_hour() {
        let from = Utc.with_ymd_and_hms(2026, 7, 28, 13, 59, 30).unwrap();
        let path = next_hour_path(Path::new("/data"), from);
        assert_eq!(
            path,
            PathBuf::from("/data/metrics_data_20260728_140000.csv")
        );
    }

    #[test]
    fn next_hour_path_rolls_into_next_day_at_midnight() {
        let from = Utc.with_ymd_and_hms(2026, 7, 28, 23, 10, 0).unwrap();
        let path = next_hour_path(Path::new("/data"), from);
        assert_eq!(
            path,
            PathBuf::from("/data/metrics_data_20260729_000000.csv")
        );
    }

    #[tokio::test]
    async fn create_with_header_writes_bom_and_header() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("metrics_data_20260728_140000.csv");
        create_with_header(&path).await.unwrap();
        let contents = tokio::fs::read(&path).await.unwrap();
        assert!(contents.starts_with(UTF8_BOM));
        let text = String::from_utf8(contents[UTF8_BOM.len()..].to_vec()).unwrap();
        assert!(text.starts_with(HEADER));
    }
}
