use crate::config::Config;
use anyhow::{Context, Result};
use async_trait::async_trait;
use std::path::Path;

/// Hands a closed hourly file off to the external data-repository service.
/// The service's own API is a Non-goal (spec.md §1); this trait is the
/// boundary the rest of the collector depends on, so tests can substitute a
/// fake without a network.
#[async_trait]
pub trait Uploader: Send + Sync {
    async fn upload(
        &self,
        file_path: &Path,
        template_path: &Path,
        campaign_id: &str,
        station_id: &str,
    ) -> Result<()>;
}

/// Best-effort HTTP client for the external uploader, matching the call
/// signature in spec.md §4.3. Per the Non-goal on the service's internal
/// API, this is an honest thin POST, not a full client for that service.
pub struct HttpUploader {
    client: reqwest::Client,
    endpoint: String,
    org: Option<String>,
    userid: Option<String>,
    password: Option<String>,
}

impl HttpUploader {
    pub fn from_config(config: &Config) -> Option<Self> {
        let endpoint = config.base_url.clone().or_else(|| config.ckan_url.clone())?;
        Some(Self {
            client: reqwest::Client::new(),
            endpoint,
            org: config.ckan_org.clone(),
            userid: config.upload_userid.clone(),
            password: config.upload_password.clone(),
        })
    }
}

#[async_trait]
impl Uploader for HttpUploader {
    async fn upload(
        &self,
        file_path: &Path,
        template_path: &Path,
        campaign_id: &str,
        station_id: &str,
    ) -> Result<()> {
        let file_bytes = tokio::fs::read(file_path)
            .await
            .with_context(|| format!("read {}", file_path.display()))?;
        let template_bytes = tokio::fs::read(template_path)
            .await
            .with_context(|| format!("read {}", template_path.display()))?;

        let file_name = file_path
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or("metrics_data.csv")
            .to_string();

        let mut form = reqwest::multipart::Form::new()
            .text("campaign_id", campaign_id.to_string())
            .text("station_id", station_id.to_string())
            .part(
                "file",
                reqwest::multipart::Part::bytes(file_bytes).file_name(file_name),
            )
            .part(
                "template",
                reqwest::multipart::Part::bytes(template_bytes).file_name("sensor_template.csv"),
            );
        if let Some(org) = &self.org {
            form = form.text("org", org.clone());
        }

        let mut request = self.client.post(&self.endpoint).multipart(form);
        if let (Some(user), Some(pass)) = (&self.userid, &self.password) {
            request = request.basic_auth(user, Some(pass));
        }

        let response = request.send().await.context("upload request failed")?;
        if !response.status().is_success() {
            anyhow::bail!("uploader responded with {}", response.status());
        }
        Ok(())
    }
}
