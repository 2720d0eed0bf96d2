//! Flood-event hydrological model job submission (spec.md §4.4).
//!
//! Grounded on `original_source/utils.py` (`get_streamflow_data`,
//! `set_model_parameters`, `submit_subtask`): fetch the latest USGS
//! instantaneous-values reading, convert ft³/s to m³/s, and if the
//! converted value clears a threshold, push it into the task service as a
//! model parameter and submit the subtask. Fire-and-forget: failures are
//! logged only and never propagate back into the CSV writer (spec.md §7).

use crate::config::Config;
use anyhow::{anyhow, Context, Result};
use serde_json::json;

const USGS_BASE_URL: &str = "https://waterservices.usgs.gov/nwis/iv/";
const FT3S_TO_M3S: f64 = 35.315;

/// Spawns the fire-and-forget submission task. Called by the CSV writer the
/// moment it observes `Flooding == 1` in a row (spec.md §4.2, §4.4).
pub fn spawn(config: Config) {
    tokio::spawn(async move {
        if let Err(err) = run(&config).await {
            tracing::warn!(error=%err, "flood job submission failed");
        }
    });
}

async fn run(config: &Config) -> Result<()> {
    let Some(mint_url) = config.mint_url.as_deref() else {
        tracing::debug!("MINT_URL not configured; skipping flood job submission");
        return Ok(());
    };

    let client = reqwest::Client::new();
    let streamflow_m3s = fetch_streamflow_m3s(&client, &config.usgs_site).await?;
    tracing::info!(streamflow_m3s, "fetched latest USGS streamflow reading");

    if streamflow_m3s < config.flood_streamflow_threshold_m3s {
        tracing::info!(
            streamflow_m3s,
            threshold = config.flood_streamflow_threshold_m3s,
            "streamflow below threshold; not submitting flood job"
        );
        return Ok(());
    }

    let auth_token = fetch_auth_token(&client, config).await?;
    set_parameters(&client, mint_url, config, streamflow_m3s, auth_token.as_deref()).await?;
    submit(&client, mint_url, config, auth_token.as_deref()).await?;
    tracing::info!("flood job submitted successfully");
    Ok(())
}

/// Fetches the latest streamflow reading and converts it from ft³/s to
/// m³/s, matching `original_source/utils.py::get_streamflow_data`.
async fn fetch_streamflow_m3s(client: &reqwest::Client, site: &str) -> Result<f64> {
    let response = client
        .get(USGS_BASE_URL)
        .query(&[("format", "json"), ("sites", site), ("siteStatus", "all")])
        .send()
        .await
        .context("USGS request failed")?;
    let body: serde_json::Value = response.json().await.context("USGS response not JSON")?;

    let series = body["value"]["timeSeries"]
        .as_array()
        .ok_or_else(|| anyhow!("USGS response missing timeSeries"))?;

    for entry in series {
        let code = entry["variable"]["variableCode"][0]["value"].as_str();
        if code != Some("00060") {
            continue;
        }
        let value_str = entry["values"][0]["value"][0]["value"]
            .as_str()
            .ok_or_else(|| anyhow!("streamflow value missing"))?;
        let ft3_per_s: f64 = value_str.parse().context("streamflow value not numeric")?;
        return Ok(ft3_per_s / FT3S_TO_M3S);
    }

    Err(anyhow!("no series with variable code 00060 in USGS response"))
}

/// Obtains an auth token from the configured identity provider. Absent
/// `MINT_IDENTITY_URL`/credentials, the submission proceeds unauthenticated
/// (some deployments front the task service with network-level auth only).
async fn fetch_auth_token(client: &reqwest::Client, config: &Config) -> Result<Option<String>> {
    let (Some(identity_url), Some(username), Some(password)) = (
        config.mint_identity_url.as_deref(),
        config.mint_username.as_deref(),
        config.mint_password.as_deref(),
    ) else {
        return Ok(None);
    };

    let response = client
        .post(identity_url)
        .basic_auth(username, Some(password))
        .send()
        .await
        .context("identity provider request failed")?;
    let body: serde_json::Value = response.json().await.context("identity response not JSON")?;
    let token = body["access_token"]
        .as_str()
        .or_else(|| body["token"].as_str())
        .map(str::to_string);
    Ok(token)
}

fn subtask_endpoint(mint_url: &str, config: &Config, suffix: &str) -> String {
    format!(
        "{}/problemStatements/{}/tasks/{}/subtasks/{}/{}",
        mint_url.trim_end_matches('/'),
        config.mint_problem_statement_id,
        config.mint_task_id,
        config.mint_subtask_id,
        suffix,
    )
}

async fn set_parameters(
    client: &reqwest::Client,
    mint_url: &str,
    config: &Config,
    streamflow_m3s: f64,
    auth_token: Option<&str>,
) -> Result<()> {
    let endpoint = subtask_endpoint(mint_url, config, "parameters");
    let payload = json!({
        "modelId": config.mint_model_id,
        "parameters": [
            { "id": config.mint_parameter_id, "value": streamflow_m3s as i64 }
        ]
    });
    post_with_optional_bearer(client, &endpoint, &payload, auth_token)
        .await
        .context("set parameters request failed")?;
    Ok(())
}

async fn submit(
    client: &reqwest::Client,
    mint_url: &str,
    config: &Config,
    auth_token: Option<&str>,
) -> Result<()> {
    let endpoint = subtask_endpoint(mint_url, config, "submit");
    post_with_optional_bearer(client, &endpoint, &json!({}), auth_token)
        .await
        .context("submit request failed")?;
    Ok(())
}

async fn post_with_optional_bearer(
    client: &reqwest::Client,
    endpoint: &str,
    payload: &serde_json::Value,
    auth_token: Option<&str>,
) -> Result<()> {
    let mut request = client.post(endpoint).json(payload);
    if let Some(token) = auth_token {
        request = request.bearer_auth(token);
    }
    let response = request.send().await?;
    if !response.status().is_success() {
        anyhow::bail!("{endpoint} responded with {}", response.status());
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn subtask_endpoint_composes_path() {
        let mut config_for_test = test_config();
        config_for_test.mint_problem_statement_id = "ps1".into();
        config_for_test.mint_task_id = "t1".into();
        config_for_test.mint_subtask_id = "st1".into();
        let url = subtask_endpoint("https://mint.example/v1/", &config_for_test, "submit");
        assert_eq!(
            url,
            "https://mint.example/v1/problemStatements/ps1/tasks/t1/subtasks/st1/submit"
        );
    }

    fn test_config() -> Config {
        Config {
            bind_addr: "0.0.0.0:4040".into(),
            data_dir: "./data".into(),
            template_path: "./data/sensor_template.csv".into(),
            ckan_url: None,
            base_url: None,
            ckan_org: None,
            campaign_id: None,
            upload_userid: None,
            upload_password: None,
            mint_url: None,
            mint_identity_url: None,
            mint_username: None,
            mint_password: None,
            mint_problem_statement_id: String::new(),
            mint_task_id: String::new(),
            mint_subtask_id: String::new(),
            mint_model_id: String::new(),
            mint_parameter_id: "streamflow".into(),
            flood_streamflow_threshold_m3s: 50.0,
            usgs_site: "15304000".into(),
            handshake_timeout: std::time::Duration::from_secs(45),
            ready_send_timeout: std::time::Duration::from_secs(15),
            body_timeout: std::time::Duration::from_secs(80),
            accept_poll_interval: std::time::Duration::from_secs(1),
            enable_upload: false,
        }
    }
}
