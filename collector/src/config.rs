use anyhow::Result;
use dotenvy::dotenv;
use fieldproto::env::{env_bool, env_optional, env_string, env_u16, env_u64};
use std::path::PathBuf;
use std::time::Duration;

/// Collector-side configuration, parsed per spec.md §6's configuration
/// table. Follows the `Config::from_env` shape of the teacher's
/// `node-forwarder::config`/`telemetry-sidecar::config`.
#[derive(Debug, Clone)]
pub struct Config {
    pub bind_addr: String,
    pub data_dir: PathBuf,
    pub template_path: PathBuf,

    pub ckan_url: Option<String>,
    pub base_url: Option<String>,
    pub ckan_org: Option<String>,
    pub campaign_id: Option<String>,
    pub upload_userid: Option<String>,
    pub upload_password: Option<String>,

    pub mint_url: Option<String>,
    pub mint_identity_url: Option<String>,
    pub mint_username: Option<String>,
    pub mint_password: Option<String>,
    pub mint_problem_statement_id: String,
    pub mint_task_id: String,
    pub mint_subtask_id: String,
    pub mint_model_id: String,
    pub mint_parameter_id: String,
    pub flood_streamflow_threshold_m3s: f64,
    pub usgs_site: String,

    pub handshake_timeout: Duration,
    pub ready_send_timeout: Duration,
    pub body_timeout: Duration,
    pub accept_poll_interval: Duration,

    pub enable_upload: bool,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        dotenv().ok();

        let receiver_port = env_u16("RECEIVER_PORT", Some(4040))?;
        let bind_addr = format!("0.0.0.0:{receiver_port}");

        let data_dir = PathBuf::from(
            env_string("COLLECTOR_DATA_DIR", Some("./data")).unwrap_or_else(|_| "./data".into()),
        );
        let template_path = data_dir.join("sensor_template.csv");

        let ckan_url = env_optional("CKAN_URL");
        let base_url = env_optional("BASE_URL");
        let ckan_org = env_optional("CKAN_ORG");
        let campaign_id = env_optional("CAMPAIGN_ID");
        let upload_userid = env_optional("userid");
        let upload_password = env_optional("password");

        let mint_url = env_optional("MINT_URL");
        let mint_identity_url = env_optional("MINT_IDENTITY_URL");
        let mint_username = env_optional("MINT_USERNAME");
        let mint_password = env_optional("MINT_PASSWORD");
        let mint_problem_statement_id = env_string("MINT_PROBLEM_STATEMENT_ID", Some(""))?;
        let mint_task_id = env_string("MINT_TASK_ID", Some(""))?;
        let mint_subtask_id = env_string("MINT_SUBTASK_ID", Some(""))?;
        let mint_model_id = env_string("MINT_MODEL_ID", Some(""))?;
        let mint_parameter_id = env_string("MINT_PARAMETER_ID", Some("streamflow"))?;
        let flood_streamflow_threshold_m3s = env_string("FLOOD_STREAMFLOW_THRESHOLD_M3S", Some("50"))
            .ok()
            .and_then(|v| v.parse::<f64>().ok())
            .unwrap_or(50.0);
        let usgs_site = env_string("USGS_SITE", Some("15304000"))?;

        let enable_upload = env_bool("COLLECTOR_ENABLE_UPLOAD", base_url.is_some() || ckan_url.is_some());

        Ok(Self {
            bind_addr,
            data_dir,
            template_path,
            ckan_url,
            base_url,
            ckan_org,
            campaign_id,
            upload_userid,
            upload_password,
            mint_url,
            mint_identity_url,
            mint_username,
            mint_password,
            mint_problem_statement_id,
            mint_task_id,
            mint_subtask_id,
            mint_model_id,
            mint_parameter_id,
            flood_streamflow_threshold_m3s,
            usgs_site,
            handshake_timeout: Duration::from_secs(45),
            ready_send_timeout: Duration::from_secs(15),
            body_timeout: Duration::from_secs(80),
            accept_poll_interval: Duration::from_secs(1),
            enable_upload,
        })
    }

    pub fn station_id(&self) -> String {
        env_optional("STATION_ID").unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_bind_to_4040() {
        std::env::remove_var("RECEIVER_PORT");
        let config = Config::from_env().unwrap();
        assert!(config.bind_addr.ends_with(":4040"));
    }
}
