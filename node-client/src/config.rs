use fieldproto::env::{env_f64, env_optional, env_string, env_u16};

/// Node-side configuration (spec.md §6 configuration table).
#[derive(Debug, Clone)]
pub struct Config {
    pub receiver_host: String,
    pub receiver_port: u16,

    pub node_id: String,
    pub station_id: Option<i64>,
    pub gps_lat: Option<f64>,
    pub gps_lon: Option<f64>,

    pub bucket_size_mm: f64,

    /// GPIO channel identifiers. Sensor acquisition is opaque per spec.md §1
    /// Non-goals; these are carried through to the log line that announces
    /// which channel a `MockSensor` is standing in for.
    pub rainfall_sensor_channel: Option<String>,
    pub flood_sensor_channel: Option<String>,
    pub temp_humid_sensor_channel: Option<String>,
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        dotenvy::dotenv().ok();

        // spec.md §6: "node falls back to 127.0.0.1 if invoked with any CLI
        // argument" — preserved from the original deployment tooling, where a
        // CLI arg signals a test/offline invocation that shouldn't reach out
        // to the configured collector host.
        let receiver_host = if std::env::args().count() > 1 {
            "127.0.0.1".to_string()
        } else {
            env_string("RECEIVER_HOST", Some("127.0.0.1"))?
        };
        let receiver_port = env_u16("RECEIVER_PORT", Some(4040))?;

        let prefix = env_optional("NODE_PREFIX")
            .or_else(|| env_optional("NODE_ID"))
            .unwrap_or_else(|| "node".to_string());
        let node_id = format!("NODE_{prefix}");

        let station_id = env_optional("STATION_ID").and_then(|v| v.parse::<i64>().ok());
        let gps_lat = env_optional("GPS_LAT").and_then(|v| v.parse::<f64>().ok());
        let gps_lon = env_optional("GPS_LON").and_then(|v| v.parse::<f64>().ok());

        let bucket_size_mm = env_f64("BUCKET_SIZE", Some(0.2794))?;

        Ok(Self {
            receiver_host,
            receiver_port,
            node_id,
            station_id,
            gps_lat,
            gps_lon,
            bucket_size_mm,
            rainfall_sensor_channel: env_optional("RAINFALL_SENSOR"),
            flood_sensor_channel: env_optional("FLOOD_SENSOR"),
            temp_humid_sensor_channel: env_optional("TEMP_&_HUMID_SENSOR"),
        })
    }

    pub fn collector_addr(&self) -> String {
        format!("{}:{}", self.receiver_host, self.receiver_port)
    }
}
