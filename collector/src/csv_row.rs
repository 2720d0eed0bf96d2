use chrono::Utc;
use fieldproto::model::{Reading, SensorKind, Value};

/// CSV header, verbatim from spec.md §6.
pub const HEADER: &str =
    "Precipitation,Temperature,Humidity,Flooding,Node_Id,Station_Id,collectiontime,Lat_deg,Lon_deg";

/// One row of the active hourly file (spec.md §3 "Observation row").
#[derive(Debug, Clone, PartialEq)]
pub struct ObservationRow {
    pub precipitation: Option<f64>,
    pub temperature: Option<f64>,
    pub humidity: Option<f64>,
    pub flooding: Option<u8>,
    pub node_id: String,
    pub station_id: Option<i64>,
    pub collection_time: String,
    pub lat_deg: Option<f64>,
    pub lon_deg: Option<f64>,
}

impl ObservationRow {
    pub fn to_csv_line(&self) -> String {
        let fields = [
            opt_to_string(self.precipitation),
            opt_to_string(self.temperature),
            opt_to_string(self.humidity),
            self.flooding.map(|v| v.to_string()).unwrap_or_default(),
            csv_quote(&self.node_id),
            self.station_id.map(|v| v.to_string()).unwrap_or_default(),
            csv_quote(&self.collection_time),
            opt_to_string(self.lat_deg),
            opt_to_string(self.lon_deg),
        ];
        fields.join(",")
    }
}

fn opt_to_string(v: Option<f64>) -> String {
    v.map(|v| v.to_string()).unwrap_or_default()
}

/// Escapes a field per RFC 4180 when it contains a comma, quote, or newline.
/// Node-declared ids are not guaranteed to be comma-free.
pub fn csv_quote(field: &str) -> String {
    if field.contains([',', '"', '\n', '\r']) {
        format!("\"{}\"", field.replace('"', "\"\""))
    } else {
        field.to_string()
    }
}

/// Flattens one batch's readings into a single row by reducing over the
/// sensor kinds present (spec.md §4.2). Unknown sensor kinds can't occur
/// post-decode (decoding itself rejects them, see `fieldproto::model`); an
/// empty or all-unrecognized batch yields `None` and the row is dropped.
pub fn flatten(readings: &[Reading], node_id: &str) -> Option<ObservationRow> {
    if readings.is_empty() {
        return None;
    }

    let precipitation = readings.iter().find_map(|r| match (r.sensor, r.value) {
        (SensorKind::RainGauge, Value::Float(v)) => Some(v),
        _ => None,
    });
    let (temperature, humidity) = readings
        .iter()
        .find_map(|r| match (r.sensor, r.value) {
            (SensorKind::TempHumidity, Value::FloatPair(t, h)) => Some((Some(t), Some(h))),
            _ => None,
        })
        .unwrap_or((None, None));
    let flooding = readings.iter().find_map(|r| match (r.sensor, r.value) {
        (SensorKind::FloodSensor, Value::Int(v)) => Some(v),
        _ => None,
    });

    if precipitation.is_none() && temperature.is_none() && flooding.is_none() {
        return None;
    }

    let station_id = readings.iter().find_map(|r| r.station_id);
    let lat_deg = readings.iter().find_map(|r| r.lat_deg);
    let lon_deg = readings.iter().find_map(|r| r.lon_deg);

    Some(ObservationRow {
        precipitation,
        temperature,
        humidity,
        flooding,
        node_id: node_id.to_string(),
        station_id,
        collection_time: Utc::now().format("%Y-%m-%d %H:%M:%S").to_string(),
        lat_deg,
        lon_deg,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rain(v: f64) -> Reading {
        Reading {
            sensor: SensorKind::RainGauge,
            value: Value::Float(v),
            station_id: Some(7),
            lat_deg: Some(60.79),
            lon_deg: Some(-161.78),
        }
    }

    fn flood(v: u8) -> Reading {
        Reading {
            sensor: SensorKind::FloodSensor,
            value: Value::Int(v),
            station_id: Some(3),
            lat_deg: None,
            lon_deg: None,
        }
    }

    #[test]
    fn s1_single_rain_gauge_batch() {
        let row = flatten(&[rain(0.2794)], "NODE_a-55001").unwrap();
        assert_eq!(row.precipitation, Some(0.2794));
        assert_eq!(row.temperature, None);
        assert_eq!(row.humidity, None);
        assert_eq!(row.flooding, None);
        assert_eq!(row.node_id, "NODE_a-55001");
        assert_eq!(row.station_id, Some(7));
    }

    #[test]
    fn empty_batch_drops_row() {
        assert!(flatten(&[], "NODE_a-1").is_none());
    }

    #[test]
    fn flood_one_is_preserved_exactly() {
        let row = flatten(&[flood(1)], "NODE_a-1").unwrap();
        assert_eq!(row.flooding, Some(1));
    }

    #[test]
    fn takes_first_reading_per_field() {
        let mut first = rain(1.0);
        first.station_id = None;
        let mut second = rain(2.0);
        second.station_id = Some(99);
        let row = flatten(&[first, second], "NODE_a-1").unwrap();
        assert_eq!(row.precipitation, Some(1.0), "first Rain Gauge reading wins");
        assert_eq!(row.station_id, Some(99), "first reading carrying station_id wins");
    }

    #[test]
    fn csv_quoting_escapes_commas_and_quotes() {
        assert_eq!(csv_quote("plain"), "plain");
        assert_eq!(csv_quote("a,b"), "\"a,b\"");
        assert_eq!(csv_quote("a\"b"), "\"a\"\"b\"");
    }
}
