use serde::{Deserialize, Serialize};
use std::fmt;

/// The sensor kinds a node may report. Wire representation is the literal
/// strings in spec.md §6 (`"Rain Gauge"`, `"Flood Sensor"`,
/// `"Temperature and Humidity"`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SensorKind {
    RainGauge,
    FloodSensor,
    TempHumidity,
}

impl SensorKind {
    pub fn wire_name(self) -> &'static str {
        match self {
            SensorKind::RainGauge => "Rain Gauge",
            SensorKind::FloodSensor => "Flood Sensor",
            SensorKind::TempHumidity => "Temperature and Humidity",
        }
    }

    pub fn from_wire_name(name: &str) -> Option<Self> {
        match name {
            "Rain Gauge" => Some(SensorKind::RainGauge),
            "Flood Sensor" => Some(SensorKind::FloodSensor),
            "Temperature and Humidity" => Some(SensorKind::TempHumidity),
            _ => None,
        }
    }
}

impl fmt::Display for SensorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.wire_name())
    }
}

/// A reading's value is polymorphic by sensor kind (spec.md §3, §9): rain
/// gauges report millimetres as a float, the flood sensor reports a 0/1
/// integer, and temperature/humidity reports a `(temperature, humidity)`
/// pair. Modeled as a tagged variant rather than a dynamically typed field so
/// downstream flattening can match exhaustively.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Value {
    Float(f64),
    Int(u8),
    FloatPair(f64, f64),
}

/// One sample produced by a sensor worker (spec.md §3 "Reading").
#[derive(Debug, Clone, PartialEq)]
pub struct Reading {
    pub sensor: SensorKind,
    pub value: Value,
    pub station_id: Option<i64>,
    pub lat_deg: Option<f64>,
    pub lon_deg: Option<f64>,
}

/// Wire shape of a `Reading`, matching spec.md §6 field names exactly. `Value`
/// is left as a raw `serde_json::Value` here; `Reading`'s (de)serialization
/// dispatches its interpretation on the `Sensor` field, per spec.md §9.
#[derive(Debug, Serialize, Deserialize)]
struct RawReading {
    #[serde(rename = "Sensor")]
    sensor: String,
    #[serde(rename = "Value")]
    value: serde_json::Value,
    #[serde(rename = "Station_Id")]
    station_id: Option<i64>,
    #[serde(rename = "Lat_deg")]
    lat_deg: Option<f64>,
    #[serde(rename = "Lon_deg")]
    lon_deg: Option<f64>,
}

impl Serialize for Reading {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        let value = match self.value {
            Value::Float(v) => serde_json::json!(v),
            Value::Int(v) => serde_json::json!(v),
            Value::FloatPair(a, b) => serde_json::json!([a, b]),
        };
        let raw = RawReading {
            sensor: self.sensor.wire_name().to_string(),
            value,
            station_id: self.station_id,
            lat_deg: self.lat_deg,
            lon_deg: self.lon_deg,
        };
        raw.serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for Reading {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let raw = RawReading::deserialize(deserializer)?;
        let sensor = SensorKind::from_wire_name(&raw.sensor)
            .ok_or_else(|| serde::de::Error::custom(format!("unknown sensor {:?}", raw.sensor)))?;

        let value = match sensor {
            SensorKind::RainGauge => {
                let v = raw
                    .value
                    .as_f64()
                    .ok_or_else(|| serde::de::Error::custom("Rain Gauge value must be a number"))?;
                Value::Float(v)
            }
            SensorKind::FloodSensor => {
                let v = raw
                    .value
                    .as_u64()
                    .ok_or_else(|| serde::de::Error::custom("Flood Sensor value must be 0 or 1"))?;
                Value::Int(v as u8)
            }
            SensorKind::TempHumidity => {
                let pair = raw
                    .value
                    .as_array()
                    .filter(|arr| arr.len() == 2)
                    .ok_or_else(|| {
                        serde::de::Error::custom("Temperature and Humidity value must be a pair")
                    })?;
                let a = pair[0]
                    .as_f64()
                    .ok_or_else(|| serde::de::Error::custom("pair element must be numeric"))?;
                let b = pair[1]
                    .as_f64()
                    .ok_or_else(|| serde::de::Error::custom("pair element must be numeric"))?;
                Value::FloatPair(a, b)
            }
        };

        Ok(Reading {
            sensor,
            value,
            station_id: raw.station_id,
            lat_deg: raw.lat_deg,
            lon_deg: raw.lon_deg,
        })
    }
}

/// Encodes a batch of readings as the wire body: the literal `NO_DATA` when
/// empty, else a JSON array (spec.md §6).
pub fn encode_body(readings: &[Reading]) -> String {
    if readings.is_empty() {
        "NO_DATA".to_string()
    } else {
        serde_json::to_string(readings).unwrap_or_else(|_| "NO_DATA".to_string())
    }
}

/// Decodes a wire body into readings. `NO_DATA` decodes to an empty vec;
/// anything else is parsed as a JSON array of `Reading`.
pub fn decode_body(body: &[u8]) -> anyhow::Result<Vec<Reading>> {
    if body == b"NO_DATA" {
        return Ok(Vec::new());
    }
    let readings: Vec<Reading> = serde_json::from_slice(body)?;
    Ok(readings)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_rain_gauge() {
        let reading = Reading {
            sensor: SensorKind::RainGauge,
            value: Value::Float(0.2794),
            station_id: Some(7),
            lat_deg: Some(60.79),
            lon_deg: Some(-161.78),
        };
        let body = encode_body(std::slice::from_ref(&reading));
        let decoded = decode_body(body.as_bytes()).unwrap();
        assert_eq!(decoded, vec![reading]);
    }

    #[test]
    fn round_trips_flood_and_temp_humid() {
        let flood = Reading {
            sensor: SensorKind::FloodSensor,
            value: Value::Int(1),
            station_id: Some(3),
            lat_deg: None,
            lon_deg: None,
        };
        let temp = Reading {
            sensor: SensorKind::TempHumidity,
            value: Value::FloatPair(21.5, 48.0),
            station_id: Some(3),
            lat_deg: None,
            lon_deg: None,
        };
        let body = encode_body(&[flood.clone(), temp.clone()]);
        let decoded = decode_body(body.as_bytes()).unwrap();
        assert_eq!(decoded, vec![flood, temp]);
    }

    #[test]
    fn empty_batch_is_no_data() {
        assert_eq!(encode_body(&[]), "NO_DATA");
        assert_eq!(decode_body(b"NO_DATA").unwrap(), Vec::new());
    }

    #[test]
    fn unknown_sensor_kind_errors() {
        let body = br#"[{"Sensor":"Seismometer","Value":1,"Station_Id":1,"Lat_deg":0.0,"Lon_deg":0.0}]"#;
        assert!(decode_body(body).is_err());
    }
}
