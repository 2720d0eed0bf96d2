use fieldproto::framing::{encode_length_prefix, parse_length_prefix, LENGTH_PREFIX_LEN};
use fieldproto::model::{decode_body, encode_body, Reading, SensorKind, Value};

/// Property 3 (spec.md §8): for any payload length in range, the length
/// prefix round-trips through encode/parse.
#[test]
fn length_prefix_round_trip_property() {
    for len in [0usize, 1, 7, 4096, 65536, 1 << 26] {
        let encoded = encode_length_prefix(len);
        assert_eq!(encoded.len(), LENGTH_PREFIX_LEN);
        assert_eq!(parse_length_prefix(&encoded).unwrap(), len);
    }
}

#[test]
fn batch_round_trip_through_wire_body() {
    let readings = vec![
        Reading {
            sensor: SensorKind::RainGauge,
            value: Value::Float(0.2794),
            station_id: Some(7),
            lat_deg: Some(60.79),
            lon_deg: Some(-161.78),
        },
        Reading {
            sensor: SensorKind::FloodSensor,
            value: Value::Int(1),
            station_id: Some(7),
            lat_deg: Some(60.79),
            lon_deg: Some(-161.78),
        },
    ];
    let body = encode_body(&readings);
    let decoded = decode_body(body.as_bytes()).unwrap();
    assert_eq!(decoded, readings);
}

#[test]
fn no_data_literal_is_not_valid_json() {
    // "NO_DATA" must be handled as a literal, not attempted as JSON, since it
    // isn't valid JSON.
    assert_eq!(decode_body(b"NO_DATA").unwrap().len(), 0);
}
