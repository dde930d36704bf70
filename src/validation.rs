//! Transport-boundary validation
//!
//! Every payload entering the core - fetched rows as well as push events -
//! passes through here and comes out either as a well-formed value or as a
//! [`MalformedEvent`] outcome. No partially-shaped object flows past this
//! boundary, and nothing here ever panics on bad input.

use chrono::{DateTime, TimeZone, Utc};
use serde::Deserialize;
use serde_json::Value;
use validator::Validate;

use crate::error::MalformedEvent;
use crate::models::{DeviceId, DeviceSummary, PushEvent, Reading};

/// Wire shape of a device row or `device:update` payload.
///
/// Fields are optional on the wire; requiredness is decided here, not by
/// the deserializer.
#[derive(Debug, Deserialize, Validate)]
pub struct DeviceRecord {
    #[serde(default)]
    pub id: Option<i64>,

    #[serde(rename = "device_id", default)]
    pub hardware_id: Option<String>,

    #[serde(default)]
    pub name: Option<String>,

    #[validate(range(min = -90.0, max = 90.0, message = "latitude out of range"))]
    #[serde(default)]
    pub lat: Option<f64>,

    #[validate(range(min = -180.0, max = 180.0, message = "longitude out of range"))]
    #[serde(default)]
    pub lng: Option<f64>,

    #[serde(rename = "isOnline", default)]
    pub is_online: Option<bool>,
}

/// Shape a raw device payload into a summary.
///
/// Requires an id; out-of-range coordinates reject the whole payload.
pub fn parse_device_summary(value: &Value) -> Result<DeviceSummary, MalformedEvent> {
    let record: DeviceRecord = serde_json::from_value(value.clone())
        .map_err(|e| MalformedEvent::new(format!("device payload: {}", e)))?;

    record
        .validate()
        .map_err(|e| MalformedEvent::new(format!("device payload: {}", e)))?;

    let id = record
        .id
        .ok_or_else(|| MalformedEvent::new("device payload missing id"))?;

    Ok(DeviceSummary {
        id,
        hardware_id: record.hardware_id.unwrap_or_default(),
        name: record.name.unwrap_or_default(),
        lat: record.lat,
        lng: record.lng,
        is_online: record.is_online.unwrap_or(false),
    })
}

/// Shape a raw reading row (`{timestamp, rainfall_mm}`) into a reading.
///
/// The timestamp is required and must parse; the rainfall value is coerced,
/// never a reason to reject (a missing or non-numeric value becomes 0.0
/// rather than a gap).
pub fn parse_reading(value: &Value) -> Result<Reading, MalformedEvent> {
    let obj = value
        .as_object()
        .ok_or_else(|| MalformedEvent::new("reading payload is not an object"))?;

    let timestamp = obj
        .get("timestamp")
        .ok_or_else(|| MalformedEvent::new("reading payload missing timestamp"))
        .and_then(|ts| {
            parse_timestamp(ts)
                .ok_or_else(|| MalformedEvent::new(format!("unparseable timestamp: {}", ts)))
        })?;

    let rainfall_mm = coerce_rainfall(obj.get("rainfall_mm"));

    Ok(Reading::new(timestamp, rainfall_mm))
}

/// Shape a `reading:new` push payload (`{deviceId, timestamp, rainfall_mm}`).
pub fn parse_reading_event(value: &Value) -> Result<(DeviceId, Reading), MalformedEvent> {
    let device_id = value
        .get("deviceId")
        .and_then(Value::as_i64)
        .ok_or_else(|| MalformedEvent::new("reading event missing deviceId"))?;

    let reading = parse_reading(value)?;
    Ok((device_id, reading))
}

/// Shape one named push frame into a typed event.
pub fn parse_push_event(name: &str, data: &Value) -> Result<PushEvent, MalformedEvent> {
    match name {
        "reading:new" => {
            let (device_id, reading) = parse_reading_event(data)?;
            Ok(PushEvent::ReadingNew { device_id, reading })
        }
        "device:update" => Ok(PushEvent::DeviceUpdate(parse_device_summary(data)?)),
        other => Err(MalformedEvent::new(format!("unknown event '{}'", other))),
    }
}

/// Timestamp from either an RFC 3339 string or an epoch-millisecond number.
fn parse_timestamp(value: &Value) -> Option<DateTime<Utc>> {
    match value {
        Value::String(s) => DateTime::parse_from_rfc3339(s)
            .ok()
            .map(|t| t.with_timezone(&Utc)),
        Value::Number(n) => n
            .as_i64()
            .and_then(|millis| Utc.timestamp_millis_opt(millis).single()),
        _ => None,
    }
}

/// Coerce a wire rainfall value to a finite, non-negative millimeter count.
///
/// Missing, null and non-numeric values normalize to 0.0; numeric strings
/// parse; negatives clamp to zero.
fn coerce_rainfall(value: Option<&Value>) -> f64 {
    let coerced = match value {
        Some(Value::Number(n)) => n.as_f64(),
        Some(Value::String(s)) => s.trim().parse::<f64>().ok(),
        _ => None,
    };

    match coerced {
        Some(v) if v.is_finite() => v.max(0.0),
        _ => 0.0,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_reading_event_well_formed() {
        let payload = json!({
            "deviceId": 3,
            "timestamp": "2024-06-01T12:00:00Z",
            "rainfall_mm": 1.5
        });

        let (device_id, reading) = parse_reading_event(&payload).unwrap();
        assert_eq!(device_id, 3);
        assert_eq!(reading.rainfall_mm, 1.5);
    }

    #[test]
    fn test_reading_event_missing_device_id_rejected() {
        let payload = json!({
            "timestamp": "2024-06-01T12:00:00Z",
            "rainfall_mm": 1.5
        });

        assert!(parse_reading_event(&payload).is_err());
    }

    #[test]
    fn test_reading_unparseable_timestamp_rejected() {
        let payload = json!({ "timestamp": "noon-ish", "rainfall_mm": 1.0 });
        assert!(parse_reading(&payload).is_err());

        let payload = json!({ "rainfall_mm": 1.0 });
        assert!(parse_reading(&payload).is_err());
    }

    #[test]
    fn test_epoch_millis_timestamp_accepted() {
        let payload = json!({ "timestamp": 1717243200000i64, "rainfall_mm": 0.2 });
        let reading = parse_reading(&payload).unwrap();

        assert_eq!(
            reading.timestamp,
            Utc.with_ymd_and_hms(2024, 6, 1, 12, 0, 0).unwrap()
        );
    }

    #[test]
    fn test_rainfall_coercion() {
        let at = |v: Value| {
            parse_reading(&json!({ "timestamp": "2024-06-01T12:00:00Z", "rainfall_mm": v }))
                .unwrap()
                .rainfall_mm
        };

        assert_eq!(at(json!(2.5)), 2.5);
        assert_eq!(at(json!("3.25")), 3.25);
        assert_eq!(at(json!("wet")), 0.0);
        assert_eq!(at(json!(null)), 0.0);
        assert_eq!(at(json!({"nested": true})), 0.0);
        assert_eq!(at(json!(-1.0)), 0.0);

        // Missing value entirely is a zero reading, not a gap.
        let reading =
            parse_reading(&json!({ "timestamp": "2024-06-01T12:00:00Z" })).unwrap();
        assert_eq!(reading.rainfall_mm, 0.0);
    }

    #[test]
    fn test_device_update_well_formed() {
        let payload = json!({
            "id": 5,
            "device_id": "RG-0005",
            "name": "Bang Na",
            "lat": 13.66,
            "lng": 100.6,
            "isOnline": true
        });

        let summary = parse_device_summary(&payload).unwrap();
        assert_eq!(summary.id, 5);
        assert_eq!(summary.hardware_id, "RG-0005");
        assert!(summary.is_online);
    }

    #[test]
    fn test_device_update_missing_id_rejected() {
        let payload = json!({ "name": "nameless", "lat": 13.0, "lng": 100.0 });
        assert!(parse_device_summary(&payload).is_err());
    }

    #[test]
    fn test_device_out_of_range_coordinates_rejected() {
        let payload = json!({ "id": 5, "name": "off-earth", "lat": 123.0, "lng": 100.0 });
        assert!(parse_device_summary(&payload).is_err());

        let payload = json!({ "id": 5, "name": "off-earth", "lat": 13.0, "lng": -500.0 });
        assert!(parse_device_summary(&payload).is_err());
    }

    #[test]
    fn test_device_unplaced_coordinates_allowed() {
        let payload = json!({ "id": 6, "name": "warehouse", "isOnline": false });
        let summary = parse_device_summary(&payload).unwrap();

        assert_eq!(summary.lat, None);
        assert_eq!(summary.lng, None);
        assert_eq!(summary.position(), None);
    }

    #[test]
    fn test_unknown_event_name_rejected() {
        let err = parse_push_event("image:new", &json!({})).unwrap_err();
        assert!(err.reason.contains("image:new"));
    }

    #[test]
    fn test_push_event_dispatch() {
        let reading = json!({
            "deviceId": 1,
            "timestamp": "2024-06-01T12:00:00Z",
            "rainfall_mm": 0.5
        });
        assert!(matches!(
            parse_push_event("reading:new", &reading).unwrap(),
            PushEvent::ReadingNew { device_id: 1, .. }
        ));

        let device = json!({ "id": 2, "name": "x" });
        assert!(matches!(
            parse_push_event("device:update", &device).unwrap(),
            PushEvent::DeviceUpdate(_)
        ));
    }
}
