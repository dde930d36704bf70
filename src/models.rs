//! Data models for devices, rain readings and push events
//!
//! Defines the core data structures used throughout the application.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Stable identifier of a sensor device, unique across the fleet.
pub type DeviceId = i64;

/// One timestamped rain measurement from a single device.
///
/// Immutable once created. `rainfall_mm` is always a finite, non-negative
/// number: the transport boundary normalizes missing or non-numeric wire
/// values to 0.0 and clamps negatives, so no gaps flow into aggregation.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Reading {
    /// Instant the measurement was taken
    pub timestamp: DateTime<Utc>,

    /// Measured rainfall in millimeters
    pub rainfall_mm: f64,
}

impl Reading {
    pub fn new(timestamp: DateTime<Utc>, rainfall_mm: f64) -> Self {
        Self {
            timestamp,
            rainfall_mm,
        }
    }
}

/// Summary of one device as shown on the fleet dashboard.
///
/// Mutated wholesale by the full-list fetch or upserted by a
/// `device:update` push event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeviceSummary {
    /// Fleet-wide stable identifier
    pub id: DeviceId,

    /// Hardware key printed on the unit
    #[serde(rename = "device_id")]
    pub hardware_id: String,

    /// Human-readable station name
    pub name: String,

    /// Latitude in decimal degrees, if the device has been placed
    pub lat: Option<f64>,

    /// Longitude in decimal degrees, if the device has been placed
    pub lng: Option<f64>,

    /// Whether the device currently holds a live connection to the backend
    #[serde(rename = "isOnline")]
    pub is_online: bool,
}

impl DeviceSummary {
    /// Coordinate pair, present only when both components are finite numbers.
    pub fn position(&self) -> Option<(f64, f64)> {
        match (self.lat, self.lng) {
            (Some(lat), Some(lng)) if lat.is_finite() && lng.is_finite() => Some((lat, lng)),
            _ => None,
        }
    }
}

/// Server-initiated events delivered over the persistent push channel.
///
/// Constructed only by the validation boundary; a payload that cannot be
/// shaped into one of these variants never enters the core.
#[derive(Debug, Clone, PartialEq)]
pub enum PushEvent {
    /// A new reading arrived for a device (`reading:new` on the wire)
    ReadingNew {
        device_id: DeviceId,
        reading: Reading,
    },
    /// A device summary changed (`device:update` on the wire)
    DeviceUpdate(DeviceSummary),
}

/// Windowed rainfall totals for one device view, recomputed after every
/// buffer mutation.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct RainTotals {
    /// Sum over the trailing hour
    pub last_hour: f64,
    /// Sum over the trailing 24 hours; a lower bound when the selected
    /// range covers less than 24 hours
    pub last_24h: f64,
    /// Sum since local midnight; a lower bound when the selected range
    /// starts after midnight
    pub today: f64,
    /// Sum over the currently selected range (the whole buffer)
    pub selected: f64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn summary(lat: Option<f64>, lng: Option<f64>) -> DeviceSummary {
        DeviceSummary {
            id: 1,
            hardware_id: "RG-0001".to_string(),
            name: "Station".to_string(),
            lat,
            lng,
            is_online: true,
        }
    }

    #[test]
    fn test_position_requires_both_coordinates() {
        assert_eq!(
            summary(Some(13.75), Some(100.5)).position(),
            Some((13.75, 100.5))
        );
        assert_eq!(summary(Some(13.75), None).position(), None);
        assert_eq!(summary(None, Some(100.5)).position(), None);
        assert_eq!(summary(None, None).position(), None);
    }

    #[test]
    fn test_position_excludes_non_finite() {
        assert_eq!(summary(Some(f64::NAN), Some(100.5)).position(), None);
        assert_eq!(summary(Some(13.75), Some(f64::INFINITY)).position(), None);
    }

    #[test]
    fn test_device_summary_wire_names() {
        let json = r#"{
            "id": 7,
            "device_id": "RG-0007",
            "name": "Khlong Toei",
            "lat": 13.7,
            "lng": 100.58,
            "isOnline": false
        }"#;

        let parsed: DeviceSummary = serde_json::from_str(json).unwrap();
        assert_eq!(parsed.id, 7);
        assert_eq!(parsed.hardware_id, "RG-0007");
        assert!(!parsed.is_online);
    }

    #[test]
    fn test_reading_roundtrip() {
        let ts = Utc.with_ymd_and_hms(2024, 6, 1, 12, 0, 0).unwrap();
        let reading = Reading::new(ts, 1.5);

        let json = serde_json::to_string(&reading).unwrap();
        let back: Reading = serde_json::from_str(&json).unwrap();
        assert_eq!(back, reading);
    }
}
