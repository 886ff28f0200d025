use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Convenience alias for UTC DT
pub type UtcDT = DateTime<Utc>;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, specta::Type)]
#[serde(rename_all = "camelCase")]
/// The coordinate bundle of a reading as reported by a Geolocation API, the optional fields are
/// `None` whenever the device couldn't determine them.
pub struct Coordinates {
    /// Latitude in decimal degrees
    pub latitude: f64,
    /// Longitude in decimal degrees
    pub longitude: f64,
    /// Accuracy of `latitude` and `longitude` in meters
    pub accuracy: f64,
    /// Ground speed in meters per second
    pub speed: Option<f64>,
    /// Direction of travel in degrees clockwise from true north
    pub heading: Option<f64>,
    /// Altitude in meters above the WGS84 ellipsoid
    pub altitude: Option<f64>,
    /// Accuracy of `altitude` in meters
    pub altitude_accuracy: Option<f64>,
}

impl Coordinates {
    /// Coordinates with only the required fields known
    pub fn new(latitude: f64, longitude: f64, accuracy: f64) -> Self {
        Self {
            latitude,
            longitude,
            accuracy,
            speed: None,
            heading: None,
            altitude: None,
            altitude_accuracy: None,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, specta::Type)]
/// A single timestamped sample from the location sensor
pub struct LocationReading {
    /// Capture time in milliseconds since the unix epoch
    #[specta(type = f64)]
    pub timestamp: u64,
    pub coords: Coordinates,
}

impl LocationReading {
    pub fn new(timestamp: u64, coords: Coordinates) -> Self {
        Self { timestamp, coords }
    }

    /// Capture time as a datetime, `None` if the timestamp is out of range
    pub fn captured_at(&self) -> Option<UtcDT> {
        i64::try_from(self.timestamp)
            .ok()
            .and_then(DateTime::from_timestamp_millis)
    }
}
