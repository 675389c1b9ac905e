//! Sample types produced by sensor sources.
//!
//! A [`Reading`] is the only thing the classifier looks at. Sources may attach
//! device metadata (battery, link status) in a [`SensorSample`]; the core
//! ignores it.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One timestamped heart-rate / movement sample.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Reading {
    /// When the sample was taken
    pub timestamp: DateTime<Utc>,
    /// Heart rate in beats per minute
    pub heart_rate: f64,
    /// Unitless body-movement magnitude (>= 0)
    pub movement: f64,
}

impl Reading {
    /// Create a reading stamped with the current time.
    pub fn new(heart_rate: f64, movement: f64) -> Self {
        Self::at(Utc::now(), heart_rate, movement)
    }

    /// Create a reading with an explicit timestamp.
    pub fn at(timestamp: DateTime<Utc>, heart_rate: f64, movement: f64) -> Self {
        Self {
            timestamp,
            heart_rate,
            movement,
        }
    }
}

/// Link state reported by a sensor source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeviceStatus {
    Connected,
    Simulated,
    Disconnected,
}

/// A reading plus whatever device metadata the source reports.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SensorSample {
    pub reading: Reading,
    /// Battery charge in percent, if the device reports it
    pub battery_level: Option<u8>,
    pub device_status: DeviceStatus,
}

impl SensorSample {
    pub fn new(reading: Reading, device_status: DeviceStatus) -> Self {
        Self {
            reading,
            battery_level: None,
            device_status,
        }
    }

    pub fn with_battery(mut self, level: u8) -> Self {
        self.battery_level = Some(level.min(100));
        self
    }
}

/// Static description of a sensor source.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeviceInfo {
    pub connected: bool,
    pub device_model: String,
    pub device_name: String,
    pub use_simulation: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reading_creation() {
        let reading = Reading::new(62.5, 1.25);
        assert_eq!(reading.heart_rate, 62.5);
        assert_eq!(reading.movement, 1.25);
    }

    #[test]
    fn test_battery_is_capped() {
        let sample = SensorSample::new(Reading::new(60.0, 0.0), DeviceStatus::Connected)
            .with_battery(140);
        assert_eq!(sample.battery_level, Some(100));
    }

    #[test]
    fn test_device_status_serializes_snake_case() {
        let json = serde_json::to_string(&DeviceStatus::Simulated).unwrap();
        assert_eq!(json, "\"simulated\"");
    }
}
