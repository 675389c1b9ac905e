//! Sensor sources for the smart wake agent.
//!
//! A source produces one [`SensorSample`] per pull. The [`Collector`] polls a
//! source on a background thread and hands samples to the sampling loop over
//! a channel.

pub mod collector;
pub mod simulator;
pub mod types;

// Re-export commonly used types
pub use collector::{Collector, CollectorConfig};
pub use simulator::SensorSimulator;
pub use types::{DeviceInfo, DeviceStatus, Reading, SensorSample};

/// Anything that can be pulled for readings.
pub trait SensorSource {
    /// Pull the next sample. Called once per sampling tick.
    fn next_sample(&mut self) -> Result<SensorSample, SensorError>;

    /// Describe the underlying device.
    fn device_info(&self) -> DeviceInfo;
}

/// Errors that can occur while acquiring readings.
#[derive(Debug)]
pub enum SensorError {
    AlreadyRunning,
    Unavailable(String),
}

impl std::fmt::Display for SensorError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SensorError::AlreadyRunning => write!(f, "Collector is already running"),
            SensorError::Unavailable(e) => write!(f, "Sensor unavailable: {e}"),
        }
    }
}

impl std::error::Error for SensorError {}
