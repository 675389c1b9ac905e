//! Configuration for the smart wake agent.

use crate::core::{AlarmSettings, DetectionThresholds};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Main configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Config {
    /// Sampling rate and classification thresholds
    #[serde(default)]
    pub sleep_detection: SleepDetectionConfig,

    /// Wake time, window and escalation length
    #[serde(default)]
    pub alarm_settings: AlarmSettings,

    /// Sensor device options
    #[serde(default)]
    pub device_settings: DeviceSettings,
}

impl Config {
    /// Load configuration from the default location.
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from(&Self::config_path())
    }

    /// Load configuration from `path`, falling back to defaults if it is absent.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let content =
            std::fs::read_to_string(path).map_err(|e| ConfigError::IoError(e.to_string()))?;
        let config: Config =
            serde_json::from_str(&content).map_err(|e| ConfigError::ParseError(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Save configuration to the default location.
    pub fn save(&self) -> Result<(), ConfigError> {
        self.save_to(&Self::config_path())
    }

    pub fn save_to(&self, path: &Path) -> Result<(), ConfigError> {
        // Ensure parent directory exists
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| ConfigError::IoError(e.to_string()))?;
        }

        let content = serde_json::to_string_pretty(self)
            .map_err(|e| ConfigError::SerializeError(e.to_string()))?;

        std::fs::write(path, content).map_err(|e| ConfigError::IoError(e.to_string()))?;

        Ok(())
    }

    /// Get the path to the configuration file.
    pub fn config_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("smart-wake-agent")
            .join("config.json")
    }

    /// Check values the components cannot recover from.
    ///
    /// The wake-time string is not checked here: a malformed value falls back
    /// to 07:00 when the scheduler is built.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.sleep_detection
            .thresholds
            .validate()
            .map_err(|e| ConfigError::Invalid(e.to_string()))?;

        if self.sleep_detection.sampling_rate == 0 {
            return Err(ConfigError::Invalid(
                "sampling_rate must be at least 1 second".to_string(),
            ));
        }

        Ok(())
    }
}

/// Sampling and classification settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SleepDetectionConfig {
    /// Seconds between readings
    pub sampling_rate: u64,

    #[serde(flatten)]
    pub thresholds: DetectionThresholds,
}

impl Default for SleepDetectionConfig {
    fn default() -> Self {
        Self {
            sampling_rate: 60,
            thresholds: DetectionThresholds::default(),
        }
    }
}

impl SleepDetectionConfig {
    pub fn sampling_interval(&self) -> Duration {
        Duration::from_secs(self.sampling_rate)
    }
}

/// Sensor device settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeviceSettings {
    /// Name shown in device info
    pub device_name: String,
    /// Seed for the simulated sensor; random when absent
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub simulator_seed: Option<u64>,
}

impl Default for DeviceSettings {
    fn default() -> Self {
        Self {
            device_name: "Sensor Simulator".to_string(),
            simulator_seed: None,
        }
    }
}

/// Configuration errors.
#[derive(Debug)]
pub enum ConfigError {
    IoError(String),
    ParseError(String),
    SerializeError(String),
    Invalid(String),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::IoError(e) => write!(f, "IO error: {e}"),
            ConfigError::ParseError(e) => write!(f, "Parse error: {e}"),
            ConfigError::SerializeError(e) => write!(f, "Serialize error: {e}"),
            ConfigError::Invalid(e) => write!(f, "Invalid configuration: {e}"),
        }
    }
}

impl std::error::Error for ConfigError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.sleep_detection.sampling_rate, 60);
        assert_eq!(config.sleep_detection.thresholds.deep_sleep_hr_threshold, 60.0);
        assert_eq!(config.sleep_detection.thresholds.light_sleep_hr_threshold, 70.0);
        assert_eq!(config.sleep_detection.thresholds.movement_threshold, 5.0);
        assert_eq!(config.alarm_settings.wake_time, "07:00");
        assert_eq!(config.alarm_settings.alarm_window, 30);
        assert_eq!(config.alarm_settings.alarm_duration, 5);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_parse_flat_sleep_detection_section() {
        let json = r#"{
            "sleep_detection": {
                "sampling_rate": 30,
                "deep_sleep_hr_threshold": 55,
                "light_sleep_hr_threshold": 68,
                "movement_threshold": 4
            },
            "alarm_settings": {
                "wake_time": "06:30",
                "alarm_window": 20,
                "alarm_duration": 3
            }
        }"#;
        let config: Config = serde_json::from_str(json).unwrap();
        assert_eq!(config.sleep_detection.sampling_rate, 30);
        assert_eq!(config.sleep_detection.thresholds.deep_sleep_hr_threshold, 55.0);
        assert_eq!(config.alarm_settings.wake_time, "06:30");
        assert_eq!(config.device_settings, DeviceSettings::default());
    }

    #[test]
    fn test_inverted_thresholds_fail_validation() {
        let mut config = Config::default();
        config.sleep_detection.thresholds.deep_sleep_hr_threshold = 80.0;
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn test_save_and_load() {
        let dir = std::env::temp_dir().join(format!("smart-wake-config-{}", uuid::Uuid::new_v4()));
        let path = dir.join("config.json");

        let mut config = Config::default();
        config.alarm_settings.wake_time = "06:45".to_string();
        config.device_settings.simulator_seed = Some(11);
        config.save_to(&path).unwrap();

        let loaded = Config::load_from(&path).unwrap();
        assert_eq!(loaded, config);

        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn test_missing_file_gives_defaults() {
        let path = std::env::temp_dir().join("smart-wake-does-not-exist.json");
        let config = Config::load_from(&path).unwrap();
        assert_eq!(config, Config::default());
    }
}
