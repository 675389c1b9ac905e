//! Smart Wake Agent - sleep-stage classification and stage-aware wake alarm.
//!
//! This library turns periodic heart-rate and movement readings from a
//! wrist-worn sensor into sleep-stage labels, and wakes the sleeper inside a
//! window before the target wake time, preferably from light sleep.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │                       Smart Wake Agent                       │
//! ├──────────────────────────────────────────────────────────────┤
//! │  ┌─────────────┐   ┌─────────────────┐   ┌───────────────┐   │
//! │  │   Sensor    │──▶│ StageClassifier │──▶│ WakeScheduler │   │
//! │  │ (collector) │   │ (10-pt history) │   │ (window+steps)│   │
//! │  └─────────────┘   └─────────────────┘   └───────────────┘   │
//! │                             │                    │           │
//! │                             ▼                    ▼           │
//! │                     ┌───────────────────────────────┐        │
//! │                     │    Monitor / SessionStats     │        │
//! │                     └───────────────────────────────┘        │
//! └──────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Example
//!
//! ```
//! use smart_wake_agent::core::{DetectionThresholds, StageClassifier, StageLabel};
//! use smart_wake_agent::sensor::Reading;
//!
//! let mut classifier = StageClassifier::new(DetectionThresholds::default()).unwrap();
//! let stage = classifier.classify(Reading::new(58.0, 1.0)).unwrap();
//! assert_eq!(stage, StageLabel::DeepSleep);
//! ```

pub mod config;
pub mod core;
pub mod monitor;
pub mod sensor;
pub mod session;

#[cfg(feature = "server")]
pub mod server;

// Re-export key types at crate root for convenience
pub use config::{Config, ConfigError};
pub use self::core::{
    AlarmSettings, AlarmStatus, DetectionThresholds, SleepSummary, StageClassifier, StageLabel,
    WakeScheduler,
};
pub use monitor::{Monitor, TickOutcome};
pub use sensor::{Collector, CollectorConfig, Reading, SensorSimulator, SensorSource};
pub use session::{SessionStats, SharedSessionStats};

/// Library version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
