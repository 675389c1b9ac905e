//! Core decision logic for the smart wake agent.
//!
//! This module contains:
//! - The bounded reading history and its trend statistics
//! - Sleep-stage classification
//! - The stage-aware wake scheduler and its escalation sequence
//! - Wake-window time arithmetic

pub mod alarm;
pub mod classifier;
pub mod timewin;
pub mod windowing;

// Re-export commonly used types
pub use alarm::{
    AlarmError, AlarmSettings, AlarmStatus, EscalationOutcome, EscalationStep, EscalationTiming,
    Intensity, RandomResponse, ResponseCheck, WakeScheduler,
};
pub use classifier::{
    ClassifyError, DetectionThresholds, SleepSummary, StageClassifier, StageLabel,
    HISTORY_CAPACITY,
};
pub use timewin::{parse_wake_time, WakeTimeParse, WakeWindow};
pub use windowing::{HeartRateTrend, ReadingWindow};
