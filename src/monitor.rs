//! One monitoring session: classify each reading, then ask the alarm.
//!
//! The classifier and the scheduler know nothing of each other; the monitor
//! is the caller that feeds one into the other on every sampling tick.

use crate::config::{Config, ConfigError};
use crate::core::{ClassifyError, EscalationOutcome, StageClassifier, StageLabel, WakeScheduler};
use crate::sensor::types::Reading;
use crate::session::{create_shared_stats, SharedSessionStats};
use chrono::NaiveDateTime;
use serde::Serialize;

/// Result of one sampling tick.
#[derive(Debug, Clone, Serialize)]
pub struct TickOutcome {
    pub stage: StageLabel,
    pub should_wake: bool,
    /// Present only on the tick that fired the alarm
    pub escalation: Option<EscalationOutcome>,
}

impl TickOutcome {
    /// Whether this tick fired the alarm.
    pub fn fired(&self) -> bool {
        self.escalation.is_some()
    }
}

/// Owns the classifier, the scheduler and the session tally.
#[derive(Debug)]
pub struct Monitor {
    classifier: StageClassifier,
    scheduler: WakeScheduler,
    stats: SharedSessionStats,
}

impl Monitor {
    pub fn new(classifier: StageClassifier, scheduler: WakeScheduler) -> Self {
        Self {
            classifier,
            scheduler,
            stats: create_shared_stats(),
        }
    }

    /// Build both components from configuration, resolving the wake time
    /// against `now`.
    pub fn from_config(config: &Config, now: NaiveDateTime) -> Result<Self, ConfigError> {
        let classifier = StageClassifier::new(config.sleep_detection.thresholds)
            .map_err(|e| ConfigError::Invalid(e.to_string()))?;
        let scheduler = WakeScheduler::with_reference(&config.alarm_settings, now);
        Ok(Self::new(classifier, scheduler))
    }

    /// Swap the scheduler, e.g. to inject a response check or timing.
    pub fn with_scheduler(mut self, scheduler: WakeScheduler) -> Self {
        self.scheduler = scheduler;
        self
    }

    /// Classify `reading`, check the wake window at `now`, and fire the alarm
    /// if due and not fired yet.
    pub fn tick(
        &mut self,
        reading: Reading,
        now: NaiveDateTime,
    ) -> Result<TickOutcome, ClassifyError> {
        let stage = match self.classifier.classify(reading) {
            Ok(stage) => stage,
            Err(e) => {
                self.stats.record_rejected();
                return Err(e);
            }
        };
        self.stats.record_stage(stage);

        let should_wake = self.scheduler.should_wake(stage, now);
        let escalation = if should_wake {
            let outcome = self.scheduler.trigger();
            if outcome.is_some() {
                self.stats.record_alarm();
            }
            outcome
        } else {
            None
        };

        Ok(TickOutcome {
            stage,
            should_wake,
            escalation,
        })
    }

    /// Record sleep onset on the scheduler.
    pub fn mark_sleep_start(&mut self, at: NaiveDateTime) {
        self.scheduler.mark_sleep_start(at);
    }

    pub fn classifier(&self) -> &StageClassifier {
        &self.classifier
    }

    pub fn scheduler(&self) -> &WakeScheduler {
        &self.scheduler
    }

    pub fn stats(&self) -> &SharedSessionStats {
        &self.stats
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{AlarmError, EscalationStep, EscalationTiming};
    use chrono::{Duration, NaiveDate};

    fn at(day: u32, hour: u32, minute: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2026, 3, day)
            .unwrap()
            .and_hms_opt(hour, minute, 0)
            .unwrap()
    }

    fn monitor() -> Monitor {
        let config = Config::default();
        let start = at(10, 23, 0);
        let scheduler = WakeScheduler::with_reference(&config.alarm_settings, start)
            .with_timing(EscalationTiming::instant())
            .with_responder(|_: &EscalationStep| -> Result<bool, AlarmError> { Ok(true) });
        Monitor::from_config(&config, start)
            .unwrap()
            .with_scheduler(scheduler)
    }

    #[test]
    fn test_deep_sleep_in_window_does_not_fire() {
        let mut m = monitor();
        let outcome = m.tick(Reading::new(55.0, 0.5), at(11, 6, 45)).unwrap();
        assert_eq!(outcome.stage, StageLabel::DeepSleep);
        assert!(!outcome.should_wake);
        assert!(!outcome.fired());
    }

    #[test]
    fn test_light_sleep_in_window_fires_once() {
        let mut m = monitor();
        let first = m.tick(Reading::new(65.0, 3.0), at(11, 6, 45)).unwrap();
        assert_eq!(first.stage, StageLabel::LightSleep);
        assert!(first.fired());
        assert!(first.escalation.unwrap().responded);

        let second = m.tick(Reading::new(65.0, 3.0), at(11, 6, 46)).unwrap();
        assert!(second.should_wake);
        assert!(!second.fired());

        let stats = m.stats().stats();
        assert_eq!(stats.alarms_triggered, 1);
        assert_eq!(stats.readings_processed, 2);
    }

    #[test]
    fn test_light_sleep_before_window_does_not_fire() {
        let mut m = monitor();
        let mut now = at(11, 1, 0);
        for _ in 0..60 {
            let outcome = m.tick(Reading::new(65.0, 3.0), now).unwrap();
            assert!(!outcome.fired());
            now += Duration::minutes(1);
        }
        assert!(!m.scheduler().is_triggered());
    }

    #[test]
    fn test_rejected_reading_is_counted() {
        let mut m = monitor();
        assert!(m.tick(Reading::new(f64::NAN, 1.0), at(11, 6, 45)).is_err());
        let stats = m.stats().stats();
        assert_eq!(stats.readings_rejected, 1);
        assert_eq!(stats.readings_processed, 0);
    }

    #[test]
    fn test_sleep_start_reaches_status() {
        let mut m = monitor();
        m.mark_sleep_start(at(10, 23, 15));
        let status = m.scheduler().status_at(at(10, 23, 30));
        assert_eq!(status.sleep_start.as_deref(), Some("2026-03-10 23:15"));
    }
}
