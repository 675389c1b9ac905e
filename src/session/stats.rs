//! Per-session tallies.
//!
//! Counts readings per classified stage and alarm firings for the current
//! monitoring session. Counters are atomic so a display thread can read them
//! while the sampling loop writes.

use crate::core::StageLabel;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use uuid::Uuid;

/// Running counters for one monitoring session.
#[derive(Debug)]
pub struct SessionStats {
    session_id: Uuid,
    session_start: DateTime<Utc>,
    readings_processed: AtomicU64,
    readings_rejected: AtomicU64,
    awake: AtomicU64,
    light_sleep: AtomicU64,
    deep_sleep: AtomicU64,
    rem_sleep: AtomicU64,
    alarms_triggered: AtomicU64,
}

impl SessionStats {
    pub fn new() -> Self {
        Self {
            session_id: Uuid::new_v4(),
            session_start: Utc::now(),
            readings_processed: AtomicU64::new(0),
            readings_rejected: AtomicU64::new(0),
            awake: AtomicU64::new(0),
            light_sleep: AtomicU64::new(0),
            deep_sleep: AtomicU64::new(0),
            rem_sleep: AtomicU64::new(0),
            alarms_triggered: AtomicU64::new(0),
        }
    }

    /// Record a successfully classified reading.
    pub fn record_stage(&self, stage: StageLabel) {
        self.readings_processed.fetch_add(1, Ordering::Relaxed);
        self.counter(stage).fetch_add(1, Ordering::Relaxed);
    }

    /// Record a reading the classifier refused.
    pub fn record_rejected(&self) {
        self.readings_rejected.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_alarm(&self) {
        self.alarms_triggered.fetch_add(1, Ordering::Relaxed);
    }

    fn counter(&self, stage: StageLabel) -> &AtomicU64 {
        match stage {
            StageLabel::Awake => &self.awake,
            StageLabel::LightSleep => &self.light_sleep,
            StageLabel::DeepSleep => &self.deep_sleep,
            StageLabel::RemSleep => &self.rem_sleep,
        }
    }

    /// Get the current statistics.
    pub fn stats(&self) -> SessionStatsSnapshot {
        SessionStatsSnapshot {
            session_id: self.session_id.to_string(),
            session_start: self.session_start,
            session_duration_secs: (Utc::now() - self.session_start).num_seconds().max(0) as u64,
            readings_processed: self.readings_processed.load(Ordering::Relaxed),
            readings_rejected: self.readings_rejected.load(Ordering::Relaxed),
            awake: self.awake.load(Ordering::Relaxed),
            light_sleep: self.light_sleep.load(Ordering::Relaxed),
            deep_sleep: self.deep_sleep.load(Ordering::Relaxed),
            rem_sleep: self.rem_sleep.load(Ordering::Relaxed),
            alarms_triggered: self.alarms_triggered.load(Ordering::Relaxed),
        }
    }

    /// Get a summary string for display.
    pub fn summary(&self) -> String {
        let stats = self.stats();
        format!(
            "Session Statistics:\n\
             - Readings processed: {}\n\
             - Readings rejected: {}\n\
             - Awake: {}\n\
             - Light sleep: {}\n\
             - Deep sleep: {}\n\
             - REM sleep: {}\n\
             - Alarms triggered: {}\n\
             - Session duration: {} seconds",
            stats.readings_processed,
            stats.readings_rejected,
            stats.awake,
            stats.light_sleep,
            stats.deep_sleep,
            stats.rem_sleep,
            stats.alarms_triggered,
            stats.session_duration_secs
        )
    }

    /// Reset all counters.
    pub fn reset(&self) {
        for counter in [
            &self.readings_processed,
            &self.readings_rejected,
            &self.awake,
            &self.light_sleep,
            &self.deep_sleep,
            &self.rem_sleep,
            &self.alarms_triggered,
        ] {
            counter.store(0, Ordering::Relaxed);
        }
    }
}

impl Default for SessionStats {
    fn default() -> Self {
        Self::new()
    }
}

/// Point-in-time copy of the session counters.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionStatsSnapshot {
    pub session_id: String,
    pub session_start: DateTime<Utc>,
    pub session_duration_secs: u64,
    pub readings_processed: u64,
    pub readings_rejected: u64,
    pub awake: u64,
    pub light_sleep: u64,
    pub deep_sleep: u64,
    pub rem_sleep: u64,
    pub alarms_triggered: u64,
}

impl SessionStatsSnapshot {
    /// Share of processed readings classified as `stage`, in percent.
    pub fn stage_percent(&self, stage: StageLabel) -> f64 {
        if self.readings_processed == 0 {
            return 0.0;
        }
        let count = match stage {
            StageLabel::Awake => self.awake,
            StageLabel::LightSleep => self.light_sleep,
            StageLabel::DeepSleep => self.deep_sleep,
            StageLabel::RemSleep => self.rem_sleep,
        };
        count as f64 * 100.0 / self.readings_processed as f64
    }
}

/// Thread-safe shared session stats.
pub type SharedSessionStats = Arc<SessionStats>;

/// Create a new shared session stats tally.
pub fn create_shared_stats() -> SharedSessionStats {
    Arc::new(SessionStats::new())
}
