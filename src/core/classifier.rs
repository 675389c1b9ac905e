//! Sleep-stage classification from heart rate and movement.
//!
//! Each reading is appended to a short history and classified by a fixed
//! priority of threshold rules. REM is detected from heart-rate trend and
//! variability over the last five readings.

use crate::core::windowing::ReadingWindow;
use crate::sensor::types::Reading;
use serde::{Deserialize, Serialize};
use statrs::statistics::Statistics;
use std::fmt;
use std::str::FromStr;

/// Number of readings kept for trend analysis and summaries.
pub const HISTORY_CAPACITY: usize = 10;

/// Number of trailing readings used by the REM indicator.
pub const TREND_POINTS: usize = 5;

/// Movement above `movement_threshold * AWAKE_MOVEMENT_FACTOR` means awake.
const AWAKE_MOVEMENT_FACTOR: f64 = 1.5;
/// Deep sleep requires movement below `movement_threshold * DEEP_MOVEMENT_FACTOR`.
const DEEP_MOVEMENT_FACTOR: f64 = 0.5;
/// REM movement band lower bound, as a fraction of `movement_threshold`.
const REM_MOVEMENT_FLOOR: f64 = 0.3;
const REM_VARIABILITY_MIN: f64 = 3.0;
const REM_TREND_MIN: f64 = 2.0;
/// REM heart rate must stay below `light_sleep_hr_threshold + REM_HR_MARGIN`.
const REM_HR_MARGIN: f64 = 5.0;

/// The four sleep stages the classifier can produce.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StageLabel {
    Awake,
    LightSleep,
    DeepSleep,
    RemSleep,
}

impl StageLabel {
    pub const ALL: [StageLabel; 4] = [
        StageLabel::Awake,
        StageLabel::LightSleep,
        StageLabel::DeepSleep,
        StageLabel::RemSleep,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            StageLabel::Awake => "awake",
            StageLabel::LightSleep => "light_sleep",
            StageLabel::DeepSleep => "deep_sleep",
            StageLabel::RemSleep => "rem_sleep",
        }
    }
}

impl fmt::Display for StageLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for StageLabel {
    type Err = ClassifyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        StageLabel::ALL
            .into_iter()
            .find(|stage| stage.as_str() == s.trim())
            .ok_or_else(|| ClassifyError::UnknownStage(s.to_string()))
    }
}

/// Detection thresholds, fixed for the lifetime of a classifier.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DetectionThresholds {
    /// Heart rate (bpm) below which sleep may be deep
    pub deep_sleep_hr_threshold: f64,
    /// Heart rate (bpm) below which sleep may be light
    pub light_sleep_hr_threshold: f64,
    /// Movement magnitude separating still from restless
    pub movement_threshold: f64,
}

impl Default for DetectionThresholds {
    fn default() -> Self {
        Self {
            deep_sleep_hr_threshold: 60.0,
            light_sleep_hr_threshold: 70.0,
            movement_threshold: 5.0,
        }
    }
}

impl DetectionThresholds {
    /// Thresholds must be finite and `deep < light`.
    pub fn validate(&self) -> Result<(), ClassifyError> {
        let fields = [
            ("deep_sleep_hr_threshold", self.deep_sleep_hr_threshold),
            ("light_sleep_hr_threshold", self.light_sleep_hr_threshold),
            ("movement_threshold", self.movement_threshold),
        ];
        for (field, value) in fields {
            if !value.is_finite() {
                return Err(ClassifyError::InvalidThresholds(format!(
                    "{field} must be finite, got {value}"
                )));
            }
        }

        if self.deep_sleep_hr_threshold >= self.light_sleep_hr_threshold {
            return Err(ClassifyError::InvalidThresholds(format!(
                "deep_sleep_hr_threshold ({}) must be below light_sleep_hr_threshold ({})",
                self.deep_sleep_hr_threshold, self.light_sleep_hr_threshold
            )));
        }

        Ok(())
    }
}

/// Aggregate statistics over the current history.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SleepSummary {
    pub avg_heart_rate: f64,
    pub max_heart_rate: f64,
    pub min_heart_rate: f64,
    pub avg_movement: f64,
    pub data_points: usize,
}

/// Classification errors.
#[derive(Debug, Clone, PartialEq)]
pub enum ClassifyError {
    /// A reading field was NaN or infinite
    InvalidReading { field: &'static str, value: f64 },
    InvalidThresholds(String),
    UnknownStage(String),
}

impl fmt::Display for ClassifyError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ClassifyError::InvalidReading { field, value } => {
                write!(f, "Invalid reading: {field} must be finite, got {value}")
            }
            ClassifyError::InvalidThresholds(e) => write!(f, "Invalid thresholds: {e}"),
            ClassifyError::UnknownStage(s) => write!(f, "Unknown sleep stage: {s}"),
        }
    }
}

impl std::error::Error for ClassifyError {}

/// Rolling-history sleep-stage classifier.
#[derive(Debug, Clone)]
pub struct StageClassifier {
    thresholds: DetectionThresholds,
    history: ReadingWindow,
}

impl StageClassifier {
    /// Create a classifier. Fails if the thresholds are inverted or non-finite.
    pub fn new(thresholds: DetectionThresholds) -> Result<Self, ClassifyError> {
        thresholds.validate()?;
        Ok(Self {
            thresholds,
            history: ReadingWindow::new(HISTORY_CAPACITY),
        })
    }

    pub fn thresholds(&self) -> &DetectionThresholds {
        &self.thresholds
    }

    pub fn history(&self) -> &ReadingWindow {
        &self.history
    }

    /// Record `reading` and classify the current stage.
    ///
    /// Rules, first match wins:
    /// 1. large movement: awake
    /// 2. low heart rate and very little movement: deep sleep
    /// 3. REM indicator
    /// 4. heart rate below light threshold and little movement: light sleep
    /// 5. heart rate at or above light threshold: awake
    /// 6. otherwise light sleep
    ///
    /// Non-finite readings are rejected without touching the history.
    pub fn classify(&mut self, reading: Reading) -> Result<StageLabel, ClassifyError> {
        if !reading.heart_rate.is_finite() {
            return Err(ClassifyError::InvalidReading {
                field: "heart_rate",
                value: reading.heart_rate,
            });
        }
        if !reading.movement.is_finite() {
            return Err(ClassifyError::InvalidReading {
                field: "movement",
                value: reading.movement,
            });
        }

        self.history.push(reading);

        let t = &self.thresholds;
        let heart_rate = reading.heart_rate;
        let movement = reading.movement;

        let stage = if movement > t.movement_threshold * AWAKE_MOVEMENT_FACTOR {
            StageLabel::Awake
        } else if heart_rate < t.deep_sleep_hr_threshold
            && movement < t.movement_threshold * DEEP_MOVEMENT_FACTOR
        {
            StageLabel::DeepSleep
        } else if self.is_rem_indication(heart_rate, movement) {
            StageLabel::RemSleep
        } else if heart_rate < t.light_sleep_hr_threshold && movement < t.movement_threshold {
            StageLabel::LightSleep
        } else if heart_rate >= t.light_sleep_hr_threshold {
            StageLabel::Awake
        } else {
            StageLabel::LightSleep
        };

        tracing::debug!(
            "Classified hr={:.1} movement={:.2} as {} (history {})",
            heart_rate,
            movement,
            stage,
            self.history.len()
        );

        Ok(stage)
    }

    /// At least two of three REM signals, with heart rate not far above the
    /// light-sleep threshold.
    fn is_rem_indication(&self, heart_rate: f64, movement: f64) -> bool {
        let Some(trend) = self.history.heart_rate_trend(TREND_POINTS) else {
            return false;
        };

        let t = &self.thresholds;
        let indicators = [
            trend.variability > REM_VARIABILITY_MIN,
            trend.trend.abs() > REM_TREND_MIN,
            movement > t.movement_threshold * REM_MOVEMENT_FLOOR && movement < t.movement_threshold,
        ];
        let hits = indicators.iter().filter(|&&hit| hit).count();

        hits >= 2 && heart_rate < t.light_sleep_hr_threshold + REM_HR_MARGIN
    }

    /// Statistics over the whole history, or `None` before the first reading.
    pub fn sleep_summary(&self) -> Option<SleepSummary> {
        if self.history.is_empty() {
            return None;
        }

        let heart_rates: Vec<f64> = self.history.iter().map(|r| r.heart_rate).collect();
        let movements: Vec<f64> = self.history.iter().map(|r| r.movement).collect();

        let max_heart_rate = heart_rates.iter().copied().fold(f64::MIN, f64::max);
        let min_heart_rate = heart_rates.iter().copied().fold(f64::MAX, f64::min);

        Some(SleepSummary {
            avg_heart_rate: round2(heart_rates.iter().mean()),
            max_heart_rate,
            min_heart_rate,
            avg_movement: round2(movements.iter().mean()),
            data_points: self.history.len(),
        })
    }
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

#[cfg(test)]
mod tests {
    use super::*;

    fn classifier() -> StageClassifier {
        StageClassifier::new(DetectionThresholds::default()).unwrap()
    }

    fn classify(c: &mut StageClassifier, hr: f64, movement: f64) -> StageLabel {
        c.classify(Reading::new(hr, movement)).unwrap()
    }

    #[test]
    fn test_large_movement_is_awake() {
        let mut c = classifier();
        assert_eq!(classify(&mut c, 50.0, 7.6), StageLabel::Awake);
        assert_eq!(classify(&mut c, 58.0, 100.0), StageLabel::Awake);
    }

    #[test]
    fn test_large_movement_overrides_rem_history() {
        let mut c = classifier();
        for hr in [60.0, 66.0, 61.0, 68.0] {
            classify(&mut c, hr, 3.0);
        }
        assert_eq!(classify(&mut c, 65.0, 8.0), StageLabel::Awake);
    }

    #[test]
    fn test_deep_sleep() {
        let mut c = classifier();
        assert_eq!(classify(&mut c, 58.0, 1.0), StageLabel::DeepSleep);
        assert_eq!(classify(&mut c, 59.9, 2.49), StageLabel::DeepSleep);
    }

    #[test]
    fn test_deep_sleep_needs_low_movement() {
        let mut c = classifier();
        // movement 2.5 is not below 5 * 0.5
        assert_eq!(classify(&mut c, 58.0, 2.5), StageLabel::LightSleep);
    }

    #[test]
    fn test_light_sleep() {
        let mut c = classifier();
        assert_eq!(classify(&mut c, 65.0, 3.0), StageLabel::LightSleep);
    }

    #[test]
    fn test_elevated_heart_rate_is_awake() {
        let mut c = classifier();
        assert_eq!(classify(&mut c, 70.0, 1.0), StageLabel::Awake);
        assert_eq!(classify(&mut c, 80.0, 6.0), StageLabel::Awake);
    }

    #[test]
    fn test_fallback_is_light_sleep() {
        let mut c = classifier();
        // Below light threshold, restless but not over the awake movement bar
        assert_eq!(classify(&mut c, 65.0, 6.0), StageLabel::LightSleep);
    }

    #[test]
    fn test_rem_needs_five_points() {
        let mut c = classifier();
        for hr in [60.0, 68.0, 61.0] {
            classify(&mut c, hr, 3.0);
        }
        // Only four readings: variable heart rate but no REM yet
        assert_eq!(classify(&mut c, 68.0, 3.0), StageLabel::LightSleep);
    }

    #[test]
    fn test_rem_detected_from_variability_and_movement() {
        let mut c = classifier();
        for hr in [60.0, 68.0, 61.0, 67.0] {
            classify(&mut c, hr, 3.0);
        }
        // variability high, moderate movement: two of three indicators
        assert_eq!(classify(&mut c, 62.0, 3.0), StageLabel::RemSleep);
    }

    #[test]
    fn test_rem_allows_slightly_elevated_heart_rate() {
        let mut c = classifier();
        for hr in [62.0, 64.0, 66.0, 68.0] {
            classify(&mut c, hr, 3.0);
        }
        // trend +10, variability > 3, moderate movement; 72 < 70 + 5
        assert_eq!(classify(&mut c, 72.0, 3.0), StageLabel::RemSleep);
    }

    #[test]
    fn test_rem_rejected_when_heart_rate_too_high() {
        let mut c = classifier();
        for hr in [62.0, 64.0, 66.0, 70.0] {
            classify(&mut c, hr, 3.0);
        }
        assert_eq!(classify(&mut c, 75.0, 3.0), StageLabel::Awake);
    }

    #[test]
    fn test_single_indicator_is_not_rem() {
        let mut c = classifier();
        for _ in 0..4 {
            classify(&mut c, 65.0, 1.0);
        }
        // Flat heart rate: only the movement indicator fires
        assert_eq!(classify(&mut c, 65.0, 3.0), StageLabel::LightSleep);
    }

    #[test]
    fn test_invalid_reading_is_rejected() {
        let mut c = classifier();
        let err = c.classify(Reading::new(f64::NAN, 1.0)).unwrap_err();
        assert!(matches!(
            err,
            ClassifyError::InvalidReading {
                field: "heart_rate",
                ..
            }
        ));
        let err = c.classify(Reading::new(60.0, f64::INFINITY)).unwrap_err();
        assert!(matches!(
            err,
            ClassifyError::InvalidReading {
                field: "movement",
                ..
            }
        ));
        assert!(c.history().is_empty());
    }

    #[test]
    fn test_inverted_thresholds_rejected() {
        let thresholds = DetectionThresholds {
            deep_sleep_hr_threshold: 75.0,
            light_sleep_hr_threshold: 70.0,
            movement_threshold: 5.0,
        };
        assert!(matches!(
            StageClassifier::new(thresholds),
            Err(ClassifyError::InvalidThresholds(_))
        ));
    }

    #[test]
    fn test_summary_empty() {
        let c = classifier();
        assert!(c.sleep_summary().is_none());
    }

    #[test]
    fn test_summary_values() {
        let mut c = classifier();
        classify(&mut c, 60.0, 1.0);
        classify(&mut c, 65.0, 2.0);
        classify(&mut c, 71.0, 2.5);

        let summary = c.sleep_summary().unwrap();
        assert_eq!(summary.data_points, 3);
        assert_eq!(summary.avg_heart_rate, 65.33);
        assert_eq!(summary.max_heart_rate, 71.0);
        assert_eq!(summary.min_heart_rate, 60.0);
        assert_eq!(summary.avg_movement, 1.83);
    }

    #[test]
    fn test_history_is_bounded() {
        let mut c = classifier();
        for i in 0..15 {
            classify(&mut c, 50.0 + i as f64, 1.0);
        }
        let summary = c.sleep_summary().unwrap();
        assert_eq!(summary.data_points, HISTORY_CAPACITY);
        assert_eq!(summary.min_heart_rate, 55.0);
        assert_eq!(summary.max_heart_rate, 64.0);
    }

    #[test]
    fn test_stage_label_round_trip_names() {
        for stage in StageLabel::ALL {
            assert_eq!(stage.as_str().parse::<StageLabel>().unwrap(), stage);
        }
        assert!("dozing".parse::<StageLabel>().is_err());
    }
}
