//! Smart wake alarm.
//!
//! The scheduler fires inside a window ending at the target wake time, but
//! only when the sleeper is in a stage that is easy to wake from. Firing runs
//! a short escalating signal sequence that stops as soon as the user responds.

use crate::core::classifier::StageLabel;
use crate::core::timewin::{parse_wake_time, WakeTimeParse, WakeWindow};
use chrono::{Duration, Local, NaiveDateTime};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use std::any::Any;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::thread;
use std::time::Duration as StdDuration;

/// Minutes before the target in which REM sleep is interrupted anyway, and the
/// tolerance around the target for acknowledging an already-awake user.
const NEAR_TARGET_MINUTES: i64 = 5;

/// Chance per step that the simulated user responds.
pub const DEFAULT_RESPONSE_PROBABILITY: f64 = 0.3;

/// Alarm configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlarmSettings {
    /// Target wake time, 24-hour `"HH:MM"`
    pub wake_time: String,
    /// Minutes before `wake_time` in which an early wake may fire
    pub alarm_window: u32,
    /// Number of escalation steps
    pub alarm_duration: u32,
}

impl Default for AlarmSettings {
    fn default() -> Self {
        Self {
            wake_time: "07:00".to_string(),
            alarm_window: 30,
            alarm_duration: 5,
        }
    }
}

/// Signal strength of one escalation step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Intensity {
    Gentle,
    Stronger,
    Sustained,
}

impl fmt::Display for Intensity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Intensity::Gentle => f.write_str("gentle"),
            Intensity::Stronger => f.write_str("stronger"),
            Intensity::Sustained => f.write_str("sustained"),
        }
    }
}

/// Hold durations for escalation steps.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EscalationTiming {
    /// Hold for the gentle and stronger steps
    pub short_hold: StdDuration,
    /// Hold for every sustained step
    pub long_hold: StdDuration,
}

impl Default for EscalationTiming {
    fn default() -> Self {
        Self {
            short_hold: StdDuration::from_millis(500),
            long_hold: StdDuration::from_secs(1),
        }
    }
}

impl EscalationTiming {
    /// No holds at all.
    pub fn instant() -> Self {
        Self {
            short_hold: StdDuration::ZERO,
            long_hold: StdDuration::ZERO,
        }
    }
}

/// One step of the escalation sequence.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EscalationStep {
    pub index: u32,
    pub intensity: Intensity,
    pub hold: StdDuration,
}

impl EscalationStep {
    pub fn new(index: u32, timing: &EscalationTiming) -> Self {
        let (intensity, hold) = match index {
            0 => (Intensity::Gentle, timing.short_hold),
            1 => (Intensity::Stronger, timing.short_hold),
            _ => (Intensity::Sustained, timing.long_hold),
        };
        Self {
            index,
            intensity,
            hold,
        }
    }
}

/// What happened during one escalation run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EscalationOutcome {
    pub steps_run: u32,
    /// The response check reported the user awake
    pub responded: bool,
    /// Set when the response check failed and the sequence was cut short
    pub failure: Option<String>,
}

/// Alarm errors.
#[derive(Debug, Clone, PartialEq)]
pub enum AlarmError {
    ResponseCheck(String),
}

impl fmt::Display for AlarmError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AlarmError::ResponseCheck(e) => write!(f, "Response check failed: {e}"),
        }
    }
}

impl std::error::Error for AlarmError {}

/// Decides after each escalation step whether the user has responded.
pub trait ResponseCheck {
    fn user_responded(&mut self, step: &EscalationStep) -> Result<bool, AlarmError>;
}

impl<F> ResponseCheck for F
where
    F: FnMut(&EscalationStep) -> Result<bool, AlarmError>,
{
    fn user_responded(&mut self, step: &EscalationStep) -> Result<bool, AlarmError> {
        self(step)
    }
}

/// Responds with a fixed probability per step.
pub struct RandomResponse {
    probability: f64,
    rng: StdRng,
}

impl RandomResponse {
    pub fn new(probability: f64) -> Self {
        Self {
            probability: probability.clamp(0.0, 1.0),
            rng: StdRng::from_entropy(),
        }
    }

    pub fn seeded(probability: f64, seed: u64) -> Self {
        Self {
            probability: probability.clamp(0.0, 1.0),
            rng: StdRng::seed_from_u64(seed),
        }
    }
}

impl Default for RandomResponse {
    fn default() -> Self {
        Self::new(DEFAULT_RESPONSE_PROBABILITY)
    }
}

impl ResponseCheck for RandomResponse {
    fn user_responded(&mut self, _step: &EscalationStep) -> Result<bool, AlarmError> {
        Ok(self.rng.gen::<f64>() < self.probability)
    }
}

/// Read-only view of the alarm.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AlarmStatus {
    /// `"HH:MM"`
    pub wake_time: String,
    pub window_minutes: u32,
    pub triggered: bool,
    /// `"HH:MM:SS"`
    pub current_time: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sleep_start: Option<String>,
}

/// Stage-aware, one-shot wake alarm.
pub struct WakeScheduler {
    wake_time: NaiveDateTime,
    window_minutes: u32,
    duration_units: u32,
    triggered: bool,
    sleep_start: Option<NaiveDateTime>,
    timing: EscalationTiming,
    responder: Box<dyn ResponseCheck + Send>,
}

impl WakeScheduler {
    /// Create a scheduler resolving the wake time against the local clock.
    pub fn new(settings: &AlarmSettings) -> Self {
        Self::with_reference(settings, Local::now().naive_local())
    }

    /// Create a scheduler resolving the wake time against `now`.
    pub fn with_reference(settings: &AlarmSettings, now: NaiveDateTime) -> Self {
        let wake_time = resolve_wake_time(&settings.wake_time, now).at();
        Self {
            wake_time,
            window_minutes: settings.alarm_window,
            duration_units: settings.alarm_duration,
            triggered: false,
            sleep_start: None,
            timing: EscalationTiming::default(),
            responder: Box::new(RandomResponse::default()),
        }
    }

    /// Replace the user-response check.
    pub fn with_responder<R>(mut self, responder: R) -> Self
    where
        R: ResponseCheck + Send + 'static,
    {
        self.responder = Box::new(responder);
        self
    }

    pub fn with_timing(mut self, timing: EscalationTiming) -> Self {
        self.timing = timing;
        self
    }

    pub fn wake_time(&self) -> NaiveDateTime {
        self.wake_time
    }

    pub fn window(&self) -> WakeWindow {
        WakeWindow::ending_at(self.wake_time, self.window_minutes)
    }

    pub fn window_minutes(&self) -> u32 {
        self.window_minutes
    }

    pub fn duration_units(&self) -> u32 {
        self.duration_units
    }

    pub fn is_triggered(&self) -> bool {
        self.triggered
    }

    /// Record when the sleeper fell asleep.
    pub fn mark_sleep_start(&mut self, at: NaiveDateTime) {
        self.sleep_start = Some(at);
    }

    pub fn sleep_start(&self) -> Option<NaiveDateTime> {
        self.sleep_start
    }

    /// Whether the alarm should fire for `stage` at `now`.
    ///
    /// Inside the window: light sleep always fires, REM fires within five
    /// minutes of the target, and an awake user is acknowledged within five
    /// minutes either side of it. Deep sleep never fires.
    pub fn should_wake(&self, stage: StageLabel, now: NaiveDateTime) -> bool {
        if !self.window().contains(now) {
            return false;
        }

        let near = Duration::minutes(NEAR_TARGET_MINUTES);
        let wake = match stage {
            StageLabel::LightSleep => true,
            StageLabel::RemSleep => self.wake_time - now <= near,
            StageLabel::Awake => (now - self.wake_time).abs() <= near,
            StageLabel::DeepSleep => false,
        };

        if wake {
            tracing::info!(
                "Wake condition met at {} during {}",
                now.format("%H:%M"),
                stage
            );
        }

        wake
    }

    /// Fire the alarm once.
    ///
    /// Returns `None` if it has already fired. Otherwise runs the escalation
    /// sequence. The alarm counts as fired even if the response check fails
    /// or panics; either cuts the sequence short and is reported in
    /// [`EscalationOutcome::failure`].
    pub fn trigger(&mut self) -> Option<EscalationOutcome> {
        if self.triggered {
            return None;
        }

        self.triggered = true;
        tracing::info!("Alarm triggered, starting progressive wake");

        let outcome = self.escalate();
        if let Some(ref failure) = outcome.failure {
            tracing::error!("Alarm escalation failed: {}", failure);
        }

        Some(outcome)
    }

    fn escalate(&mut self) -> EscalationOutcome {
        let mut outcome = EscalationOutcome {
            steps_run: 0,
            responded: false,
            failure: None,
        };

        for index in 0..self.duration_units {
            let step = EscalationStep::new(index, &self.timing);
            tracing::info!("Escalation step {}: {} signal", step.index + 1, step.intensity);
            if !step.hold.is_zero() {
                thread::sleep(step.hold);
            }
            outcome.steps_run += 1;

            let response = panic::catch_unwind(AssertUnwindSafe(|| {
                self.responder.user_responded(&step)
            }))
            .unwrap_or_else(|payload| {
                Err(AlarmError::ResponseCheck(panic_message(payload.as_ref())))
            });

            match response {
                Ok(true) => {
                    tracing::info!("User responded, stopping alarm");
                    outcome.responded = true;
                    break;
                }
                Ok(false) => {}
                Err(e) => {
                    outcome.failure = Some(e.to_string());
                    break;
                }
            }
        }

        outcome
    }

    /// Snapshot against the local clock.
    pub fn status(&self) -> AlarmStatus {
        self.status_at(Local::now().naive_local())
    }

    pub fn status_at(&self, now: NaiveDateTime) -> AlarmStatus {
        AlarmStatus {
            wake_time: self.wake_time.format("%H:%M").to_string(),
            window_minutes: self.window_minutes,
            triggered: self.triggered,
            current_time: now.format("%H:%M:%S").to_string(),
            sleep_start: self
                .sleep_start
                .map(|t| t.format("%Y-%m-%d %H:%M").to_string()),
        }
    }

    /// Re-resolve the wake time against the local clock.
    pub fn update_wake_time(&mut self, time: &str) -> WakeTimeParse {
        self.update_wake_time_at(time, Local::now().naive_local())
    }

    /// Re-resolve the wake time against `now`. Does not re-arm a fired alarm.
    pub fn update_wake_time_at(&mut self, time: &str, now: NaiveDateTime) -> WakeTimeParse {
        let parsed = resolve_wake_time(time, now);
        self.wake_time = parsed.at();
        tracing::info!("Wake time updated to {}", self.wake_time.format("%H:%M"));
        parsed
    }
}

impl fmt::Debug for WakeScheduler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WakeScheduler")
            .field("wake_time", &self.wake_time)
            .field("window_minutes", &self.window_minutes)
            .field("duration_units", &self.duration_units)
            .field("triggered", &self.triggered)
            .finish_non_exhaustive()
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    let message = payload
        .downcast_ref::<&str>()
        .map(|s| s.to_string())
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "unknown cause".to_string());
    format!("panicked: {message}")
}

/// Parse and report any fallback to the default wake time.
fn resolve_wake_time(time: &str, now: NaiveDateTime) -> WakeTimeParse {
    let parsed = parse_wake_time(time, now);
    if let WakeTimeParse::Defaulted { at, input } = &parsed {
        tracing::warn!(
            "Invalid wake time '{}', using default {}",
            input,
            at.format("%Y-%m-%d %H:%M")
        );
    }
    parsed
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    fn at(day: u32, hour: u32, minute: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2026, 3, day)
            .unwrap()
            .and_hms_opt(hour, minute, 0)
            .unwrap()
    }

    /// Wake at 07:00 on the 11th, configured at 23:00 on the 10th.
    fn scheduler(steps: u32) -> WakeScheduler {
        let settings = AlarmSettings {
            wake_time: "07:00".to_string(),
            alarm_window: 30,
            alarm_duration: steps,
        };
        WakeScheduler::with_reference(&settings, at(10, 23, 0))
            .with_timing(EscalationTiming::instant())
            .with_responder(check(|_| Ok(false)))
    }

    fn check<F>(f: F) -> F
    where
        F: FnMut(&EscalationStep) -> Result<bool, AlarmError>,
    {
        f
    }

    #[test]
    fn test_wake_time_resolution() {
        let s = scheduler(5);
        assert_eq!(s.wake_time(), at(11, 7, 0));
        assert_eq!(s.window().start, at(11, 6, 30));
    }

    #[test]
    fn test_outside_window_never_wakes() {
        let s = scheduler(5);
        for stage in StageLabel::ALL {
            assert!(!s.should_wake(stage, at(11, 6, 0)));
            assert!(!s.should_wake(stage, at(11, 6, 29)));
            assert!(!s.should_wake(stage, at(11, 7, 1)));
        }
    }

    #[test]
    fn test_light_sleep_wakes_anywhere_in_window() {
        let s = scheduler(5);
        for minute in 30..60 {
            assert!(s.should_wake(StageLabel::LightSleep, at(11, 6, minute)));
        }
        assert!(s.should_wake(StageLabel::LightSleep, at(11, 7, 0)));
    }

    #[test]
    fn test_rem_wakes_only_near_target() {
        let s = scheduler(5);
        assert!(!s.should_wake(StageLabel::RemSleep, at(11, 6, 45)));
        assert!(!s.should_wake(StageLabel::RemSleep, at(11, 6, 54)));
        assert!(s.should_wake(StageLabel::RemSleep, at(11, 6, 55)));
        assert!(s.should_wake(StageLabel::RemSleep, at(11, 7, 0)));
    }

    #[test]
    fn test_awake_acknowledged_near_target() {
        let s = scheduler(5);
        assert!(!s.should_wake(StageLabel::Awake, at(11, 6, 40)));
        assert!(s.should_wake(StageLabel::Awake, at(11, 6, 56)));
    }

    #[test]
    fn test_deep_sleep_never_wakes() {
        let s = scheduler(5);
        assert!(!s.should_wake(StageLabel::DeepSleep, at(11, 6, 45)));
        assert!(!s.should_wake(StageLabel::DeepSleep, at(11, 7, 0)));
    }

    #[test]
    fn test_escalation_runs_all_steps_without_response() {
        let mut s = scheduler(5);
        let outcome = s.trigger().unwrap();
        assert_eq!(outcome.steps_run, 5);
        assert!(!outcome.responded);
        assert!(outcome.failure.is_none());
        assert!(s.is_triggered());
    }

    #[test]
    fn test_escalation_stops_on_response() {
        let calls = Arc::new(AtomicU32::new(0));
        let seen = Arc::clone(&calls);
        let mut s = scheduler(5).with_responder(check(move |step| {
            seen.fetch_add(1, Ordering::SeqCst);
            Ok(step.index == 1)
        }));

        let outcome = s.trigger().unwrap();
        assert_eq!(outcome.steps_run, 2);
        assert!(outcome.responded);
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_trigger_is_one_shot() {
        let calls = Arc::new(AtomicU32::new(0));
        let seen = Arc::clone(&calls);
        let mut s = scheduler(3).with_responder(check(move |_| {
            seen.fetch_add(1, Ordering::SeqCst);
            Ok(false)
        }));

        assert!(s.trigger().is_some());
        assert!(s.trigger().is_none());
        assert_eq!(calls.load(Ordering::SeqCst), 3);
        assert!(s.status_at(at(11, 7, 0)).triggered);
    }

    #[test]
    fn test_failing_response_check_still_marks_triggered() {
        let mut s = scheduler(5).with_responder(check(|_| {
            Err(AlarmError::ResponseCheck("button unavailable".to_string()))
        }));

        let outcome = s.trigger().unwrap();
        assert_eq!(outcome.steps_run, 1);
        assert!(outcome.failure.unwrap().contains("button unavailable"));
        assert!(s.is_triggered());
    }

    #[test]
    fn test_panicking_response_check_still_marks_triggered() {
        let mut s = scheduler(5).with_responder(check(|_| {
            panic!("sensor driver fault")
        }));

        let outcome = s.trigger().unwrap();
        assert_eq!(outcome.steps_run, 1);
        assert!(!outcome.responded);
        assert!(outcome.failure.unwrap().contains("sensor driver fault"));
        assert!(s.is_triggered());
        assert!(s.trigger().is_none());
    }

    #[test]
    fn test_zero_steps_is_not_a_failure() {
        let mut s = scheduler(0);
        let outcome = s.trigger().unwrap();
        assert_eq!(outcome.steps_run, 0);
        assert!(outcome.failure.is_none());
        assert!(s.is_triggered());
    }

    #[test]
    fn test_step_intensities() {
        let timing = EscalationTiming::default();
        assert_eq!(EscalationStep::new(0, &timing).intensity, Intensity::Gentle);
        assert_eq!(EscalationStep::new(1, &timing).intensity, Intensity::Stronger);
        assert_eq!(EscalationStep::new(2, &timing).intensity, Intensity::Sustained);
        assert_eq!(EscalationStep::new(7, &timing).intensity, Intensity::Sustained);
        assert_eq!(EscalationStep::new(1, &timing).hold, timing.short_hold);
        assert_eq!(EscalationStep::new(2, &timing).hold, timing.long_hold);
    }

    #[test]
    fn test_update_wake_time() {
        let mut s = scheduler(5);
        let parsed = s.update_wake_time_at("08:15", at(10, 23, 30));
        assert!(!parsed.is_default());
        assert_eq!(s.status_at(at(10, 23, 30)).wake_time, "08:15");
        assert_eq!(s.wake_time(), at(11, 8, 15));
    }

    #[test]
    fn test_update_does_not_rearm() {
        let mut s = scheduler(1);
        s.trigger();
        s.update_wake_time_at("08:15", at(11, 7, 5));
        assert!(s.is_triggered());
        assert!(s.trigger().is_none());
    }

    #[test]
    fn test_malformed_wake_time_falls_back() {
        let settings = AlarmSettings {
            wake_time: "7h30".to_string(),
            ..AlarmSettings::default()
        };
        let s = WakeScheduler::with_reference(&settings, at(10, 2, 0));
        assert_eq!(s.wake_time(), at(11, 7, 0));
    }

    #[test]
    fn test_seeded_random_response_is_reproducible() {
        let step = EscalationStep::new(0, &EscalationTiming::instant());
        let mut a = RandomResponse::seeded(0.5, 9);
        let mut b = RandomResponse::seeded(0.5, 9);
        for _ in 0..10 {
            assert_eq!(
                a.user_responded(&step).unwrap(),
                b.user_responded(&step).unwrap()
            );
        }
        let mut never = RandomResponse::seeded(0.0, 1);
        assert!(!never.user_responded(&step).unwrap());
    }
}
