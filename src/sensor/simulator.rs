//! Simulated wrist sensor.
//!
//! Walks a fixed sleep-cycle schedule (awake, light, deep, then repeating
//! light/deep/REM cycles) and draws heart rate and movement from per-stage
//! ranges with noise, occasional body-turn spikes and a per-sample heart-rate
//! slew limit.

use crate::core::StageLabel;
use crate::sensor::types::{DeviceInfo, DeviceStatus, Reading, SensorSample};
use crate::sensor::{SensorError, SensorSource};
use chrono::{DateTime, Duration, Utc};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

/// Phase lengths in seconds.
const AWAKE_SECS: u64 = 300;
const LIGHT_SECS: u64 = 1_200;
const DEEP_SECS: u64 = 1_800;
const REM_SECS: u64 = 900;

/// Largest heart-rate change allowed between two samples (bpm).
const MAX_HR_STEP: f64 = 5.0;

/// Probability of a body-turn movement spike while asleep.
const TURN_PROBABILITY: f64 = 0.05;

const HR_NOISE: f64 = 2.0;
const MOVEMENT_NOISE: f64 = 1.0;
const HR_FLOOR: f64 = 40.0;
const HR_CEILING: f64 = 120.0;

/// Sleep stage the simulated subject is in `offset_secs` after start.
pub fn phase_at(offset_secs: u64) -> StageLabel {
    let first_cycle_end = AWAKE_SECS + LIGHT_SECS + DEEP_SECS;

    if offset_secs < AWAKE_SECS {
        StageLabel::Awake
    } else if offset_secs < AWAKE_SECS + LIGHT_SECS {
        StageLabel::LightSleep
    } else if offset_secs < first_cycle_end {
        StageLabel::DeepSleep
    } else {
        let cycle = LIGHT_SECS + DEEP_SECS + REM_SECS;
        let t = (offset_secs - first_cycle_end) % cycle;
        if t < REM_SECS {
            StageLabel::RemSleep
        } else if t < REM_SECS + LIGHT_SECS {
            StageLabel::LightSleep
        } else {
            StageLabel::DeepSleep
        }
    }
}

fn heart_rate_range(stage: StageLabel) -> (f64, f64) {
    match stage {
        StageLabel::Awake => (70.0, 85.0),
        StageLabel::LightSleep => (65.0, 75.0),
        StageLabel::DeepSleep => (55.0, 65.0),
        StageLabel::RemSleep => (65.0, 75.0),
    }
}

fn movement_range(stage: StageLabel) -> (f64, f64) {
    match stage {
        StageLabel::Awake => (5.0, 15.0),
        StageLabel::LightSleep => (2.0, 8.0),
        StageLabel::DeepSleep => (0.0, 3.0),
        StageLabel::RemSleep => (3.0, 10.0),
    }
}

/// Deterministic-when-seeded simulated sensor.
pub struct SensorSimulator {
    rng: StdRng,
    started_at: DateTime<Utc>,
    sampling_rate_secs: u64,
    elapsed_secs: u64,
    last_heart_rate: f64,
    phase: StageLabel,
    device_name: String,
}

impl SensorSimulator {
    /// Create a simulator seeded from the OS.
    pub fn new(sampling_rate_secs: u64) -> Self {
        Self::with_rng(StdRng::from_entropy(), sampling_rate_secs)
    }

    /// Create a reproducible simulator.
    pub fn seeded(seed: u64, sampling_rate_secs: u64) -> Self {
        Self::with_rng(StdRng::seed_from_u64(seed), sampling_rate_secs)
    }

    fn with_rng(rng: StdRng, sampling_rate_secs: u64) -> Self {
        Self {
            rng,
            started_at: Utc::now(),
            sampling_rate_secs: sampling_rate_secs.max(1),
            elapsed_secs: 0,
            last_heart_rate: 75.0,
            phase: StageLabel::Awake,
            device_name: "Sensor Simulator".to_string(),
        }
    }

    /// Stamp readings relative to `start` instead of the construction time.
    pub fn starting_at(mut self, start: DateTime<Utc>) -> Self {
        self.started_at = start;
        self
    }

    pub fn with_device_name(mut self, name: impl Into<String>) -> Self {
        self.device_name = name.into();
        self
    }

    /// The stage the last sample was drawn from.
    pub fn current_phase(&self) -> StageLabel {
        self.phase
    }

    /// Simulated seconds since start.
    pub fn elapsed_secs(&self) -> u64 {
        self.elapsed_secs
    }

    fn generate_heart_rate(&mut self) -> f64 {
        let (lo, hi) = heart_rate_range(self.phase);
        let base = self.rng.gen_range(lo..hi);
        let mut heart_rate = base + self.rng.gen_range(-3.0..3.0);

        let change = heart_rate - self.last_heart_rate;
        if change.abs() > MAX_HR_STEP {
            heart_rate = self.last_heart_rate + MAX_HR_STEP.copysign(change);
        }

        self.last_heart_rate = heart_rate;
        heart_rate
    }

    fn generate_movement(&mut self) -> f64 {
        let (lo, hi) = movement_range(self.phase);
        if self.phase != StageLabel::Awake && self.rng.gen::<f64>() < TURN_PROBABILITY {
            self.rng.gen_range(hi..hi * 2.0)
        } else {
            self.rng.gen_range(lo..hi)
        }
    }

    fn noise(&mut self, level: f64) -> f64 {
        self.rng.gen_range(-level..level)
    }
}

impl SensorSource for SensorSimulator {
    fn next_sample(&mut self) -> Result<SensorSample, SensorError> {
        self.phase = phase_at(self.elapsed_secs);

        let heart_rate = self.generate_heart_rate() + self.noise(HR_NOISE);
        let movement = (self.generate_movement() + self.noise(MOVEMENT_NOISE)).max(0.0);

        let heart_rate = round_to(heart_rate.clamp(HR_FLOOR, HR_CEILING), 1);
        let movement = round_to(movement, 2);

        let timestamp = self.started_at + Duration::seconds(self.elapsed_secs as i64);
        self.elapsed_secs += self.sampling_rate_secs;

        Ok(
            SensorSample::new(Reading::at(timestamp, heart_rate, movement), DeviceStatus::Simulated)
                .with_battery(100),
        )
    }

    fn device_info(&self) -> DeviceInfo {
        DeviceInfo {
            connected: true,
            device_model: "Sensor Simulator".to_string(),
            device_name: self.device_name.clone(),
            use_simulation: true,
        }
    }
}

fn round_to(value: f64, decimals: i32) -> f64 {
    let factor = 10f64.powi(decimals);
    (value * factor).round() / factor
}
