//! Walk through one simulated night with the smart wake alarm.
//!
//! This example shows how to:
//! 1. Build a classifier and a scheduler from configuration
//! 2. Drive a seeded sensor simulator on an accelerated clock
//! 3. Let the monitor fire the alarm inside the wake window
//! 4. Print the session tally
//!
//! Run with: cargo run --example overnight_demo

use chrono::{Duration, NaiveDate, Utc};

use smart_wake_agent::{
    core::{timewin, EscalationTiming, WakeScheduler},
    Config, Monitor, SensorSimulator, SensorSource,
};

fn main() -> Result<(), Box<dyn std::error::Error>> {
    println!("Smart Wake Agent - Overnight Demo");
    println!("=================================");
    println!();

    let config = Config::default();
    let bedtime = NaiveDate::from_ymd_opt(2026, 3, 10)
        .and_then(|d| d.and_hms_opt(23, 0, 0))
        .ok_or("invalid bedtime")?;

    let scheduler = WakeScheduler::with_reference(&config.alarm_settings, bedtime)
        .with_timing(EscalationTiming::instant());
    let mut monitor = Monitor::from_config(&config, bedtime)?.with_scheduler(scheduler);
    monitor.mark_sleep_start(bedtime);

    let window = monitor.scheduler().window();
    println!("Bedtime:     {}", bedtime.format("%Y-%m-%d %H:%M"));
    println!(
        "Wake window: {} - {}",
        window.start.format("%H:%M"),
        window.end.format("%H:%M")
    );
    println!("Cycle boundaries worth waking at:");
    for t in timewin::optimal_wake_times(bedtime, 6, 9) {
        println!("  {}", t.format("%H:%M"));
    }
    println!();

    let rate = config.sleep_detection.sampling_rate;
    let mut sensor = SensorSimulator::seeded(42, rate).starting_at(Utc::now());
    let mut now = bedtime;
    let mut last_stage = None;

    while now <= window.end {
        let sample = sensor.next_sample()?;
        let outcome = monitor.tick(sample.reading, now)?;

        if last_stage != Some(outcome.stage) {
            println!("[{}] {}", now.format("%H:%M"), outcome.stage);
            last_stage = Some(outcome.stage);
        }

        if let Some(escalation) = outcome.escalation {
            println!();
            println!(
                "Alarm fired at {} during {} ({} step(s))",
                now.format("%H:%M"),
                outcome.stage,
                escalation.steps_run
            );
            break;
        }

        now += Duration::seconds(rate as i64);
    }

    if !monitor.scheduler().is_triggered() {
        println!();
        println!("No light sleep inside the window; the alarm did not fire");
    }

    println!();
    println!("{}", monitor.stats().summary());
    Ok(())
}
