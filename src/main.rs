//! Smart Wake Agent CLI
//!
//! Sleep-stage monitoring with a stage-aware wake alarm.

use anyhow::Context;
use chrono::{Duration as ChronoDuration, Local, NaiveDateTime, Utc};
use clap::{Parser, Subcommand};
use smart_wake_agent::{
    config::Config,
    core::{timewin, StageClassifier},
    monitor::Monitor,
    sensor::{Collector, CollectorConfig, Reading, SensorSimulator, SensorSource},
    VERSION,
};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "smart-wake")]
#[command(version = VERSION)]
#[command(about = "Sleep-stage monitoring with a smart wake alarm", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Monitor in real time until the alarm fires or Ctrl+C
    Start {
        /// Override the configured wake time (HH:MM)
        #[arg(long)]
        wake_time: Option<String>,

        /// Override the configured wake window in minutes
        #[arg(long)]
        window: Option<u32>,
    },

    /// Replay a simulated night on an accelerated clock
    Simulate {
        /// Bedtime of the simulated night (HH:MM)
        #[arg(long, default_value = "23:00")]
        bedtime: String,

        /// Length of the simulated night in samples
        #[arg(long, default_value = "480")]
        samples: u32,

        /// Override the configured wake time (HH:MM)
        #[arg(long)]
        wake_time: Option<String>,

        /// Seed for a reproducible night
        #[arg(long)]
        seed: Option<u64>,
    },

    /// Classify a single reading with the configured thresholds
    Classify {
        #[arg(long)]
        heart_rate: f64,

        #[arg(long)]
        movement: f64,
    },

    /// Show the alarm as configured right now
    Status,

    /// Suggest wake times at sleep-cycle boundaries
    Cycles {
        /// When sleep starts (HH:MM)
        #[arg(long)]
        sleep_start: String,

        #[arg(long, default_value = "6")]
        min_hours: u32,

        #[arg(long, default_value = "9")]
        max_hours: u32,
    },

    /// Show configuration
    Config,

    /// Serve the HTTP API (requires server feature)
    #[cfg(feature = "server")]
    Serve {
        #[arg(long, default_value = "5000")]
        port: u16,
    },
}

fn main() -> anyhow::Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Start { wake_time, window } => cmd_start(wake_time, window),
        Commands::Simulate {
            bedtime,
            samples,
            wake_time,
            seed,
        } => cmd_simulate(&bedtime, samples, wake_time, seed),
        Commands::Classify {
            heart_rate,
            movement,
        } => cmd_classify(heart_rate, movement),
        Commands::Status => cmd_status(),
        Commands::Cycles {
            sleep_start,
            min_hours,
            max_hours,
        } => cmd_cycles(&sleep_start, min_hours, max_hours),
        Commands::Config => cmd_config(),
        #[cfg(feature = "server")]
        Commands::Serve { port } => cmd_serve(port),
    }
}

/// Load configuration and apply command-line overrides.
fn load_config(wake_time: Option<String>, window: Option<u32>) -> anyhow::Result<Config> {
    let mut config = Config::load().context("Could not load configuration")?;
    if let Some(wake_time) = wake_time {
        config.alarm_settings.wake_time = wake_time;
    }
    if let Some(window) = window {
        config.alarm_settings.alarm_window = window;
    }
    Ok(config)
}

fn now_local() -> NaiveDateTime {
    Local::now().naive_local()
}

fn cmd_start(wake_time: Option<String>, window: Option<u32>) -> anyhow::Result<()> {
    println!("Smart Wake Agent v{VERSION}");
    println!();

    let config = load_config(wake_time, window)?;
    let mut monitor = Monitor::from_config(&config, now_local())?;

    let status = monitor.scheduler().status();
    println!("Monitoring started");
    println!("  Wake time: {}", status.wake_time);
    println!("  Window: {} minutes", status.window_minutes);
    println!("  Sampling every {}s", config.sleep_detection.sampling_rate);
    println!();
    println!("Press Ctrl+C to stop");
    println!();

    let source = match config.device_settings.simulator_seed {
        Some(seed) => SensorSimulator::seeded(seed, config.sleep_detection.sampling_rate),
        None => SensorSimulator::new(config.sleep_detection.sampling_rate),
    }
    .with_device_name(config.device_settings.device_name.clone());
    let device = source.device_info();
    println!("Sensor: {} ({})", device.device_name, device.device_model);

    let mut collector = Collector::new(CollectorConfig {
        poll_interval: config.sleep_detection.sampling_interval(),
        ..CollectorConfig::default()
    });
    collector.start(source)?;

    // Set up Ctrl+C handler
    let running = Arc::new(AtomicBool::new(true));
    let r = Arc::clone(&running);
    ctrlc::set_handler(move || {
        r.store(false, Ordering::SeqCst);
    })
    .context("Error setting Ctrl+C handler")?;

    monitor.mark_sleep_start(now_local());
    let receiver = collector.receiver().clone();

    while running.load(Ordering::SeqCst) {
        let sample = match receiver.recv_timeout(Duration::from_millis(200)) {
            Ok(sample) => sample,
            Err(crossbeam_channel::RecvTimeoutError::Timeout) => continue,
            Err(crossbeam_channel::RecvTimeoutError::Disconnected) => {
                eprintln!("Sensor disconnected unexpectedly");
                break;
            }
        };

        let now = now_local();
        match monitor.tick(sample.reading, now) {
            Ok(outcome) => {
                println!(
                    "[{}] hr {:.1} movement {:.2} -> {}",
                    now.format("%H:%M:%S"),
                    sample.reading.heart_rate,
                    sample.reading.movement,
                    outcome.stage
                );
                if let Some(escalation) = outcome.escalation {
                    println!(
                        "Alarm fired after {} step(s){}",
                        escalation.steps_run,
                        if escalation.responded { ", user responded" } else { "" }
                    );
                    break;
                }
            }
            Err(e) => eprintln!("Warning: Skipping reading: {e}"),
        }
    }

    println!();
    println!("Stopping monitoring...");
    collector.stop();

    if let Some(summary) = monitor.classifier().sleep_summary() {
        println!(
            "Recent heart rate: avg {:.2} (min {:.1}, max {:.1}) over {} readings",
            summary.avg_heart_rate,
            summary.min_heart_rate,
            summary.max_heart_rate,
            summary.data_points
        );
    }
    println!();
    println!("{}", monitor.stats().summary());
    Ok(())
}

fn cmd_simulate(
    bedtime: &str,
    samples: u32,
    wake_time: Option<String>,
    seed: Option<u64>,
) -> anyhow::Result<()> {
    let config = load_config(wake_time, None)?;

    let bedtime = timewin::parse_time_of_day(bedtime)
        .with_context(|| format!("Invalid bedtime '{bedtime}', expected HH:MM"))?;
    let start = timewin::next_occurrence(bedtime, now_local());

    let mut monitor = Monitor::from_config(&config, start)?;
    monitor.mark_sleep_start(start);

    let rate = config.sleep_detection.sampling_rate;
    let seed = seed.or(config.device_settings.simulator_seed);
    let mut sensor = match seed {
        Some(seed) => SensorSimulator::seeded(seed, rate),
        None => SensorSimulator::new(rate),
    }
    .starting_at(Utc::now());

    println!(
        "Simulating {} samples from {} (wake {}, window {} min)",
        samples,
        start.format("%Y-%m-%d %H:%M"),
        monitor.scheduler().status_at(start).wake_time,
        config.alarm_settings.alarm_window
    );

    let step = ChronoDuration::seconds(rate as i64);
    let per_hour = (3600 / rate).max(1);
    let mut now = start;
    let mut fired = false;

    for i in 0..samples {
        let sample = sensor.next_sample()?;
        let outcome = match monitor.tick(sample.reading, now) {
            Ok(outcome) => outcome,
            Err(e) => {
                eprintln!("Warning: Skipping reading: {e}");
                now += step;
                continue;
            }
        };

        if let Some(escalation) = outcome.escalation {
            println!(
                "[{}] Woke during {} after {} step(s)",
                now.format("%H:%M"),
                outcome.stage,
                escalation.steps_run
            );
            fired = true;
            break;
        }

        if u64::from(i) % per_hour == 0 {
            println!(
                "[{}] {} (simulated {})",
                now.format("%H:%M"),
                outcome.stage,
                sensor.current_phase()
            );
        }
        now += step;
    }

    if !fired {
        println!("Night ended at {} without a wake trigger", now.format("%H:%M"));
    }

    println!();
    println!("{}", monitor.stats().summary());
    Ok(())
}

fn cmd_classify(heart_rate: f64, movement: f64) -> anyhow::Result<()> {
    let config = Config::load().unwrap_or_default();
    let mut classifier = StageClassifier::new(config.sleep_detection.thresholds)?;
    let stage = classifier.classify(Reading::new(heart_rate, movement))?;
    println!("{stage}");
    Ok(())
}

fn cmd_status() -> anyhow::Result<()> {
    let config = Config::load().unwrap_or_default();
    let monitor = Monitor::from_config(&config, now_local())?;
    let status = monitor.scheduler().status();
    let window = monitor.scheduler().window();

    println!("Smart Wake Agent Status");
    println!("=======================");
    println!();
    println!("Alarm:");
    println!("  Wake time: {}", status.wake_time);
    println!(
        "  Window: {} - {} ({} minutes)",
        window.start.format("%H:%M"),
        window.end.format("%H:%M"),
        status.window_minutes
    );
    println!("  Escalation steps: {}", monitor.scheduler().duration_units());
    println!("  Current time: {}", status.current_time);
    println!(
        "  Night time: {}",
        if timewin::is_night_time(&now_local()) {
            "yes"
        } else {
            "no"
        }
    );
    println!();

    let thresholds = monitor.classifier().thresholds();
    println!("Detection thresholds:");
    println!("  Deep sleep HR: < {}", thresholds.deep_sleep_hr_threshold);
    println!("  Light sleep HR: < {}", thresholds.light_sleep_hr_threshold);
    println!("  Movement: {}", thresholds.movement_threshold);
    Ok(())
}

fn cmd_cycles(sleep_start: &str, min_hours: u32, max_hours: u32) -> anyhow::Result<()> {
    let time = timewin::parse_time_of_day(sleep_start)
        .with_context(|| format!("Invalid sleep start '{sleep_start}', expected HH:MM"))?;
    let start = timewin::next_occurrence(time, now_local());

    println!("Sleep cycles from {}:", start.format("%H:%M"));
    for (i, t) in timewin::sleep_cycle_times(start, max_hours * 60).iter().enumerate() {
        println!("  cycle {}: {}", i + 1, t.format("%H:%M"));
    }
    println!();

    let suggestions = timewin::optimal_wake_times(start, min_hours, max_hours);
    if suggestions.is_empty() {
        println!("No cycle boundary between {min_hours}h and {max_hours}h of sleep");
    } else {
        println!("Suggested wake times:");
        for t in suggestions {
            println!(
                "  {} ({} minutes of sleep)",
                t.format("%H:%M"),
                timewin::minutes_between(start, t)
            );
        }
    }
    Ok(())
}

fn cmd_config() -> anyhow::Result<()> {
    let config = Config::load().unwrap_or_default();

    println!("Configuration");
    println!("=============");
    println!();
    println!("Config file: {:?}", Config::config_path());
    println!();
    println!("{}", serde_json::to_string_pretty(&config)?);
    Ok(())
}

#[cfg(feature = "server")]
fn cmd_serve(port: u16) -> anyhow::Result<()> {
    use smart_wake_agent::server::{run, ServerConfig};

    let config = Config::load().context("Could not load configuration")?;
    let runtime = tokio::runtime::Runtime::new()?;

    runtime.block_on(async {
        let (addr, shutdown_tx) = run(ServerConfig::new(port, config)).await?;
        println!("Listening on http://{addr}");
        println!("Press Ctrl+C to stop");

        tokio::signal::ctrl_c().await?;
        let _ = shutdown_tx.send(());
        Ok::<(), anyhow::Error>(())
    })
}
