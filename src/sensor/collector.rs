//! Background polling of a sensor source.
//!
//! The collector owns a worker thread that pulls one sample per poll interval
//! and forwards it over a bounded channel. The sampling loop drains the
//! receiver at its own pace.

use crate::sensor::types::SensorSample;
use crate::sensor::{SensorError, SensorSource};
use crossbeam_channel::{bounded, Receiver, Sender, TrySendError};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

/// Polling configuration.
#[derive(Debug, Clone)]
pub struct CollectorConfig {
    /// Time between two pulls from the source
    pub poll_interval: Duration,
    /// Maximum number of samples buffered; further samples are dropped
    pub channel_capacity: usize,
}

impl Default for CollectorConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(60),
            channel_capacity: 1_000,
        }
    }
}

/// Polls a [`SensorSource`] on a worker thread.
pub struct Collector {
    config: CollectorConfig,
    sender: Sender<SensorSample>,
    receiver: Receiver<SensorSample>,
    running: Arc<AtomicBool>,
    worker: Option<JoinHandle<()>>,
}

impl Collector {
    /// Create a new, idle collector.
    pub fn new(config: CollectorConfig) -> Self {
        let (sender, receiver) = bounded(config.channel_capacity.max(1));
        Self {
            config,
            sender,
            receiver,
            running: Arc::new(AtomicBool::new(false)),
            worker: None,
        }
    }

    /// Start polling `source`. The source moves onto the worker thread.
    pub fn start<S>(&mut self, mut source: S) -> Result<(), SensorError>
    where
        S: SensorSource + Send + 'static,
    {
        if self.running.swap(true, Ordering::SeqCst) {
            return Err(SensorError::AlreadyRunning);
        }

        let sender = self.sender.clone();
        let running = Arc::clone(&self.running);
        let poll_interval = self.config.poll_interval;

        let spawned = thread::Builder::new()
            .name("sensor-collector".to_string())
            .spawn(move || {
                while running.load(Ordering::SeqCst) {
                    match source.next_sample() {
                        Ok(sample) => match sender.try_send(sample) {
                            Ok(()) => {}
                            Err(TrySendError::Full(_)) => {
                                tracing::warn!("Sample buffer full, dropping reading")
                            }
                            Err(TrySendError::Disconnected(_)) => break,
                        },
                        Err(e) => tracing::warn!("Sensor read failed: {}", e),
                    }
                    sleep_while_running(&running, poll_interval);
                }
            });

        match spawned {
            Ok(handle) => {
                self.worker = Some(handle);
                Ok(())
            }
            Err(e) => {
                self.running.store(false, Ordering::SeqCst);
                Err(SensorError::Unavailable(e.to_string()))
            }
        }
    }

    /// Stop polling and wait for the worker to exit.
    pub fn stop(&mut self) {
        self.running.store(false, Ordering::SeqCst);
        if let Some(handle) = self.worker.take() {
            if handle.join().is_err() {
                tracing::error!("Sensor collector thread panicked");
            }
        }
    }

    /// Check if the collector is currently running.
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Get the receiver for sensor samples.
    pub fn receiver(&self) -> &Receiver<SensorSample> {
        &self.receiver
    }
}

impl Drop for Collector {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Sleep for `total`, waking early once `running` is cleared.
fn sleep_while_running(running: &AtomicBool, total: Duration) {
    const SLICE: Duration = Duration::from_millis(50);
    let mut remaining = total;
    while !remaining.is_zero() && running.load(Ordering::SeqCst) {
        let step = remaining.min(SLICE);
        thread::sleep(step);
        remaining -= step;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sensor::types::{DeviceInfo, DeviceStatus, Reading};

    struct FixedSource {
        heart_rate: f64,
    }

    impl SensorSource for FixedSource {
        fn next_sample(&mut self) -> Result<SensorSample, SensorError> {
            Ok(SensorSample::new(
                Reading::new(self.heart_rate, 0.5),
                DeviceStatus::Connected,
            ))
        }

        fn device_info(&self) -> DeviceInfo {
            DeviceInfo {
                connected: true,
                device_model: "fixed".to_string(),
                device_name: "fixed".to_string(),
                use_simulation: true,
            }
        }
    }

    fn fast_config() -> CollectorConfig {
        CollectorConfig {
            poll_interval: Duration::from_millis(5),
            channel_capacity: 16,
        }
    }

    #[test]
    fn test_collector_delivers_samples() {
        let mut collector = Collector::new(fast_config());
        collector.start(FixedSource { heart_rate: 61.0 }).unwrap();
        assert!(collector.is_running());

        let sample = collector
            .receiver()
            .recv_timeout(Duration::from_secs(2))
            .expect("no sample received");
        assert_eq!(sample.reading.heart_rate, 61.0);

        collector.stop();
        assert!(!collector.is_running());
    }

    #[test]
    fn test_double_start_is_rejected() {
        let mut collector = Collector::new(fast_config());
        collector.start(FixedSource { heart_rate: 61.0 }).unwrap();
        let err = collector.start(FixedSource { heart_rate: 62.0 });
        assert!(matches!(err, Err(SensorError::AlreadyRunning)));
        collector.stop();
    }
}
