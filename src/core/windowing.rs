//! Bounded history of recent readings.
//!
//! The classifier keeps the last few readings in a fixed-capacity FIFO and
//! derives short-term heart-rate trend statistics from its tail.

use crate::sensor::types::Reading;
use statrs::statistics::Statistics;
use std::collections::VecDeque;

/// Heart-rate trend over the tail of the window.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct HeartRateTrend {
    /// Last minus first heart rate in the tail
    pub trend: f64,
    /// Sample standard deviation of the tail (0 when all values are equal)
    pub variability: f64,
}

/// Fixed-capacity, chronologically ordered reading buffer.
#[derive(Debug, Clone)]
pub struct ReadingWindow {
    capacity: usize,
    readings: VecDeque<Reading>,
}

impl ReadingWindow {
    /// Create an empty window holding at most `capacity` readings.
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            capacity,
            readings: VecDeque::with_capacity(capacity),
        }
    }

    /// Append a reading, returning the evicted oldest one if the window was full.
    pub fn push(&mut self, reading: Reading) -> Option<Reading> {
        let evicted = if self.readings.len() == self.capacity {
            self.readings.pop_front()
        } else {
            None
        };
        self.readings.push_back(reading);
        evicted
    }

    pub fn len(&self) -> usize {
        self.readings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.readings.is_empty()
    }

    /// Oldest to newest.
    pub fn iter(&self) -> impl Iterator<Item = &Reading> {
        self.readings.iter()
    }

    /// The most recent `n` readings (or fewer), oldest first.
    pub fn tail(&self, n: usize) -> impl Iterator<Item = &Reading> {
        let skip = self.readings.len().saturating_sub(n);
        self.readings.iter().skip(skip)
    }

    /// Trend statistics over the last `n` heart rates.
    ///
    /// Returns `None` until the window holds at least `n` readings.
    pub fn heart_rate_trend(&self, n: usize) -> Option<HeartRateTrend> {
        if n < 2 || self.readings.len() < n {
            return None;
        }

        let rates: Vec<f64> = self.tail(n).map(|r| r.heart_rate).collect();
        let first = rates[0];
        let last = rates[rates.len() - 1];

        let all_equal = rates.iter().all(|&hr| hr == first);
        let variability = if all_equal { 0.0 } else { rates.iter().std_dev() };

        Some(HeartRateTrend {
            trend: last - first,
            variability,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn reading(hr: f64) -> Reading {
        Reading::new(hr, 1.0)
    }

    #[test]
    fn test_window_evicts_oldest() {
        let mut window = ReadingWindow::new(3);
        assert!(window.push(reading(60.0)).is_none());
        assert!(window.push(reading(61.0)).is_none());
        assert!(window.push(reading(62.0)).is_none());

        let evicted = window.push(reading(63.0)).unwrap();
        assert_eq!(evicted.heart_rate, 60.0);
        assert_eq!(window.len(), 3);

        let rates: Vec<f64> = window.iter().map(|r| r.heart_rate).collect();
        assert_eq!(rates, vec![61.0, 62.0, 63.0]);
    }

    #[test]
    fn test_tail_is_oldest_first() {
        let mut window = ReadingWindow::new(10);
        for hr in [60.0, 61.0, 62.0, 63.0] {
            window.push(reading(hr));
        }
        let tail: Vec<f64> = window.tail(2).map(|r| r.heart_rate).collect();
        assert_eq!(tail, vec![62.0, 63.0]);

        let all: Vec<f64> = window.tail(10).map(|r| r.heart_rate).collect();
        assert_eq!(all.len(), 4);
    }

    #[test]
    fn test_trend_requires_enough_points() {
        let mut window = ReadingWindow::new(10);
        for hr in [60.0, 61.0, 62.0, 63.0] {
            window.push(reading(hr));
        }
        assert!(window.heart_rate_trend(5).is_none());
    }

    #[test]
    fn test_trend_and_sample_std_dev() {
        let mut window = ReadingWindow::new(10);
        for hr in [50.0, 60.0, 62.0, 64.0, 66.0, 68.0] {
            window.push(reading(hr));
        }
        let trend = window.heart_rate_trend(5).unwrap();
        assert_eq!(trend.trend, 8.0);
        // Sample std dev of 60, 62, 64, 66, 68 is sqrt(10)
        assert!((trend.variability - 10f64.sqrt()).abs() < 1e-9);
    }

    #[test]
    fn test_flat_trend_has_zero_variability() {
        let mut window = ReadingWindow::new(10);
        for _ in 0..5 {
            window.push(reading(64.0));
        }
        let trend = window.heart_rate_trend(5).unwrap();
        assert_eq!(trend.trend, 0.0);
        assert_eq!(trend.variability, 0.0);
    }
}
