//! Per-session mutable state threaded through snapshot processing.

use crate::record::{FeatureRecord, Field, FeatureValue};

/// Running minimum and maximum of one metric.
///
/// Bounds start unset and the first observed value seeds both, so a genuine
/// zero is a valid extremum.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RunningExtremes<T> {
    min: Option<T>,
    max: Option<T>,
}

impl<T> Default for RunningExtremes<T> {
    fn default() -> Self {
        Self { min: None, max: None }
    }
}

impl<T: PartialOrd + Copy> RunningExtremes<T> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fold in a value and return the updated `(min, max)`.
    pub fn update(&mut self, value: T) -> (T, T) {
        let min = match self.min {
            Some(min) if min <= value => min,
            _ => value,
        };
        let max = match self.max {
            Some(max) if max >= value => max,
            _ => value,
        };
        self.min = Some(min);
        self.max = Some(max);
        (min, max)
    }

    pub fn min(&self) -> Option<T> {
        self.min
    }

    pub fn max(&self) -> Option<T> {
        self.max
    }

    pub fn bounds(&self) -> Option<(T, T)> {
        self.min.zip(self.max)
    }
}

impl<T: PartialOrd + Copy + Into<FeatureValue>> RunningExtremes<T> {
    /// Update and write the bounds into `record` under the given columns.
    pub fn record(&mut self, value: T, record: &mut FeatureRecord, min_field: Field, max_field: Field) {
        let (min, max) = self.update(value);
        record.set(min_field, min);
        record.set(max_field, max);
    }
}

/// Mutable context for one experiment run or streaming session.
///
/// Never shared between sessions; every run gets a fresh one.
#[derive(Debug, Clone)]
pub struct SessionState {
    pub rtt: RunningExtremes<f64>,
    pub cwnd: RunningExtremes<i64>,
    pub ssthresh: RunningExtremes<i64>,
    /// Last cwnd seen by the streaming policy.
    pub prev_cwnd: Option<i64>,
    /// Cumulative `data_segs_out` from the previous tick.
    pub prev_segments: i64,
    timestamp_ms: u64,
    tick_ms: u64,
}

impl SessionState {
    pub fn new(tick_ms: u64) -> Self {
        Self {
            rtt: RunningExtremes::new(),
            cwnd: RunningExtremes::new(),
            ssthresh: RunningExtremes::new(),
            prev_cwnd: None,
            prev_segments: 0,
            timestamp_ms: 0,
            tick_ms,
        }
    }

    /// Return the current synthetic timestamp and advance it by one tick.
    pub fn next_timestamp(&mut self) -> u64 {
        let ts = self.timestamp_ms;
        self.timestamp_ms += self.tick_ms;
        ts
    }

    pub fn timestamp_ms(&self) -> u64 {
        self.timestamp_ms
    }
}
