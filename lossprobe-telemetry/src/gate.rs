//! Warm-up gates.
//!
//! A run's first ticks fall in slow start and are not representative, so
//! features are suppressed until the gate opens. Batch runs and streaming
//! sessions open on different triggers; both are kept as separate strategies
//! behind [`WarmupGate`].

use std::time::{Duration, Instant};
use tracing::info;

/// A closed→open latch advanced once per tick.
pub trait WarmupGate {
    /// What a tick contributes to the gate.
    type Tick;

    fn is_open(&self) -> bool;

    /// Advance the gate. Returns `true` only on the tick that opens it.
    fn observe(&mut self, tick: Self::Tick) -> bool;
}

/// Opens once the summed RTT of observed ticks exceeds a threshold.
#[derive(Debug, Clone)]
pub struct CumulativeRttGate {
    threshold_ms: f64,
    cumulative_ms: f64,
    open: bool,
}

impl CumulativeRttGate {
    pub fn new(threshold_ms: f64) -> Self {
        Self {
            threshold_ms,
            cumulative_ms: 0.0,
            open: false,
        }
    }

    pub fn cumulative_ms(&self) -> f64 {
        self.cumulative_ms
    }
}

impl WarmupGate for CumulativeRttGate {
    type Tick = f64;

    fn is_open(&self) -> bool {
        self.open
    }

    fn observe(&mut self, rtt_ms: f64) -> bool {
        if self.open {
            return false;
        }
        if rtt_ms.is_finite() && rtt_ms > 0.0 {
            self.cumulative_ms += rtt_ms;
        }
        if self.cumulative_ms > self.threshold_ms {
            self.open = true;
            info!(
                cumulative_ms = self.cumulative_ms,
                threshold_ms = self.threshold_ms,
                "Cumulative RTT warm-up complete"
            );
            return true;
        }
        false
    }
}

/// Opens once a fixed wall-clock interval has passed since the first tick.
#[derive(Debug, Clone)]
pub struct ElapsedTimeGate {
    warmup: Duration,
    started: Option<Instant>,
    open: bool,
}

impl ElapsedTimeGate {
    pub fn new(warmup: Duration) -> Self {
        Self {
            warmup,
            started: None,
            open: false,
        }
    }

    pub fn started(&self) -> Option<Instant> {
        self.started
    }
}

impl WarmupGate for ElapsedTimeGate {
    type Tick = Instant;

    fn is_open(&self) -> bool {
        self.open
    }

    fn observe(&mut self, now: Instant) -> bool {
        if self.open {
            return false;
        }
        let started = *self.started.get_or_insert(now);
        if now.saturating_duration_since(started) >= self.warmup {
            self.open = true;
            info!(warmup_ms = self.warmup.as_millis() as u64, "Elapsed-time warm-up complete");
            return true;
        }
        false
    }
}
