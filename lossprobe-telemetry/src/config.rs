//! Probe configuration.
//!
//! Loaded from `config.toml` in the lossprobe config directory, then
//! overridden from `LOSSPROBE_*` environment variables.

use anyhow::{Context, Result};
use lossprobe_common::{EnvError, EnvParser, load_toml_or_default};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use tracing::{debug, warn};

const CONFIG_FILE_NAME: &str = "config.toml";

/// Top-level configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProbeConfig {
    #[serde(default)]
    pub batch: BatchConfig,
    #[serde(default)]
    pub stream: StreamConfig,
    #[serde(default)]
    pub watch: WatchConfig,
}

/// Offline dataset construction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchConfig {
    /// Summed RTT (ms) that must be exceeded before features are emitted.
    #[serde(default = "default_rtt_warmup_ms")]
    pub rtt_warmup_ms: f64,

    /// Synthetic timestamp increment per active snapshot (ms).
    #[serde(default = "default_tick_ms")]
    pub tick_ms: u64,

    /// Maximum number of identical cwnd values scanned backwards.
    #[serde(default = "default_max_cwnd_scan_depth")]
    pub max_cwnd_scan_depth: usize,

    /// Summed RTT (seconds) trimmed from each capture when merging.
    #[serde(default = "default_merge_threshold_secs")]
    pub merge_threshold_secs: f64,
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            rtt_warmup_ms: default_rtt_warmup_ms(),
            tick_ms: default_tick_ms(),
            max_cwnd_scan_depth: default_max_cwnd_scan_depth(),
            merge_threshold_secs: default_merge_threshold_secs(),
        }
    }
}

/// Online per-snapshot processing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StreamConfig {
    /// Wall-clock warm-up after the first snapshot, in seconds.
    #[serde(default = "default_warmup_secs")]
    pub warmup_secs: f64,

    #[serde(default = "default_tick_ms")]
    pub tick_ms: u64,

    /// Include the `timestamp` column in emitted records.
    #[serde(default = "default_true")]
    pub emit_timestamp: bool,
}

impl StreamConfig {
    /// Warm-up as a duration. Negative or non-finite values mean no warm-up.
    pub fn warmup(&self) -> Duration {
        Duration::try_from_secs_f64(self.warmup_secs).unwrap_or(Duration::ZERO)
    }
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            warmup_secs: default_warmup_secs(),
            tick_ms: default_tick_ms(),
            emit_timestamp: true,
        }
    }
}

/// File-notification watcher.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WatchConfig {
    /// Shut down after this long without a notification.
    #[serde(default = "default_idle_timeout_secs")]
    pub idle_timeout_secs: u64,

    /// Capacity of the notification queue.
    #[serde(default = "default_channel_capacity")]
    pub channel_capacity: usize,
}

impl WatchConfig {
    pub fn idle_timeout(&self) -> Duration {
        Duration::from_secs(self.idle_timeout_secs)
    }
}

impl Default for WatchConfig {
    fn default() -> Self {
        Self {
            idle_timeout_secs: default_idle_timeout_secs(),
            channel_capacity: default_channel_capacity(),
        }
    }
}

fn default_rtt_warmup_ms() -> f64 {
    30_000.0
}

fn default_tick_ms() -> u64 {
    20
}

fn default_max_cwnd_scan_depth() -> usize {
    1000
}

fn default_merge_threshold_secs() -> f64 {
    10.0
}

fn default_warmup_secs() -> f64 {
    1.0
}

fn default_true() -> bool {
    true
}

fn default_idle_timeout_secs() -> u64 {
    5
}

fn default_channel_capacity() -> usize {
    64
}

impl ProbeConfig {
    /// Load from `path`, or the default config location. Missing files give defaults.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let config: Self = load_toml_or_default(path, CONFIG_FILE_NAME)?;
        debug!(?config, "Loaded probe config");
        Ok(config)
    }

    pub fn to_toml(&self) -> Result<String> {
        toml::to_string_pretty(self).context("Failed to serialize probe config")
    }

    /// Apply `LOSSPROBE_*` overrides. Invalid values keep the current setting
    /// and are collected in the parser.
    pub fn apply_env(&mut self, env: &mut EnvParser) {
        self.batch.rtt_warmup_ms = env
            .get_in_range("RTT_WARMUP_MS", self.batch.rtt_warmup_ms, 0.0, 3_600_000.0)
            .into_inner();

        let tick_ms = env.get_in_range("TICK_MS", self.batch.tick_ms, 1, 60_000).into_inner();
        self.batch.tick_ms = tick_ms;
        self.stream.tick_ms = tick_ms;

        self.batch.max_cwnd_scan_depth = env
            .get_in_range("MAX_CWND_SCAN_DEPTH", self.batch.max_cwnd_scan_depth, 1, 1_000_000)
            .into_inner();

        self.batch.merge_threshold_secs = env
            .get_in_range("MERGE_THRESHOLD_SECS", self.batch.merge_threshold_secs, 0.0, 3600.0)
            .into_inner();

        self.stream.warmup_secs = env
            .get_in_range("WARMUP_SECS", self.stream.warmup_secs, 0.0, 3600.0)
            .into_inner();

        self.stream.emit_timestamp = env
            .get_bool("EMIT_TIMESTAMP", self.stream.emit_timestamp)
            .into_inner();

        self.watch.idle_timeout_secs = env
            .get_in_range("IDLE_TIMEOUT_SECS", self.watch.idle_timeout_secs, 1, 86_400)
            .into_inner();

        for err in env.errors() {
            warn!(error = %err, "Ignoring invalid environment override");
        }
    }

    /// Load the file, then apply the process environment.
    pub fn load_with_env(path: Option<&Path>) -> Result<(Self, Vec<EnvError>)> {
        let mut config = Self::load(path)?;
        let mut env = EnvParser::new();
        config.apply_env(&mut env);
        Ok((config, env.take_errors()))
    }
}
