//! Offline dataset construction from captured runs.
//!
//! Each run goes `WARMING → ACTIVE`. While warming only RTT extremes are
//! tracked and RTT is summed into a [`CumulativeRttGate`]; the gate is checked
//! before each snapshot, so the snapshot that crosses the threshold is still a
//! warm-up tick. Active snapshots are fully extracted and kept when every
//! field is present. The kept sequence is then labeled by cwnd shape.

use crate::config::BatchConfig;
use crate::delta::{batch_cwnd_delta, segments_delta};
use crate::extract::{RttSample, extract_all};
use crate::gate::{CumulativeRttGate, WarmupGate};
use crate::label::label_records;
use crate::record::{FeatureRecord, Field, LabeledRecord};
use crate::snapshot::{RunCapture, Snapshot, SnapshotError, load_run_directories};
use crate::state::SessionState;
use std::path::PathBuf;
use tracing::{debug, info};

/// Counters describing how one run was processed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunStats {
    pub warmup_ticks: usize,
    pub active_ticks: usize,
    /// Active ticks dropped for a missing field.
    pub dropped: usize,
    /// Records left after labeling.
    pub labeled: usize,
}

/// Labeled output of one run.
#[derive(Debug, Clone)]
pub struct RunOutput {
    pub run_id: String,
    pub records: Vec<LabeledRecord>,
    pub stats: RunStats,
}

/// Per-run processing context.
struct BatchRun<'a> {
    config: &'a BatchConfig,
    state: SessionState,
    gate: CumulativeRttGate,
    /// cwnd of every active tick that had one, kept or not.
    cwnd_history: Vec<i64>,
    retained: Vec<FeatureRecord>,
    stats: RunStats,
}

impl<'a> BatchRun<'a> {
    fn new(config: &'a BatchConfig) -> Self {
        Self {
            config,
            state: SessionState::new(config.tick_ms),
            gate: CumulativeRttGate::new(config.rtt_warmup_ms),
            cwnd_history: Vec::new(),
            retained: Vec::new(),
            stats: RunStats::default(),
        }
    }

    fn step(&mut self, snapshot: &Snapshot) {
        if self.gate.is_open() {
            self.active(snapshot.as_str());
        } else {
            self.warm(snapshot.as_str());
        }
    }

    fn warm(&mut self, snapshot: &str) {
        self.stats.warmup_ticks += 1;
        if let Some(sample) = RttSample::parse(snapshot) {
            self.state.rtt.update(sample.rtt);
            self.gate.observe(sample.rtt);
        }
    }

    fn active(&mut self, snapshot: &str) {
        self.stats.active_ticks += 1;

        let mut record = FeatureRecord::new();
        let raw = extract_all(snapshot, &mut record);
        let mut complete = raw.all_present();

        let timestamp = self.state.next_timestamp();
        record.set(Field::Timestamp, timestamp as i64);

        if let Some(sample) = raw.rtt {
            self.state.rtt.record(sample.rtt, &mut record, Field::MinRtt, Field::MaxRtt);
        }

        if let Some(cwnd) = raw.cwnd {
            match batch_cwnd_delta(&self.cwnd_history, cwnd, self.config.max_cwnd_scan_depth) {
                Some(diff) => record.set(Field::CwndDiff, diff),
                None => {
                    debug!(cwnd, depth = self.config.max_cwnd_scan_depth, "cwnd scan depth exceeded");
                    complete = false;
                }
            }
            self.state.cwnd.record(cwnd, &mut record, Field::MinCwnd, Field::MaxCwnd);
        }

        if let Some(ssthresh) = raw.ssthresh {
            self.state
                .ssthresh
                .record(ssthresh, &mut record, Field::MinSsthresh, Field::MaxSsthresh);
        }

        if let Some(segs) = raw.data_segs_out {
            let delta = segments_delta(self.state.prev_segments, segs);
            self.state.prev_segments = segs;
            record.set(Field::DataSegmentsSent, delta);
        }

        if let Some(cwnd) = raw.cwnd {
            self.cwnd_history.push(cwnd);
        }

        if complete {
            self.retained.push(record);
        } else {
            self.stats.dropped += 1;
        }
    }

    fn finish(mut self, run_id: &str) -> RunOutput {
        let records = label_records(run_id, self.retained);
        self.stats.labeled = records.len();
        RunOutput {
            run_id: run_id.to_string(),
            records,
            stats: self.stats,
        }
    }
}

/// Builds labeled datasets from captured runs.
#[derive(Debug, Clone, Default)]
pub struct BatchPipeline {
    config: BatchConfig,
}

impl BatchPipeline {
    pub fn new(config: BatchConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &BatchConfig {
        &self.config
    }

    /// Process one run with fresh session state.
    pub fn process_run(&self, run_id: &str, snapshots: &[Snapshot]) -> RunOutput {
        let mut run = BatchRun::new(&self.config);
        for snapshot in snapshots {
            run.step(snapshot);
        }
        let output = run.finish(run_id);

        debug!(
            run_id,
            snapshots = snapshots.len(),
            warmup_ticks = output.stats.warmup_ticks,
            active_ticks = output.stats.active_ticks,
            dropped = output.stats.dropped,
            labeled = output.stats.labeled,
            "Processed run"
        );
        output
    }

    /// Process independent runs in order and concatenate their records.
    pub fn process_runs(&self, runs: &[RunCapture]) -> Vec<LabeledRecord> {
        let records: Vec<LabeledRecord> = runs
            .iter()
            .flat_map(|run| self.process_run(&run.run_id, &run.snapshots).records)
            .collect();

        let lost = records.iter().filter(|r| r.lost).count();
        info!(runs = runs.len(), records = records.len(), lost, "Built labeled dataset");
        records
    }

    /// Load every capture file under `dirs` and process it.
    pub fn process_directories(&self, dirs: &[PathBuf]) -> Result<Vec<LabeledRecord>, SnapshotError> {
        let runs = load_run_directories(dirs)?;
        Ok(self.process_runs(&runs))
    }
}
