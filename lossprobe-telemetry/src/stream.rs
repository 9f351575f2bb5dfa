//! Online per-snapshot processing.
//!
//! A [`StreamingSession`] owns all state for one live connection and takes
//! `&mut self`, so callers serialize invocations (see [`crate::watch`]).

use crate::config::StreamConfig;
use crate::delta::{segments_delta, stream_cwnd_delta};
use crate::extract::{RttSample, extract_all};
use crate::gate::{ElapsedTimeGate, WarmupGate};
use crate::record::{FeatureRecord, Field};
use crate::snapshot::Snapshot;
use crate::state::SessionState;
use std::time::Instant;
use tracing::debug;

/// Result of feeding one snapshot to a session.
#[derive(Debug, Clone, PartialEq)]
pub enum StreamOutcome {
    /// Still inside the warm-up window; only RTT extremes were updated.
    WarmingUp,
    /// Warmed up, but a field (or the cwnd delta) was missing.
    Incomplete,
    Record(FeatureRecord),
}

impl StreamOutcome {
    pub fn into_record(self) -> Option<FeatureRecord> {
        match self {
            StreamOutcome::Record(record) => Some(record),
            _ => None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct StreamingSession {
    config: StreamConfig,
    state: SessionState,
    gate: ElapsedTimeGate,
}

impl StreamingSession {
    pub fn new(config: StreamConfig) -> Self {
        let state = SessionState::new(config.tick_ms);
        let gate = ElapsedTimeGate::new(config.warmup());
        Self { config, state, gate }
    }

    pub fn state(&self) -> &SessionState {
        &self.state
    }

    pub fn is_warm(&self) -> bool {
        self.gate.is_open()
    }

    pub fn process(&mut self, snapshot: &Snapshot) -> StreamOutcome {
        self.process_at(snapshot, Instant::now())
    }

    /// Process a snapshot observed at `now`. The first call starts the warm-up clock.
    pub fn process_at(&mut self, snapshot: &Snapshot, now: Instant) -> StreamOutcome {
        self.gate.observe(now);
        let text = snapshot.as_str();

        if !self.gate.is_open() {
            if let Some(sample) = RttSample::parse(text) {
                let (min, max) = self.state.rtt.update(sample.rtt);
                debug!(rtt = sample.rtt, min_rtt = min, max_rtt = max, "Warm-up tick");
            }
            return StreamOutcome::WarmingUp;
        }

        let mut record = FeatureRecord::new();
        let raw = extract_all(text, &mut record);

        let timestamp = self.state.next_timestamp();
        if self.config.emit_timestamp {
            record.set(Field::Timestamp, timestamp as i64);
        }

        if let Some(sample) = raw.rtt {
            self.state.rtt.record(sample.rtt, &mut record, Field::MinRtt, Field::MaxRtt);
        }

        let mut cwnd_diff = None;
        if let Some(cwnd) = raw.cwnd {
            cwnd_diff = stream_cwnd_delta(self.state.prev_cwnd, cwnd);
            if let Some(diff) = cwnd_diff {
                record.set(Field::CwndDiff, diff);
            }
            self.state.prev_cwnd = Some(cwnd);
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

        if raw.all_present() && cwnd_diff.is_some() {
            StreamOutcome::Record(record)
        } else {
            debug!(timestamp, fields = record.len(), "Snapshot missing fields");
            StreamOutcome::Incomplete
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::FeatureValue;
    use std::time::Duration;

    fn snapshot(rtt: f64, cwnd: i64, segs: i64) -> Snapshot {
        Snapshot::new(format!(
            "tcp ESTAB 0 0 a:1 b:2 timer:(on,200ms,0) ts sack ecn cubic rto:204 \
             rtt:{rtt}/0.5 cwnd:{cwnd} ssthresh:40 data_segs_out:{segs} lastsnd:4 \
             pacing_rate 12.5Mbps"
        ))
    }

    fn session(warmup_secs: f64, emit_timestamp: bool) -> StreamingSession {
        StreamingSession::new(StreamConfig {
            warmup_secs,
            tick_ms: 20,
            emit_timestamp,
        })
    }

    #[test]
    fn test_warmup_tracks_rtt_only() {
        let mut session = session(1.0, true);
        let t0 = Instant::now();

        assert_eq!(session.process_at(&snapshot(50.0, 10, 100), t0), StreamOutcome::WarmingUp);
        assert_eq!(
            session.process_at(&snapshot(70.0, 12, 200), t0 + Duration::from_millis(500)),
            StreamOutcome::WarmingUp
        );
        assert!(!session.is_warm());
        assert_eq!(session.state().rtt.bounds(), Some((50.0, 70.0)));
        assert_eq!(session.state().cwnd.bounds(), None);
        assert_eq!(session.state().prev_cwnd, None);
        assert_eq!(session.state().timestamp_ms(), 0);
    }

    #[test]
    fn test_first_warm_tick_lacks_cwnd_diff() {
        let mut session = session(1.0, true);
        let t0 = Instant::now();
        session.process_at(&snapshot(50.0, 10, 100), t0);

        let later = t0 + Duration::from_secs(1);
        assert_eq!(session.process_at(&snapshot(60.0, 20, 300), later), StreamOutcome::Incomplete);
        assert_eq!(session.state().prev_cwnd, Some(20));

        let record = session
            .process_at(&snapshot(40.0, 15, 350), later + Duration::from_millis(20))
            .into_record()
            .unwrap();
        assert_eq!(record.get(Field::CwndDiff), Some(FeatureValue::Int(-5)));
        assert_eq!(record.get(Field::DataSegmentsSent), Some(FeatureValue::Int(50)));
        assert_eq!(record.get(Field::Timestamp), Some(FeatureValue::Int(20)));
        assert_eq!(record.get(Field::MinRtt), Some(FeatureValue::Float(40.0)));
        assert_eq!(record.get(Field::MaxRtt), Some(FeatureValue::Float(60.0)));
        assert_eq!(record.get(Field::MinCwnd), Some(FeatureValue::Int(15)));
        assert_eq!(record.get(Field::MaxCwnd), Some(FeatureValue::Int(20)));
    }

    #[test]
    fn test_first_segment_delta_is_cumulative() {
        let mut session = session(0.0, true);
        let t0 = Instant::now();
        session.process_at(&snapshot(10.0, 10, 1000), t0);
        assert_eq!(session.state().prev_segments, 1000);
    }

    #[test]
    fn test_timestamp_column_is_optional() {
        let mut session = session(0.0, false);
        let t0 = Instant::now();
        session.process_at(&snapshot(10.0, 10, 10), t0);
        let record = session
            .process_at(&snapshot(10.0, 11, 20), t0)
            .into_record()
            .unwrap();
        assert!(!record.contains(Field::Timestamp));
        assert_eq!(session.state().timestamp_ms(), 40);
    }

    #[test]
    fn test_missing_field_suppresses_record_but_updates_state() {
        let mut session = session(0.0, true);
        let t0 = Instant::now();
        session.process_at(&snapshot(10.0, 10, 10), t0);

        let partial = Snapshot::new("tcp ESTAB cwnd:30 rtt:5.0/1.0");
        assert_eq!(session.process_at(&partial, t0), StreamOutcome::Incomplete);
        assert_eq!(session.state().prev_cwnd, Some(30));
        assert_eq!(session.state().rtt.min(), Some(5.0));
        assert_eq!(session.state().prev_segments, 10);
    }

    #[test]
    fn test_sessions_do_not_share_state() {
        let t0 = Instant::now();
        let mut a = session(0.0, true);
        let mut b = session(0.0, true);
        a.process_at(&snapshot(10.0, 10, 10), t0);
        assert_eq!(b.process_at(&snapshot(10.0, 10, 10), t0), StreamOutcome::Incomplete);
        assert!(a.process_at(&snapshot(10.0, 12, 20), t0).into_record().is_some());
    }
}
