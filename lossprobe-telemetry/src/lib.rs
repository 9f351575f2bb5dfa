//! TCP congestion-control telemetry for loss-prediction experiments.
//!
//! Turns periodic `ss -ti` snapshots of a running connection into numeric
//! feature records, labels them with a cwnd-shape loss heuristic, and rolls
//! per-run results up into order-statistic summaries.
//!
//! ## Modules
//!
//! - [`snapshot`]: Reading and pairing raw `ss` output
//! - [`extract`]: Per-field extractors and series helpers
//! - [`batch`]: Offline labeled-dataset construction
//! - [`stream`] / [`watch`]: Online per-snapshot processing driven by file notifications
//! - [`merge`]: Warm-up trimming and gzip merging of raw captures
//! - [`pcap_metrics`]: Retransmissions and throughput from packet captures
//! - [`results`] / [`stats`]: Result files and five-number summaries

#![forbid(unsafe_code)]

pub mod batch;
pub mod classify;
pub mod config;
pub mod delta;
pub mod experiment;
pub mod export;
pub mod extract;
pub mod gate;
pub mod label;
pub mod merge;
pub mod pcap_metrics;
pub mod record;
pub mod results;
pub mod snapshot;
pub mod state;
pub mod stats;
pub mod stream;
pub mod watch;


pub use batch::{BatchPipeline, RunOutput, RunStats};
pub use classify::{Classifier, ClassifierError, PredictionLog, PredictionMode, Predictor, read_predictions};
pub use config::{BatchConfig, ProbeConfig, StreamConfig, WatchConfig};
pub use delta::{batch_cwnd_delta, segments_delta, stream_cwnd_delta};
pub use experiment::{
    ExperimentCase, experiment_matrix, poll_interval_secs, queue_size_bytes, write_experiment_matrix,
};
pub use export::{ExportError, write_dataset_csv, write_record_csv};
pub use extract::{
    CongestionControl, RawFields, RttSample, SeriesFeature, TimerInfo, congestion_algorithm,
    cwnd_values, extract_all, feature_values,
};
pub use gate::{CumulativeRttGate, ElapsedTimeGate, WarmupGate};
pub use label::{is_loss, label_records};
pub use merge::{MergeError, MergeSummary, default_merge_output, merge_captures, trim_warmup};
pub use pcap_metrics::{
    PcapMetricsError, TcpSegment, TransferMetrics, append_transfer_metrics, capture_metrics,
    read_tcp_segments, record_run_metrics, transfer_metrics,
};
pub use record::{FeatureRecord, FeatureValue, Field, LabeledRecord};
pub use results::{
    MetricSample, ResultsError, RunMetrics, Threshold, ThresholdGroups, average_results,
    calculate_and_write_results, collect_threshold_groups, parse_results, read_metric_files,
    write_results,
};
pub use snapshot::{
    RunCapture, Snapshot, SnapshotError, load_run_directories, parse_single_snapshot,
    parse_snapshots, read_snapshots,
};
pub use state::{RunningExtremes, SessionState};
pub use stats::{
    Comparison, FiveNumberSummary, GroupSummaries, Metric, StatsError, compare_to_baseline,
    five_number_summary, percentile, summarize_groups,
};
pub use stream::{StreamOutcome, StreamingSession};
pub use watch::{
    CsvRecordSink, Notification, NotificationKind, PredictionSink, RecordSink, SessionWatcher,
    WatchError, WatchExit, WatchMessage, WatchSummary,
};
