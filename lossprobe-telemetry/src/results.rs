//! Per-run result files.
//!
//! Each experiment run leaves a `metrics.txt`. Runs of one configuration are
//! averaged into a `results.txt`, and result files are grouped by the
//! classification threshold encoded in their top-level directory name.

use regex::Regex;
use serde::Serialize;
use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;
use thiserror::Error;
use tracing::{debug, info, warn};

pub const METRICS_FILE: &str = "metrics.txt";
pub const RESULTS_FILE: &str = "results.txt";
/// Group directory of runs without model inference.
pub const BASELINE_DIR: &str = "no_model_inference";

static THROUGHPUT_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"Throughput: (\d+\.\d+)Mbps").expect("throughput regex"));
static RETRANSMISSIONS_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"Retransmissions: (\d+)").expect("retransmissions regex"));
static CLASSIFICATION_THRESHOLD_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"Classification Threshold: (\d+\.\d+)").expect("classification threshold regex")
});
static BANDWIDTH_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"Bandwidth: (\d+) Mbit").expect("bandwidth regex"));
static DELAY_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"Delay: (\d+) ms").expect("delay regex"));
static MODEL_INFERENCE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"Model inference: (\d+)").expect("model inference regex"));
static AVG_THROUGHPUT_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"Average throughput: (\d+\.\d+)Mbps").expect("average throughput regex")
});
static AVG_RETRANSMISSIONS_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"Average retransmissions: (\d+)").expect("average retransmissions regex")
});
static THRESHOLD_NAME_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(\d+\.\d+)").expect("threshold name regex"));

#[derive(Debug, Error)]
pub enum ResultsError {
    #[error("failed to access {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("{0} is not a directory")]
    NotADirectory(PathBuf),

    #[error("missing field {field:?} in {path}")]
    MissingField { field: &'static str, path: PathBuf },

    #[error("no metrics.txt files under {0}")]
    NoRuns(PathBuf),
}

fn io_err(path: &Path) -> impl FnOnce(std::io::Error) -> ResultsError + '_ {
    move |source| ResultsError::Io {
        path: path.to_path_buf(),
        source,
    }
}

fn find<T: std::str::FromStr>(re: &Regex, text: &str) -> Option<T> {
    re.captures(text)?.get(1)?.as_str().parse().ok()
}

/// Classification threshold of a group. `1.0` is the no-inference baseline.
#[derive(Debug, Clone, Copy, Serialize)]
pub struct Threshold(f64);

impl Threshold {
    pub const BASELINE: Threshold = Threshold(1.0);

    pub fn new(value: f64) -> Self {
        Self(value)
    }

    pub fn value(self) -> f64 {
        self.0
    }

    pub fn is_baseline(self) -> bool {
        self == Self::BASELINE
    }

    /// Threshold for a group directory name.
    pub fn from_dir_name(name: &str) -> Option<Self> {
        if name == BASELINE_DIR {
            return Some(Self::BASELINE);
        }
        find(&THRESHOLD_NAME_RE, name).map(Self)
    }
}

impl PartialEq for Threshold {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Threshold {}

impl PartialOrd for Threshold {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Threshold {
    fn cmp(&self, other: &Self) -> Ordering {
        self.0.total_cmp(&other.0)
    }
}

impl fmt::Display for Threshold {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Throughput and retransmissions of one completed run (or run average).
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct MetricSample {
    /// Mbps.
    pub throughput: f64,
    pub retransmissions: u64,
}

/// Contents of one `metrics.txt`.
#[derive(Debug, Clone, PartialEq)]
pub struct RunMetrics {
    pub throughput: f64,
    pub retransmissions: u64,
    pub classification_threshold: Option<f64>,
    pub bandwidth_mbit: Option<u64>,
    pub delay_ms: Option<u64>,
    pub model_inference: Option<bool>,
}

impl RunMetrics {
    /// Parse a metrics file. Throughput and retransmissions are required.
    pub fn parse(text: &str, path: &Path) -> Result<Self, ResultsError> {
        let missing = |field| ResultsError::MissingField {
            field,
            path: path.to_path_buf(),
        };
        Ok(Self {
            throughput: find(&THROUGHPUT_RE, text).ok_or_else(|| missing("Throughput"))?,
            retransmissions: find(&RETRANSMISSIONS_RE, text).ok_or_else(|| missing("Retransmissions"))?,
            classification_threshold: find(&CLASSIFICATION_THRESHOLD_RE, text),
            bandwidth_mbit: find(&BANDWIDTH_RE, text),
            delay_ms: find(&DELAY_RE, text),
            model_inference: find::<u8>(&MODEL_INFERENCE_RE, text).map(|v| v != 0),
        })
    }

    pub fn sample(&self) -> MetricSample {
        MetricSample {
            throughput: self.throughput,
            retransmissions: self.retransmissions,
        }
    }
}

/// Every file named `file_name` below `root`, sorted.
fn find_files(root: &Path, file_name: &str) -> Result<Vec<PathBuf>, ResultsError> {
    let mut found = Vec::new();
    let mut pending = vec![root.to_path_buf()];

    while let Some(dir) = pending.pop() {
        for entry in std::fs::read_dir(&dir).map_err(io_err(&dir))? {
            let path = entry.map_err(io_err(&dir))?.path();
            if path.is_dir() {
                pending.push(path);
            } else if path.file_name().is_some_and(|n| n == file_name) {
                found.push(path);
            }
        }
    }

    found.sort();
    Ok(found)
}

/// Parse every `metrics.txt` below `dir`.
pub fn read_metric_files(dir: &Path) -> Result<Vec<RunMetrics>, ResultsError> {
    if !dir.is_dir() {
        return Err(ResultsError::NotADirectory(dir.to_path_buf()));
    }
    find_files(dir, METRICS_FILE)?
        .into_iter()
        .map(|path| {
            let text = std::fs::read_to_string(&path).map_err(io_err(&path))?;
            RunMetrics::parse(&text, &path)
        })
        .collect()
}

/// Mean throughput and mean retransmissions (rounded half to even).
pub fn average_results(runs: &[RunMetrics]) -> Option<MetricSample> {
    if runs.is_empty() {
        return None;
    }
    let n = runs.len() as f64;
    let throughput = runs.iter().map(|r| r.throughput).sum::<f64>() / n;
    let retransmissions = runs.iter().map(|r| r.retransmissions as f64).sum::<f64>() / n;
    Some(MetricSample {
        throughput,
        retransmissions: retransmissions.round_ties_even() as u64,
    })
}

pub(crate) fn format_throughput(value: f64) -> String {
    let rounded = (value * 100.0).round() / 100.0;
    if rounded.fract() == 0.0 {
        format!("{rounded:.1}")
    } else {
        format!("{rounded}")
    }
}

/// Write `results.txt` into `dir`.
pub fn write_results(dir: &Path, average: &MetricSample) -> Result<PathBuf, ResultsError> {
    let path = dir.join(RESULTS_FILE);
    let body = format!(
        "Average throughput: {}Mbps\nAverage retransmissions: {}\n",
        format_throughput(average.throughput),
        average.retransmissions
    );
    std::fs::write(&path, body).map_err(io_err(&path))?;
    Ok(path)
}

/// Average every run below `dir` and write the result file next to them.
pub fn calculate_and_write_results(dir: &Path) -> Result<MetricSample, ResultsError> {
    let runs = read_metric_files(dir)?;
    let average = average_results(&runs).ok_or_else(|| ResultsError::NoRuns(dir.to_path_buf()))?;
    let path = write_results(dir, &average)?;
    info!(
        path = %path.display(),
        runs = runs.len(),
        throughput = average.throughput,
        retransmissions = average.retransmissions,
        "Wrote averaged results"
    );
    Ok(average)
}

/// Parse a `results.txt`. Files lacking either line give `None`.
pub fn parse_results(text: &str) -> Option<MetricSample> {
    Some(MetricSample {
        throughput: find(&AVG_THROUGHPUT_RE, text)?,
        retransmissions: find(&AVG_RETRANSMISSIONS_RE, text)?,
    })
}

/// Samples per threshold, ordered by threshold.
pub type ThresholdGroups = BTreeMap<Threshold, Vec<MetricSample>>;

/// Collect every `results.txt` below each threshold directory of `root`.
pub fn collect_threshold_groups(root: &Path) -> Result<ThresholdGroups, ResultsError> {
    if !root.is_dir() {
        return Err(ResultsError::NotADirectory(root.to_path_buf()));
    }

    let mut group_dirs = Vec::new();
    for entry in std::fs::read_dir(root).map_err(io_err(root))? {
        let path = entry.map_err(io_err(root))?.path();
        if path.is_dir() {
            group_dirs.push(path);
        }
    }
    group_dirs.sort();

    let mut groups = ThresholdGroups::new();
    for dir in group_dirs {
        let name = dir
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        let Some(threshold) = Threshold::from_dir_name(&name) else {
            warn!(dir = %dir.display(), "Skipping directory without a threshold in its name");
            continue;
        };

        for path in find_files(&dir, RESULTS_FILE)? {
            let text = std::fs::read_to_string(&path).map_err(io_err(&path))?;
            match parse_results(&text) {
                Some(sample) => groups.entry(threshold).or_default().push(sample),
                None => debug!(path = %path.display(), "Results file missing averages"),
            }
        }
    }

    debug!(groups = groups.len(), "Collected threshold groups");
    Ok(groups)
}
