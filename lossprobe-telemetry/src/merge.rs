//! Merging raw capture files into one compressed training input.
//!
//! Every `*.txt` capture in a directory is trimmed of its warm-up lines and
//! the remainders are concatenated into a gzip file.

use crate::extract::RttSample;
use crate::gate::{CumulativeRttGate, WarmupGate};
use flate2::Compression;
use flate2::write::GzEncoder;
use std::io::Write;
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;
use thiserror::Error;
use tracing::{debug, info};

/// File-name suffix of a merged capture.
pub const MERGED_SUFFIX: &str = "_merged_data.txt.gz";

/// Each capture line accounts for the last RTT seen divided by this.
const LINES_PER_RTT: f64 = 5.0;

#[derive(Debug, Error)]
pub enum MergeError {
    #[error("failed to access {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("no .txt captures in {0}")]
    NoCaptures(PathBuf),
}

/// Outcome of [`merge_captures`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MergeSummary {
    pub output: PathBuf,
    pub captures: usize,
    pub lines_kept: usize,
}

/// The tail of `text` after its warm-up.
///
/// Lines are walked in order, each adding a fifth of the most recent RTT to
/// a running sum. The result starts at the first line reached after the sum
/// exceeds `threshold_ms`, and is empty if it never does.
pub fn trim_warmup(text: &str, threshold_ms: f64) -> &str {
    let mut gate = CumulativeRttGate::new(threshold_ms);
    let mut last_rtt = 0.0;
    let mut offset = 0;

    for line in text.split_inclusive('\n') {
        if gate.is_open() {
            return &text[offset..];
        }
        if let Some(sample) = RttSample::parse(line) {
            last_rtt = sample.rtt;
        }
        gate.observe(last_rtt / LINES_PER_RTT);
        offset += line.len();
    }
    ""
}

/// Default output path for merging `dir`: `<dir name>_merged_data.txt.gz`
/// inside `dir`.
pub fn default_merge_output(dir: &Path) -> PathBuf {
    let name = dir
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "captures".to_string());
    dir.join(format!("{name}{MERGED_SUFFIX}"))
}

/// Trim every `*.txt` capture in `dir` and write the concatenation, gzipped,
/// to `output`. Captures are taken in file-name order, each with its own
/// warm-up.
pub fn merge_captures(dir: &Path, threshold_secs: f64, output: &Path) -> Result<MergeSummary, MergeError> {
    let io_err = |path: &Path| {
        let path = path.to_path_buf();
        move |source: std::io::Error| MergeError::Io { path, source }
    };

    let mut captures = Vec::new();
    for entry in std::fs::read_dir(dir).map_err(io_err(dir))? {
        let path = entry.map_err(io_err(dir))?.path();
        if path.is_file() && path.extension().is_some_and(|e| e == "txt") {
            captures.push(path);
        }
    }
    if captures.is_empty() {
        return Err(MergeError::NoCaptures(dir.to_path_buf()));
    }
    captures.sort();

    let out_dir = match output.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => Path::new("."),
    };
    let temp = NamedTempFile::new_in(out_dir).map_err(io_err(out_dir))?;
    let mut encoder = GzEncoder::new(temp, Compression::default());
    let threshold_ms = threshold_secs * 1000.0;
    let mut lines_kept = 0;

    for path in &captures {
        let text = std::fs::read_to_string(path).map_err(io_err(path))?;
        let kept = trim_warmup(&text, threshold_ms);
        let lines = kept.lines().count();
        debug!(path = %path.display(), lines, "Trimmed capture");
        lines_kept += lines;
        encoder.write_all(kept.as_bytes()).map_err(io_err(output))?;
    }

    let temp = encoder.finish().map_err(io_err(output))?;
    temp.persist(output).map_err(|e| MergeError::Io {
        path: output.to_path_buf(),
        source: e.error,
    })?;

    info!(
        output = %output.display(),
        captures = captures.len(),
        lines_kept,
        "Merged captures"
    );
    Ok(MergeSummary {
        output: output.to_path_buf(),
        captures: captures.len(),
        lines_kept,
    })
}
