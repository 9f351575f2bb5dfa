//! Socket-statistics snapshot reading.
//!
//! `ss -ti` prints each TCP socket as two lines: the socket line (starting
//! with the `tcp` netid) and an indented option line carrying the `tcp_info`
//! fields. A capture file repeats that pair once per poll, interleaved with
//! `Netid ...` header lines:
//!
//! ```text
//! Netid State  Recv-Q Send-Q  Local Address:Port  Peer Address:Port
//! tcp   ESTAB  0      5655000 10.1.1.100:5001     10.2.2.100:5201 timer:(on,300ms,0)
//!      ts sack ecn reno wscale:9,9 rto:300 rtt:99.413/0.261 ... cwnd:669 ...
//! ```
//!
//! Each pair is merged into one [`Snapshot`].

use std::fmt;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, warn};

const HEADER_MARKER: &str = "Netid";
const SOCKET_TAG: &str = "tcp";

/// Errors while loading capture files.
#[derive(Debug, Error)]
pub enum SnapshotError {
    #[error("failed to read capture file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid run directory {0}: expected a directory containing only files")]
    InvalidRunDirectory(PathBuf),
}

/// One merged two-line `ss` record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Snapshot(String);

impl Snapshot {
    pub fn new(text: impl Into<String>) -> Self {
        Self(text.into())
    }

    fn from_pair(socket_line: &str, option_line: &str) -> Self {
        Self(format!("{} {}", socket_line.trim(), option_line.trim()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl AsRef<str> for Snapshot {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Snapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

fn is_header(line: &str) -> bool {
    line.contains(HEADER_MARKER)
}

fn is_socket_line(line: &str) -> bool {
    line.trim_start().starts_with(SOCKET_TAG)
}

/// Merge every socket/option line pair in `text`.
///
/// Lines before the first socket line are skipped. A socket line followed by
/// another socket line drops the first one and starts over with the second.
pub fn parse_snapshots(text: &str) -> Vec<Snapshot> {
    let mut snapshots = Vec::new();
    let mut pending: Option<&str> = None;
    let mut invalid_pairs = 0usize;

    for line in text.lines().filter(|l| !is_header(l)) {
        match pending {
            None if is_socket_line(line) => pending = Some(line),
            None => {}
            Some(_) if is_socket_line(line) => {
                invalid_pairs += 1;
                pending = Some(line);
            }
            Some(socket_line) => {
                snapshots.push(Snapshot::from_pair(socket_line, line));
                pending = None;
            }
        }
    }

    if invalid_pairs > 0 {
        debug!(invalid_pairs, "Dropped socket lines without an option line");
    }

    snapshots
}

/// Parse a file expected to hold exactly one snapshot (the streaming input).
///
/// Returns `None` unless the first two non-header lines are a socket line
/// followed by an option line.
pub fn parse_single_snapshot(text: &str) -> Option<Snapshot> {
    let mut lines = text.lines().filter(|l| !is_header(l));
    let first = lines.next()?;
    let second = lines.next()?;

    if !is_socket_line(first) || is_socket_line(second) {
        return None;
    }

    Some(Snapshot::from_pair(first, second))
}

/// Read and parse a whole capture file. A missing file is fatal for the run.
pub fn read_snapshots(path: &Path) -> Result<Vec<Snapshot>, SnapshotError> {
    let text = std::fs::read_to_string(path).map_err(|source| SnapshotError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    Ok(parse_snapshots(&text))
}

/// One capture file: its run identifier (the file name) and its snapshots.
#[derive(Debug, Clone)]
pub struct RunCapture {
    pub run_id: String,
    pub snapshots: Vec<Snapshot>,
}

/// Load every capture file under the given run directories.
///
/// Each directory must exist and contain only regular files; anything else
/// rejects the whole load. Runs are returned sorted by directory, then file
/// name.
pub fn load_run_directories(dirs: &[PathBuf]) -> Result<Vec<RunCapture>, SnapshotError> {
    let mut files = Vec::new();

    for dir in dirs {
        if !dir.is_dir() {
            return Err(SnapshotError::InvalidRunDirectory(dir.clone()));
        }
        let entries = std::fs::read_dir(dir).map_err(|source| SnapshotError::Read {
            path: dir.clone(),
            source,
        })?;

        let mut children = Vec::new();
        for entry in entries {
            let path = entry
                .map_err(|source| SnapshotError::Read {
                    path: dir.clone(),
                    source,
                })?
                .path();
            if !path.is_file() {
                warn!(path = %path.display(), "Run directory contains a non-file entry");
                return Err(SnapshotError::InvalidRunDirectory(dir.clone()));
            }
            children.push(path);
        }
        children.sort();
        files.extend(children);
    }

    files
        .into_iter()
        .map(|path| {
            let snapshots = read_snapshots(&path)?;
            let run_id = path
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_else(|| path.display().to_string());
            debug!(run_id = %run_id, snapshots = snapshots.len(), "Loaded capture file");
            Ok(RunCapture { run_id, snapshots })
        })
        .collect()
}
