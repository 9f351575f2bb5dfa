//! Shared helpers for integration tests.

#![allow(dead_code)]

use std::sync::Once;
use tracing::Level;

/// Twelve snapshots of a Reno connection at ~100ms RTT. Snapshot 7 has no
/// pacing rate.
pub const RENO_CAPTURE: &str = include_str!("../fixtures/reno_run.txt");

static INIT: Once = Once::new();

pub fn init_test_logging() {
    INIT.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_max_level(Level::DEBUG)
            .with_test_writer()
            .try_init();
    });
}

/// The capture split into one `ss` output per snapshot, header included.
pub fn capture_chunks() -> Vec<String> {
    let lines: Vec<&str> = RENO_CAPTURE.lines().collect();
    lines.chunks(3).map(|chunk| format!("{}\n", chunk.join("\n"))).collect()
}
