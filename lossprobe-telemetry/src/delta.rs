//! Congestion-window and segment-counter deltas.
//!
//! Batch and streaming processing use different cwnd policies:
//! [`batch_cwnd_delta`] looks back to the nearest *different* cwnd, while
//! [`stream_cwnd_delta`] only ever compares with the previous tick.

/// Delta against the nearest earlier cwnd that differs from `current`.
///
/// `history` holds the cwnd of every earlier active tick, oldest first. An
/// empty history or a history with no differing value gives `Some(0)`.
/// Scanning more than `max_depth` identical values gives `None`, which the
/// caller treats as a missing field.
pub fn batch_cwnd_delta(history: &[i64], current: i64, max_depth: usize) -> Option<i64> {
    for (steps, &prev) in history.iter().rev().enumerate() {
        if steps >= max_depth {
            return None;
        }
        if prev != current {
            return Some(current - prev);
        }
    }
    Some(0)
}

/// Delta against the previous tick's cwnd; absent until one was seen.
pub fn stream_cwnd_delta(prev: Option<i64>, current: i64) -> Option<i64> {
    prev.map(|prev| current - prev)
}

/// Per-tick delta of the cumulative `data_segs_out` counter.
///
/// The first tick of a session compares against zero. A counter that goes
/// backwards yields a negative delta rather than wrapping.
pub fn segments_delta(prev: i64, current: i64) -> i64 {
    current - prev
}
