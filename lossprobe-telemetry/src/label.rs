//! Heuristic loss labeling from the local cwnd shape.

use crate::record::{FeatureRecord, LabeledRecord};
use tracing::debug;

/// A tick is labeled lost when cwnd did not shrink into it and shrinks right after.
pub fn is_loss(prev: i64, current: i64, next: i64) -> bool {
    prev <= current && next < current
}

/// Label every interior record and drop the two boundary records.
///
/// Runs shorter than three records produce nothing.
pub fn label_records(run_id: &str, records: Vec<FeatureRecord>) -> Vec<LabeledRecord> {
    let cwnds: Vec<Option<i64>> = records.iter().map(FeatureRecord::cwnd).collect();
    let labels: Vec<bool> = cwnds
        .windows(3)
        .map(|w| match (w[0], w[1], w[2]) {
            (Some(prev), Some(current), Some(next)) => is_loss(prev, current, next),
            _ => false,
        })
        .collect();

    let lost = labels.iter().filter(|l| **l).count();
    debug!(run_id, labeled = labels.len(), lost, "Labeled run");

    records
        .into_iter()
        .skip(1)
        .zip(labels)
        .map(|(record, lost)| LabeledRecord {
            run_id: run_id.to_string(),
            record,
            lost,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::Field;

    fn with_cwnd(cwnd: i64) -> FeatureRecord {
        let mut record = FeatureRecord::new();
        record.set(Field::Cwnd, cwnd);
        record
    }

    #[test]
    fn test_is_loss() {
        assert!(is_loss(100, 120, 90));
        assert!(!is_loss(100, 90, 120));
        assert!(is_loss(120, 120, 119));
        assert!(!is_loss(121, 120, 90));
        assert!(!is_loss(100, 120, 120));
    }

    #[test]
    fn test_three_record_window() {
        let labeled = label_records("run", vec![with_cwnd(100), with_cwnd(120), with_cwnd(90)]);
        assert_eq!(labeled.len(), 1);
        assert!(labeled[0].lost);
        assert_eq!(labeled[0].record.cwnd(), Some(120));

        let labeled = label_records("run", vec![with_cwnd(100), with_cwnd(90), with_cwnd(120)]);
        assert_eq!(labeled.len(), 1);
        assert!(!labeled[0].lost);
    }

    #[test]
    fn test_boundaries_are_dropped() {
        let records: Vec<FeatureRecord> = [10, 20, 30, 25, 26, 27].into_iter().map(with_cwnd).collect();
        let labeled = label_records("run", records);
        let cwnds: Vec<i64> = labeled.iter().filter_map(|r| r.record.cwnd()).collect();
        let lost: Vec<bool> = labeled.iter().map(|r| r.lost).collect();
        assert_eq!(cwnds, vec![20, 30, 25, 26]);
        assert_eq!(lost, vec![false, true, false, false]);
        assert!(labeled.iter().all(|r| r.run_id == "run"));
    }

    #[test]
    fn test_short_runs_produce_nothing() {
        assert!(label_records("run", vec![]).is_empty());
        assert!(label_records("run", vec![with_cwnd(1)]).is_empty());
        assert!(label_records("run", vec![with_cwnd(1), with_cwnd(2)]).is_empty());
    }
}
