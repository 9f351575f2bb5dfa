//! Experiment parameter helpers.

use crate::export::ExportError;
use crate::extract::CongestionControl;
use serde::Serialize;
use std::path::Path;
use tracing::info;

/// Queue capacity in bytes for a link of `bandwidth_mbps` and one-way
/// `delay_ms`, sized at `bdp_multiplier` times the bandwidth-delay product.
pub fn queue_size_bytes(bandwidth_mbps: f64, delay_ms: f64, bdp_multiplier: f64) -> u64 {
    // bytes/s * ms / 1000 ms/s, then scaled
    (bandwidth_mbps * 125_000.0 * delay_ms / 1000.0 * bdp_multiplier) as u64
}

/// Seconds between `ss` polls when `polls` are spread over `total_time_secs`.
pub fn poll_interval_secs(total_time_secs: f64, polls: u32) -> Option<f64> {
    (polls > 0).then(|| total_time_secs / f64::from(polls))
}

/// One row of the experiment matrix.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ExperimentCase {
    #[serde(rename = "bw")]
    pub bandwidth_mbps: u32,
    #[serde(rename = "delay")]
    pub delay_ms: u32,
    /// Queue size in bytes.
    #[serde(rename = "bdp")]
    pub queue_bytes: u64,
    pub cc_algo: CongestionControl,
    pub scenario: String,
}

/// Every combination of the given parameters, in nested order with the
/// scenario varying fastest.
pub fn experiment_matrix(
    bandwidths: &[u32],
    delays: &[u32],
    bdp_multipliers: &[f64],
    algorithms: &[CongestionControl],
    scenarios: &[&str],
) -> Vec<ExperimentCase> {
    let mut cases = Vec::new();
    for &bandwidth_mbps in bandwidths {
        for &delay_ms in delays {
            for &bdp in bdp_multipliers {
                let queue_bytes = queue_size_bytes(f64::from(bandwidth_mbps), f64::from(delay_ms), bdp);
                for &cc_algo in algorithms {
                    for scenario in scenarios {
                        cases.push(ExperimentCase {
                            bandwidth_mbps,
                            delay_ms,
                            queue_bytes,
                            cc_algo,
                            scenario: (*scenario).to_string(),
                        });
                    }
                }
            }
        }
    }
    cases
}

/// Write the matrix as `bw,delay,bdp,cc_algo,scenario` rows.
pub fn write_experiment_matrix(path: &Path, cases: &[ExperimentCase]) -> Result<(), ExportError> {
    let csv_err = |source| ExportError::Csv {
        path: path.to_path_buf(),
        source,
    };
    let mut writer = csv::Writer::from_path(path).map_err(csv_err)?;
    for case in cases {
        writer.serialize(case).map_err(csv_err)?;
    }
    writer.flush().map_err(|e| csv_err(csv::Error::from(e)))?;
    info!(path = %path.display(), cases = cases.len(), "Wrote experiment matrix");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_queue_size() {
        assert_eq!(queue_size_bytes(50.0, 100.0, 1.0), 625_000);
        assert_eq!(queue_size_bytes(50.0, 100.0, 0.5), 312_500);
        assert_eq!(queue_size_bytes(50.0, 50.0, 1.0), 312_500);
        assert_eq!(queue_size_bytes(10.0, 30.0, 0.25), 9_375);
        // The multiplier is applied to the byte count last.
        assert_eq!(queue_size_bytes(50.0, 30.0, 0.7), 131_250);
        assert_eq!(queue_size_bytes(50.0, 30.0, 0.35), 65_625);
    }

    #[test]
    fn test_poll_interval() {
        assert_eq!(poll_interval_secs(60.0, 3000), Some(0.02));
        assert_eq!(poll_interval_secs(60.0, 0), None);
    }

    #[test]
    fn test_matrix_is_cartesian_product() {
        let cases = experiment_matrix(
            &[10, 50],
            &[30],
            &[0.5, 1.0],
            &[CongestionControl::Reno, CongestionControl::Cubic],
            &["reno", "half"],
        );
        assert_eq!(cases.len(), 16);
        assert_eq!(
            cases[0],
            ExperimentCase {
                bandwidth_mbps: 10,
                delay_ms: 30,
                queue_bytes: 18_750,
                cc_algo: CongestionControl::Reno,
                scenario: "reno".to_string(),
            }
        );
        assert_eq!(cases[1].scenario, "half");
        assert_eq!(cases[2].cc_algo, CongestionControl::Cubic);
        assert_eq!(cases[4].queue_bytes, 37_500);
        assert_eq!(cases[8].bandwidth_mbps, 50);
    }

    #[test]
    fn test_write_matrix() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("experiments.csv");
        let cases = experiment_matrix(&[50], &[100], &[1.0], &[CongestionControl::Cubic], &["cubic"]);
        write_experiment_matrix(&path, &cases).unwrap();
        assert_eq!(
            std::fs::read_to_string(&path).unwrap(),
            "bw,delay,bdp,cc_algo,scenario\n50,100,625000,cubic,cubic\n"
        );
    }
}
