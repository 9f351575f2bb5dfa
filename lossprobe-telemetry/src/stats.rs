//! Order-statistic summaries across threshold groups.

use crate::results::{MetricSample, Threshold, ThresholdGroups};
use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt;
use thiserror::Error;
use tracing::debug;

#[derive(Debug, Error, PartialEq)]
pub enum StatsError {
    #[error("cannot summarize an empty sample set")]
    EmptySamples,

    #[error("percentile {0} is outside 0..=1")]
    InvalidPercentile(f64),

    #[error("baseline {field} is zero")]
    ZeroBaseline { field: &'static str },

    #[error("no baseline group (threshold {baseline}) present")]
    MissingBaseline { baseline: Threshold },
}

/// Which sample value a summary is computed over.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Metric {
    Throughput,
    Retransmissions,
}

impl Metric {
    pub fn value(self, sample: &MetricSample) -> f64 {
        match self {
            Metric::Throughput => sample.throughput,
            Metric::Retransmissions => sample.retransmissions as f64,
        }
    }
}

impl fmt::Display for Metric {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Metric::Throughput => f.write_str("throughput"),
            Metric::Retransmissions => f.write_str("retransmissions"),
        }
    }
}

/// Smallest, quartiles, median and largest of a sample set.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct FiveNumberSummary {
    pub smallest: f64,
    pub q1: f64,
    pub median: f64,
    pub q3: f64,
    pub largest: f64,
}

impl FiveNumberSummary {
    fn zip_with(
        &self,
        baseline: &Self,
        f: impl Fn(f64, f64) -> f64,
    ) -> Result<Self, StatsError> {
        let field = |name: &'static str, value: f64, base: f64| {
            if base == 0.0 {
                Err(StatsError::ZeroBaseline { field: name })
            } else {
                Ok(f(value, base))
            }
        };
        Ok(Self {
            smallest: field("smallest", self.smallest, baseline.smallest)?,
            q1: field("q1", self.q1, baseline.q1)?,
            median: field("median", self.median, baseline.median)?,
            q3: field("q3", self.q3, baseline.q3)?,
            largest: field("largest", self.largest, baseline.largest)?,
        })
    }

    /// `(value / baseline - 1) * 100` per field.
    pub fn percentage_change(&self, baseline: &Self) -> Result<Self, StatsError> {
        self.zip_with(baseline, |v, b| (v / b - 1.0) * 100.0)
    }

    /// `(1 - value / baseline) * 100` per field.
    pub fn percentage_reduction(&self, baseline: &Self) -> Result<Self, StatsError> {
        self.zip_with(baseline, |v, b| (1.0 - v / b) * 100.0)
    }
}

/// Linear interpolation between order statistics of an ascending slice.
pub fn percentile(sorted: &[f64], p: f64) -> Result<f64, StatsError> {
    if sorted.is_empty() {
        return Err(StatsError::EmptySamples);
    }
    if !(0.0..=1.0).contains(&p) {
        return Err(StatsError::InvalidPercentile(p));
    }

    let index = (sorted.len() - 1) as f64 * p;
    let floor = index.floor() as usize;
    if floor as f64 == index {
        return Ok(sorted[floor]);
    }
    let ceil = floor + 1;
    Ok(sorted[floor] * (ceil as f64 - index) + sorted[ceil] * (index - floor as f64))
}

pub fn five_number_summary(
    samples: &[MetricSample],
    metric: Metric,
) -> Result<FiveNumberSummary, StatsError> {
    let mut values: Vec<f64> = samples.iter().map(|s| metric.value(s)).collect();
    values.sort_by(f64::total_cmp);

    let (Some(&smallest), Some(&largest)) = (values.first(), values.last()) else {
        return Err(StatsError::EmptySamples);
    };
    Ok(FiveNumberSummary {
        smallest,
        q1: percentile(&values, 0.25)?,
        median: percentile(&values, 0.5)?,
        q3: percentile(&values, 0.75)?,
        largest,
    })
}

pub type GroupSummaries = BTreeMap<Threshold, FiveNumberSummary>;

/// Five-number summary of `metric` for every threshold group.
pub fn summarize_groups(groups: &ThresholdGroups, metric: Metric) -> Result<GroupSummaries, StatsError> {
    groups
        .iter()
        .map(|(threshold, samples)| {
            let summary = five_number_summary(samples, metric)?;
            debug!(%threshold, %metric, samples = samples.len(), median = summary.median, "Summarized group");
            Ok((*threshold, summary))
        })
        .collect()
}

/// How a group is compared against the baseline.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Comparison {
    Change,
    Reduction,
}

/// Compare every group against the baseline group.
///
/// The output keeps the baseline's own entry, whose values are all zero.
/// Callers that only want the thresholded groups should remove
/// [`Threshold::BASELINE`] from the result.
pub fn compare_to_baseline(
    summaries: &GroupSummaries,
    comparison: Comparison,
) -> Result<GroupSummaries, StatsError> {
    let baseline = summaries
        .get(&Threshold::BASELINE)
        .ok_or(StatsError::MissingBaseline {
            baseline: Threshold::BASELINE,
        })?;

    summaries
        .iter()
        .map(|(threshold, summary)| {
            let compared = match comparison {
                Comparison::Change => summary.percentage_change(baseline)?,
                Comparison::Reduction => summary.percentage_reduction(baseline)?,
            };
            Ok((*threshold, compared))
        })
        .collect()
}
