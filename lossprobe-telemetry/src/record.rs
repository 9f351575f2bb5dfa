//! Feature records produced from snapshots.
//!
//! A [`FeatureRecord`] is an insertion-ordered map from [`Field`] to
//! [`FeatureValue`]. The order matters: the first record of an export defines
//! the column layout for every row that follows.

use serde::ser::{Serialize, SerializeMap, Serializer};
use std::fmt;

/// Every column a feature record can carry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Field {
    TimerName,
    ExpireTime,
    Retrans,
    Rto,
    Rtt,
    RttVariance,
    Cwnd,
    Ssthresh,
    /// Raw cumulative `data_segs_out` until the per-tick delta replaces it.
    DataSegmentsSent,
    LastSend,
    PacingRate,
    Timestamp,
    MinRtt,
    MaxRtt,
    CwndDiff,
    MinCwnd,
    MaxCwnd,
    MinSsthresh,
    MaxSsthresh,
}

impl Field {
    pub const ALL: [Field; 19] = [
        Field::TimerName,
        Field::ExpireTime,
        Field::Retrans,
        Field::Rto,
        Field::Rtt,
        Field::RttVariance,
        Field::Cwnd,
        Field::Ssthresh,
        Field::DataSegmentsSent,
        Field::LastSend,
        Field::PacingRate,
        Field::Timestamp,
        Field::MinRtt,
        Field::MaxRtt,
        Field::CwndDiff,
        Field::MinCwnd,
        Field::MaxCwnd,
        Field::MinSsthresh,
        Field::MaxSsthresh,
    ];

    /// Column name used in exported datasets.
    pub fn name(self) -> &'static str {
        match self {
            Field::TimerName => "timer_name",
            Field::ExpireTime => "expire_time",
            Field::Retrans => "retrans",
            Field::Rto => "rto",
            Field::Rtt => "rtt",
            Field::RttVariance => "rtt_variance",
            Field::Cwnd => "cwnd",
            Field::Ssthresh => "ssthresh",
            Field::DataSegmentsSent => "data_segments_sent",
            Field::LastSend => "last_send",
            Field::PacingRate => "pacing_rate",
            Field::Timestamp => "timestamp",
            Field::MinRtt => "min_rtt",
            Field::MaxRtt => "max_rtt",
            Field::CwndDiff => "cwnd_diff",
            Field::MinCwnd => "min_cwnd",
            Field::MaxCwnd => "max_cwnd",
            Field::MinSsthresh => "min_ssthresh",
            Field::MaxSsthresh => "max_ssthresh",
        }
    }

    pub fn from_name(name: &str) -> Option<Field> {
        Field::ALL.into_iter().find(|f| f.name() == name)
    }
}

impl fmt::Display for Field {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A numeric cell value.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum FeatureValue {
    Int(i64),
    Float(f64),
}

impl FeatureValue {
    pub fn as_f64(self) -> f64 {
        match self {
            FeatureValue::Int(v) => v as f64,
            FeatureValue::Float(v) => v,
        }
    }

    pub fn as_i64(self) -> Option<i64> {
        match self {
            FeatureValue::Int(v) => Some(v),
            FeatureValue::Float(_) => None,
        }
    }
}

impl From<i64> for FeatureValue {
    fn from(v: i64) -> Self {
        FeatureValue::Int(v)
    }
}

impl From<i32> for FeatureValue {
    fn from(v: i32) -> Self {
        FeatureValue::Int(i64::from(v))
    }
}

impl From<f64> for FeatureValue {
    fn from(v: f64) -> Self {
        FeatureValue::Float(v)
    }
}

impl fmt::Display for FeatureValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FeatureValue::Int(v) => write!(f, "{v}"),
            // Whole floats keep a trailing ".0" so the column stays a float column.
            FeatureValue::Float(v) if v.is_finite() && v.fract() == 0.0 => write!(f, "{v:.1}"),
            FeatureValue::Float(v) => write!(f, "{v}"),
        }
    }
}

impl Serialize for FeatureValue {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            FeatureValue::Int(v) => serializer.serialize_i64(*v),
            FeatureValue::Float(v) => serializer.serialize_f64(*v),
        }
    }
}

/// Insertion-ordered feature map for one snapshot.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FeatureRecord {
    entries: Vec<(Field, FeatureValue)>,
}

impl FeatureRecord {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set a field. Existing fields keep their position.
    pub fn set(&mut self, field: Field, value: impl Into<FeatureValue>) {
        let value = value.into();
        match self.entries.iter_mut().find(|(f, _)| *f == field) {
            Some(entry) => entry.1 = value,
            None => self.entries.push((field, value)),
        }
    }

    pub fn get(&self, field: Field) -> Option<FeatureValue> {
        self.entries
            .iter()
            .find(|(f, _)| *f == field)
            .map(|(_, v)| *v)
    }

    pub fn contains(&self, field: Field) -> bool {
        self.get(field).is_some()
    }

    pub fn cwnd(&self) -> Option<i64> {
        self.get(Field::Cwnd).and_then(FeatureValue::as_i64)
    }

    /// Field names in insertion order.
    pub fn keys(&self) -> impl Iterator<Item = Field> + '_ {
        self.entries.iter().map(|(f, _)| *f)
    }

    pub fn iter(&self) -> impl Iterator<Item = (Field, FeatureValue)> + '_ {
        self.entries.iter().copied()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Render as a JSON object with keys in insertion order.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

impl Serialize for FeatureRecord {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.entries.len()))?;
        for (field, value) in &self.entries {
            map.serialize_entry(field.name(), value)?;
        }
        map.end()
    }
}

/// A retained record plus its heuristic loss label.
#[derive(Debug, Clone, PartialEq)]
pub struct LabeledRecord {
    pub run_id: String,
    pub record: FeatureRecord,
    pub lost: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_set_keeps_insertion_order() {
        let mut record = FeatureRecord::new();
        record.set(Field::Cwnd, 10);
        record.set(Field::DataSegmentsSent, 500);
        record.set(Field::Rtt, 1.5);
        record.set(Field::DataSegmentsSent, 20);

        let keys: Vec<Field> = record.keys().collect();
        assert_eq!(keys, vec![Field::Cwnd, Field::DataSegmentsSent, Field::Rtt]);
        assert_eq!(record.get(Field::DataSegmentsSent), Some(FeatureValue::Int(20)));
        assert_eq!(record.cwnd(), Some(10));
        assert!(!record.contains(Field::Rto));
    }

    #[test]
    fn test_value_display() {
        assert_eq!(FeatureValue::Int(-3).to_string(), "-3");
        assert_eq!(FeatureValue::Float(100.0).to_string(), "100.0");
        assert_eq!(FeatureValue::Float(99.413).to_string(), "99.413");
        assert_eq!(FeatureValue::Float(0.5).to_string(), "0.5");
    }

    #[test]
    fn test_field_names_round_trip() {
        for field in Field::ALL {
            assert_eq!(Field::from_name(field.name()), Some(field));
        }
        assert_eq!(Field::from_name("lost"), None);
    }

    #[test]
    fn test_to_json_is_ordered() {
        let mut record = FeatureRecord::new();
        record.set(Field::TimerName, 1);
        record.set(Field::Rtt, 99.5);
        record.set(Field::Cwnd, 669);
        assert_eq!(
            record.to_json().unwrap(),
            r#"{"timer_name":1,"rtt":99.5,"cwnd":669}"#
        );
    }
}
