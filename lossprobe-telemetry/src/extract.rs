//! Field extractors for merged `ss` snapshots.
//!
//! Each extractor looks for one metric in the snapshot text, writes it into
//! the output [`FeatureRecord`] when found, and returns the parsed value.
//! A missing or malformed field is `None`, never an error.

use crate::record::{FeatureRecord, FeatureValue, Field};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::sync::LazyLock;

static TIMER_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"timer:\((.+?)\)").expect("timer regex"));
static DIGITS_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(\d+)").expect("digits regex"));
static RTO_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"rto:(\d+)").expect("rto regex"));
static RTT_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"rtt:(\d+\.?\d*)/(\d+\.?\d*)").expect("rtt regex"));
static CWND_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"cwnd:(\d+)").expect("cwnd regex"));
// Word boundary keeps rcv_ssthresh out.
static SSTHRESH_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\bssthresh:(\d+)").expect("ssthresh regex"));
static DATA_SEGS_OUT_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"data_segs_out:(\d+)").expect("data_segs_out regex"));
static LASTSND_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"lastsnd:(\d+)").expect("lastsnd regex"));
static PACING_RATE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"pacing_rate (\d+(\.\d+)?)([Mk])bps").expect("pacing_rate regex")
});
static CC_ALGO_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"ts sack ecn (reno|cubic|bbr)").expect("cc algorithm regex"));

fn capture<T: FromStr>(re: &Regex, snapshot: &str) -> Option<T> {
    re.captures(snapshot)?.get(1)?.as_str().parse().ok()
}

/// Parsed `timer:(name,expire,retrans)` triple.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TimerInfo {
    /// Timer name as printed by ss (`on`, `keepalive`, `persist`, ...).
    pub name: String,
    /// Time until the timer fires, in milliseconds.
    pub expire_ms: i64,
    /// Retransmissions performed under this timer.
    pub retrans: i64,
}

impl TimerInfo {
    /// Numeric encoding of the timer name: 1 for `on`, 0 for anything else.
    pub fn name_code(&self) -> i64 {
        i64::from(self.name == "on")
    }

    fn parse(snapshot: &str) -> Option<Self> {
        let inner = TIMER_RE.captures(snapshot)?.get(1)?.as_str();
        let parts: Vec<&str> = inner.split(',').collect();
        let [name, expire, retrans] = parts.as_slice() else {
            return None;
        };

        let expire_ms = capture(&DIGITS_RE, expire)?;
        let retrans = retrans.trim().parse().ok()?;

        Some(Self {
            name: (*name).to_string(),
            expire_ms,
            retrans,
        })
    }
}

/// Round-trip time and its variance, in milliseconds.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RttSample {
    pub rtt: f64,
    pub variance: f64,
}

impl RttSample {
    /// Parse without touching any record. Used while a session is warming up.
    pub fn parse(snapshot: &str) -> Option<Self> {
        let caps = RTT_RE.captures(snapshot)?;
        Some(Self {
            rtt: caps.get(1)?.as_str().parse().ok()?,
            variance: caps.get(2)?.as_str().parse().ok()?,
        })
    }
}

pub fn extract_timer(snapshot: &str, record: &mut FeatureRecord) -> Option<TimerInfo> {
    let timer = TimerInfo::parse(snapshot)?;
    record.set(Field::TimerName, timer.name_code());
    record.set(Field::ExpireTime, timer.expire_ms);
    record.set(Field::Retrans, timer.retrans);
    Some(timer)
}

pub fn extract_rto(snapshot: &str, record: &mut FeatureRecord) -> Option<i64> {
    let rto: i64 = capture(&RTO_RE, snapshot)?;
    record.set(Field::Rto, rto);
    Some(rto)
}

pub fn extract_rtt(snapshot: &str, record: &mut FeatureRecord) -> Option<RttSample> {
    let sample = RttSample::parse(snapshot)?;
    record.set(Field::Rtt, sample.rtt);
    record.set(Field::RttVariance, sample.variance);
    Some(sample)
}

/// Congestion window in MSS units.
pub fn extract_cwnd(snapshot: &str, record: &mut FeatureRecord) -> Option<i64> {
    let cwnd: i64 = capture(&CWND_RE, snapshot)?;
    record.set(Field::Cwnd, cwnd);
    Some(cwnd)
}

pub fn extract_ssthresh(snapshot: &str, record: &mut FeatureRecord) -> Option<i64> {
    let ssthresh: i64 = capture(&SSTHRESH_RE, snapshot)?;
    record.set(Field::Ssthresh, ssthresh);
    Some(ssthresh)
}

/// Cumulative `data_segs_out`. The caller replaces it with a per-tick delta.
pub fn extract_data_segs_out(snapshot: &str, record: &mut FeatureRecord) -> Option<i64> {
    let segs: i64 = capture(&DATA_SEGS_OUT_RE, snapshot)?;
    record.set(Field::DataSegmentsSent, segs);
    Some(segs)
}

pub fn extract_last_send(snapshot: &str, record: &mut FeatureRecord) -> Option<i64> {
    let last_send: i64 = capture(&LASTSND_RE, snapshot)?;
    record.set(Field::LastSend, last_send);
    Some(last_send)
}

fn parse_pacing_rate(snapshot: &str) -> Option<f64> {
    let caps = PACING_RATE_RE.captures(snapshot)?;
    let rate: f64 = caps.get(1)?.as_str().parse().ok()?;
    match caps.get(3)?.as_str() {
        "k" => Some(rate / 1000.0),
        _ => Some(rate),
    }
}

/// Pacing rate normalized to Mbps.
pub fn extract_pacing_rate(snapshot: &str, record: &mut FeatureRecord) -> Option<f64> {
    let rate = parse_pacing_rate(snapshot)?;
    record.set(Field::PacingRate, rate);
    Some(rate)
}

/// Everything the extractors found in one snapshot.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RawFields {
    pub timer: Option<TimerInfo>,
    pub rto: Option<i64>,
    pub rtt: Option<RttSample>,
    pub cwnd: Option<i64>,
    pub ssthresh: Option<i64>,
    pub data_segs_out: Option<i64>,
    pub last_send: Option<i64>,
    pub pacing_rate: Option<f64>,
}

impl RawFields {
    pub fn all_present(&self) -> bool {
        self.timer.is_some()
            && self.rto.is_some()
            && self.rtt.is_some()
            && self.cwnd.is_some()
            && self.ssthresh.is_some()
            && self.data_segs_out.is_some()
            && self.last_send.is_some()
            && self.pacing_rate.is_some()
    }
}

/// Run every extractor in column order.
pub fn extract_all(snapshot: &str, record: &mut FeatureRecord) -> RawFields {
    RawFields {
        timer: extract_timer(snapshot, record),
        rto: extract_rto(snapshot, record),
        rtt: extract_rtt(snapshot, record),
        cwnd: extract_cwnd(snapshot, record),
        ssthresh: extract_ssthresh(snapshot, record),
        data_segs_out: extract_data_segs_out(snapshot, record),
        last_send: extract_last_send(snapshot, record),
        pacing_rate: extract_pacing_rate(snapshot, record),
    }
}

/// Congestion-control algorithm negotiated for the connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CongestionControl {
    Reno,
    Cubic,
    Bbr,
}

impl CongestionControl {
    pub fn as_str(self) -> &'static str {
        match self {
            CongestionControl::Reno => "reno",
            CongestionControl::Cubic => "cubic",
            CongestionControl::Bbr => "bbr",
        }
    }
}

impl fmt::Display for CongestionControl {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CongestionControl {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "reno" => Ok(CongestionControl::Reno),
            "cubic" => Ok(CongestionControl::Cubic),
            "bbr" => Ok(CongestionControl::Bbr),
            other => Err(format!("unknown congestion control algorithm: {other}")),
        }
    }
}

/// First algorithm tag found across the snapshots, in order.
pub fn congestion_algorithm<S: AsRef<str>>(snapshots: &[S]) -> Option<CongestionControl> {
    snapshots.iter().find_map(|s| {
        CC_ALGO_RE
            .captures(s.as_ref())
            .and_then(|caps| caps.get(1))
            .and_then(|m| m.as_str().parse().ok())
    })
}

/// A metric that can be pulled out of every snapshot of a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SeriesFeature {
    Cwnd,
    Ssthresh,
    ExpireTime,
    Retrans,
    Rto,
    Rtt,
    RttVariance,
    LastSend,
    PacingRate,
}

impl SeriesFeature {
    fn extract(self, snapshot: &str) -> Option<FeatureValue> {
        match self {
            SeriesFeature::Cwnd => capture::<i64>(&CWND_RE, snapshot).map(Into::into),
            SeriesFeature::Ssthresh => capture::<i64>(&SSTHRESH_RE, snapshot).map(Into::into),
            SeriesFeature::ExpireTime => TimerInfo::parse(snapshot).map(|t| t.expire_ms.into()),
            SeriesFeature::Retrans => TimerInfo::parse(snapshot).map(|t| t.retrans.into()),
            SeriesFeature::Rto => capture::<i64>(&RTO_RE, snapshot).map(Into::into),
            SeriesFeature::Rtt => RttSample::parse(snapshot).map(|s| s.rtt.into()),
            SeriesFeature::RttVariance => RttSample::parse(snapshot).map(|s| s.variance.into()),
            SeriesFeature::LastSend => capture::<i64>(&LASTSND_RE, snapshot).map(Into::into),
            SeriesFeature::PacingRate => parse_pacing_rate(snapshot).map(Into::into),
        }
    }
}

/// Values of one metric across a run. Snapshots lacking it are skipped.
pub fn feature_values<S: AsRef<str>>(snapshots: &[S], feature: SeriesFeature) -> Vec<FeatureValue> {
    snapshots
        .iter()
        .filter_map(|s| feature.extract(s.as_ref()))
        .collect()
}

pub fn cwnd_values<S: AsRef<str>>(snapshots: &[S]) -> Vec<i64> {
    snapshots
        .iter()
        .filter_map(|s| capture(&CWND_RE, s.as_ref()))
        .collect()
}
