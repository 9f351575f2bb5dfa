//! Per-run transfer metrics from a packet capture.
//!
//! Each experiment run records the sender's traffic to a pcap file. Two
//! numbers are derived from it and appended to the run's `metrics.txt`:
//!
//! - retransmissions: TCP segments whose sequence number was already seen,
//!   counted only after the first second of sender traffic so the slow-start
//!   overshoot is excluded
//! - throughput: payload bytes of first-seen sequence numbers over the whole
//!   capture, in Mbps over the measurement duration, rounded to 2 decimals

use crate::results::{METRICS_FILE, format_throughput};
use flate2::read::GzDecoder;
use pcap_file::DataLink;
use pcap_file::pcap::PcapReader;
use pnet_packet::Packet;
use pnet_packet::ethernet::{EtherTypes, EthernetPacket};
use pnet_packet::ip::IpNextHeaderProtocols;
use pnet_packet::ipv4::Ipv4Packet;
use pnet_packet::tcp::TcpPacket;
use serde::Serialize;
use std::collections::HashSet;
use std::fs::{File, OpenOptions};
use std::io::{BufReader, Read, Write};
use std::net::Ipv4Addr;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info, warn};

/// Sender traffic before this offset is ignored when counting retransmissions.
pub const SLOW_START_SKIP: Duration = Duration::from_secs(1);

#[derive(Debug, Error)]
pub enum PcapMetricsError {
    #[error("failed to access {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid capture {path}: {source}")]
    Pcap {
        path: PathBuf,
        #[source]
        source: pcap_file::PcapError,
    },

    #[error("unsupported link type {datalink:?} in {path}")]
    UnsupportedLink { path: PathBuf, datalink: DataLink },

    #[error("measurement duration must be positive")]
    ZeroDuration,

    #[error("no TCP traffic from {0}")]
    NoSenderTraffic(Ipv4Addr),
}

/// One TCP segment seen on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TcpSegment {
    /// Capture timestamp.
    pub timestamp: Duration,
    pub src: Ipv4Addr,
    pub seq: u32,
    pub payload_len: usize,
}

/// Retransmissions and throughput of one run.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct TransferMetrics {
    pub retransmissions: u64,
    /// Mbps, rounded to 2 decimals.
    pub throughput_mbps: f64,
}

/// Compute metrics for the segments sent by `sender` during `duration`.
///
/// Segments must be in capture order. The retransmission window starts
/// [`SLOW_START_SKIP`] after the sender's first segment, exclusive.
pub fn transfer_metrics<I>(
    segments: I,
    sender: Ipv4Addr,
    duration: Duration,
) -> Result<TransferMetrics, PcapMetricsError>
where
    I: IntoIterator<Item = TcpSegment>,
{
    if duration.is_zero() {
        return Err(PcapMetricsError::ZeroDuration);
    }

    let mut start = None;
    let mut seen = HashSet::new();
    let mut seen_after_skip = HashSet::new();
    let mut unique_bytes: u64 = 0;
    let mut retransmissions: u64 = 0;

    for segment in segments.into_iter().filter(|s| s.src == sender) {
        let start = *start.get_or_insert(segment.timestamp);

        if seen.insert(segment.seq) {
            unique_bytes += segment.payload_len as u64;
        }
        if segment.timestamp.saturating_sub(start) > SLOW_START_SKIP
            && !seen_after_skip.insert(segment.seq)
        {
            retransmissions += 1;
        }
    }

    if start.is_none() {
        return Err(PcapMetricsError::NoSenderTraffic(sender));
    }

    let mbps = (unique_bytes * 8) as f64 / (1_000_000.0 * duration.as_secs_f64());
    let metrics = TransferMetrics {
        retransmissions,
        throughput_mbps: (mbps * 100.0).round() / 100.0,
    };
    debug!(%sender, unique_bytes, ?metrics, "Computed transfer metrics");
    Ok(metrics)
}

fn tcp_in_ipv4(timestamp: Duration, bytes: &[u8]) -> Option<TcpSegment> {
    let ip = Ipv4Packet::new(bytes)?;
    if ip.get_next_level_protocol() != IpNextHeaderProtocols::Tcp {
        return None;
    }
    let tcp = TcpPacket::new(ip.payload())?;
    Some(TcpSegment {
        timestamp,
        src: ip.get_source(),
        seq: tcp.get_sequence(),
        payload_len: tcp.payload().len(),
    })
}

fn tcp_segment(datalink: DataLink, timestamp: Duration, data: &[u8]) -> Option<TcpSegment> {
    match datalink {
        DataLink::ETHERNET => {
            let eth = EthernetPacket::new(data)?;
            if eth.get_ethertype() != EtherTypes::Ipv4 {
                return None;
            }
            tcp_in_ipv4(timestamp, eth.payload())
        }
        _ => tcp_in_ipv4(timestamp, data),
    }
}

/// Read every IPv4 TCP segment from a pcap file. Files ending in `.gz` are
/// decompressed on the fly. A truncated tail ends the read.
pub fn read_tcp_segments(path: &Path) -> Result<Vec<TcpSegment>, PcapMetricsError> {
    let file = File::open(path).map_err(|source| PcapMetricsError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let input: Box<dyn Read> = if path.extension().is_some_and(|e| e == "gz") {
        Box::new(GzDecoder::new(file))
    } else {
        Box::new(file)
    };

    let mut reader =
        PcapReader::new(BufReader::new(input)).map_err(|source| PcapMetricsError::Pcap {
            path: path.to_path_buf(),
            source,
        })?;
    let datalink = reader.header().datalink;
    if !matches!(datalink, DataLink::ETHERNET | DataLink::RAW | DataLink::IPV4) {
        return Err(PcapMetricsError::UnsupportedLink {
            path: path.to_path_buf(),
            datalink,
        });
    }

    let mut segments = Vec::new();
    let mut skipped = 0usize;
    while let Some(next_packet) = reader.next_packet() {
        let packet = match next_packet {
            Ok(packet) => packet,
            Err(e) => {
                warn!(path = %path.display(), error = %e, "Stopping at unreadable packet");
                break;
            }
        };
        match tcp_segment(datalink, packet.timestamp, &packet.data) {
            Some(segment) => segments.push(segment),
            None => skipped += 1,
        }
    }

    debug!(path = %path.display(), segments = segments.len(), skipped, "Read capture");
    Ok(segments)
}

/// Read `pcap` and compute the metrics of `sender`'s traffic.
pub fn capture_metrics(
    pcap: &Path,
    sender: Ipv4Addr,
    duration: Duration,
) -> Result<TransferMetrics, PcapMetricsError> {
    let metrics = transfer_metrics(read_tcp_segments(pcap)?, sender, duration)?;
    info!(
        path = %pcap.display(),
        %sender,
        retransmissions = metrics.retransmissions,
        throughput_mbps = metrics.throughput_mbps,
        "Capture metrics"
    );
    Ok(metrics)
}

/// Append the metrics lines to `path` in the `metrics.txt` format.
pub fn append_transfer_metrics(path: &Path, metrics: &TransferMetrics) -> Result<(), PcapMetricsError> {
    let io_err = |source| PcapMetricsError::Io {
        path: path.to_path_buf(),
        source,
    };
    let mut file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .map_err(io_err)?;
    write!(
        file,
        "Retransmissions: {}\nThroughput: {}Mbps\n",
        metrics.retransmissions,
        format_throughput(metrics.throughput_mbps)
    )
    .map_err(io_err)
}

/// Compute a run's metrics from its capture and append them to the
/// `metrics.txt` in `run_dir`.
pub fn record_run_metrics(
    run_dir: &Path,
    pcap: &Path,
    sender: Ipv4Addr,
    duration: Duration,
) -> Result<TransferMetrics, PcapMetricsError> {
    let metrics = capture_metrics(pcap, sender, duration)?;
    append_transfer_metrics(&run_dir.join(METRICS_FILE), &metrics)?;
    Ok(metrics)
}
