//! File-notification driven streaming.
//!
//! `ss` is polled by an external process that rewrites one capture file per
//! poll. A [`SessionWatcher`] watches that file's directory, and every
//! created/modified notification for the file runs one
//! [`StreamingSession`] step. Notifications go through a single-consumer
//! queue, so session state is only ever touched by the loop in
//! [`SessionWatcher::run`].

use crate::classify::{Classifier, ClassifierError, PredictionLog, Predictor};
use crate::export::{ExportError, write_record_csv};
use crate::record::FeatureRecord;
use crate::snapshot::parse_single_snapshot;
use crate::stream::{StreamOutcome, StreamingSession};
use chrono::{DateTime, Utc};
use notify::event::ModifyKind;
use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;
use tokio::sync::mpsc;
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

#[derive(Debug, Error)]
pub enum WatchError {
    #[error("file watcher error: {0}")]
    Notify(#[from] notify::Error),

    #[error("watched file {0} has no parent directory")]
    NoParent(PathBuf),

    #[error(transparent)]
    Export(#[from] ExportError),

    #[error(transparent)]
    Classifier(#[from] ClassifierError),
}

/// Filesystem change kinds the watcher distinguishes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NotificationKind {
    Created,
    Modified,
    Moved,
    Deleted,
}

/// One filesystem change.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notification {
    pub kind: NotificationKind,
    pub path: PathBuf,
    pub is_dir: bool,
}

impl Notification {
    pub fn new(kind: NotificationKind, path: impl Into<PathBuf>) -> Self {
        Self {
            kind,
            path: path.into(),
            is_dir: false,
        }
    }

    fn from_event(event: Event) -> Vec<Self> {
        let kind = match event.kind {
            EventKind::Create(_) => NotificationKind::Created,
            EventKind::Modify(ModifyKind::Name(_)) => NotificationKind::Moved,
            EventKind::Modify(_) => NotificationKind::Modified,
            EventKind::Remove(_) => NotificationKind::Deleted,
            _ => return Vec::new(),
        };
        event
            .paths
            .into_iter()
            .map(|path| Self {
                kind,
                is_dir: path.is_dir(),
                path,
            })
            .collect()
    }
}

/// Messages consumed by the watcher loop.
#[derive(Debug)]
pub enum WatchMessage {
    Notify(Notification),
    Shutdown,
}

/// Receives every complete record a session emits.
pub trait RecordSink {
    fn accept(&mut self, record: &FeatureRecord) -> Result<(), WatchError>;
}

impl RecordSink for Vec<FeatureRecord> {
    fn accept(&mut self, record: &FeatureRecord) -> Result<(), WatchError> {
        self.push(record.clone());
        Ok(())
    }
}

/// Rewrites a one-row CSV with the latest record.
#[derive(Debug, Clone)]
pub struct CsvRecordSink {
    path: PathBuf,
}

impl CsvRecordSink {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl RecordSink for CsvRecordSink {
    fn accept(&mut self, record: &FeatureRecord) -> Result<(), WatchError> {
        write_record_csv(&self.path, record)?;
        Ok(())
    }
}

/// Classifies each record and writes the prediction log.
#[derive(Debug)]
pub struct PredictionSink<C> {
    predictor: Predictor<C>,
    log: PredictionLog,
    positives: usize,
}

impl<C: Classifier> PredictionSink<C> {
    pub fn new(predictor: Predictor<C>, log: PredictionLog) -> Self {
        Self {
            predictor,
            log,
            positives: 0,
        }
    }

    pub fn positives(&self) -> usize {
        self.positives
    }
}

impl<C: Classifier> RecordSink for PredictionSink<C> {
    fn accept(&mut self, record: &FeatureRecord) -> Result<(), WatchError> {
        let prediction = self.predictor.predict(record)?;
        if prediction {
            self.positives += 1;
        }
        self.log.write(prediction)?;
        Ok(())
    }
}

/// Why the watcher loop ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum WatchExit {
    IdleTimeout,
    Shutdown,
    ChannelClosed,
}

/// Counters for one watcher run.
#[derive(Debug, Clone, Serialize)]
pub struct WatchSummary {
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    /// Notifications received, relevant or not.
    pub notifications: usize,
    /// Notifications for other paths, directories or irrelevant kinds.
    pub ignored: usize,
    /// Input files that could not be read or held no valid snapshot.
    pub invalid_input: usize,
    pub warming_up: usize,
    pub incomplete: usize,
    pub records: usize,
    pub sink_errors: usize,
    pub exit: Option<WatchExit>,
}

impl WatchSummary {
    fn new() -> Self {
        Self {
            started_at: Utc::now(),
            finished_at: None,
            notifications: 0,
            ignored: 0,
            invalid_input: 0,
            warming_up: 0,
            incomplete: 0,
            records: 0,
            sink_errors: 0,
            exit: None,
        }
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

/// Directory holding `path`. A bare file name lives in `.`.
fn parent_dir(path: &Path) -> Option<&Path> {
    match path.parent() {
        Some(p) if p.as_os_str().is_empty() => Some(Path::new(".")),
        other => other,
    }
}

fn same_file(a: &Path, b: &Path) -> bool {
    if a == b {
        return true;
    }
    if a.file_name() != b.file_name() {
        return false;
    }
    match (parent_dir(a).map(Path::canonicalize), parent_dir(b).map(Path::canonicalize)) {
        (Some(Ok(pa)), Some(Ok(pb))) => pa == pb,
        _ => false,
    }
}

/// Drives one [`StreamingSession`] from notifications about one input file.
pub struct SessionWatcher<S> {
    input: PathBuf,
    session: StreamingSession,
    sink: S,
    idle_timeout: Duration,
    rx: mpsc::Receiver<WatchMessage>,
    _watcher: Option<RecommendedWatcher>,
}

impl<S: RecordSink> SessionWatcher<S> {
    /// Create a watcher and the sender feeding its queue.
    pub fn new(
        input: impl Into<PathBuf>,
        session: StreamingSession,
        sink: S,
        idle_timeout: Duration,
        capacity: usize,
    ) -> (Self, mpsc::Sender<WatchMessage>) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        (
            Self {
                input: input.into(),
                session,
                sink,
                idle_timeout,
                rx,
                _watcher: None,
            },
            tx,
        )
    }

    pub fn sink(&self) -> &S {
        &self.sink
    }

    pub fn into_sink(self) -> S {
        self.sink
    }

    /// Watch the input file's directory and forward notifications to `tx`.
    pub fn watch(&mut self, tx: mpsc::Sender<WatchMessage>) -> Result<(), WatchError> {
        let dir = parent_dir(&self.input)
            .ok_or_else(|| WatchError::NoParent(self.input.clone()))?
            .to_path_buf();

        let mut watcher = notify::recommended_watcher(move |res: Result<Event, notify::Error>| {
            match res {
                Ok(event) => {
                    for notification in Notification::from_event(event) {
                        if let Err(e) = tx.blocking_send(WatchMessage::Notify(notification)) {
                            debug!("Watcher queue closed: {}", e);
                        }
                    }
                }
                Err(e) => error!("File watcher error: {}", e),
            }
        })?;

        watcher.watch(&dir, RecursiveMode::NonRecursive)?;
        info!(dir = %dir.display(), input = %self.input.display(), "Watching for snapshots");
        self._watcher = Some(watcher);
        Ok(())
    }

    /// Process notifications until idle timeout, shutdown, or channel close.
    ///
    /// Every notification pushes the idle deadline forward.
    pub async fn run(&mut self) -> WatchSummary {
        let mut summary = WatchSummary::new();
        let mut deadline = Instant::now() + self.idle_timeout;

        let exit = loop {
            tokio::select! {
                msg = self.rx.recv() => match msg {
                    Some(WatchMessage::Notify(notification)) => {
                        deadline = Instant::now() + self.idle_timeout;
                        self.handle(notification, &mut summary);
                    }
                    Some(WatchMessage::Shutdown) => break WatchExit::Shutdown,
                    None => break WatchExit::ChannelClosed,
                },
                _ = tokio::time::sleep_until(deadline) => break WatchExit::IdleTimeout,
            }
        };

        self._watcher = None;
        summary.exit = Some(exit);
        summary.finished_at = Some(Utc::now());
        info!(
            exit = ?exit,
            notifications = summary.notifications,
            records = summary.records,
            "Session watcher stopped"
        );
        summary
    }

    fn handle(&mut self, notification: Notification, summary: &mut WatchSummary) {
        summary.notifications += 1;

        let relevant = matches!(
            notification.kind,
            NotificationKind::Created | NotificationKind::Modified
        );
        if !relevant || notification.is_dir || !same_file(&notification.path, &self.input) {
            debug!(kind = ?notification.kind, path = %notification.path.display(), "Ignoring notification");
            summary.ignored += 1;
            return;
        }

        let text = match std::fs::read_to_string(&self.input) {
            Ok(text) => text,
            Err(e) => {
                warn!(path = %self.input.display(), error = %e, "Failed to read snapshot file");
                summary.invalid_input += 1;
                return;
            }
        };

        let Some(snapshot) = parse_single_snapshot(&text) else {
            debug!(path = %self.input.display(), "Snapshot file not valid");
            summary.invalid_input += 1;
            return;
        };

        match self.session.process(&snapshot) {
            StreamOutcome::WarmingUp => summary.warming_up += 1,
            StreamOutcome::Incomplete => summary.incomplete += 1,
            StreamOutcome::Record(record) => {
                summary.records += 1;
                if let Err(e) = self.sink.accept(&record) {
                    warn!(error = %e, "Record sink failed");
                    summary.sink_errors += 1;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::StreamConfig;
    use crate::record::{FeatureValue, Field};
    use tempfile::TempDir;
    use tracing::Level;

    fn init_test_logging() {
        let _ = tracing_subscriber::fmt()
            .with_max_level(Level::DEBUG)
            .with_test_writer()
            .try_init();
    }

    fn capture(cwnd: i64, segs: i64) -> String {
        format!(
            "Netid State Recv-Q Send-Q Local Address:Port Peer Address:Port\n\
             tcp ESTAB 0 0 10.1.1.100:5001 10.2.2.100:5201 timer:(on,200ms,0)\n\
             \t ts sack ecn reno rto:204 rtt:20.5/1.5 cwnd:{cwnd} ssthresh:30 \
             data_segs_out:{segs} lastsnd:8 pacing_rate 10Mbps\n"
        )
    }

    fn session() -> StreamingSession {
        StreamingSession::new(StreamConfig {
            warmup_secs: 0.0,
            tick_ms: 20,
            emit_timestamp: true,
        })
    }

    async fn feed(tx: &mpsc::Sender<WatchMessage>, input: &Path, cwnd: i64, segs: i64) {
        std::fs::write(input, capture(cwnd, segs)).unwrap();
        tx.send(WatchMessage::Notify(Notification::new(NotificationKind::Modified, input)))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_queued_notifications_are_processed_in_order() {
        init_test_logging();
        tracing::info!("TEST START: test_queued_notifications_are_processed_in_order");

        let dir = TempDir::new().unwrap();
        let input = dir.path().join("ss_output.txt");
        let (mut watcher, tx) =
            SessionWatcher::new(&input, session(), Vec::new(), Duration::from_secs(5), 16);

        std::fs::write(&input, capture(10, 100)).unwrap();
        tx.send(WatchMessage::Notify(Notification::new(NotificationKind::Created, &input)))
            .await
            .unwrap();
        tx.send(WatchMessage::Shutdown).await.unwrap();

        let summary = watcher.run().await;
        assert_eq!(summary.exit, Some(WatchExit::Shutdown));
        assert_eq!(summary.incomplete, 1);
        assert!(watcher.sink().is_empty());

        feed(&tx, &input, 14, 130).await;
        tx.send(WatchMessage::Shutdown).await.unwrap();
        let summary = watcher.run().await;
        assert_eq!(summary.records, 1);

        let record = &watcher.sink()[0];
        assert_eq!(record.get(Field::CwndDiff), Some(FeatureValue::Int(4)));
        assert_eq!(record.get(Field::DataSegmentsSent), Some(FeatureValue::Int(30)));
        assert_eq!(record.get(Field::Timestamp), Some(FeatureValue::Int(20)));

        tracing::info!("TEST PASS: test_queued_notifications_are_processed_in_order");
    }

    #[tokio::test]
    async fn test_irrelevant_notifications_are_ignored() {
        init_test_logging();
        let dir = TempDir::new().unwrap();
        let input = dir.path().join("ss_output.txt");
        std::fs::write(&input, capture(10, 100)).unwrap();
        let (mut watcher, tx) =
            SessionWatcher::new(&input, session(), Vec::new(), Duration::from_secs(5), 16);

        let other = dir.path().join("other.txt");
        for notification in [
            Notification::new(NotificationKind::Modified, &other),
            Notification::new(NotificationKind::Deleted, &input),
            Notification::new(NotificationKind::Moved, &input),
            Notification {
                kind: NotificationKind::Created,
                path: dir.path().to_path_buf(),
                is_dir: true,
            },
        ] {
            tx.send(WatchMessage::Notify(notification)).await.unwrap();
        }
        drop(tx);

        let summary = watcher.run().await;
        assert_eq!(summary.exit, Some(WatchExit::ChannelClosed));
        assert_eq!(summary.notifications, 4);
        assert_eq!(summary.ignored, 4);
        assert_eq!(watcher.session.state().timestamp_ms(), 0);
    }

    #[test]
    fn test_bare_file_name_matches_absolute_path() {
        let cwd = std::env::current_dir().unwrap();
        let absolute = cwd.join("ss_output.txt");
        assert!(same_file(&absolute, Path::new("ss_output.txt")));
        assert!(same_file(Path::new("ss_output.txt"), &absolute));
        assert!(!same_file(&cwd.join("other.txt"), Path::new("ss_output.txt")));
    }

    #[tokio::test]
    async fn test_relative_input_accepts_absolute_notifications() {
        init_test_logging();
        let absolute = std::env::current_dir().unwrap().join("lossprobe_missing_capture.txt");
        let (mut watcher, tx) = SessionWatcher::new(
            "lossprobe_missing_capture.txt",
            session(),
            Vec::new(),
            Duration::from_secs(5),
            16,
        );

        tx.send(WatchMessage::Notify(Notification::new(NotificationKind::Modified, &absolute)))
            .await
            .unwrap();
        drop(tx);

        let summary = watcher.run().await;
        assert_eq!(summary.notifications, 1);
        assert_eq!(summary.ignored, 0);
        // The notification is routed to the session; the file itself is absent.
        assert_eq!(summary.invalid_input, 1);
    }

    #[tokio::test]
    async fn test_invalid_input_is_counted() {
        let dir = TempDir::new().unwrap();
        let input = dir.path().join("ss_output.txt");
        let (mut watcher, tx) =
            SessionWatcher::new(&input, session(), Vec::new(), Duration::from_secs(5), 16);

        tx.send(WatchMessage::Notify(Notification::new(NotificationKind::Modified, &input)))
            .await
            .unwrap();
        std::fs::write(&input, "tcp ESTAB only one line\n").unwrap();
        tx.send(WatchMessage::Notify(Notification::new(NotificationKind::Modified, &input)))
            .await
            .unwrap();
        drop(tx);

        let summary = watcher.run().await;
        assert_eq!(summary.invalid_input, 2);
        assert_eq!(summary.records, 0);
    }

    #[tokio::test]
    async fn test_idle_timeout_ends_session() {
        let dir = TempDir::new().unwrap();
        let input = dir.path().join("ss_output.txt");
        let (mut watcher, tx) =
            SessionWatcher::new(&input, session(), Vec::new(), Duration::from_millis(50), 16);

        let summary = watcher.run().await;
        assert_eq!(summary.exit, Some(WatchExit::IdleTimeout));
        assert_eq!(summary.notifications, 0);
        assert!(summary.finished_at.is_some());
        assert!(summary.to_json().unwrap().contains("\"exit\":\"idle_timeout\""));
        drop(tx);
    }

    #[tokio::test]
    async fn test_csv_sink_writes_latest_record() {
        let dir = TempDir::new().unwrap();
        let input = dir.path().join("ss_output.txt");
        let output = dir.path().join("input_data.csv");
        let (mut watcher, tx) = SessionWatcher::new(
            &input,
            session(),
            CsvRecordSink::new(&output),
            Duration::from_secs(5),
            16,
        );

        feed(&tx, &input, 10, 100).await;
        tx.send(WatchMessage::Shutdown).await.unwrap();
        watcher.run().await;
        feed(&tx, &input, 12, 150).await;
        tx.send(WatchMessage::Shutdown).await.unwrap();
        let summary = watcher.run().await;
        assert_eq!(summary.records, 1);

        let csv = std::fs::read_to_string(&output).unwrap();
        let mut lines = csv.lines();
        assert!(lines.next().unwrap().starts_with("timer_name,expire_time,retrans,rto,rtt"));
        assert!(lines.next().unwrap().starts_with("1,200,0,204,20.5,1.5,12,30,50,8,10.0,20,"));
        assert_eq!(lines.next(), None);
    }

    #[tokio::test]
    async fn test_notify_watcher_feeds_queue() {
        init_test_logging();
        let dir = TempDir::new().unwrap();
        let input = dir.path().join("ss_output.txt");
        let (mut watcher, tx) =
            SessionWatcher::new(&input, session(), Vec::new(), Duration::from_millis(1500), 64);
        watcher.watch(tx).unwrap();

        let writer_input = input.clone();
        let writer = tokio::task::spawn_blocking(move || {
            std::thread::sleep(Duration::from_millis(200));
            std::fs::write(&writer_input, capture(10, 100)).unwrap();
        });

        let summary = watcher.run().await;
        writer.await.unwrap();
        assert_eq!(summary.exit, Some(WatchExit::IdleTimeout));
        assert!(summary.notifications >= 1);
    }
}
