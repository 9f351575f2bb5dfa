//! Classifier seam and prediction log.
//!
//! The trained model lives outside this crate; it is reached through the
//! [`Classifier`] trait, one feature row per call.

use crate::record::FeatureRecord;
use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};
use thiserror::Error;
use tracing::debug;

#[derive(Debug, Error)]
pub enum ClassifierError {
    #[error("classifier failed: {0}")]
    Model(String),

    #[error("failed to access prediction log {path}: {source}")]
    Log {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("malformed prediction line: {0:?}")]
    MalformedLine(String),
}

/// A binary loss classifier.
pub trait Classifier {
    /// Hard label for one feature row.
    fn predict(&self, features: &FeatureRecord) -> Result<bool, ClassifierError>;

    /// Probability of the positive (lost) class for one feature row.
    fn predict_proba(&self, features: &FeatureRecord) -> Result<f64, ClassifierError>;
}

impl<C: Classifier + ?Sized> Classifier for Box<C> {
    fn predict(&self, features: &FeatureRecord) -> Result<bool, ClassifierError> {
        (**self).predict(features)
    }

    fn predict_proba(&self, features: &FeatureRecord) -> Result<f64, ClassifierError> {
        (**self).predict_proba(features)
    }
}

/// Applies an optional probability threshold on top of a classifier.
#[derive(Debug, Clone)]
pub struct Predictor<C> {
    classifier: C,
    threshold: Option<f64>,
}

impl<C: Classifier> Predictor<C> {
    pub fn new(classifier: C, threshold: Option<f64>) -> Self {
        Self {
            classifier,
            threshold,
        }
    }

    pub fn threshold(&self) -> Option<f64> {
        self.threshold
    }

    /// Without a threshold the classifier's own label is used; with one the
    /// row is positive when the probability reaches it.
    pub fn predict(&self, features: &FeatureRecord) -> Result<bool, ClassifierError> {
        match self.threshold {
            None => self.classifier.predict(features),
            Some(threshold) => {
                let proba = self.classifier.predict_proba(features)?;
                debug!(proba, threshold, "Thresholded prediction");
                Ok(proba >= threshold)
            }
        }
    }
}

/// How predictions are written.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PredictionMode {
    /// Overwrite the file with the latest `0` or `1`.
    Latest,
    /// Append `<seconds since start>: <0|1>` lines.
    Timestamped,
}

/// Prediction output file for one session.
#[derive(Debug, Clone)]
pub struct PredictionLog {
    path: PathBuf,
    mode: PredictionMode,
    started: Instant,
}

impl PredictionLog {
    pub fn new(path: impl Into<PathBuf>, mode: PredictionMode) -> Self {
        Self {
            path: path.into(),
            mode,
            started: Instant::now(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn write(&self, prediction: bool) -> Result<(), ClassifierError> {
        self.write_at(prediction, self.started.elapsed())
    }

    pub fn write_at(&self, prediction: bool, elapsed: Duration) -> Result<(), ClassifierError> {
        let flag = u8::from(prediction);
        let result = match self.mode {
            PredictionMode::Latest => std::fs::write(&self.path, flag.to_string()),
            PredictionMode::Timestamped => OpenOptions::new()
                .create(true)
                .append(true)
                .open(&self.path)
                .and_then(|mut file| writeln!(file, "{}: {}", elapsed.as_secs_f64(), flag)),
        };
        result.map_err(|source| ClassifierError::Log {
            path: self.path.clone(),
            source,
        })
    }
}

/// Parse a timestamped prediction log back into `(seconds, prediction)` pairs.
pub fn read_predictions(path: &Path) -> Result<Vec<(f64, bool)>, ClassifierError> {
    let text = std::fs::read_to_string(path).map_err(|source| ClassifierError::Log {
        path: path.to_path_buf(),
        source,
    })?;

    text.lines()
        .filter(|line| !line.trim().is_empty())
        .map(|line| {
            let malformed = || ClassifierError::MalformedLine(line.to_string());
            let (secs, flag) = line.split_once(':').ok_or_else(malformed)?;
            let secs: f64 = secs.trim().parse().map_err(|_| malformed())?;
            let flag = match flag.trim() {
                "1" => true,
                "0" => false,
                _ => return Err(malformed()),
            };
            Ok((secs, flag))
        })
        .collect()
}
