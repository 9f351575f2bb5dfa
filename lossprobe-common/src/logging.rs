//! Structured logging initialization.
//!
//! Every lossprobe consumer logs through `tracing`; this module installs the
//! global subscriber once, with console output and an optional daily-rotated
//! log file.

use anyhow::Result;
use std::collections::BTreeMap;
use std::ffi::OsStr;
use std::path::{Path, PathBuf};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{
    EnvFilter, fmt,
    fmt::writer::{BoxMakeWriter, MakeWriterExt},
    util::SubscriberInitExt,
};

const ENV_PREFIX: &str = "LOSSPROBE_LOG_";
const DEFAULT_LOG_FILE: &str = "lossprobe.log";

/// Logging output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    /// Multi-line, human-friendly output.
    Pretty,
    /// One JSON object per event.
    Json,
    /// Single-line output.
    Compact,
}

impl LogFormat {
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "pretty" => Some(Self::Pretty),
            "json" => Some(Self::Json),
            "compact" => Some(Self::Compact),
            _ => None,
        }
    }
}

/// Configuration for logging initialization.
#[derive(Debug, Clone)]
pub struct LogConfig {
    /// Base level directive (trace, debug, info, warn, error, off).
    pub level: String,
    pub format: LogFormat,
    /// Optional rotating log file; console output is kept alongside it.
    pub file_path: Option<PathBuf>,
    /// Per-target level overrides, e.g. `lossprobe_telemetry::batch=debug`.
    pub targets: BTreeMap<String, String>,
    /// Write console logs to stderr instead of stdout.
    pub use_stderr: bool,
    pub with_file_line: bool,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: LogFormat::Compact,
            file_path: None,
            targets: BTreeMap::new(),
            use_stderr: true,
            with_file_line: false,
        }
    }
}

impl LogConfig {
    /// Build a logging configuration from `LOSSPROBE_LOG_*` variables.
    ///
    /// - `LOSSPROBE_LOG_LEVEL`
    /// - `LOSSPROBE_LOG_FORMAT` (pretty|json|compact)
    /// - `LOSSPROBE_LOG_FILE`
    /// - `LOSSPROBE_LOG_TARGETS` (comma-separated target=level list)
    pub fn from_env(default_level: &str) -> Self {
        Self::from_lookup(default_level, |name| std::env::var(name).ok())
    }

    /// Same as [`LogConfig::from_env`] but reads variables through `lookup`.
    pub fn from_lookup(default_level: &str, lookup: impl Fn(&str) -> Option<String>) -> Self {
        let var = |suffix: &str| lookup(&format!("{ENV_PREFIX}{suffix}"));

        let mut config = Self {
            level: var("LEVEL").unwrap_or_else(|| default_level.to_string()),
            ..Self::default()
        };

        if let Some(format) = var("FORMAT").as_deref().and_then(LogFormat::parse) {
            config.format = format;
        }

        if let Some(path) = var("FILE").filter(|p| !p.trim().is_empty()) {
            config.file_path = Some(PathBuf::from(path));
        }

        if let Some(targets) = var("TARGETS") {
            config.targets = parse_target_overrides(&targets);
        }

        config
    }

    pub fn with_level(mut self, level: impl Into<String>) -> Self {
        self.level = level.into();
        self
    }

    pub fn with_format(mut self, format: LogFormat) -> Self {
        self.format = format;
        self
    }

    pub fn with_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.file_path = Some(path.into());
        self
    }

    /// Render the filter directive string, base level first.
    pub fn directives(&self) -> String {
        self.targets
            .iter()
            .fold(self.level.clone(), |mut acc, (target, level)| {
                acc.push_str(&format!(",{target}={level}"));
                acc
            })
    }

    /// Build the effective filter. `RUST_LOG` takes precedence when it parses.
    pub fn env_filter(&self) -> EnvFilter {
        if std::env::var_os("RUST_LOG").is_some() {
            if let Ok(filter) = EnvFilter::try_from_default_env() {
                return filter;
            }
        }
        EnvFilter::new(self.directives())
    }
}

/// Keeps the non-blocking file writer flushing; hold it for the life of the process.
pub struct LoggingGuards {
    _file_guard: Option<WorkerGuard>,
}

/// Install the global tracing subscriber.
///
/// Calling this a second time leaves the first subscriber in place and
/// returns fresh guards.
pub fn init_logging(config: &LogConfig) -> Result<LoggingGuards> {
    let (writer, file_guard) = build_writer(config);
    let ansi = file_guard.is_none() && config.format != LogFormat::Json;

    let builder = fmt::Subscriber::builder()
        .with_writer(writer)
        .with_env_filter(config.env_filter())
        .with_file(config.with_file_line)
        .with_line_number(config.with_file_line)
        .with_ansi(ansi);

    let installed = match config.format {
        LogFormat::Pretty => builder.pretty().finish().try_init(),
        LogFormat::Json => builder.json().finish().try_init(),
        LogFormat::Compact => builder.compact().finish().try_init(),
    };

    // try_init only fails when a global dispatcher or `log` bridge is already set.
    if let Err(err) = installed {
        tracing::debug!(error = %err, "Logging already initialized, keeping existing subscriber");
    }

    Ok(LoggingGuards {
        _file_guard: file_guard,
    })
}

fn build_writer(config: &LogConfig) -> (BoxMakeWriter, Option<WorkerGuard>) {
    let console = if config.use_stderr {
        BoxMakeWriter::new(std::io::stderr)
    } else {
        BoxMakeWriter::new(std::io::stdout)
    };

    let Some(path) = config.file_path.as_ref() else {
        return (console, None);
    };

    let dir = path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));
    let file_name = path
        .file_name()
        .unwrap_or_else(|| OsStr::new(DEFAULT_LOG_FILE));
    let (file_writer, guard) =
        tracing_appender::non_blocking(tracing_appender::rolling::daily(dir, file_name));

    (BoxMakeWriter::new(console.and(file_writer)), Some(guard))
}

fn parse_target_overrides(value: &str) -> BTreeMap<String, String> {
    value
        .split(',')
        .filter_map(|entry| entry.split_once('='))
        .map(|(target, level)| (target.trim(), level.trim().to_ascii_lowercase()))
        .filter(|(target, level)| !target.is_empty() && is_valid_level(level))
        .map(|(target, level)| (target.to_string(), level))
        .collect()
}

pub(crate) fn is_valid_level(level: &str) -> bool {
    matches!(level, "trace" | "debug" | "info" | "warn" | "error" | "off")
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_parse_targets_skips_invalid_entries() {
        let targets =
            parse_target_overrides("lossprobe_telemetry::batch=DEBUG, notify=warn,broken,x=loud");
        assert_eq!(
            targets.get("lossprobe_telemetry::batch"),
            Some(&"debug".to_string())
        );
        assert_eq!(targets.get("notify"), Some(&"warn".to_string()));
        assert_eq!(targets.len(), 2);
    }

    #[test]
    fn test_from_lookup_reads_prefixed_vars() {
        let vars: HashMap<&str, &str> = HashMap::from([
            ("LOSSPROBE_LOG_LEVEL", "debug"),
            ("LOSSPROBE_LOG_FORMAT", "json"),
            ("LOSSPROBE_LOG_FILE", "/tmp/lossprobe/run.log"),
        ]);
        let config = LogConfig::from_lookup("info", |name| vars.get(name).map(|v| v.to_string()));

        assert_eq!(config.level, "debug");
        assert_eq!(config.format, LogFormat::Json);
        assert_eq!(
            config.file_path.as_deref(),
            Some(Path::new("/tmp/lossprobe/run.log"))
        );
    }

    #[test]
    fn test_from_lookup_falls_back_to_default_level() {
        let config = LogConfig::from_lookup("warn", |_| None);
        assert_eq!(config.level, "warn");
        assert_eq!(config.format, LogFormat::Compact);
        assert!(config.file_path.is_none());
    }

    #[test]
    fn test_directives_include_overrides() {
        let mut config = LogConfig::default().with_level("info");
        config
            .targets
            .insert("lossprobe_telemetry::watch".to_string(), "trace".to_string());
        assert_eq!(config.directives(), "info,lossprobe_telemetry::watch=trace");
    }

    #[test]
    fn test_init_logging_twice_is_harmless() {
        let config = LogConfig::default().with_level("off");
        assert!(init_logging(&config).is_ok());
        assert!(init_logging(&config).is_ok());
    }
}
