//! lossprobe - Common Library
//!
//! Logging and configuration plumbing shared by the lossprobe crates.

#![forbid(unsafe_code)]

pub mod config;
pub mod logging;

pub use config::{ConfigSource, EnvError, EnvParser, Sourced, config_dir, load_toml_or_default};
pub use logging::{LogConfig, LogFormat, LoggingGuards, init_logging};
