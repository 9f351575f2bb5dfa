//! Configuration plumbing.
//!
//! - TOML file loading with defaults when the file is absent
//! - Prefixed environment-variable overrides with error collection
//! - Source tracking so a value can report where it came from

pub mod env;
pub mod file;
pub mod source;

pub use env::{EnvError, EnvParser};
pub use file::{config_dir, load_toml_or_default};
pub use source::{ConfigSource, Sourced};
