//! Tracks where a configuration value originated.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Origin of a configuration value, lowest precedence first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConfigSource {
    Default,
    ConfigFile,
    Environment,
}

impl fmt::Display for ConfigSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ConfigSource::Default => "default",
            ConfigSource::ConfigFile => "config file",
            ConfigSource::Environment => "environment",
        })
    }
}

/// A configuration value together with its origin.
#[derive(Debug, Clone, PartialEq)]
pub struct Sourced<T> {
    pub value: T,
    pub source: ConfigSource,
    /// Variable name when the value came from the environment.
    pub env_var: Option<String>,
}

impl<T> Sourced<T> {
    pub fn new(value: T, source: ConfigSource) -> Self {
        Self {
            value,
            source,
            env_var: None,
        }
    }

    pub fn from_env(value: T, var_name: impl Into<String>) -> Self {
        Self {
            value,
            source: ConfigSource::Environment,
            env_var: Some(var_name.into()),
        }
    }

    pub fn default_value(value: T) -> Self {
        Self::new(value, ConfigSource::Default)
    }

    /// True when the value was set by something other than a built-in default.
    pub fn is_overridden(&self) -> bool {
        self.source != ConfigSource::Default
    }

    /// Keep whichever of the two values has the higher-precedence source.
    pub fn merge(self, other: Self) -> Self {
        if other.source >= self.source { other } else { self }
    }

    pub fn into_inner(self) -> T {
        self.value
    }
}
