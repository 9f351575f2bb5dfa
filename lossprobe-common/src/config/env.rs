//! Prefixed environment-variable parsing.
//!
//! The parser keeps going after a bad value so every problem can be reported
//! at once; a rejected value falls back to the supplied default.

use super::source::Sourced;
use std::fmt::Display;
use std::str::FromStr;
use thiserror::Error;

/// Errors collected while reading environment overrides.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EnvError {
    #[error("Invalid value for {var}: expected {expected}, got '{value}'")]
    InvalidValue {
        var: String,
        expected: &'static str,
        value: String,
    },

    #[error("Value out of range for {var}: {value} (valid: {min}..={max})")]
    OutOfRange {
        var: String,
        value: String,
        min: String,
        max: String,
    },

    #[error("Invalid log level for {var}: {value}")]
    InvalidLogLevel { var: String, value: String },
}

type Lookup = Box<dyn Fn(&str) -> Option<String>>;

/// Reads `<prefix><NAME>` variables through a lookup function.
pub struct EnvParser {
    prefix: String,
    lookup: Lookup,
    errors: Vec<EnvError>,
}

impl EnvParser {
    /// Parser over the process environment with the `LOSSPROBE_` prefix.
    pub fn new() -> Self {
        Self::with_lookup("LOSSPROBE_", |name| std::env::var(name).ok())
    }

    /// Parser over an arbitrary variable source.
    pub fn with_lookup(
        prefix: impl Into<String>,
        lookup: impl Fn(&str) -> Option<String> + 'static,
    ) -> Self {
        Self {
            prefix: prefix.into(),
            lookup: Box::new(lookup),
            errors: Vec::new(),
        }
    }

    pub fn errors(&self) -> &[EnvError] {
        &self.errors
    }

    pub fn has_errors(&self) -> bool {
        !self.errors.is_empty()
    }

    pub fn take_errors(&mut self) -> Vec<EnvError> {
        std::mem::take(&mut self.errors)
    }

    fn var_name(&self, name: &str) -> String {
        format!("{}{}", self.prefix, name)
    }

    fn raw(&self, name: &str) -> (String, Option<String>) {
        let var_name = self.var_name(name);
        let value = (self.lookup)(&var_name);
        (var_name, value)
    }

    /// Accepts 1/true/yes/on and 0/false/no/off/"".
    pub fn get_bool(&mut self, name: &str, default: bool) -> Sourced<bool> {
        let (var, Some(value)) = self.raw(name) else {
            return Sourced::default_value(default);
        };
        match value.trim().to_ascii_lowercase().as_str() {
            "1" | "true" | "yes" | "on" => Sourced::from_env(true, var),
            "0" | "false" | "no" | "off" | "" => Sourced::from_env(false, var),
            _ => {
                self.errors.push(EnvError::InvalidValue {
                    var,
                    expected: "boolean (true/false/1/0/yes/no)",
                    value,
                });
                Sourced::default_value(default)
            }
        }
    }

    /// Parse a number and check it lies within `min..=max`.
    pub fn get_in_range<T>(&mut self, name: &str, default: T, min: T, max: T) -> Sourced<T>
    where
        T: FromStr + PartialOrd + Display + Copy,
    {
        let (var, Some(value)) = self.raw(name) else {
            return Sourced::default_value(default);
        };
        match value.trim().parse::<T>() {
            Ok(n) if n >= min && n <= max => Sourced::from_env(n, var),
            Ok(n) => {
                self.errors.push(EnvError::OutOfRange {
                    var,
                    value: n.to_string(),
                    min: min.to_string(),
                    max: max.to_string(),
                });
                Sourced::default_value(default)
            }
            Err(_) => {
                self.errors.push(EnvError::InvalidValue {
                    var,
                    expected: std::any::type_name::<T>(),
                    value,
                });
                Sourced::default_value(default)
            }
        }
    }

    pub fn get_log_level(&mut self, name: &str, default: &str) -> Sourced<String> {
        let (var, Some(value)) = self.raw(name) else {
            return Sourced::default_value(default.to_string());
        };
        let lower = value.trim().to_ascii_lowercase();
        if crate::logging::is_valid_level(&lower) {
            Sourced::from_env(lower, var)
        } else {
            self.errors.push(EnvError::InvalidLogLevel { var, value });
            Sourced::default_value(default.to_string())
        }
    }
}

impl Default for EnvParser {
    fn default() -> Self {
        Self::new()
    }
}
