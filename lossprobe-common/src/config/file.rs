//! TOML configuration files.

use anyhow::{Context, Result};
use serde::de::DeserializeOwned;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

const CONFIG_DIR_NAME: &str = "lossprobe";

/// Per-user configuration directory (e.g. `~/.config/lossprobe`).
pub fn config_dir() -> Option<PathBuf> {
    directories::ProjectDirs::from("org", "lossprobe", CONFIG_DIR_NAME)
        .map(|dirs| dirs.config_dir().to_path_buf())
}

/// Load `path`, or `<config dir>/<default_file>` when no path is given.
///
/// A file that does not exist yields `T::default()`; a file that exists but
/// does not parse is an error.
pub fn load_toml_or_default<T>(path: Option<&Path>, default_file: &str) -> Result<T>
where
    T: DeserializeOwned + Default,
{
    let config_path = match path {
        Some(p) => p.to_path_buf(),
        None => config_dir()
            .context("Could not determine config directory")?
            .join(default_file),
    };

    if !config_path.exists() {
        debug!("Config not found at {:?}, using defaults", config_path);
        return Ok(T::default());
    }

    info!("Loading config from {:?}", config_path);
    let contents = std::fs::read_to_string(&config_path)
        .with_context(|| format!("Failed to read config from {:?}", config_path))?;

    toml::from_str(&contents)
        .with_context(|| format!("Failed to parse config from {:?}", config_path))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;
    use tempfile::TempDir;

    #[derive(Debug, Default, Deserialize, PartialEq)]
    struct Sample {
        #[serde(default)]
        name: String,
        #[serde(default)]
        count: u32,
    }

    #[test]
    fn test_missing_file_yields_default() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("absent.toml");
        let loaded: Sample = load_toml_or_default(Some(path.as_path()), "config.toml").unwrap();
        assert_eq!(loaded, Sample::default());
    }

    #[test]
    fn test_file_is_parsed() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "name = \"reno\"\ncount = 3\n").unwrap();

        let loaded: Sample = load_toml_or_default(Some(path.as_path()), "config.toml").unwrap();
        assert_eq!(loaded.name, "reno");
        assert_eq!(loaded.count, 3);
    }

    #[test]
    fn test_malformed_file_is_an_error() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "count = \"three\"").unwrap();

        let err = load_toml_or_default::<Sample>(Some(path.as_path()), "config.toml").unwrap_err();
        assert!(format!("{err:#}").contains("Failed to parse config"));
    }
}
