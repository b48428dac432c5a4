use crate::benchmark::DEFAULT_CAPACITY;
use serde::{Deserialize, Serialize};
use std::{
    env,
    fs::File,
    io::Error,
    path::{Path, PathBuf},
};
use thiserror::Error;
use tracing::{debug, error};

/// file name of the benchmark snapshot inside the data directory
pub const CACHE_FILE_NAME: &str = "BenchmarkCache.yaml";
/// environment variable pointing to a config file
pub const CONFIG_ENV: &str = "FOLDMON_CONFIG";
/// environment variable overriding the data directory
pub const DATA_DIR_ENV: &str = "FOLDMON_DATA_DIR";

#[derive(Error, Debug)]
pub enum ConfigErrors {
    #[error("Config file could not be read")]
    ReadError(#[from] Error),
    #[error("Config file is not valid YAML")]
    ParseError(#[from] serde_yaml::Error),
    #[error("Config failed preflight checks")]
    Preflight,
}

#[derive(Deserialize, Serialize, Clone, Debug, Default, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct BenchmarkConfig {
    #[serde(default)]
    pub cache: CacheConfig,
}

#[derive(Deserialize, Serialize, Clone, Debug, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct CacheConfig {
    // where the snapshot lives, resolved from the environment if missing
    #[serde(default = "default_cache_path")]
    pub path: PathBuf,
    // frame times kept per benchmark
    #[serde(default = "default_capacity")]
    pub capacity: usize,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            path: default_cache_path(),
            capacity: DEFAULT_CAPACITY,
        }
    }
}

impl CacheConfig {
    /// cache config for an explicit snapshot path
    pub fn at(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            capacity: DEFAULT_CAPACITY,
        }
    }
}

impl BenchmarkConfig {
    /// load a config file from `path`
    pub fn load(path: &Path) -> Result<Self, ConfigErrors> {
        let file = File::open(path)?;
        let config: Self = serde_yaml::from_reader(file)?;

        if config.preflight_checks() {
            return Err(ConfigErrors::Preflight);
        }

        debug!(path = ?path, "Loaded config");

        Ok(config)
    }

    /// Load the config named by `FOLDMON_CONFIG`, or fall back to the defaults
    pub fn discover() -> Result<Self, ConfigErrors> {
        match env::var_os(CONFIG_ENV) {
            Some(path) => Self::load(Path::new(&path)),
            None => Ok(Self::default()),
        }
    }

    /// returns true if any problem was found, all problems are logged
    pub fn preflight_checks(&self) -> bool {
        let mut contains_error = false;

        if self.cache.capacity == 0 {
            error!("cache.capacity must be at least 1");
            contains_error = true;
        }

        if self.cache.path.as_os_str().is_empty() {
            error!("cache.path must not be empty");
            contains_error = true;
        } else if self.cache.path.is_dir() {
            error!(
                "cache.path {} points to a directory, expected a file",
                self.cache.path.to_string_lossy()
            );
            contains_error = true;
        }

        contains_error
    }
}

/// Resolve the application data directory.
///
/// `FOLDMON_DATA_DIR`, then `$XDG_DATA_HOME/foldmon`, then
/// `$HOME/.local/share/foldmon`, then the working directory.
pub fn data_dir() -> PathBuf {
    if let Some(dir) = env::var_os(DATA_DIR_ENV).filter(|dir| !dir.is_empty()) {
        return PathBuf::from(dir);
    }

    if let Some(dir) = env::var_os("XDG_DATA_HOME").filter(|dir| !dir.is_empty()) {
        return PathBuf::from(dir).join("foldmon");
    }

    env::var_os("HOME")
        .filter(|dir| !dir.is_empty())
        .map(|home| PathBuf::from(home).join(".local/share/foldmon"))
        .unwrap_or_else(|| PathBuf::from("."))
}

fn default_cache_path() -> PathBuf {
    data_dir().join(CACHE_FILE_NAME)
}

fn default_capacity() -> usize {
    DEFAULT_CAPACITY
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn load_partial_config() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "cache:\n  path: /tmp/bench.yaml").unwrap();

        let config = BenchmarkConfig::load(file.path()).unwrap();

        assert_eq!(config.cache.path, PathBuf::from("/tmp/bench.yaml"));
        assert_eq!(config.cache.capacity, DEFAULT_CAPACITY);
    }

    #[test]
    fn zero_capacity_fails_preflight() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "cache:\n  path: /tmp/bench.yaml\n  capacity: 0").unwrap();

        assert!(matches!(
            BenchmarkConfig::load(file.path()),
            Err(ConfigErrors::Preflight)
        ));
    }

    #[test]
    fn unknown_fields_rejected() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "cache:\n  capacity: 10\n  frames: 3").unwrap();

        assert!(matches!(
            BenchmarkConfig::load(file.path()),
            Err(ConfigErrors::ParseError(_))
        ));
    }

    #[test]
    fn default_path_uses_cache_file_name() {
        assert!(CacheConfig::default().path.ends_with(CACHE_FILE_NAME));
    }
}
