use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::buffer::DEFAULT_STASH_THRESHOLD;
use crate::codec::DEFAULT_COMPRESSION_LEVEL;

/// Default repository directory, relative to the host's working directory.
pub const DEFAULT_ROOT: &str = ".worldgit";

/// Repository configuration: where history lives and how eagerly the buffer flushes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RepoConfig {
    /// Directory holding `HEAD`, `commits/` and `stash/`.
    pub root: PathBuf,
    /// Pending record count above which an observer append forces a stash.
    pub stash_threshold: usize,
    /// zstd level for commit and stash files.
    pub compression_level: i32,
}

impl Default for RepoConfig {
    fn default() -> Self {
        Self {
            root: PathBuf::from(DEFAULT_ROOT),
            stash_threshold: DEFAULT_STASH_THRESHOLD,
            compression_level: DEFAULT_COMPRESSION_LEVEL,
        }
    }
}

/// Errors from loading a configuration file.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid config {}: {source}", path.display())]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("stash_threshold must be at least 1")]
    ZeroThreshold,
}

impl RepoConfig {
    /// Default configuration rooted at `root`.
    pub fn at(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            ..Self::default()
        }
    }

    /// Load a JSON config file. Missing keys take their defaults.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let config: Self = serde_json::from_str(&text).map_err(|source| ConfigError::Json {
            path: path.to_path_buf(),
            source,
        })?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.stash_threshold == 0 {
            return Err(ConfigError::ZeroThreshold);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_documented_values() {
        let c = RepoConfig::default();
        assert_eq!(c.root, PathBuf::from(".worldgit"));
        assert_eq!(c.stash_threshold, 32);
        assert_eq!(c.compression_level, 3);
    }

    #[test]
    fn partial_file_fills_in_defaults() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("worldgit.json");
        std::fs::write(&path, r#"{ "stash_threshold": 8 }"#).unwrap();

        let c = RepoConfig::load(&path).unwrap();
        assert_eq!(c.stash_threshold, 8);
        assert_eq!(c.root, PathBuf::from(DEFAULT_ROOT));
    }

    #[test]
    fn zero_threshold_is_rejected() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("worldgit.json");
        std::fs::write(&path, r#"{ "stash_threshold": 0 }"#).unwrap();
        assert!(matches!(
            RepoConfig::load(&path),
            Err(ConfigError::ZeroThreshold)
        ));
    }

    #[test]
    fn missing_file_reports_path() {
        let err = RepoConfig::load("/nonexistent/worldgit.json").unwrap_err();
        assert!(err.to_string().contains("/nonexistent/worldgit.json"));
    }
}
