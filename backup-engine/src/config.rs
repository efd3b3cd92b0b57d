//! Configuration management for the backup engine.
//!
//! Loads configuration from a TOML file. Every section and key is optional;
//! missing values fall back to the defaults below.

use crate::executor::{BackupRun, EngineSettings};
use anyhow::Context;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub paths: PathsConfig,
    #[serde(default)]
    pub backup: BackupConfig,
    #[serde(default)]
    pub log: LogConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PathsConfig {
    /// Root holding one upload directory per session
    #[serde(default = "default_uploads_dir")]
    pub uploads_dir: PathBuf,

    /// Root holding staging directories, archives and the history file
    #[serde(default = "default_backups_dir")]
    pub backups_dir: PathBuf,

    /// Static-mode source directory
    #[serde(default)]
    pub source_dir: Option<PathBuf>,

    /// Static-mode destination directory
    #[serde(default)]
    pub backup_dir: Option<PathBuf>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackupConfig {
    /// Only files modified within this many minutes are backed up (0 = all)
    #[serde(default)]
    pub modified_minutes: i64,

    /// Maximum number of files copied at once
    #[serde(default = "default_max_concurrency")]
    pub max_concurrency: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,
}

// Default values
fn default_uploads_dir() -> PathBuf {
    PathBuf::from("uploads")
}

fn default_backups_dir() -> PathBuf {
    PathBuf::from("backups")
}

fn default_max_concurrency() -> i64 {
    5
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            uploads_dir: default_uploads_dir(),
            backups_dir: default_backups_dir(),
            source_dir: None,
            backup_dir: None,
        }
    }
}

impl Default for BackupConfig {
    fn default() -> Self {
        Self {
            modified_minutes: 0,
            max_concurrency: default_max_concurrency(),
        }
    }
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

impl Config {
    /// Load configuration from a TOML file
    pub fn from_file(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        Self::from_toml(&content)
            .with_context(|| format!("Failed to parse config file {}", path.display()))
    }

    pub fn from_toml(content: &str) -> anyhow::Result<Self> {
        let mut config: Config = toml::from_str(content)?;
        config.normalize();
        Ok(config)
    }

    /// Replace out-of-range values with their defaults.
    pub fn normalize(&mut self) {
        if self.backup.max_concurrency <= 0 {
            self.backup.max_concurrency = default_max_concurrency();
        }
        if self.backup.modified_minutes < 0 {
            self.backup.modified_minutes = 0;
        }
    }

    pub fn max_concurrency(&self) -> usize {
        usize::try_from(self.backup.max_concurrency)
            .ok()
            .filter(|n| *n > 0)
            .unwrap_or(5)
    }

    pub fn window_minutes(&self) -> u64 {
        u64::try_from(self.backup.modified_minutes).unwrap_or(0)
    }

    /// Create the uploads and backups roots if they are missing.
    pub fn ensure_dirs(&self) -> anyhow::Result<()> {
        for dir in [&self.paths.uploads_dir, &self.paths.backups_dir] {
            std::fs::create_dir_all(dir)
                .with_context(|| format!("Failed to create directory {}", dir.display()))?;
        }
        Ok(())
    }

    pub fn engine_settings(&self) -> EngineSettings {
        EngineSettings {
            uploads_root: self.paths.uploads_dir.clone(),
            backups_root: self.paths.backups_dir.clone(),
            window_minutes: self.window_minutes(),
            max_concurrency: self.max_concurrency(),
        }
    }

    /// Static-mode run, if both directories are configured.
    pub fn static_run(&self) -> Option<BackupRun> {
        let source = self.paths.source_dir.as_ref()?;
        let dest = self.paths.backup_dir.as_ref()?;
        Some(BackupRun::new(
            source,
            dest,
            self.window_minutes(),
            self.max_concurrency(),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_empty_file_uses_defaults() {
        let config = Config::from_toml("").unwrap();
        assert_eq!(config.paths.uploads_dir, PathBuf::from("uploads"));
        assert_eq!(config.paths.backups_dir, PathBuf::from("backups"));
        assert_eq!(config.window_minutes(), 0);
        assert_eq!(config.max_concurrency(), 5);
        assert_eq!(config.log.level, "info");
        assert!(config.static_run().is_none());
    }

    #[test]
    fn test_out_of_range_values_are_normalized() {
        let config = Config::from_toml(
            r#"
            [backup]
            modified_minutes = -3
            max_concurrency = 0
            "#,
        )
        .unwrap();
        assert_eq!(config.backup.max_concurrency, 5);
        assert_eq!(config.backup.modified_minutes, 0);

        let config = Config::from_toml("[backup]\nmax_concurrency = -2\n").unwrap();
        assert_eq!(config.max_concurrency(), 5);
    }

    #[test]
    fn test_static_run_from_file() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("backup.toml");
        std::fs::write(
            &path,
            r#"
            [paths]
            source_dir = "/data/src"
            backup_dir = "/data/dst"

            [backup]
            modified_minutes = 10
            max_concurrency = 2

            [log]
            level = "debug"
            "#,
        )
        .unwrap();

        let config = Config::from_file(&path).unwrap();
        let run = config.static_run().unwrap();
        assert_eq!(run.source_root, PathBuf::from("/data/src"));
        assert_eq!(run.dest_root, PathBuf::from("/data/dst"));
        assert_eq!(run.window_minutes(), 10);
        assert_eq!(run.max_concurrency, 2);
        assert_eq!(config.log.level, "debug");
    }

    #[test]
    fn test_static_run_needs_both_directories() {
        let mut config = Config::default();
        config.paths.source_dir = Some(PathBuf::from("/data/src"));
        assert!(config.static_run().is_none());

        config.paths.backup_dir = Some(PathBuf::from("/data/dst"));
        config.backup.max_concurrency = 0;
        config.backup.modified_minutes = 30;
        config.normalize();

        let run = config.static_run().unwrap();
        assert_eq!(run.max_concurrency, 5);
        assert_eq!(run.window_minutes(), 30);
    }

    #[test]
    fn test_missing_file_is_an_error() {
        let temp_dir = TempDir::new().unwrap();
        assert!(Config::from_file(&temp_dir.path().join("absent.toml")).is_err());
    }

    #[test]
    fn test_ensure_dirs_and_settings() {
        let temp_dir = TempDir::new().unwrap();
        let mut config = Config::default();
        config.paths.uploads_dir = temp_dir.path().join("up");
        config.paths.backups_dir = temp_dir.path().join("bk");

        config.ensure_dirs().unwrap();
        assert!(config.paths.uploads_dir.is_dir());
        assert!(config.paths.backups_dir.is_dir());

        let settings = config.engine_settings();
        assert_eq!(settings.uploads_root, config.paths.uploads_dir);
        assert_eq!(settings.max_concurrency, 5);
    }
}
