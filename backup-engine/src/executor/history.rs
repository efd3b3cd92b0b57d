//! Run history persisted as `backup_history.json` in the backups root.
//!
//! Only the most recent [`MAX_HISTORY_ENTRIES`] runs are kept. Every per-file
//! record carries the id of the run that produced it and is dropped together
//! with that run, so re-running a session does not grow the file.

use crate::fs::walker::FileRecord;
use crate::utils::{BackupError, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::warn;

pub const HISTORY_FILE: &str = "backup_history.json";
pub const MAX_HISTORY_ENTRIES: usize = 50;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunOutcome {
    Success,
    Failed,
}

/// Summary of one session-mode run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BackupStats {
    /// Unique per run; links the run to its file records
    #[serde(default)]
    pub run_id: String,
    pub timestamp: DateTime<Utc>,
    pub session_id: String,
    #[serde(rename = "total_size")]
    pub total_size_bytes: u64,
    pub files_count: usize,
    #[serde(default = "default_backup_type")]
    pub backup_type: String,
    pub duration_seconds: f64,
    pub status: RunOutcome,
}

fn default_backup_type() -> String {
    "session".to_string()
}

/// One file that took part in a recorded run
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileHistoryEntry {
    pub path: String,
    pub size: u64,
    pub modified: DateTime<Utc>,
    #[serde(default)]
    pub session_id: String,
    #[serde(default)]
    pub run_id: String,
}

impl FileHistoryEntry {
    pub fn from_record(record: &FileRecord, session_id: &str) -> Self {
        Self {
            path: record.relative_path.to_string_lossy().replace('\\', "/"),
            size: record.size,
            modified: DateTime::<Utc>::from(record.modified_at),
            session_id: session_id.to_string(),
            run_id: String::new(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BackupHistory {
    #[serde(default)]
    pub backups: Vec<BackupStats>,
    #[serde(default)]
    pub files: Vec<FileHistoryEntry>,
}

impl BackupHistory {
    pub fn path_in(backups_root: &Path) -> PathBuf {
        backups_root.join(HISTORY_FILE)
    }

    /// Load the history; a missing or unreadable file yields an empty one.
    pub fn load(path: &Path) -> Self {
        let data = match fs::read_to_string(path) {
            Ok(data) => data,
            Err(_) => return Self::default(),
        };

        serde_json::from_str(&data).unwrap_or_else(|e| {
            warn!("Ignoring unreadable history file {}: {}", path.display(), e);
            Self::default()
        })
    }

    /// Append a run and its files, then trim to the retention window.
    ///
    /// The files are stamped with the run's id; records from runs that fall
    /// out of the window are removed.
    pub fn record(&mut self, stats: BackupStats, files: Vec<FileHistoryEntry>) {
        let run_id = stats.run_id.clone();
        self.backups.push(stats);
        self.files.extend(files.into_iter().map(|mut file| {
            file.run_id = run_id.clone();
            file
        }));

        if self.backups.len() > MAX_HISTORY_ENTRIES {
            let excess = self.backups.len() - MAX_HISTORY_ENTRIES;
            self.backups.drain(..excess);
        }

        let retained: HashSet<&str> = self.backups.iter().map(|b| b.run_id.as_str()).collect();
        self.files.retain(|f| retained.contains(f.run_id.as_str()));
    }

    /// Write pretty JSON through a temporary sibling file.
    pub fn save(&self, path: &Path) -> Result<()> {
        let data = serde_json::to_string_pretty(self)?;
        let tmp = path.with_extension("json.tmp");
        fs::write(&tmp, data).map_err(|e| BackupError::io(&tmp, e))?;
        fs::rename(&tmp, path).map_err(|e| BackupError::io(path, e))?;
        Ok(())
    }

    /// Load, record and save in one step.
    pub fn append(backups_root: &Path, stats: BackupStats, files: Vec<FileHistoryEntry>) -> Result<()> {
        let path = Self::path_in(backups_root);
        let mut history = Self::load(&path);
        history.record(stats, files);
        history.save(&path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn stats(session_id: &str, status: RunOutcome) -> BackupStats {
        BackupStats {
            run_id: uuid::Uuid::new_v4().simple().to_string(),
            timestamp: Utc::now(),
            session_id: session_id.to_string(),
            total_size_bytes: 10,
            files_count: 1,
            backup_type: default_backup_type(),
            duration_seconds: 0.5,
            status,
        }
    }

    fn file(session_id: &str) -> FileHistoryEntry {
        FileHistoryEntry {
            path: "a.txt".to_string(),
            size: 10,
            modified: Utc::now(),
            session_id: session_id.to_string(),
            run_id: String::new(),
        }
    }

    #[test]
    fn test_backups_are_capped() {
        let mut history = BackupHistory::default();
        for i in 0..60 {
            let id = format!("s{}", i);
            history.record(stats(&id, RunOutcome::Success), vec![file(&id)]);
        }

        assert_eq!(history.backups.len(), MAX_HISTORY_ENTRIES);
        assert_eq!(history.backups[0].session_id, "s10");
        assert_eq!(history.backups[49].session_id, "s59");
        assert_eq!(history.files.len(), MAX_HISTORY_ENTRIES);
        assert!(history.files.iter().all(|f| f.session_id != "s0"));
    }

    #[test]
    fn test_rerun_session_keeps_files_bounded() {
        let mut history = BackupHistory::default();
        for _ in 0..200 {
            let files = (0..10).map(|_| file("same")).collect();
            history.record(stats("same", RunOutcome::Success), files);
        }

        assert_eq!(history.backups.len(), MAX_HISTORY_ENTRIES);
        assert_eq!(history.files.len(), MAX_HISTORY_ENTRIES * 10);

        let retained: HashSet<&str> = history.backups.iter().map(|b| b.run_id.as_str()).collect();
        assert!(history.files.iter().all(|f| retained.contains(f.run_id.as_str())));
    }

    #[test]
    fn test_save_and_load_keeps_field_names() -> Result<()> {
        let temp_dir = TempDir::new().unwrap();
        BackupHistory::append(temp_dir.path(), stats("abc", RunOutcome::Failed), vec![file("abc")])?;

        let path = BackupHistory::path_in(temp_dir.path());
        let raw: serde_json::Value = serde_json::from_str(&fs::read_to_string(&path).unwrap())?;
        assert_eq!(raw["backups"][0]["status"], "failed");
        assert_eq!(raw["backups"][0]["total_size"], 10);
        assert_eq!(raw["backups"][0]["backup_type"], "session");
        assert_eq!(raw["files"][0]["path"], "a.txt");
        assert_eq!(raw["files"][0]["run_id"], raw["backups"][0]["run_id"]);

        let loaded = BackupHistory::load(&path);
        assert_eq!(loaded.backups.len(), 1);
        assert_eq!(loaded.files.len(), 1);
        Ok(())
    }

    #[test]
    fn test_corrupt_file_starts_fresh() {
        let temp_dir = TempDir::new().unwrap();
        let path = BackupHistory::path_in(temp_dir.path());
        fs::write(&path, b"{ not json").unwrap();

        assert_eq!(BackupHistory::load(&path), BackupHistory::default());
    }
}
