//! Session storage layout.
//!
//! A session `id` owns three locations:
//!
//! | Path                      | Contents                              |
//! |---------------------------|---------------------------------------|
//! | `uploads_root/<id>/`      | files to back up                      |
//! | `backups_root/<id>/`      | verified copies, removed after zipping |
//! | `backups_root/<id>.zip`   | the final archive                     |

use crate::fs::walker::count_files_and_size;
use crate::transfer::progress::format_bytes;
use crate::utils::{BackupError, Result};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use tracing::{info, warn};
use uuid::Uuid;

const ARCHIVE_EXTENSION: &str = "zip";
const HEALTH_PROBE: &str = ".write_probe.tmp";

/// Details about a finished archive
#[derive(Debug, Clone, Serialize)]
pub struct ArchiveInfo {
    pub session_id: String,
    pub filename: String,
    pub size_bytes: u64,
    pub size_display: String,
    pub created_at: DateTime<Utc>,
}

/// File counts under the two roots
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct StorageStats {
    pub sessions: usize,
    pub upload_files: usize,
    pub upload_bytes: u64,
    pub backup_files: usize,
    pub backup_bytes: u64,
}

#[derive(Debug, Clone)]
pub struct SessionStore {
    uploads_root: PathBuf,
    backups_root: PathBuf,
}

impl SessionStore {
    pub fn new(uploads_root: impl Into<PathBuf>, backups_root: impl Into<PathBuf>) -> Self {
        Self {
            uploads_root: uploads_root.into(),
            backups_root: backups_root.into(),
        }
    }

    pub fn backups_root(&self) -> &Path {
        &self.backups_root
    }

    /// Reject ids that could escape the storage roots.
    pub fn validate_id(id: &str) -> Result<()> {
        let valid = !id.is_empty()
            && id.len() <= 128
            && id != "."
            && id != ".."
            && !id.contains(['/', '\\', '\0']);

        if valid {
            Ok(())
        } else {
            Err(BackupError::InvalidSessionId(id.to_string()))
        }
    }

    /// Create a fresh, empty upload directory and return its id.
    pub fn create(&self) -> Result<String> {
        let id = Uuid::new_v4().simple().to_string();
        let dir = self.upload_dir(&id)?;
        fs::create_dir_all(&dir).map_err(|e| BackupError::io(&dir, e))?;
        info!("Session created: {}", id);
        Ok(id)
    }

    pub fn upload_dir(&self, id: &str) -> Result<PathBuf> {
        Self::validate_id(id)?;
        Ok(self.uploads_root.join(id))
    }

    /// Intermediate destination for a session's verified copies.
    pub fn staging_dir(&self, id: &str) -> Result<PathBuf> {
        Self::validate_id(id)?;
        Ok(self.backups_root.join(id))
    }

    /// Path of the session's archive, whether or not it exists yet.
    pub fn locate(&self, id: &str) -> Result<PathBuf> {
        Self::validate_id(id)?;
        Ok(self
            .backups_root
            .join(format!("{}.{}", id, ARCHIVE_EXTENSION)))
    }

    /// True if the session has a finished archive.
    pub fn exists(&self, id: &str) -> bool {
        self.locate(id).map(|path| path.is_file()).unwrap_or(false)
    }

    pub fn info(&self, id: &str) -> Result<ArchiveInfo> {
        let path = self.locate(id)?;
        let metadata = fs::metadata(&path).map_err(|e| BackupError::io(&path, e))?;
        if !metadata.is_file() {
            return Err(BackupError::NotFound(path));
        }

        let created_at = metadata
            .modified()
            .map(DateTime::<Utc>::from)
            .unwrap_or_else(|_| Utc::now());

        Ok(ArchiveInfo {
            session_id: id.to_string(),
            filename: format!("{}.{}", id, ARCHIVE_EXTENSION),
            size_bytes: metadata.len(),
            size_display: format_bytes(metadata.len()),
            created_at,
        })
    }

    /// Ids of every session with an archive, sorted.
    pub fn list(&self) -> Result<Vec<String>> {
        let entries =
            fs::read_dir(&self.backups_root).map_err(|e| BackupError::io(&self.backups_root, e))?;

        let mut ids = Vec::new();
        for entry in entries {
            let entry = match entry {
                Ok(entry) => entry,
                Err(e) => {
                    warn!("Skipping unreadable entry in {}: {}", self.backups_root.display(), e);
                    continue;
                }
            };

            let path = entry.path();
            let is_archive = path.extension().is_some_and(|ext| ext == ARCHIVE_EXTENSION);
            if !is_archive || !entry.file_type().map(|t| t.is_file()).unwrap_or(false) {
                continue;
            }
            if let Some(stem) = path.file_stem().and_then(|s| s.to_str()) {
                ids.push(stem.to_string());
            }
        }

        ids.sort();
        Ok(ids)
    }

    /// Remove the upload dir, the staging dir and the archive. Missing paths
    /// are not errors, so repeated calls succeed.
    pub fn cleanup(&self, id: &str) -> Result<()> {
        remove_dir_if_present(&self.upload_dir(id)?)?;
        remove_dir_if_present(&self.staging_dir(id)?)?;

        let archive = self.locate(id)?;
        match fs::remove_file(&archive) {
            Ok(()) => {}
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => return Err(BackupError::io(&archive, e)),
        }

        info!("Session cleaned up: {}", id);
        Ok(())
    }

    /// Both roots exist, are directories and accept writes.
    pub fn health(&self) -> Result<()> {
        for root in [&self.uploads_root, &self.backups_root] {
            let metadata = fs::metadata(root)
                .map_err(|_| BackupError::Config(format!("directory {} does not exist", root.display())))?;
            if !metadata.is_dir() {
                return Err(BackupError::Config(format!(
                    "{} is not a directory",
                    root.display()
                )));
            }

            let probe = root.join(HEALTH_PROBE);
            fs::write(&probe, b"probe").map_err(|e| BackupError::io(root, e))?;
            fs::remove_file(&probe).map_err(|e| BackupError::io(&probe, e))?;
        }
        Ok(())
    }

    pub fn stats(&self) -> Result<StorageStats> {
        let (upload_files, upload_bytes) = count_files_and_size(&self.uploads_root)?;
        let (backup_files, backup_bytes) = count_files_and_size(&self.backups_root)?;

        let sessions = fs::read_dir(&self.uploads_root)
            .map_err(|e| BackupError::io(&self.uploads_root, e))?
            .filter_map(|entry| entry.ok())
            .filter(|entry| entry.file_type().map(|t| t.is_dir()).unwrap_or(false))
            .count();

        Ok(StorageStats {
            sessions,
            upload_files,
            upload_bytes,
            backup_files,
            backup_bytes,
        })
    }
}

fn remove_dir_if_present(path: &Path) -> Result<()> {
    match fs::remove_dir_all(path) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(BackupError::io(path, e)),
    }
}
