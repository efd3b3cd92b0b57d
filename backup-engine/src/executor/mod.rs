//! Backup engine - orchestrates a run from scan to archive.
//!
//! This module ties together:
//! - File system scanner
//! - Concurrent copy-and-verify pipeline
//! - ZIP archival and run history (session mode)
//! - Status tracking for observers
//!
//! A run moves through `Scanning → Copying → (Archiving) → Done | Failed`.
//! Runs on the same engine are serialized.

pub mod archive;
pub mod history;

use crate::fs::walker::{scan_modified_files, FileRecord};
use crate::session::{SessionStore, StorageStats};
use crate::status::{RunPhase, Status, StatusTracker};
use crate::transfer::copier::{copy_all, CopyReport};
use crate::transfer::progress::{format_bytes, format_duration};
use crate::utils::{BackupError, Result};
use archive::archive_directory;
use chrono::Utc;
use history::{BackupHistory, BackupStats, FileHistoryEntry, RunOutcome};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

/// Parameters of one static-directory run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackupRun {
    pub source_root: PathBuf,
    pub dest_root: PathBuf,
    pub max_concurrency: usize,
    pub modified_window: Duration,
}

impl BackupRun {
    pub fn new(
        source_root: impl Into<PathBuf>,
        dest_root: impl Into<PathBuf>,
        window_minutes: u64,
        max_concurrency: usize,
    ) -> Self {
        Self {
            source_root: source_root.into(),
            dest_root: dest_root.into(),
            max_concurrency: max_concurrency.max(1),
            modified_window: Duration::from_secs(window_minutes.saturating_mul(60)),
        }
    }

    pub fn window_minutes(&self) -> u64 {
        self.modified_window.as_secs() / 60
    }
}

/// Engine-wide settings used for session runs
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineSettings {
    pub uploads_root: PathBuf,
    pub backups_root: PathBuf,
    pub window_minutes: u64,
    pub max_concurrency: usize,
}

/// Result of a successful run
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunSummary {
    pub files_selected: usize,
    pub files_copied: usize,
    pub bytes_copied: u64,
    pub archive: Option<PathBuf>,
    pub duration: Duration,
}

pub struct BackupEngine {
    settings: EngineSettings,
    sessions: SessionStore,
    status: Arc<StatusTracker>,
    run_lock: Mutex<()>,
}

impl BackupEngine {
    pub fn new(settings: EngineSettings) -> Self {
        let sessions = SessionStore::new(&settings.uploads_root, &settings.backups_root);
        Self {
            settings,
            sessions,
            status: Arc::new(StatusTracker::new()),
            run_lock: Mutex::new(()),
        }
    }

    pub fn settings(&self) -> &EngineSettings {
        &self.settings
    }

    pub fn sessions(&self) -> &SessionStore {
        &self.sessions
    }

    /// Shared handle for observers polling or subscribing to progress
    pub fn status_tracker(&self) -> Arc<StatusTracker> {
        Arc::clone(&self.status)
    }

    pub fn status(&self) -> Status {
        self.status.get()
    }

    pub fn storage_stats(&self) -> Result<StorageStats> {
        self.sessions.stats()
    }

    /// Back up the files changed within the run's window from `source_root`
    /// into `dest_root`. Both directories must already exist.
    pub async fn scan_and_copy(&self, run: BackupRun) -> Result<RunSummary> {
        let _guard = self.run_lock.lock().await;
        let started = Instant::now();
        self.status.begin();

        info!(
            "Starting backup from {} to {}",
            run.source_root.display(),
            run.dest_root.display()
        );

        match self.static_pipeline(&run, started).await {
            Ok(summary) => {
                self.finish(&summary);
                Ok(summary)
            }
            Err(e) => Err(self.fail(e)),
        }
    }

    /// Back up an uploaded session into `backups_root/<id>.zip`.
    ///
    /// The staging copy under `backups_root/<id>/` is removed once the
    /// archive is complete. Every run that selected at least one file is
    /// appended to the history, successful or not.
    pub async fn run_session(&self, session_id: &str) -> Result<RunSummary> {
        let _guard = self.run_lock.lock().await;
        let started = Instant::now();
        self.status.begin();

        match self.session_pipeline(session_id, started).await {
            Ok(summary) => {
                self.finish(&summary);
                Ok(summary)
            }
            Err(e) => Err(self.fail(e)),
        }
    }

    async fn static_pipeline(&self, run: &BackupRun, started: Instant) -> Result<RunSummary> {
        require_dir(&run.source_root, "source")?;
        require_dir(&run.dest_root, "destination")?;

        let files = self.scan(run).await?;
        if files.is_empty() {
            return Ok(RunSummary {
                duration: started.elapsed(),
                ..RunSummary::default()
            });
        }

        let files_selected = files.len();
        let report = self.copy(run, files).await?;

        Ok(RunSummary {
            files_selected,
            files_copied: report.files_copied,
            bytes_copied: report.bytes_copied,
            archive: None,
            duration: started.elapsed(),
        })
    }

    async fn session_pipeline(&self, session_id: &str, started: Instant) -> Result<RunSummary> {
        let source = self.sessions.upload_dir(session_id)?;
        let staging = self.sessions.staging_dir(session_id)?;
        let archive_path = self.sessions.locate(session_id)?;

        if !source.is_dir() {
            return Err(BackupError::NotFound(source));
        }
        require_dir(&self.settings.backups_root, "backups")?;

        let run = BackupRun::new(
            &source,
            &staging,
            self.settings.window_minutes,
            self.settings.max_concurrency,
        );

        info!(
            "Starting session backup {} from {} to {}",
            session_id,
            source.display(),
            staging.display()
        );

        let files = self.scan(&run).await?;
        if files.is_empty() {
            return Ok(RunSummary {
                duration: started.elapsed(),
                ..RunSummary::default()
            });
        }

        let files_selected = files.len();
        let total_size: u64 = files.iter().map(|f| f.size).sum();
        let entries: Vec<FileHistoryEntry> = files
            .iter()
            .map(|f| FileHistoryEntry::from_record(f, session_id))
            .collect();

        let outcome = self.copy_and_archive(&run, files, &archive_path).await;

        let stats = BackupStats {
            run_id: Uuid::new_v4().simple().to_string(),
            timestamp: Utc::now(),
            session_id: session_id.to_string(),
            total_size_bytes: total_size,
            files_count: files_selected,
            backup_type: "session".to_string(),
            duration_seconds: started.elapsed().as_secs_f64(),
            status: if outcome.is_ok() {
                RunOutcome::Success
            } else {
                RunOutcome::Failed
            },
        };
        if let Err(e) = BackupHistory::append(&self.settings.backups_root, stats, entries) {
            warn!("Failed to update backup history: {}", e);
        }

        let report = outcome?;
        Ok(RunSummary {
            files_selected,
            files_copied: report.files_copied,
            bytes_copied: report.bytes_copied,
            archive: Some(archive_path),
            duration: started.elapsed(),
        })
    }

    async fn scan(&self, run: &BackupRun) -> Result<Vec<FileRecord>> {
        let root = run.source_root.clone();
        let window = run.window_minutes();
        let files = tokio::task::spawn_blocking(move || scan_modified_files(&root, window))
            .await
            .map_err(|e| BackupError::Task(format!("scan task failed: {}", e)))??;

        self.status.reset(files.len());
        info!("Files selected for backup: {}", files.len());
        Ok(files)
    }

    async fn copy(&self, run: &BackupRun, files: Vec<FileRecord>) -> Result<CopyReport> {
        self.status.set_phase(RunPhase::Copying);
        copy_all(
            files,
            &run.source_root,
            &run.dest_root,
            run.max_concurrency,
            Arc::clone(&self.status),
        )
        .await
    }

    async fn copy_and_archive(
        &self,
        run: &BackupRun,
        files: Vec<FileRecord>,
        archive_path: &Path,
    ) -> Result<CopyReport> {
        reset_staging(&run.dest_root).await?;

        let report = self.copy(run, files).await?;

        self.status.set_phase(RunPhase::Archiving);
        let staging = run.dest_root.clone();
        let target = archive_path.to_path_buf();
        let archived = tokio::task::spawn_blocking(move || archive_directory(&staging, &target))
            .await
            .map_err(|e| BackupError::Task(format!("archive task failed: {}", e)))??;

        info!(
            "Backup archive ready: {} ({})",
            archive_path.display(),
            format_bytes(archived.archive_size)
        );

        if let Err(e) = tokio::fs::remove_dir_all(&run.dest_root).await {
            warn!(
                "Failed to remove staging directory {}: {}",
                run.dest_root.display(),
                e
            );
        }

        Ok(report)
    }

    fn finish(&self, summary: &RunSummary) {
        self.status.set_done();
        info!(
            "Backup finished: {} of {} files copied ({}) in {}",
            summary.files_copied,
            summary.files_selected,
            format_bytes(summary.bytes_copied),
            format_duration(summary.duration)
        );
    }

    fn fail(&self, err: BackupError) -> BackupError {
        let phase = self.status.get().phase;
        let message = format!("Error during {}: {}", phase, err);
        error!("{}", message);
        self.status.set_error(message);
        err
    }
}

/// Leave `staging` as an empty directory, discarding anything a previous
/// failed run copied into it.
async fn reset_staging(staging: &Path) -> Result<()> {
    match tokio::fs::remove_dir_all(staging).await {
        Ok(()) => debug!("Removed stale staging directory {}", staging.display()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => return Err(BackupError::io(staging, e)),
    }
    tokio::fs::create_dir_all(staging)
        .await
        .map_err(|e| BackupError::io(staging, e))
}

/// Fail with a configuration error unless `path` is an existing directory.
fn require_dir(path: &Path, role: &str) -> Result<()> {
    match std::fs::metadata(path) {
        Ok(metadata) if metadata.is_dir() => Ok(()),
        Ok(_) => Err(BackupError::Config(format!(
            "{} path is not a directory: {}",
            role,
            path.display()
        ))),
        Err(_) => Err(BackupError::Config(format!(
            "{} directory does not exist: {}",
            role,
            path.display()
        ))),
    }
}
