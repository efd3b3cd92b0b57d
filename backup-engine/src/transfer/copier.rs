//! Concurrent copy-and-verify pipeline.
//!
//! One task is spawned per file. Tasks wait on the shared [`Limiter`] before
//! touching the file system, so at most `concurrency` copies are active at
//! once. A failed task never cancels its siblings: the caller waits for the
//! whole set and receives the first error in completion order.

use crate::fs::metadata::FileMetadata;
use crate::fs::walker::FileRecord;
use crate::status::StatusTracker;
use crate::transfer::checksum::ChecksumVerifier;
use crate::transfer::limiter::Limiter;
use crate::utils::{BackupError, Result};
use std::fs::{self, File};
use std::io::{self, BufReader, BufWriter};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::task::JoinSet;
use tracing::{debug, info, warn};

/// Outcome counters for one `copy_all` call
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CopyReport {
    pub files_copied: usize,
    pub bytes_copied: u64,
    pub failures: usize,
}

/// Copy every file in `files` from under `source_root` to the same relative
/// location under `dest_root`, verifying each copy by digest.
///
/// Waits for every task before returning. Only the first failure (by
/// completion order) is returned; later ones are logged and appended to the
/// status error list.
pub async fn copy_all(
    files: Vec<FileRecord>,
    source_root: &Path,
    dest_root: &Path,
    concurrency: usize,
    status: Arc<StatusTracker>,
) -> Result<CopyReport> {
    let limiter = Limiter::new(concurrency);
    let verifier = ChecksumVerifier::new();
    let source_root: Arc<Path> = Arc::from(source_root);
    let dest_root: Arc<Path> = Arc::from(dest_root);

    info!(
        "Copying {} files with concurrency {}",
        files.len(),
        limiter.capacity()
    );

    let mut tasks = JoinSet::new();

    for file in files {
        let limiter = limiter.clone();
        let source_root = Arc::clone(&source_root);
        let dest_root = Arc::clone(&dest_root);
        let status = Arc::clone(&status);

        tasks.spawn(async move {
            let _permit = limiter.acquire().await?;

            let source = file.absolute_path.clone();
            let result = tokio::task::spawn_blocking(move || {
                copy_one(&source, &source_root, &dest_root, &verifier)
            })
            .await
            .map_err(|e| BackupError::Task(format!("copy task aborted: {}", e)))?;

            match result {
                Ok(bytes) => {
                    debug!("Copied and verified: {}", file.relative_path.display());
                    status.increment_files_copied();
                    Ok(bytes)
                }
                Err(e) => {
                    warn!("Failed to copy {}: {}", file.absolute_path.display(), e);
                    Err(e)
                }
            }
        });
    }

    let mut report = CopyReport::default();
    let mut first_error: Option<BackupError> = None;

    while let Some(joined) = tasks.join_next().await {
        let outcome = joined
            .unwrap_or_else(|e| Err(BackupError::Task(format!("copy task panicked: {}", e))));

        match outcome {
            Ok(bytes) => {
                report.files_copied += 1;
                report.bytes_copied += bytes;
            }
            Err(e) => {
                report.failures += 1;
                status.record_error(e.to_string());
                if first_error.is_none() {
                    first_error = Some(e);
                }
            }
        }
    }

    info!(
        "Copy finished: {} copied, {} failed, {} bytes",
        report.files_copied, report.failures, report.bytes_copied
    );

    match first_error {
        Some(e) => Err(e),
        None => Ok(report),
    }
}

/// Copy a single file into the mirrored location and verify it.
fn copy_one(
    source: &Path,
    source_root: &Path,
    dest_root: &Path,
    verifier: &ChecksumVerifier,
) -> Result<u64> {
    let relative = source.strip_prefix(source_root).map_err(|_| {
        BackupError::io(
            source,
            io::Error::new(io::ErrorKind::InvalidInput, "file is outside the source root"),
        )
    })?;

    let destination = dest_root.join(relative);
    if let Some(parent) = destination.parent() {
        fs::create_dir_all(parent).map_err(|e| BackupError::io(parent, e))?;
    }

    let bytes = copy_file(source, &destination)?;
    verify_copy(verifier, source, &destination)?;
    Ok(bytes)
}

/// Stream `source` into `destination`, carrying over the permission bits.
pub fn copy_file(source: &Path, destination: &Path) -> Result<u64> {
    let input = File::open(source).map_err(|e| BackupError::io(source, e))?;
    let metadata = input.metadata().map_err(|e| BackupError::io(source, e))?;

    // A read-only copy from an earlier run cannot be opened for writing
    match fs::remove_file(destination) {
        Ok(()) => {}
        Err(e) if e.kind() == io::ErrorKind::NotFound => {}
        Err(e) => return Err(BackupError::io(destination, e)),
    }

    let output = File::create(destination).map_err(|e| BackupError::io(destination, e))?;
    let mut writer = BufWriter::new(output);
    let bytes = io::copy(&mut BufReader::new(input), &mut writer)
        .map_err(|e| BackupError::io(source, e))?;

    let output = writer
        .into_inner()
        .map_err(|e| BackupError::io(destination, e.into_error()))?;
    output.sync_all().map_err(|e| BackupError::io(destination, e))?;
    drop(output);

    FileMetadata::from_metadata(&metadata)
        .apply_to_path(destination)
        .map_err(|e| BackupError::io(destination, e))?;

    Ok(bytes)
}

/// Accept the copy only if both digests match.
pub fn verify_copy(verifier: &ChecksumVerifier, source: &Path, destination: &Path) -> Result<()> {
    let source_digest = verifier
        .digest(source)
        .map_err(|e| BackupError::io(source, e))?;
    let destination_digest = verifier
        .digest(destination)
        .map_err(|e| BackupError::io(destination, e))?;

    if source_digest == destination_digest {
        Ok(())
    } else {
        Err(BackupError::Integrity {
            path: PathBuf::from(source),
        })
    }
}
