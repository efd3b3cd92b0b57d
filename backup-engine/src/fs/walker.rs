//! Directory traversal and recency-based file selection.
//!
//! The scanner walks a source tree once and returns every regular file whose
//! modification time falls inside the configured window.

use crate::utils::{BackupError, Result};
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};
use tracing::{debug, info, warn};
use walkdir::{DirEntry, WalkDir};

/// A file selected for backup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileRecord {
    /// Path relative to the scanned root
    pub relative_path: PathBuf,

    /// Full path to the file
    pub absolute_path: PathBuf,

    /// File size in bytes
    pub size: u64,

    /// Last modification time
    pub modified_at: SystemTime,
}

impl FileRecord {
    /// Build a record from a walk entry. Symlinks are resolved to their
    /// target; links to directories and dangling links yield `None`.
    fn from_entry(entry: &DirEntry, root: &Path) -> std::io::Result<Option<Self>> {
        let path = entry.path().to_path_buf();

        let metadata = if entry.path_is_symlink() {
            match std::fs::metadata(&path) {
                Ok(resolved) if resolved.is_dir() => return Ok(None),
                Ok(resolved) => resolved,
                Err(e) => {
                    warn!("Skipping broken symlink {}: {}", path.display(), e);
                    return Ok(None);
                }
            }
        } else {
            entry.metadata().map_err(std::io::Error::from)?
        };

        if !metadata.is_file() {
            return Ok(None);
        }

        let relative_path = path.strip_prefix(root).unwrap_or(&path).to_path_buf();

        Ok(Some(Self {
            relative_path,
            absolute_path: path,
            size: metadata.len(),
            modified_at: metadata.modified()?,
        }))
    }
}

/// Compute the selection cutoff for a window, or `None` for a full backup.
pub fn cutoff_for_window(now: SystemTime, window_minutes: u64) -> Option<SystemTime> {
    if window_minutes == 0 {
        return None;
    }
    let window = Duration::from_secs(window_minutes.saturating_mul(60));
    Some(now.checked_sub(window).unwrap_or(SystemTime::UNIX_EPOCH))
}

/// Scan `root` recursively and return the files modified within the last
/// `window_minutes` minutes. A window of zero selects every regular file.
///
/// # Example
/// ```no_run
/// use backup_engine::fs::walker::scan_modified_files;
/// use std::path::Path;
///
/// let files = scan_modified_files(Path::new("/data"), 10).unwrap();
/// println!("{} files changed in the last 10 minutes", files.len());
/// ```
pub fn scan_modified_files(root: &Path, window_minutes: u64) -> Result<Vec<FileRecord>> {
    info!("Scanning directory: {} (last {} minutes)", root.display(), window_minutes);

    // The cutoff is fixed for the whole walk
    let cutoff = cutoff_for_window(SystemTime::now(), window_minutes);
    let files = scan_with_cutoff(root, cutoff)?;

    info!("Scan complete: {} files selected", files.len());
    Ok(files)
}

/// Scan `root` selecting files with `modified_at > cutoff` (all files when
/// `cutoff` is `None`).
pub fn scan_with_cutoff(root: &Path, cutoff: Option<SystemTime>) -> Result<Vec<FileRecord>> {
    let mut files = Vec::new();

    walk_files(root, |record| {
        let selected = match cutoff {
            None => true,
            Some(cutoff) => record.modified_at > cutoff,
        };
        if selected {
            debug!("Selected: {}", record.relative_path.display());
            files.push(record);
        }
    })?;

    Ok(files)
}

/// Walk every regular file under `root`, handing each to `callback`.
///
/// Fails only when the root itself is missing or unreadable; errors on
/// individual entries are logged and skipped.
pub fn walk_files<F>(root: &Path, mut callback: F) -> Result<()>
where
    F: FnMut(FileRecord),
{
    std::fs::metadata(root).map_err(|e| BackupError::io(root, e))?;

    for entry in WalkDir::new(root).follow_links(false) {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) if e.depth() == 0 => {
                let source = e
                    .into_io_error()
                    .unwrap_or_else(|| std::io::Error::other("walk failed at root"));
                return Err(BackupError::io(root, source));
            }
            Err(e) => {
                let path = e.path().map(|p| p.display().to_string()).unwrap_or_default();
                warn!("Cannot access {}: {}", path, e);
                continue;
            }
        };

        if entry.file_type().is_dir() {
            continue;
        }

        match FileRecord::from_entry(&entry, root) {
            Ok(Some(record)) => callback(record),
            Ok(None) => {}
            Err(e) => warn!("Cannot read metadata for {}: {}", entry.path().display(), e),
        }
    }

    Ok(())
}

/// Count regular files and their total size under `root`.
pub fn count_files_and_size(root: &Path) -> Result<(usize, u64)> {
    let mut count = 0usize;
    let mut total = 0u64;

    walk_files(root, |record| {
        count += 1;
        total += record.size;
    })?;

    Ok((count, total))
}

#[cfg(test)]
mod tests {
    use super::*;
    use filetime::FileTime;
    use std::fs;
    use tempfile::TempDir;

    fn backdate(path: &Path, age: Duration) {
        let mtime = FileTime::from_system_time(SystemTime::now() - age);
        filetime::set_file_mtime(path, mtime).unwrap();
    }

    #[test]
    fn test_scan_empty_directory() -> Result<()> {
        let temp_dir = TempDir::new().unwrap();
        let files = scan_modified_files(temp_dir.path(), 0)?;
        assert!(files.is_empty());
        Ok(())
    }

    #[test]
    fn test_scan_missing_root() {
        let temp_dir = TempDir::new().unwrap();
        let result = scan_modified_files(&temp_dir.path().join("nope"), 0);
        assert!(matches!(result, Err(BackupError::NotFound(_))));
    }

    #[test]
    fn test_zero_window_selects_everything() -> Result<()> {
        let temp_dir = TempDir::new().unwrap();
        fs::create_dir(temp_dir.path().join("subdir")).unwrap();
        fs::write(temp_dir.path().join("new.txt"), b"new").unwrap();
        fs::write(temp_dir.path().join("subdir/old.txt"), b"old").unwrap();
        backdate(&temp_dir.path().join("subdir/old.txt"), Duration::from_secs(86_400 * 30));

        let mut files = scan_modified_files(temp_dir.path(), 0)?;
        files.sort_by(|a, b| a.relative_path.cmp(&b.relative_path));

        assert_eq!(files.len(), 2);
        assert_eq!(files[0].relative_path, PathBuf::from("new.txt"));
        assert_eq!(files[1].relative_path, PathBuf::from("subdir/old.txt"));
        assert_eq!(files[1].size, 3);
        Ok(())
    }

    #[test]
    fn test_window_excludes_old_files() -> Result<()> {
        let temp_dir = TempDir::new().unwrap();
        fs::write(temp_dir.path().join("a.txt"), b"recent").unwrap();
        fs::write(temp_dir.path().join("b.txt"), b"stale").unwrap();
        backdate(&temp_dir.path().join("a.txt"), Duration::from_secs(60));
        backdate(&temp_dir.path().join("b.txt"), Duration::from_secs(2 * 3600));

        let files = scan_modified_files(temp_dir.path(), 10)?;
        assert_eq!(files.len(), 1);
        assert_eq!(files[0].relative_path, PathBuf::from("a.txt"));
        Ok(())
    }

    #[test]
    fn test_cutoff_is_exclusive() -> Result<()> {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("edge.txt");
        fs::write(&path, b"edge").unwrap();

        let mtime = fs::metadata(&path).unwrap().modified().unwrap();
        assert!(scan_with_cutoff(temp_dir.path(), Some(mtime))?.is_empty());

        let earlier = mtime - Duration::from_secs(1);
        assert_eq!(scan_with_cutoff(temp_dir.path(), Some(earlier))?.len(), 1);
        Ok(())
    }

    #[test]
    fn test_cutoff_for_window() {
        let now = SystemTime::UNIX_EPOCH + Duration::from_secs(10_000);
        assert_eq!(cutoff_for_window(now, 0), None);
        assert_eq!(
            cutoff_for_window(now, 10),
            Some(SystemTime::UNIX_EPOCH + Duration::from_secs(9_400))
        );
        assert_eq!(cutoff_for_window(now, 1_000), Some(SystemTime::UNIX_EPOCH));
    }

    #[test]
    #[cfg(unix)]
    fn test_broken_symlink_is_skipped() -> Result<()> {
        let temp_dir = TempDir::new().unwrap();
        fs::write(temp_dir.path().join("real.txt"), b"data").unwrap();
        std::os::unix::fs::symlink(
            temp_dir.path().join("gone.txt"),
            temp_dir.path().join("dangling.txt"),
        )
        .unwrap();

        let files = scan_modified_files(temp_dir.path(), 0)?;
        assert_eq!(files.len(), 1);
        assert_eq!(files[0].relative_path, PathBuf::from("real.txt"));
        Ok(())
    }

    #[test]
    fn test_count_files_and_size() -> Result<()> {
        let temp_dir = TempDir::new().unwrap();
        fs::write(temp_dir.path().join("file1.txt"), b"12345").unwrap();
        fs::write(temp_dir.path().join("file2.txt"), b"1234567").unwrap();

        let (count, total) = count_files_and_size(temp_dir.path())?;
        assert_eq!(count, 2);
        assert_eq!(total, 12);
        Ok(())
    }
}
