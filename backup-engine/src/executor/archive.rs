//! ZIP packaging of a finished destination tree.

use crate::utils::{BackupError, Result};
use std::fs::{self, File};
use std::io::{self, BufReader};
use std::path::{Component, Path, PathBuf};
use tracing::{debug, info, warn};
use walkdir::WalkDir;
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipWriter};

/// Entries at or above this size need ZIP64 headers
const ZIP64_THRESHOLD: u64 = 0xFFFF_FFFF;

/// What went into an archive
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ArchiveReport {
    pub entries: usize,
    pub bytes_in: u64,
    pub archive_size: u64,
}

/// Write every regular file under `source_dir` into a Deflate-compressed ZIP
/// at `archive_path`.
///
/// Entry names are relative to `source_dir` and use `/` separators; no
/// directory entries are written. The archive is assembled next to its
/// final location and renamed into place, so `archive_path` either holds a
/// complete archive or is left untouched.
pub fn archive_directory(source_dir: &Path, archive_path: &Path) -> Result<ArchiveReport> {
    let partial = partial_path(archive_path);

    match write_archive(source_dir, &partial) {
        Ok(mut report) => {
            fs::rename(&partial, archive_path).map_err(|e| BackupError::io(archive_path, e))?;
            report.archive_size = fs::metadata(archive_path)
                .map_err(|e| BackupError::io(archive_path, e))?
                .len();
            info!(
                "Archive created: {} ({} entries, {} bytes)",
                archive_path.display(),
                report.entries,
                report.archive_size
            );
            Ok(report)
        }
        Err(e) => {
            if let Err(cleanup) = fs::remove_file(&partial) {
                if cleanup.kind() != io::ErrorKind::NotFound {
                    warn!("Failed to remove partial archive {}: {}", partial.display(), cleanup);
                }
            }
            Err(e)
        }
    }
}

fn write_archive(source_dir: &Path, target: &Path) -> Result<ArchiveReport> {
    let metadata = fs::metadata(source_dir).map_err(|e| BackupError::io(source_dir, e))?;
    if !metadata.is_dir() {
        return Err(BackupError::Config(format!(
            "archive source is not a directory: {}",
            source_dir.display()
        )));
    }

    let file = File::create(target).map_err(|e| BackupError::io(target, e))?;
    let mut zip = ZipWriter::new(file);
    let mut report = ArchiveReport::default();

    for entry in WalkDir::new(source_dir).sort_by_file_name() {
        let entry = entry.map_err(|e| {
            let path = e.path().unwrap_or(source_dir).to_path_buf();
            BackupError::io(path, io::Error::from(e))
        })?;

        if !entry.file_type().is_file() {
            continue;
        }

        let path = entry.path();
        let relative = path.strip_prefix(source_dir).unwrap_or(path);
        let name = entry_name(relative);
        let size = entry.metadata().map_err(|e| BackupError::io(path, io::Error::from(e)))?.len();

        let mut options = SimpleFileOptions::default()
            .compression_method(CompressionMethod::Deflated)
            .large_file(size >= ZIP64_THRESHOLD);

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            if let Ok(meta) = entry.metadata() {
                options = options.unix_permissions(meta.permissions().mode());
            }
        }

        zip.start_file(name.as_str(), options)?;
        let input = File::open(path).map_err(|e| BackupError::io(path, e))?;
        let written =
            io::copy(&mut BufReader::new(input), &mut zip).map_err(|e| BackupError::io(path, e))?;

        debug!("Compressed: {} -> {}", path.display(), name);
        report.entries += 1;
        report.bytes_in += written;
    }

    let file = zip.finish()?;
    file.sync_all().map_err(|e| BackupError::io(target, e))?;

    Ok(report)
}

/// Forward-slash entry name for a relative path.
fn entry_name(relative: &Path) -> String {
    relative
        .components()
        .filter_map(|component| match component {
            Component::Normal(part) => Some(part.to_string_lossy().into_owned()),
            _ => None,
        })
        .collect::<Vec<_>>()
        .join("/")
}

fn partial_path(archive_path: &Path) -> PathBuf {
    let mut name = archive_path
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_default();
    name.push(".partial");
    archive_path.with_file_name(name)
}
