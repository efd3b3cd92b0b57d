//! Source metadata carried over to copied files.
//!
//! Only the permission bits are re-applied; timestamps on the copy reflect
//! the time of the backup.

use std::fs;
use std::path::Path;
use std::time::SystemTime;

/// Metadata captured from a source file before it is copied
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FileMetadata {
    /// File size in bytes
    pub size: u64,

    /// Last modified time (seconds since Unix epoch)
    pub modified: u64,

    /// File permissions (Unix mode bits)
    pub permissions: Option<u32>,
}

impl FileMetadata {
    /// Extract metadata from an already-fetched `fs::Metadata`
    pub fn from_metadata(metadata: &fs::Metadata) -> Self {
        let modified = metadata
            .modified()
            .ok()
            .and_then(|t| t.duration_since(SystemTime::UNIX_EPOCH).ok())
            .map(|d| d.as_secs())
            .unwrap_or_default();

        #[cfg(unix)]
        let permissions = {
            use std::os::unix::fs::PermissionsExt;
            Some(metadata.permissions().mode())
        };

        #[cfg(not(unix))]
        let permissions = None;

        Self {
            size: metadata.len(),
            modified,
            permissions,
        }
    }

    /// Apply the captured permission bits to `path`
    #[cfg(unix)]
    pub fn apply_to_path(&self, path: &Path) -> std::io::Result<()> {
        use std::os::unix::fs::PermissionsExt;

        if let Some(mode) = self.permissions {
            fs::set_permissions(path, fs::Permissions::from_mode(mode & 0o7777))?;
        }
        Ok(())
    }

    #[cfg(not(unix))]
    pub fn apply_to_path(&self, _path: &Path) -> std::io::Result<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_extract_metadata() -> std::io::Result<()> {
        let mut temp_file = NamedTempFile::new()?;
        temp_file.write_all(b"test content")?;
        temp_file.flush()?;

        let metadata = FileMetadata::from_metadata(&fs::metadata(temp_file.path())?);

        assert_eq!(metadata.size, 12);
        assert!(metadata.modified > 0);

        Ok(())
    }

    #[test]
    #[cfg(unix)]
    fn test_permissions_applied_to_other_file() -> std::io::Result<()> {
        use std::os::unix::fs::PermissionsExt;

        let source = NamedTempFile::new()?;
        let target = NamedTempFile::new()?;
        fs::set_permissions(source.path(), fs::Permissions::from_mode(0o640))?;

        FileMetadata::from_metadata(&fs::metadata(source.path())?).apply_to_path(target.path())?;

        let mode = fs::metadata(target.path())?.permissions().mode() & 0o777;
        assert_eq!(mode, 0o640);

        Ok(())
    }
}
