//! Custom error types for the backup engine.

use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum BackupError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Not found: {}", .0.display())]
    NotFound(PathBuf),

    #[error("Permission denied: {}", .0.display())]
    PermissionDenied(PathBuf),

    #[error("I/O error on {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Checksum mismatch for {}", path.display())]
    Integrity { path: PathBuf },

    #[error("Archive error: {0}")]
    Archive(#[from] zip::result::ZipError),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Invalid session ID: {0:?}")]
    InvalidSessionId(String),

    #[error("Task failed: {0}")]
    Task(String),
}

impl BackupError {
    /// Wrap an I/O error with the path it happened on, keeping the
    /// not-found and permission cases distinguishable for callers.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        let path = path.into();
        match source.kind() {
            std::io::ErrorKind::NotFound => BackupError::NotFound(path),
            std::io::ErrorKind::PermissionDenied => BackupError::PermissionDenied(path),
            _ => BackupError::Io { path, source },
        }
    }
}

pub type Result<T> = std::result::Result<T, BackupError>;

#[cfg(test)]
mod tests {
    use super::*;
    use std::io;

    #[test]
    fn test_io_maps_error_kinds() {
        let err = BackupError::io("/missing", io::Error::from(io::ErrorKind::NotFound));
        assert!(matches!(err, BackupError::NotFound(_)));

        let err = BackupError::io("/locked", io::Error::from(io::ErrorKind::PermissionDenied));
        assert!(matches!(err, BackupError::PermissionDenied(_)));

        let err = BackupError::io("/disk", io::Error::new(io::ErrorKind::Other, "boom"));
        assert!(matches!(err, BackupError::Io { .. }));
        assert!(err.to_string().contains("boom"));
    }

    #[test]
    fn test_integrity_message_names_file() {
        let err = BackupError::Integrity { path: PathBuf::from("docs/a.txt") };
        assert_eq!(err.to_string(), "Checksum mismatch for docs/a.txt");
    }
}
