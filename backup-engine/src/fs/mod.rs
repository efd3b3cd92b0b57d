//! File system access: tree walking and metadata preservation.

pub mod metadata;
pub mod walker;

pub use walker::{scan_modified_files, FileRecord};
