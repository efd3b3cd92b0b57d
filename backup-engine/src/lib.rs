//! Backup Engine Library
//!
//! Point-in-time backup of recently modified files: scan, bounded concurrent
//! copy with SHA-256 verification, and ZIP archival of upload sessions.

pub mod config;
pub mod executor;
pub mod fs;
pub mod session;
pub mod status;
pub mod transfer;
pub mod utils;

// Re-export commonly used types
pub use config::Config;
pub use executor::{BackupEngine, BackupRun, EngineSettings, RunSummary};
pub use session::SessionStore;
pub use status::{RunPhase, Status, StatusTracker};
pub use utils::errors::BackupError;
pub use utils::Result;
