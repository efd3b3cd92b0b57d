//! Copy pipeline: admission control, integrity checks and the copier itself.

pub mod checksum;
pub mod copier;
pub mod limiter;
pub mod progress;

pub use checksum::ChecksumVerifier;
pub use copier::{copy_all, CopyReport};
pub use limiter::Limiter;
