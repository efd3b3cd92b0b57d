//! Content digests used to accept or reject a finished copy.

use sha2::{Digest, Sha256};
use std::fs::File;
use std::io::{self, Read};
use std::path::Path;

/// Read buffer for streaming digests
const DIGEST_BUFFER_SIZE: usize = 64 * 1024;

/// Streaming SHA-256 verifier.
#[derive(Debug, Clone, Copy)]
pub struct ChecksumVerifier {
    buffer_size: usize,
}

impl Default for ChecksumVerifier {
    fn default() -> Self {
        Self {
            buffer_size: DIGEST_BUFFER_SIZE,
        }
    }
}

impl ChecksumVerifier {
    pub fn new() -> Self {
        Self::default()
    }

    /// Lowercase hex SHA-256 of the file at `path`, read in fixed-size chunks.
    pub fn digest(&self, path: &Path) -> io::Result<String> {
        let mut file = File::open(path)?;
        let mut hasher = Sha256::new();
        let mut buffer = vec![0u8; self.buffer_size];

        loop {
            let read = file.read(&mut buffer)?;
            if read == 0 {
                break;
            }
            hasher.update(&buffer[..read]);
        }

        Ok(format!("{:x}", hasher.finalize()))
    }

    /// True iff both files have the same digest.
    pub fn verify(&self, source: &Path, destination: &Path) -> io::Result<bool> {
        let source_digest = self.digest(source)?;
        let destination_digest = self.digest(destination)?;
        Ok(source_digest == destination_digest)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_known_digest() -> io::Result<()> {
        let temp_dir = TempDir::new()?;
        let path = temp_dir.path().join("abc.txt");
        fs::write(&path, b"abc")?;

        assert_eq!(
            ChecksumVerifier::new().digest(&path)?,
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
        Ok(())
    }

    #[test]
    fn test_digest_spans_multiple_buffers() -> io::Result<()> {
        let temp_dir = TempDir::new()?;
        let path = temp_dir.path().join("big.bin");
        let data: Vec<u8> = (0..200_000u32).map(|i| (i % 251) as u8).collect();
        fs::write(&path, &data)?;

        let small = ChecksumVerifier { buffer_size: 7 };
        assert_eq!(small.digest(&path)?, ChecksumVerifier::new().digest(&path)?);
        Ok(())
    }

    #[test]
    fn test_verify_detects_same_length_change() -> io::Result<()> {
        let temp_dir = TempDir::new()?;
        let a = temp_dir.path().join("a");
        let b = temp_dir.path().join("b");
        fs::write(&a, b"hello world")?;
        fs::write(&b, b"hello world")?;

        let verifier = ChecksumVerifier::new();
        assert!(verifier.verify(&a, &b)?);

        fs::write(&b, b"hello World")?;
        assert!(!verifier.verify(&a, &b)?);
        Ok(())
    }

    #[test]
    fn test_missing_file_is_an_error() {
        let temp_dir = TempDir::new().unwrap();
        let result = ChecksumVerifier::new().digest(&temp_dir.path().join("missing"));
        assert_eq!(result.unwrap_err().kind(), io::ErrorKind::NotFound);
    }
}
