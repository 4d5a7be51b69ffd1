//! Cryptographic hashing utilities for artifact integrity verification

use crate::error::{AppError, AppResult};
use std::fs::File;
use std::io::Read;
use std::path::Path;

const DIGEST_CHUNK_SIZE: usize = 64 * 1024;

/// Calculate SHA256 hash of data.
///
/// Returns the digest as a lowercase hexadecimal string.
///
/// # Examples
///
/// ```
/// # use artifact_server::hash_utils::sha256_hash;
/// let hash = sha256_hash(b"hello world");
/// assert_eq!(hash.len(), 64);
/// ```
pub fn sha256_hash(data: &[u8]) -> String {
    use sha2::{Digest, Sha256};
    let mut hasher = Sha256::new();
    hasher.update(data);
    format!("{:x}", hasher.finalize())
}

/// Calculate SHA1 hash of data.
///
/// Maven clients publish `.sha1` sidecars next to every artifact, so this is the
/// checksum most declared values use.
///
/// # Examples
///
/// ```
/// # use artifact_server::hash_utils::sha1_hash;
/// let hash = sha1_hash(b"hello world");
/// assert_eq!(hash.len(), 40);
/// ```
pub fn sha1_hash(data: &[u8]) -> String {
    use sha1::{Digest, Sha1};
    let mut hasher = Sha1::new();
    hasher.update(data);
    format!("{:x}", hasher.finalize())
}

/// Size and both digests of one file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileDigests {
    pub size: u64,
    pub sha1: String,
    pub sha256: String,
}

/// Hash a file without holding it in memory.
pub fn digest_file(path: &Path) -> std::io::Result<FileDigests> {
    use sha1::{Digest, Sha1};
    use sha2::Sha256;

    let mut file = File::open(path)?;
    let mut sha1 = Sha1::new();
    let mut sha256 = Sha256::new();
    let mut buffer = vec![0u8; DIGEST_CHUNK_SIZE];
    let mut size = 0u64;
    loop {
        let read = file.read(&mut buffer)?;
        if read == 0 {
            break;
        }
        sha1.update(&buffer[..read]);
        sha256.update(&buffer[..read]);
        size += read as u64;
    }

    Ok(FileDigests {
        size,
        sha1: format!("{:x}", sha1.finalize()),
        sha256: format!("{:x}", sha256.finalize()),
    })
}

/// Digest algorithms accepted for declared checksums.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChecksumAlgorithm {
    Sha1,
    Sha256,
}

impl ChecksumAlgorithm {
    /// Infers the algorithm from the length of a hex digest.
    pub fn from_hex_len(len: usize) -> Option<Self> {
        match len {
            40 => Some(ChecksumAlgorithm::Sha1),
            64 => Some(ChecksumAlgorithm::Sha256),
            _ => None,
        }
    }

    pub fn digest(&self, data: &[u8]) -> String {
        match self {
            ChecksumAlgorithm::Sha1 => sha1_hash(data),
            ChecksumAlgorithm::Sha256 => sha256_hash(data),
        }
    }
}

/// Verify a client-declared checksum against the received bytes.
///
/// Sidecar files sometimes carry the file name after the digest
/// (`<hex>  lib-1.0.jar`); only the first token is compared.
pub fn verify_declared_checksum(declared: &str, data: &[u8]) -> AppResult<ChecksumAlgorithm> {
    let declared = declared
        .split_whitespace()
        .next()
        .unwrap_or_default()
        .to_ascii_lowercase();

    if !declared.chars().all(|c| c.is_ascii_hexdigit()) {
        return Err(AppError::BadRequest(format!(
            "Declared checksum '{declared}' is not a hex digest"
        )));
    }

    let algorithm = ChecksumAlgorithm::from_hex_len(declared.len()).ok_or_else(|| {
        AppError::BadRequest(format!(
            "Unsupported checksum length {} (expected SHA-1 or SHA-256)",
            declared.len()
        ))
    })?;

    let computed = algorithm.digest(data);
    if computed != declared {
        return Err(AppError::ChecksumMismatch { declared, computed });
    }

    Ok(algorithm)
}

#[cfg(test)]
mod tests {
    use super::*;

    const HELLO_SHA256: &str = "b94d27b9934d3e08a52e52d7da7dabfac484efe37a5380ee9088f7ace2efcde9";
    const HELLO_SHA1: &str = "2aae6c35c94fcfb415dbe95f408b9ce91ee846ed";

    #[test]
    fn test_sha256_hash() {
        assert_eq!(sha256_hash(b"hello world"), HELLO_SHA256);
    }

    #[test]
    fn test_sha1_hash() {
        assert_eq!(sha1_hash(b"hello world"), HELLO_SHA1);
    }

    #[test]
    fn test_digest_file_matches_in_memory_hashes() {
        let temp_dir = tempfile::TempDir::new().unwrap();
        let path = temp_dir.path().join("large.bin");
        // Spans several read chunks.
        let content: Vec<u8> = (0..200_000u32).map(|i| (i % 251) as u8).collect();
        std::fs::write(&path, &content).unwrap();

        let digests = digest_file(&path).unwrap();
        assert_eq!(digests.size, content.len() as u64);
        assert_eq!(digests.sha1, sha1_hash(&content));
        assert_eq!(digests.sha256, sha256_hash(&content));
    }

    #[test]
    fn test_verify_declared_checksum() {
        assert_eq!(
            verify_declared_checksum(HELLO_SHA1, b"hello world").unwrap(),
            ChecksumAlgorithm::Sha1
        );
        assert_eq!(
            verify_declared_checksum(&HELLO_SHA256.to_uppercase(), b"hello world").unwrap(),
            ChecksumAlgorithm::Sha256
        );
        assert!(
            verify_declared_checksum(&format!("{HELLO_SHA1}  lib-1.0.jar"), b"hello world")
                .is_ok()
        );
    }

    #[test]
    fn test_mismatch_and_bad_input() {
        assert!(matches!(
            verify_declared_checksum(HELLO_SHA1, b"other bytes"),
            Err(AppError::ChecksumMismatch { .. })
        ));
        assert!(matches!(
            verify_declared_checksum("abc", b"x"),
            Err(AppError::BadRequest(_))
        ));
        assert!(matches!(
            verify_declared_checksum("not-hex", b"x"),
            Err(AppError::BadRequest(_))
        ));
    }
}
