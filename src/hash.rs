//! Content fingerprinting for change detection.
//!
//! Hashes are used only to decide whether a file changed between rebuild
//! cycles; they are not a security boundary. Read failures are expected
//! (a file can vanish between discovery and read) and map to `None`,
//! which callers treat as "skip this file this cycle".

use sha2::{Digest, Sha256};
use std::path::Path;

/// Fingerprint of one file's content at a point in time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileDigest {
    /// SHA-256 of the byte content, hex-encoded.
    pub hash: String,
    /// Size in bytes.
    pub size: u64,
}

impl FileDigest {
    /// Compute the fingerprint of a byte buffer. Pure.
    pub fn of_bytes(bytes: &[u8]) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(bytes);
        Self {
            hash: hex::encode(hasher.finalize()),
            size: bytes.len() as u64,
        }
    }
}

/// Read a file and fingerprint it. `None` on any read failure.
pub async fn read_digest(path: &Path) -> Option<FileDigest> {
    match tokio::fs::read(path).await {
        Ok(bytes) => Some(FileDigest::of_bytes(&bytes)),
        Err(e) => {
            tracing::debug!("failed to read {} for hashing: {}", path.display(), e);
            None
        }
    }
}

/// Read a file once, returning both its fingerprint and its
/// base64-encoded content. `None` on any read failure. Using a single
/// read keeps the recorded hash consistent with the bytes actually sent.
pub async fn read_for_transmission(path: &Path) -> Option<(FileDigest, String)> {
    match tokio::fs::read(path).await {
        Ok(bytes) => Some((FileDigest::of_bytes(&bytes), crate::b64::encode(&bytes))),
        Err(e) => {
            tracing::debug!("failed to read {} for transmission: {}", path.display(), e);
            None
        }
    }
}

/// Read a file and base64-encode its content. `None` on any read failure.
pub async fn read_encoded(path: &Path) -> Option<String> {
    match tokio::fs::read(path).await {
        Ok(bytes) => Some(crate::b64::encode(&bytes)),
        Err(e) => {
            tracing::debug!("failed to read {} for transmission: {}", path.display(), e);
            None
        }
    }
}
