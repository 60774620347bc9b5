use std::fs::{self, File};
use std::io::{self, Read};
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tracing::debug;

use lineage_types::ContentHash;

/// Read buffer size used when streaming file contents.
const CHUNK_SIZE: usize = 64 * 1024;

/// Bounds applied to every streamed hash computation.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct HashLimits {
    /// Largest input hashed, in bytes (default: 1 GiB).
    pub max_bytes: u64,
    /// Wall-clock budget per input in milliseconds (default: 30 s).
    ///
    /// Checked between chunks, so a single blocked read is not interrupted.
    pub timeout_ms: u64,
}

impl HashLimits {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

impl Default for HashLimits {
    fn default() -> Self {
        Self {
            max_bytes: 1024 * 1024 * 1024,
            timeout_ms: 30_000,
        }
    }
}

/// Result of hashing a file or stream.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FileDigest {
    pub hash: ContentHash,
    pub size_bytes: u64,
}

/// Errors from bounded hashing.
#[derive(Debug, thiserror::Error)]
pub enum HashError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("input of {size} bytes exceeds the {limit}-byte hashing limit")]
    TooLarge { limit: u64, size: u64 },

    #[error("hashing exceeded {limit_ms} ms")]
    TimedOut { limit_ms: u64 },

    /// The path names a directory, FIFO, socket, or device.
    #[error("{} is not a regular file", path.display())]
    NotAFile { path: PathBuf },
}

pub type HashResult<T> = Result<T, HashError>;

/// SHA-256 content hasher producing [`ContentHash`] values.
///
/// Digests are plain SHA-256 over the raw content, without domain
/// separation, so they match `sha256sum` and any external tool.
#[derive(Clone, Debug, Default)]
pub struct ContentHasher {
    limits: HashLimits,
}

impl ContentHasher {
    pub fn new(limits: HashLimits) -> Self {
        Self { limits }
    }

    pub fn limits(&self) -> &HashLimits {
        &self.limits
    }

    /// Hash an in-memory buffer. Not subject to limits.
    pub fn hash_bytes(data: &[u8]) -> ContentHash {
        ContentHash::from_digest(Sha256::digest(data).into())
    }

    /// Verify that data produces the expected hash.
    pub fn verify_bytes(data: &[u8], expected: &ContentHash) -> bool {
        Self::hash_bytes(data) == *expected
    }

    /// Stream a reader through SHA-256, enforcing size and time limits.
    pub fn hash_reader<R: Read>(&self, mut reader: R) -> HashResult<FileDigest> {
        let started = Instant::now();
        let timeout = self.limits.timeout();
        let mut hasher = Sha256::new();
        let mut buf = vec![0u8; CHUNK_SIZE];
        let mut total: u64 = 0;

        loop {
            let n = match reader.read(&mut buf) {
                Ok(0) => break,
                Ok(n) => n,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(e.into()),
            };

            total += n as u64;
            if total > self.limits.max_bytes {
                return Err(HashError::TooLarge {
                    limit: self.limits.max_bytes,
                    size: total,
                });
            }
            hasher.update(&buf[..n]);

            if started.elapsed() > timeout {
                return Err(HashError::TimedOut {
                    limit_ms: self.limits.timeout_ms,
                });
            }
        }

        Ok(FileDigest {
            hash: ContentHash::from_digest(hasher.finalize().into()),
            size_bytes: total,
        })
    }

    /// Hash a regular file on disk.
    ///
    /// Anything else is refused before it is opened, since opening a FIFO
    /// or device can block indefinitely. Files whose metadata already
    /// reports a size above the limit are rejected without being read.
    pub fn hash_file(&self, path: &Path) -> HashResult<FileDigest> {
        let meta = fs::metadata(path)?;
        if !meta.is_file() {
            return Err(HashError::NotAFile {
                path: path.to_path_buf(),
            });
        }
        let size = meta.len();
        if size > self.limits.max_bytes {
            return Err(HashError::TooLarge {
                limit: self.limits.max_bytes,
                size,
            });
        }

        let digest = self.hash_reader(File::open(path)?)?;
        debug!(path = %path.display(), size = digest.size_bytes, hash = digest.hash.short_hex(), "hashed file");
        Ok(digest)
    }
}
