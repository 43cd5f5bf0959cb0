// Hash computation utilities for package integrity checks

use crate::error::DownloadError;
use sha2::{Digest, Sha256, Sha512};
use std::fmt;
use std::path::Path;
use tokio::io::AsyncReadExt;

/// Hash algorithm types
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HashAlgorithm {
    Md5,
    Sha256,
    Sha512,
}

impl HashAlgorithm {
    /// Get the algorithm prefix for formatted output
    pub fn prefix(&self) -> &'static str {
        match self {
            HashAlgorithm::Md5 => "md5",
            HashAlgorithm::Sha256 => "sha256",
            HashAlgorithm::Sha512 => "sha512",
        }
    }

    fn from_prefix(prefix: &str) -> Option<Self> {
        match prefix.to_lowercase().as_str() {
            "md5" => Some(HashAlgorithm::Md5),
            "sha256" => Some(HashAlgorithm::Sha256),
            "sha512" => Some(HashAlgorithm::Sha512),
            _ => None,
        }
    }

    /// Guess the algorithm of a bare hex digest from its length
    fn from_hex_length(length: usize) -> Option<Self> {
        match length {
            32 => Some(HashAlgorithm::Md5),
            64 => Some(HashAlgorithm::Sha256),
            128 => Some(HashAlgorithm::Sha512),
            _ => None,
        }
    }
}

/// Expected digest of a download, parsed from `algorithm:hex` or bare hex
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IntegrityHash {
    pub algorithm: HashAlgorithm,
    pub hex: String,
}

impl IntegrityHash {
    pub fn parse(value: &str) -> Result<Self, DownloadError> {
        let value = value.trim();
        let unsupported = || DownloadError::UnsupportedHash(value.to_string());

        let (algorithm, hex) = match value.split_once(':') {
            Some((prefix, hex)) => (HashAlgorithm::from_prefix(prefix).ok_or_else(unsupported)?, hex),
            None => (HashAlgorithm::from_hex_length(value.len()).ok_or_else(unsupported)?, value),
        };

        if hex.is_empty() || !hex.chars().all(|c| c.is_ascii_hexdigit()) {
            return Err(unsupported());
        }

        Ok(Self {
            algorithm,
            hex: hex.to_lowercase(),
        })
    }

    pub fn matches(&self, actual_hex: &str) -> bool {
        self.hex.eq_ignore_ascii_case(actual_hex)
    }
}

impl fmt::Display for IntegrityHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.algorithm.prefix(), self.hex)
    }
}

/// Incremental hasher fed chunk by chunk
pub enum Hasher {
    Md5(md5::Context),
    Sha256(Sha256),
    Sha512(Sha512),
}

impl Hasher {
    pub fn new(algorithm: HashAlgorithm) -> Self {
        match algorithm {
            HashAlgorithm::Md5 => Hasher::Md5(md5::Context::new()),
            HashAlgorithm::Sha256 => Hasher::Sha256(Sha256::new()),
            HashAlgorithm::Sha512 => Hasher::Sha512(Sha512::new()),
        }
    }

    pub fn update(&mut self, data: &[u8]) {
        match self {
            Hasher::Md5(context) => context.consume(data),
            Hasher::Sha256(hasher) => hasher.update(data),
            Hasher::Sha512(hasher) => hasher.update(data),
        }
    }

    /// Finish and return the lowercase hex digest
    pub fn finalize(self) -> String {
        match self {
            Hasher::Md5(context) => format!("{:x}", context.compute()),
            Hasher::Sha256(hasher) => hex::encode(hasher.finalize()),
            Hasher::Sha512(hasher) => hex::encode(hasher.finalize()),
        }
    }
}

/// Compute hash of data and return formatted string (e.g., "sha256:abc123...")
#[cfg(test)]
pub fn compute_hash(data: &[u8], algorithm: HashAlgorithm) -> String {
    let mut hasher = Hasher::new(algorithm);
    hasher.update(data);
    format!("{}:{}", algorithm.prefix(), hasher.finalize())
}

/// Feed a file into `hasher` in chunks, reporting the bytes read so far after each chunk
pub async fn hash_file_into(
    path: &Path,
    hasher: &mut Hasher,
    chunk_size: usize,
    mut on_chunk: impl FnMut(u64),
) -> Result<u64, DownloadError> {
    let mut file = tokio::fs::File::open(path)
        .await
        .map_err(|e| DownloadError::io(path, e))?;
    let mut buffer = vec![0u8; chunk_size.max(1)];
    let mut total = 0u64;
    loop {
        let read = file
            .read(&mut buffer)
            .await
            .map_err(|e| DownloadError::io(path, e))?;
        if read == 0 {
            break;
        }
        hasher.update(&buffer[..read]);
        total += read as u64;
        on_chunk(total);
    }
    Ok(total)
}
