//! Checksum computation and verification
//!
//! Artifacts are stored with checksum companion files (`foo-1.0.jar.sha256`).
//! The engine writes SHA-256 and SHA-512 companions; MD5 and SHA-1
//! companions deployed by older clients are recognised but never generated.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256, Sha512};
use std::fmt;
use std::io;
use std::pin::Pin;
use std::str::FromStr;
use std::task::{ready, Context, Poll};
use tokio::io::{AsyncRead, ReadBuf};

use crate::error::{RepositoryError, Result};

/// Extensions recognised as checksum companions
pub const CHECKSUM_EXTENSIONS: &[&str] = &["sha256", "sha512", "sha1", "md5"];

/// Whether `extension` (without the leading dot) names a checksum companion
pub fn is_checksum_extension(extension: &str) -> bool {
    CHECKSUM_EXTENSIONS.contains(&extension.to_ascii_lowercase().as_str())
}

/// Whether a file name is a checksum companion
pub fn is_checksum_file(name: &str) -> bool {
    name.rsplit_once('.')
        .map(|(_, ext)| is_checksum_extension(ext))
        .unwrap_or(false)
}

/// Supported hashing algorithms for generated checksums
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ChecksumAlgorithm {
    Sha256,
    Sha512,
}

impl ChecksumAlgorithm {
    /// All generated algorithms, in companion-file order
    pub const ALL: [ChecksumAlgorithm; 2] = [ChecksumAlgorithm::Sha256, ChecksumAlgorithm::Sha512];

    /// Digest length in bytes
    pub fn hash_length(&self) -> usize {
        match self {
            ChecksumAlgorithm::Sha256 => 32,
            ChecksumAlgorithm::Sha512 => 64,
        }
    }

    pub fn hex_length(&self) -> usize {
        self.hash_length() * 2
    }

    /// Companion file extension
    pub fn extension(&self) -> &'static str {
        match self {
            ChecksumAlgorithm::Sha256 => "sha256",
            ChecksumAlgorithm::Sha512 => "sha512",
        }
    }

    /// Algorithm for a companion file extension
    pub fn from_extension(extension: &str) -> Option<Self> {
        match extension.to_ascii_lowercase().as_str() {
            "sha256" => Some(ChecksumAlgorithm::Sha256),
            "sha512" => Some(ChecksumAlgorithm::Sha512),
            _ => None,
        }
    }

    pub fn validate_hash_format(&self, hash: &str) -> Result<()> {
        let expected_len = self.hex_length();
        if hash.len() != expected_len {
            return Err(RepositoryError::InvalidArgument(format!(
                "Invalid hash length for {}: expected {} characters, got {}",
                self,
                expected_len,
                hash.len()
            )));
        }
        if !hash.chars().all(|c| c.is_ascii_hexdigit()) {
            return Err(RepositoryError::InvalidArgument(
                "Invalid hash format: must be hexadecimal string".to_string(),
            ));
        }
        Ok(())
    }

    /// Hex digest of `data`
    pub fn digest(&self, data: &[u8]) -> String {
        match self {
            ChecksumAlgorithm::Sha256 => to_hex(&Sha256::digest(data)),
            ChecksumAlgorithm::Sha512 => to_hex(&Sha512::digest(data)),
        }
    }
}

fn to_hex(bytes: &[u8]) -> String {
    use std::fmt::Write;
    let mut out = String::with_capacity(bytes.len() * 2);
    for b in bytes {
        let _ = write!(out, "{:02x}", b);
    }
    out
}

impl fmt::Display for ChecksumAlgorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ChecksumAlgorithm::Sha256 => write!(f, "SHA256"),
            ChecksumAlgorithm::Sha512 => write!(f, "SHA512"),
        }
    }
}

impl FromStr for ChecksumAlgorithm {
    type Err = RepositoryError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_uppercase().replace('-', "").as_str() {
            "SHA256" => Ok(ChecksumAlgorithm::Sha256),
            "SHA512" => Ok(ChecksumAlgorithm::Sha512),
            _ => Err(RepositoryError::InvalidArgument(format!(
                "Invalid checksum algorithm: {}",
                s
            ))),
        }
    }
}

/// A hash value together with its algorithm
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Checksum {
    pub algorithm: ChecksumAlgorithm,
    /// Lowercase hexadecimal digest
    pub value: String,
}

impl Checksum {
    /// Create a checksum from a hex value, normalizing to lowercase
    pub fn new(algorithm: ChecksumAlgorithm, value: impl Into<String>) -> Result<Self> {
        let normalized = value.into().to_lowercase();
        algorithm.validate_hash_format(&normalized)?;
        Ok(Self {
            algorithm,
            value: normalized,
        })
    }

    /// Compute the checksum of `data`
    pub fn compute(algorithm: ChecksumAlgorithm, data: &[u8]) -> Self {
        Self {
            algorithm,
            value: algorithm.digest(data),
        }
    }

    /// Checksums for every generated algorithm
    pub fn compute_all(data: &[u8]) -> Vec<Checksum> {
        ChecksumAlgorithm::ALL
            .iter()
            .map(|alg| Checksum::compute(*alg, data))
            .collect()
    }

    /// Parse the content of a companion file (`<hex>` or `<hex>  <file name>`)
    pub fn parse_companion(algorithm: ChecksumAlgorithm, content: &str) -> Result<Self> {
        let value = content.split_whitespace().next().unwrap_or("");
        Checksum::new(algorithm, value)
    }

    pub fn verify(&self, other: &Checksum) -> bool {
        self.algorithm == other.algorithm && self.value == other.value
    }

    pub fn verify_hash(&self, hash_value: &str) -> bool {
        self.value == hash_value.to_lowercase()
    }

    /// Recompute over `data` and compare
    pub fn verify_data(&self, data: &[u8]) -> bool {
        self.algorithm.digest(data) == self.value
    }

    /// Content written to the companion file
    pub fn companion_content(&self) -> String {
        self.value.clone()
    }
}

/// Reader that hashes everything passing through it, so content can be
/// streamed to storage and checksummed in one pass
pub struct ChecksummingReader<R> {
    inner: R,
    sha256: Sha256,
    sha512: Sha512,
    bytes_read: u64,
}

impl<R> ChecksummingReader<R> {
    pub fn new(inner: R) -> Self {
        Self {
            inner,
            sha256: Sha256::new(),
            sha512: Sha512::new(),
            bytes_read: 0,
        }
    }

    pub fn bytes_read(&self) -> u64 {
        self.bytes_read
    }

    /// Checksums for every generated algorithm over the bytes read so far
    pub fn finish(self) -> Vec<Checksum> {
        vec![
            Checksum {
                algorithm: ChecksumAlgorithm::Sha256,
                value: to_hex(&self.sha256.finalize()),
            },
            Checksum {
                algorithm: ChecksumAlgorithm::Sha512,
                value: to_hex(&self.sha512.finalize()),
            },
        ]
    }
}

impl<R: AsyncRead + Unpin> AsyncRead for ChecksummingReader<R> {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        let this = self.get_mut();
        let before = buf.filled().len();
        ready!(Pin::new(&mut this.inner).poll_read(cx, buf))?;
        let chunk = &buf.filled()[before..];
        this.sha256.update(chunk);
        this.sha512.update(chunk);
        this.bytes_read += chunk.len() as u64;
        Poll::Ready(Ok(()))
    }
}

impl fmt::Display for Checksum {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.algorithm, self.value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const EMPTY_SHA256: &str = "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855";

    #[test]
    fn test_algorithm_lengths() {
        assert_eq!(ChecksumAlgorithm::Sha256.hex_length(), 64);
        assert_eq!(ChecksumAlgorithm::Sha512.hex_length(), 128);
    }

    #[test]
    fn test_compute_known_value() {
        let checksum = Checksum::compute(ChecksumAlgorithm::Sha256, b"");
        assert_eq!(checksum.value, EMPTY_SHA256);
        assert!(checksum.verify_data(b""));
        assert!(!checksum.verify_data(b"x"));
        assert_eq!(Checksum::compute_all(b"abc").len(), 2);
    }

    #[test]
    fn test_checksum_normalization() {
        let checksum = Checksum::new(ChecksumAlgorithm::Sha256, EMPTY_SHA256.to_uppercase()).unwrap();
        assert_eq!(checksum.value, EMPTY_SHA256);
        assert!(checksum.verify_hash(&EMPTY_SHA256.to_uppercase()));
    }

    #[test]
    fn test_checksum_invalid() {
        assert!(Checksum::new(ChecksumAlgorithm::Sha256, "not_a_valid_hash").is_err());
        assert!(Checksum::new(ChecksumAlgorithm::Sha256, "g".repeat(64)).is_err());
    }

    #[test]
    fn test_parse_companion() {
        let content = format!("{}  foo-1.0.jar\n", EMPTY_SHA256);
        let checksum = Checksum::parse_companion(ChecksumAlgorithm::Sha256, &content).unwrap();
        assert_eq!(checksum.value, EMPTY_SHA256);
    }

    #[test]
    fn test_checksum_extensions() {
        assert!(is_checksum_extension("sha256"));
        assert!(is_checksum_extension("MD5"));
        assert!(!is_checksum_extension("jar"));
        assert!(is_checksum_file("foo-1.0.jar.sha1"));
        assert!(!is_checksum_file("foo-1.0.jar"));
        assert_eq!(ChecksumAlgorithm::from_extension("sha512"), Some(ChecksumAlgorithm::Sha512));
        assert_eq!(ChecksumAlgorithm::from_extension("md5"), None);
    }

    #[test]
    fn test_checksum_display() {
        let checksum = Checksum::new(ChecksumAlgorithm::Sha256, EMPTY_SHA256).unwrap();
        assert_eq!(checksum.to_string(), format!("SHA256:{}", EMPTY_SHA256));
    }

    #[tokio::test]
    async fn test_checksumming_reader_matches_buffered_digest() {
        use tokio::io::AsyncReadExt;
        let data: Vec<u8> = (0..10_000u32).map(|i| (i % 251) as u8).collect();
        let (head, tail) = data.split_at(4_097);
        let mut reader = ChecksummingReader::new(head.chain(tail));
        let mut sink = Vec::new();
        reader.read_to_end(&mut sink).await.unwrap();

        assert_eq!(sink, data);
        assert_eq!(reader.bytes_read(), data.len() as u64);
        assert_eq!(reader.finish(), Checksum::compute_all(&data));
    }
}
