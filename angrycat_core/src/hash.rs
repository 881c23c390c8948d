//! Content digests for catalog checksums and file identity.

use crate::error::{Error, Result};
use std::fmt;
use std::io::Read;
use std::path::Path;

/// Digest size in bytes (128-bit digests, 32 hex characters).
pub const DIGEST_SIZE: usize = 16;

/// Supported digest algorithms.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Algorithm {
    /// MD5, the algorithm the published catalogs are checked with.
    #[default]
    Md5,
    /// BLAKE3 truncated to 128 bits.
    Blake3,
}

impl Algorithm {
    /// Returns the string representation of the algorithm (for config files).
    pub fn as_str(&self) -> &'static str {
        match self {
            Algorithm::Md5 => "md5",
            Algorithm::Blake3 => "blake3-128",
        }
    }

    /// Parse algorithm from string.
    pub fn parse(s: &str) -> Result<Self> {
        match s {
            "md5" => Ok(Algorithm::Md5),
            "blake3-128" => Ok(Algorithm::Blake3),
            _ => Err(Error::unsupported_algorithm(s)),
        }
    }
}

/// A 16-byte content digest.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Digest([u8; DIGEST_SIZE]);

impl Digest {
    /// Create a Digest from raw bytes.
    pub fn from_bytes(bytes: [u8; DIGEST_SIZE]) -> Self {
        Digest(bytes)
    }

    /// Create a Digest from a hex string (32 hex characters, any case).
    pub fn from_hex(hex_str: &str) -> Result<Self> {
        if hex_str.len() != DIGEST_SIZE * 2 {
            return Err(Error::invalid_digest(format!(
                "Expected {} hex characters, got {}",
                DIGEST_SIZE * 2,
                hex_str.len()
            )));
        }

        let bytes = hex::decode(hex_str)
            .map_err(|e| Error::invalid_digest(format!("Invalid hex: {}", e)))?;

        let mut digest = [0u8; DIGEST_SIZE];
        digest.copy_from_slice(&bytes);
        Ok(Digest(digest))
    }

    /// Convert to lowercase hex string (32 characters).
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    /// Get the raw bytes.
    pub fn as_bytes(&self) -> &[u8; DIGEST_SIZE] {
        &self.0
    }

    /// Digest raw bytes.
    pub fn compute(algorithm: Algorithm, data: &[u8]) -> Self {
        match algorithm {
            Algorithm::Md5 => Digest(md5::compute(data).0),
            Algorithm::Blake3 => {
                let full = blake3::hash(data);
                let mut digest = [0u8; DIGEST_SIZE];
                digest.copy_from_slice(&full.as_bytes()[..DIGEST_SIZE]);
                Digest(digest)
            }
        }
    }

    /// Digest data from a reader.
    pub fn compute_reader<R: Read>(algorithm: Algorithm, mut reader: R) -> Result<Self> {
        match algorithm {
            Algorithm::Md5 => {
                let mut context = md5::Context::new();
                std::io::copy(&mut reader, &mut context)?;
                Ok(Digest(context.finalize().0))
            }
            Algorithm::Blake3 => {
                let mut hasher = blake3::Hasher::new();
                std::io::copy(&mut reader, &mut hasher)?;
                let full = hasher.finalize();
                let mut digest = [0u8; DIGEST_SIZE];
                digest.copy_from_slice(&full.as_bytes()[..DIGEST_SIZE]);
                Ok(Digest(digest))
            }
        }
    }

    /// Digest a file.
    pub fn compute_file(algorithm: Algorithm, path: &Path) -> Result<Self> {
        let file = std::fs::File::open(path)?;
        Self::compute_reader(algorithm, file)
    }
}

impl fmt::Display for Digest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}

impl fmt::Debug for Digest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Digest({})", self.to_hex())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_digest_empty() {
        let digest = Digest::compute(Algorithm::Md5, b"");
        assert_eq!(digest.to_hex(), "d41d8cd98f00b204e9800998ecf8427e");
    }

    #[test]
    fn test_digest_hello_world() {
        let md5 = Digest::compute(Algorithm::Md5, b"hello world");
        assert_eq!(md5.to_hex(), "5eb63bbbe01eeed093cb22bb8f5acdc3");

        // First 16 bytes of BLAKE3 of "hello world"
        let blake = Digest::compute(Algorithm::Blake3, b"hello world");
        assert_eq!(blake.to_hex(), "d74981efa70a0c880b8d8c1985d075db");
    }

    #[test]
    fn test_digest_reader_matches_bytes() {
        let data = vec![7u8; 100_000];
        for algo in [Algorithm::Md5, Algorithm::Blake3] {
            let from_reader = Digest::compute_reader(algo, &data[..]).unwrap();
            assert_eq!(from_reader, Digest::compute(algo, &data));
        }
    }

    #[test]
    fn test_digest_reader_across_reads() {
        let reader = (&b"hello "[..]).chain(&b"wor"[..]).chain(&b"ld"[..]);
        let md5 = Digest::compute_reader(Algorithm::Md5, reader).unwrap();
        assert_eq!(md5.to_hex(), "5eb63bbbe01eeed093cb22bb8f5acdc3");
    }

    #[test]
    fn test_digest_file() {
        let temp_dir = tempfile::TempDir::new().unwrap();
        let path = temp_dir.path().join("thumb.png");
        std::fs::write(&path, b"png bytes").unwrap();

        let digest = Digest::compute_file(Algorithm::Md5, &path).unwrap();
        assert_eq!(digest, Digest::compute(Algorithm::Md5, b"png bytes"));
    }

    #[test]
    fn test_from_hex_accepts_uppercase() {
        let digest = Digest::from_hex("5EB63BBBE01EEED093CB22BB8F5ACDC3").unwrap();
        assert_eq!(digest.to_hex(), "5eb63bbbe01eeed093cb22bb8f5acdc3");
    }

    #[test]
    fn test_from_hex_invalid() {
        assert!(Digest::from_hex("abcd").is_err());
        assert!(Digest::from_hex("").is_err());
        assert!(Digest::from_hex(&"z".repeat(32)).is_err());
    }

    #[test]
    fn test_algorithm_conversions() {
        assert_eq!(Algorithm::default(), Algorithm::Md5);
        assert_eq!(Algorithm::parse("md5").unwrap(), Algorithm::Md5);
        assert_eq!(Algorithm::parse("blake3-128").unwrap(), Algorithm::Blake3);
        assert!(Algorithm::parse("sha1").is_err());
    }

    use proptest::prelude::*;

    proptest! {
        #![proptest_config(ProptestConfig {
            cases: 256,
            ..ProptestConfig::default()
        })]

        /// Digests are deterministic and always 32 lowercase hex characters
        #[test]
        fn prop_digest_deterministic(data: Vec<u8>) {
            for algo in [Algorithm::Md5, Algorithm::Blake3] {
                let first = Digest::compute(algo, &data);
                let second = Digest::compute(algo, &data);
                prop_assert_eq!(first, second);

                let hex = first.to_hex();
                prop_assert_eq!(hex.len(), 32);
                prop_assert!(hex.chars().all(|c| c.is_ascii_digit() || ('a'..='f').contains(&c)));
            }
        }

        #[test]
        fn prop_hex_roundtrip(bytes in prop::array::uniform16(any::<u8>())) {
            let digest = Digest::from_bytes(bytes);
            let parsed = Digest::from_hex(&digest.to_hex())?;
            prop_assert_eq!(digest, parsed);
        }
    }
}
