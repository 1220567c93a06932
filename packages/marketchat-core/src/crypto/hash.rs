//! # Hashing
//!
//! Digest helpers over strings and byte buffers. Strings are hashed as
//! their UTF-8 bytes.

use std::fmt;
use std::str::FromStr;

use sha1::Sha1;
use sha2::{Digest, Sha256, Sha384, Sha512};

use crate::error::{Error, Result};

/// Supported digest algorithms
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum HashAlgorithm {
    /// SHA-1 (160-bit), kept for legacy identifiers only
    Sha1,
    /// SHA-256 (256-bit)
    #[default]
    Sha256,
    /// SHA-384 (384-bit)
    Sha384,
    /// SHA-512 (512-bit)
    Sha512,
}

impl HashAlgorithm {
    /// Digest size in bytes
    pub fn output_size(&self) -> usize {
        match self {
            HashAlgorithm::Sha1 => 20,
            HashAlgorithm::Sha256 => 32,
            HashAlgorithm::Sha384 => 48,
            HashAlgorithm::Sha512 => 64,
        }
    }

    /// Canonical identifier, e.g. `"SHA-256"`
    pub fn as_str(&self) -> &'static str {
        match self {
            HashAlgorithm::Sha1 => "SHA-1",
            HashAlgorithm::Sha256 => "SHA-256",
            HashAlgorithm::Sha384 => "SHA-384",
            HashAlgorithm::Sha512 => "SHA-512",
        }
    }
}

impl fmt::Display for HashAlgorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for HashAlgorithm {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_uppercase().as_str() {
            "SHA-1" | "SHA1" => Ok(HashAlgorithm::Sha1),
            "SHA-256" | "SHA256" => Ok(HashAlgorithm::Sha256),
            "SHA-384" | "SHA384" => Ok(HashAlgorithm::Sha384),
            "SHA-512" | "SHA512" => Ok(HashAlgorithm::Sha512),
            _ => Err(Error::UnsupportedAlgorithm(s.to_string())),
        }
    }
}

/// Hash a string or byte buffer
///
/// ## Example
///
/// ```ignore
/// let digest = hash("hello", HashAlgorithm::Sha256);
/// assert_eq!(digest.len(), 32);
/// ```
pub fn hash(value: impl AsRef<[u8]>, algorithm: HashAlgorithm) -> Vec<u8> {
    let value = value.as_ref();
    match algorithm {
        HashAlgorithm::Sha1 => Sha1::digest(value).to_vec(),
        HashAlgorithm::Sha256 => Sha256::digest(value).to_vec(),
        HashAlgorithm::Sha384 => Sha384::digest(value).to_vec(),
        HashAlgorithm::Sha512 => Sha512::digest(value).to_vec(),
    }
}

/// Hash with an algorithm given by name, rejecting unknown identifiers
pub fn hash_named(value: impl AsRef<[u8]>, algorithm: &str) -> Result<Vec<u8>> {
    Ok(hash(value, algorithm.parse()?))
}
