//! # Key Usages
//!
//! Every key object carries the set of operations it may be used for. The
//! check happens on the key itself, so a decrypt-only key handed to the
//! wrong caller still cannot encrypt.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// A single operation a key may be used for
///
/// Serialized with the WebCrypto names so JWK `key_ops` stay interoperable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum KeyUsage {
    /// Encrypt plaintext
    Encrypt,
    /// Decrypt ciphertext
    Decrypt,
    /// Derive a new key (ECDH)
    DeriveKey,
    /// Derive raw bits (ECDH, PBKDF2)
    DeriveBits,
    /// Wrap another key
    WrapKey,
    /// Unwrap another key
    UnwrapKey,
}

impl KeyUsage {
    const ALL: [KeyUsage; 6] = [
        KeyUsage::Encrypt,
        KeyUsage::Decrypt,
        KeyUsage::DeriveKey,
        KeyUsage::DeriveBits,
        KeyUsage::WrapKey,
        KeyUsage::UnwrapKey,
    ];

    fn bit(self) -> u8 {
        match self {
            KeyUsage::Encrypt => 1 << 0,
            KeyUsage::Decrypt => 1 << 1,
            KeyUsage::DeriveKey => 1 << 2,
            KeyUsage::DeriveBits => 1 << 3,
            KeyUsage::WrapKey => 1 << 4,
            KeyUsage::UnwrapKey => 1 << 5,
        }
    }

    /// WebCrypto name of this usage
    pub fn as_str(&self) -> &'static str {
        match self {
            KeyUsage::Encrypt => "encrypt",
            KeyUsage::Decrypt => "decrypt",
            KeyUsage::DeriveKey => "deriveKey",
            KeyUsage::DeriveBits => "deriveBits",
            KeyUsage::WrapKey => "wrapKey",
            KeyUsage::UnwrapKey => "unwrapKey",
        }
    }
}

impl fmt::Display for KeyUsage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The set of operations a key may be used for
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct KeyUsages(u8);

impl KeyUsages {
    /// No usages at all (ECDH public keys)
    pub const fn empty() -> Self {
        Self(0)
    }

    /// Build a set from a list of usages
    pub fn from_slice(usages: &[KeyUsage]) -> Self {
        usages.iter().fold(Self::empty(), |set, u| set.with(*u))
    }

    /// `{decrypt}`, the default for deterministic symmetric keys
    pub fn decrypt_only() -> Self {
        Self::from_slice(&[KeyUsage::Decrypt])
    }

    /// `{encrypt, decrypt}`, used for shared keys and wrap keys
    pub fn encrypt_decrypt() -> Self {
        Self::from_slice(&[KeyUsage::Encrypt, KeyUsage::Decrypt])
    }

    /// `{deriveKey}`, used for ECDH private keys
    pub fn derive_key() -> Self {
        Self::from_slice(&[KeyUsage::DeriveKey])
    }

    /// Return a copy of this set with `usage` added
    pub fn with(self, usage: KeyUsage) -> Self {
        Self(self.0 | usage.bit())
    }

    /// Whether `usage` is in the set
    pub fn contains(&self, usage: KeyUsage) -> bool {
        self.0 & usage.bit() != 0
    }

    /// Whether the set is empty
    pub fn is_empty(&self) -> bool {
        self.0 == 0
    }

    /// Fail with [`Error::CapabilityViolation`] unless `usage` is in the set
    pub fn require(&self, usage: KeyUsage) -> Result<()> {
        if self.contains(usage) {
            Ok(())
        } else {
            Err(Error::CapabilityViolation { required: usage })
        }
    }

    /// Iterate the usages in canonical order
    pub fn iter(&self) -> impl Iterator<Item = KeyUsage> + '_ {
        KeyUsage::ALL.into_iter().filter(move |u| self.contains(*u))
    }

    /// Usages as a list, for JWK `key_ops`
    pub fn to_vec(&self) -> Vec<KeyUsage> {
        self.iter().collect()
    }
}

impl fmt::Debug for KeyUsages {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_set().entries(self.iter()).finish()
    }
}

impl From<&[KeyUsage]> for KeyUsages {
    fn from(usages: &[KeyUsage]) -> Self {
        Self::from_slice(usages)
    }
}

impl<const N: usize> From<[KeyUsage; N]> for KeyUsages {
    fn from(usages: [KeyUsage; N]) -> Self {
        Self::from_slice(&usages)
    }
}
