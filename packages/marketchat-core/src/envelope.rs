//! # User Encryption Key Envelope
//!
//! Binary format for a private key wrapped under a password-derived key,
//! as kept in local storage between sessions.
//!
//! ## Wire Format
//!
//! ```text
//! ┌────────────────┬────────────────┬──────────────────┬───────────────────────┐
//! │ version: u32LE │ ivLength: u32LE│ iv: ivLength B   │ ciphertext: rest      │
//! │ (always 1)     │ (always 12)    │                  │ AES-GCM(pkcs8) + tag  │
//! └────────────────┴────────────────┴──────────────────┴───────────────────────┘
//!   0              4                8                  8 + ivLength
//! ```
//!
//! ## Decode Pipeline
//!
//! ```text
//! bytes ──► len < 8 ? ──yes──► Format("too short")
//!             │ no
//!             ▼
//!        version != 1 ? ──yes──► Format("unsupported version")
//!             │ no
//!             ▼
//!        ivLength != 12 ? ──yes──► Format("unsupported version")
//!             │ no
//!             ▼
//!        AES-GCM open(wrap_key, iv) ──fail──► AuthenticationFailure
//!             │
//!             ▼
//!        import pkcs8 ──► EcdhPrivateKey
//! ```
//!
//! The IV-length check reports the same reason as the version check.
//! Callers already match on that text, so it stays that way.

use crate::crypto::{
    EcdhPrivateKey, ExportedKey, KeyFormat, KeyUsages, SymmetricCipher, SymmetricKey, UEK_IV_SIZE,
};
use crate::error::{Error, Result};

/// The only supported envelope version
pub const UEK_VERSION: u32 = 1;

/// Size of the fixed header (`version` + `ivLength`)
pub const HEADER_SIZE: usize = 8;

const TOO_SHORT: &str = "too short";
const UNSUPPORTED_VERSION: &str = "unsupported version";

/// A parsed envelope, before decryption
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserEncryptionKeyEnvelope {
    /// Format version, always [`UEK_VERSION`]
    pub version: u32,
    /// AES-GCM IV, always [`UEK_IV_SIZE`] bytes
    pub iv: Vec<u8>,
    /// Wrapped PKCS8 private key with tag
    pub ciphertext: Vec<u8>,
}

impl UserEncryptionKeyEnvelope {
    /// Build a version-1 envelope
    pub fn new(iv: Vec<u8>, ciphertext: Vec<u8>) -> Self {
        Self {
            version: UEK_VERSION,
            iv,
            ciphertext,
        }
    }

    /// Serialize to `[version][ivLength][iv][ciphertext]`
    pub fn encode(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(HEADER_SIZE + self.iv.len() + self.ciphertext.len());
        out.extend_from_slice(&self.version.to_le_bytes());
        out.extend_from_slice(&(self.iv.len() as u32).to_le_bytes());
        out.extend_from_slice(&self.iv);
        out.extend_from_slice(&self.ciphertext);
        out
    }

    /// Parse and validate the header
    ///
    /// ## Errors
    ///
    /// - `Format("too short")` if the buffer cannot hold the header and IV
    /// - `Format("unsupported version")` if `version != 1` or `ivLength != 12`
    pub fn decode(bytes: &[u8]) -> Result<Self> {
        if bytes.len() < HEADER_SIZE {
            return Err(Error::Format(TOO_SHORT.into()));
        }

        let version = read_u32_le(&bytes[0..4]);
        let iv_length = read_u32_le(&bytes[4..8]) as usize;

        if version != UEK_VERSION {
            return Err(Error::Format(UNSUPPORTED_VERSION.into()));
        }
        if iv_length != UEK_IV_SIZE {
            return Err(Error::Format(UNSUPPORTED_VERSION.into()));
        }

        let body = &bytes[HEADER_SIZE..];
        if body.len() < iv_length {
            return Err(Error::Format(TOO_SHORT.into()));
        }
        let (iv, ciphertext) = body.split_at(iv_length);

        Ok(Self {
            version,
            iv: iv.to_vec(),
            ciphertext: ciphertext.to_vec(),
        })
    }
}

fn read_u32_le(bytes: &[u8]) -> u32 {
    let mut buf = [0u8; 4];
    buf.copy_from_slice(bytes);
    u32::from_le_bytes(buf)
}

/// Wrap `private_key` under `wrap_key`
///
/// The key is exported as PKCS8, so it must be extractable. A fresh
/// 12-byte IV is drawn for every call.
pub fn encrypt_user_encryption_key(
    cipher: &SymmetricCipher,
    private_key: &EcdhPrivateKey,
    wrap_key: &SymmetricKey,
) -> Result<Vec<u8>> {
    let pkcs8 = zeroize::Zeroizing::new(private_key.export(KeyFormat::Pkcs8)?.into_bytes()?);
    let iv = cipher.generate_iv(UEK_IV_SIZE)?;
    let payload = cipher.encrypt(&pkcs8, wrap_key, Some(iv.as_slice()))?;

    let encoded = UserEncryptionKeyEnvelope::new(payload.iv, payload.ciphertext).encode();
    tracing::debug!(envelope_len = encoded.len(), "Wrapped user encryption key");
    Ok(encoded)
}

/// Unwrap an envelope produced by [`encrypt_user_encryption_key`]
///
/// The recovered key has usages `{deriveKey}` and stays extractable so it
/// can be re-wrapped after a password change.
pub fn decrypt_user_encryption_key(
    cipher: &SymmetricCipher,
    bytes: &[u8],
    wrap_key: &SymmetricKey,
) -> Result<EcdhPrivateKey> {
    let envelope = UserEncryptionKeyEnvelope::decode(bytes)?;
    let pkcs8 = cipher.decrypt(&envelope.ciphertext, &envelope.iv, wrap_key)?;

    let key = EcdhPrivateKey::import(
        KeyFormat::Pkcs8,
        &ExportedKey::Bytes(pkcs8),
        KeyUsages::derive_key(),
        true,
    )?;
    tracing::debug!("Unwrapped user encryption key");
    Ok(key)
}

// ============================================================================
// TESTS
// ============================================================================
