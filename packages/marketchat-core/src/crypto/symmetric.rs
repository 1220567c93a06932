//! # Symmetric Encryption
//!
//! AES-GCM authenticated encryption for chat payloads and wrapped keys.
//!
//! ## Encryption Flow
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                      PAYLOAD ENCRYPTION FLOW                            │
//! ├─────────────────────────────────────────────────────────────────────────┤
//! │                                                                         │
//! │  Step 1: Check capability                                              │
//! │  ┌─────────────────────────────────────────────────────────────┐       │
//! │  │  key.usages ∋ encrypt   (else CapabilityViolation)           │       │
//! │  └─────────────────────────────────────────────────────────────┘       │
//! │                                                                         │
//! │  Step 2: Pick IV                                                       │
//! │  ┌─────────────────────────────────────────────────────────────┐       │
//! │  │  caller-supplied IV, or 16 fresh bytes from the provider     │       │
//! │  │  (Never reuse an IV with the same key and plaintext!)        │       │
//! │  └─────────────────────────────────────────────────────────────┘       │
//! │                                                                         │
//! │  Step 3: Encrypt                                                       │
//! │  ┌─────────────────────────────────────────────────────────────┐       │
//! │  │  AES-GCM(key = 128|256 bit, iv = 12|16 bytes, plaintext)     │       │
//! │  │           ↓                                                  │       │
//! │  │  Ciphertext + 16-byte Auth Tag                              │       │
//! │  └─────────────────────────────────────────────────────────────┘       │
//! │                                                                         │
//! │  Output: EncryptedPayload { ciphertext, iv }                           │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## IV Sizes
//!
//! Two IV sizes are in use and both are part of the stored formats:
//!
//! | Constant | Bytes | Used by |
//! |----------|-------|---------|
//! | [`MESSAGE_IV_SIZE`] | 16 | chat message content and filenames |
//! | [`UEK_IV_SIZE`] | 12 | the wrapped user encryption key envelope |
//!
//! A 16-byte IV is hashed through GHASH into the initial counter block, the
//! same construction WebCrypto uses, so ciphertexts stay interoperable.

use std::fmt;
use std::sync::Arc;

use aes_gcm::{
    aead::{
        consts::{U12, U16},
        generic_array::typenum::Unsigned,
        Aead, AeadCore, KeyInit, Nonce,
    },
    aes::{Aes128, Aes256},
    AesGcm,
};
use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
use zeroize::Zeroizing;

use super::format::{ExportKey, ExportedKey, Jwk, KeyFormat};
use super::provider::CryptoProvider;
use super::usage::{KeyUsage, KeyUsages};
use crate::error::{Error, Result};

/// IV size for chat message encryption (128 bits)
pub const MESSAGE_IV_SIZE: usize = 16;

/// IV size for the user encryption key envelope (96 bits)
pub const UEK_IV_SIZE: usize = 12;

/// Size of the AES-GCM authentication tag in bytes (128 bits)
pub const TAG_SIZE: usize = 16;

type Aes128Gcm12 = AesGcm<Aes128, U12>;
type Aes128Gcm16 = AesGcm<Aes128, U16>;
type Aes256Gcm12 = AesGcm<Aes256, U12>;
type Aes256Gcm16 = AesGcm<Aes256, U16>;

/// AES key length
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AesKeyLength {
    /// AES-128, test contexts only
    Aes128,
    /// AES-256, used for all production keys
    Aes256,
}

impl AesKeyLength {
    /// Key length in bits
    pub fn bits(&self) -> usize {
        match self {
            AesKeyLength::Aes128 => 128,
            AesKeyLength::Aes256 => 256,
        }
    }

    /// Key length in bytes
    pub fn bytes(&self) -> usize {
        self.bits() / 8
    }

    fn from_byte_len(len: usize) -> Result<Self> {
        match len {
            16 => Ok(AesKeyLength::Aes128),
            32 => Ok(AesKeyLength::Aes256),
            other => Err(Error::InvalidKey(format!(
                "AES-GCM key must be 16 or 32 bytes, got {}",
                other
            ))),
        }
    }

    fn jwk_alg(&self) -> &'static str {
        match self {
            AesKeyLength::Aes128 => "A128GCM",
            AesKeyLength::Aes256 => "A256GCM",
        }
    }
}

/// An AES-GCM key with its usage set
///
/// Key material is zeroized when dropped.
#[derive(Clone)]
pub struct SymmetricKey {
    material: Zeroizing<Vec<u8>>,
    length: AesKeyLength,
    usages: KeyUsages,
    extractable: bool,
}

impl SymmetricKey {
    /// Create from raw key bytes (16 or 32)
    pub fn from_bytes(bytes: &[u8], usages: KeyUsages, extractable: bool) -> Result<Self> {
        let length = AesKeyLength::from_byte_len(bytes.len())?;
        Ok(Self {
            material: Zeroizing::new(bytes.to_vec()),
            length,
            usages,
            extractable,
        })
    }

    /// Key length
    pub fn length(&self) -> AesKeyLength {
        self.length
    }

    /// Permitted operations
    pub fn usages(&self) -> KeyUsages {
        self.usages
    }

    /// Whether the key may be exported
    pub fn is_extractable(&self) -> bool {
        self.extractable
    }

    pub(crate) fn material(&self) -> &[u8] {
        &self.material
    }

    /// Export the key as `raw` bytes or an `oct` JWK
    pub fn export(&self, format: KeyFormat) -> Result<ExportedKey> {
        if !self.extractable {
            return Err(Error::NotExtractable);
        }

        match format {
            KeyFormat::Raw => Ok(ExportedKey::Bytes(self.material.to_vec())),
            KeyFormat::Jwk => Ok(ExportedKey::Jwk(Jwk {
                kty: "oct".into(),
                crv: None,
                x: None,
                y: None,
                d: None,
                k: Some(URL_SAFE_NO_PAD.encode(self.material.as_slice())),
                alg: Some(self.length.jwk_alg().into()),
                key_ops: Some(self.usages.to_vec()),
                ext: Some(self.extractable),
            })),
            other => Err(Error::UnsupportedKeyFormat(format!(
                "AES-GCM keys cannot be exported as {}",
                other
            ))),
        }
    }

    /// Import a key from `raw` bytes or an `oct` JWK
    ///
    /// The imported key's usage set is exactly `usages`.
    pub fn import(
        format: KeyFormat,
        encoded: &ExportedKey,
        usages: KeyUsages,
        extractable: bool,
    ) -> Result<Self> {
        match (format, encoded) {
            (KeyFormat::Raw, ExportedKey::Bytes(bytes)) => {
                Self::from_bytes(bytes, usages, extractable)
            }
            (KeyFormat::Jwk, ExportedKey::Jwk(jwk)) => {
                if jwk.kty != "oct" {
                    return Err(Error::InvalidKey(format!(
                        "Expected oct JWK, got kty={}",
                        jwk.kty
                    )));
                }
                if let Some(ops) = &jwk.key_ops {
                    if let Some(missing) = usages.iter().find(|u| !ops.contains(u)) {
                        return Err(Error::InvalidKey(format!(
                            "JWK key_ops does not allow '{}'",
                            missing
                        )));
                    }
                }
                let k = jwk
                    .k
                    .as_deref()
                    .ok_or_else(|| Error::InvalidKey("oct JWK is missing 'k'".into()))?;
                let bytes = Zeroizing::new(
                    URL_SAFE_NO_PAD
                        .decode(k)
                        .map_err(|e| Error::InvalidKey(format!("Invalid base64url: {}", e)))?,
                );
                let key = Self::from_bytes(&bytes, usages, extractable)?;
                if let Some(alg) = &jwk.alg {
                    if alg != key.length.jwk_alg() {
                        return Err(Error::InvalidKey(format!(
                            "JWK alg {} does not match a {}-bit key",
                            alg,
                            key.length.bits()
                        )));
                    }
                }
                Ok(key)
            }
            (format, _) => Err(Error::UnsupportedKeyFormat(format!(
                "cannot import an AES-GCM key from {}",
                format
            ))),
        }
    }
}

impl fmt::Debug for SymmetricKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SymmetricKey")
            .field("length", &self.length)
            .field("usages", &self.usages)
            .field("extractable", &self.extractable)
            .finish_non_exhaustive()
    }
}

impl ExportKey for SymmetricKey {
    fn export_as(&self, format: KeyFormat) -> Result<ExportedKey> {
        self.export(format)
    }
}

/// Result of a symmetric encryption
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncryptedPayload {
    /// Ciphertext with the 16-byte tag appended
    pub ciphertext: Vec<u8>,
    /// IV the ciphertext was produced under
    pub iv: Vec<u8>,
}

/// AES-GCM cipher bound to a randomness provider
#[derive(Debug, Clone)]
pub struct SymmetricCipher {
    provider: Arc<dyn CryptoProvider>,
}

impl SymmetricCipher {
    /// Create a cipher drawing IVs from `provider`
    pub fn new(provider: Arc<dyn CryptoProvider>) -> Self {
        Self { provider }
    }

    /// Draw a fresh random IV of `size` bytes
    pub fn generate_iv(&self, size: usize) -> Result<Vec<u8>> {
        self.provider.random_bytes(size)
    }

    /// Encrypt `plaintext` under `key`
    ///
    /// When `iv` is `None`, a fresh [`MESSAGE_IV_SIZE`]-byte IV is drawn.
    ///
    /// ## Errors
    ///
    /// - `CapabilityViolation` if the key lacks `encrypt`
    /// - `InvalidIv` if the IV is neither 12 nor 16 bytes
    pub fn encrypt(
        &self,
        plaintext: &[u8],
        key: &SymmetricKey,
        iv: Option<&[u8]>,
    ) -> Result<EncryptedPayload> {
        key.usages.require(KeyUsage::Encrypt)?;

        let iv = match iv {
            Some(iv) => iv.to_vec(),
            None => self.generate_iv(MESSAGE_IV_SIZE)?,
        };

        let ciphertext = match (key.length, iv.len()) {
            (AesKeyLength::Aes128, 12) => seal::<Aes128Gcm12>(key.material(), &iv, plaintext),
            (AesKeyLength::Aes128, 16) => seal::<Aes128Gcm16>(key.material(), &iv, plaintext),
            (AesKeyLength::Aes256, 12) => seal::<Aes256Gcm12>(key.material(), &iv, plaintext),
            (AesKeyLength::Aes256, 16) => seal::<Aes256Gcm16>(key.material(), &iv, plaintext),
            (_, other) => Err(unsupported_iv(other)),
        }?;

        tracing::trace!(
            plaintext_len = plaintext.len(),
            iv_len = iv.len(),
            "AES-GCM encrypt"
        );

        Ok(EncryptedPayload { ciphertext, iv })
    }

    /// Decrypt `ciphertext` produced under `(key, iv)`
    ///
    /// ## Errors
    ///
    /// - `CapabilityViolation` if the key lacks `decrypt`
    /// - `AuthenticationFailure` if the tag does not verify: the ciphertext
    ///   was tampered with, or the key or IV is wrong
    pub fn decrypt(&self, ciphertext: &[u8], iv: &[u8], key: &SymmetricKey) -> Result<Vec<u8>> {
        key.usages.require(KeyUsage::Decrypt)?;

        match (key.length, iv.len()) {
            (AesKeyLength::Aes128, 12) => open::<Aes128Gcm12>(key.material(), iv, ciphertext),
            (AesKeyLength::Aes128, 16) => open::<Aes128Gcm16>(key.material(), iv, ciphertext),
            (AesKeyLength::Aes256, 12) => open::<Aes256Gcm12>(key.material(), iv, ciphertext),
            (AesKeyLength::Aes256, 16) => open::<Aes256Gcm16>(key.material(), iv, ciphertext),
            (_, other) => Err(unsupported_iv(other)),
        }
    }
}

fn unsupported_iv(len: usize) -> Error {
    Error::InvalidIv(format!("AES-GCM IV must be 12 or 16 bytes, got {}", len))
}

fn seal<C>(key: &[u8], iv: &[u8], plaintext: &[u8]) -> Result<Vec<u8>>
where
    C: Aead + KeyInit,
{
    debug_assert_eq!(iv.len(), <<C as AeadCore>::NonceSize as Unsigned>::USIZE);
    let cipher = C::new_from_slice(key)
        .map_err(|e| Error::EncryptionFailed(format!("Invalid key: {}", e)))?;
    cipher
        .encrypt(Nonce::<C>::from_slice(iv), plaintext)
        .map_err(|e| Error::EncryptionFailed(format!("Encryption failed: {}", e)))
}

fn open<C>(key: &[u8], iv: &[u8], ciphertext: &[u8]) -> Result<Vec<u8>>
where
    C: Aead + KeyInit,
{
    debug_assert_eq!(iv.len(), <<C as AeadCore>::NonceSize as Unsigned>::USIZE);
    let cipher = C::new_from_slice(key)
        .map_err(|e| Error::InvalidKey(format!("Invalid key: {}", e)))?;
    cipher
        .decrypt(Nonce::<C>::from_slice(iv), ciphertext)
        .map_err(|_| Error::AuthenticationFailure)
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::provider::{OsCryptoProvider, SequenceCryptoProvider};

    fn cipher() -> SymmetricCipher {
        SymmetricCipher::new(OsCryptoProvider::shared())
    }

    fn key(byte: u8) -> SymmetricKey {
        SymmetricKey::from_bytes(&[byte; 32], KeyUsages::encrypt_decrypt(), true).unwrap()
    }

    #[test]
    fn test_encrypt_decrypt_basic() {
        let cipher = cipher();
        let key = key(42);
        let payload = cipher.encrypt(b"Hello, World!", &key, None).unwrap();

        assert_eq!(payload.iv.len(), MESSAGE_IV_SIZE);
        assert_eq!(payload.ciphertext.len(), 13 + TAG_SIZE);

        let decrypted = cipher.decrypt(&payload.ciphertext, &payload.iv, &key).unwrap();
        assert_eq!(decrypted, b"Hello, World!");
    }

    #[test]
    fn test_encrypt_decrypt_empty() {
        let cipher = cipher();
        let key = key(42);
        let payload = cipher.encrypt(b"", &key, None).unwrap();
        let decrypted = cipher.decrypt(&payload.ciphertext, &payload.iv, &key).unwrap();
        assert!(decrypted.is_empty());
    }

    #[test]
    fn test_twelve_byte_iv_round_trip() {
        let cipher = cipher();
        let key = key(7);
        let iv = cipher.generate_iv(UEK_IV_SIZE).unwrap();
        let payload = cipher.encrypt(b"wrapped", &key, Some(iv.as_slice())).unwrap();
        assert_eq!(payload.iv, iv);
        let decrypted = cipher.decrypt(&payload.ciphertext, &iv, &key).unwrap();
        assert_eq!(decrypted, b"wrapped");
    }

    #[test]
    fn test_sixteen_byte_iv_known_answer() {
        let cipher = cipher();
        let key = key(42);
        let iv: Vec<u8> = (0u8..16).collect();

        let payload = cipher.encrypt(b"hello world", &key, Some(iv.as_slice())).unwrap();
        assert_eq!(
            hex::encode(&payload.ciphertext),
            "566172d2d28aa366da2734211d77ff4eb21e6d0c6b5bbd6cad94c9"
        );

        let decrypted = cipher.decrypt(&payload.ciphertext, &iv, &key).unwrap();
        assert_eq!(decrypted, b"hello world");
    }

    #[test]
    fn test_aes128_round_trip() {
        let cipher = cipher();
        let key = SymmetricKey::from_bytes(&[3u8; 16], KeyUsages::encrypt_decrypt(), true).unwrap();
        assert_eq!(key.length(), AesKeyLength::Aes128);
        let payload = cipher.encrypt(b"short key", &key, None).unwrap();
        let decrypted = cipher.decrypt(&payload.ciphertext, &payload.iv, &key).unwrap();
        assert_eq!(decrypted, b"short key");
    }

    #[test]
    fn test_tampered_ciphertext_fails() {
        let cipher = cipher();
        let key = key(42);
        let mut payload = cipher.encrypt(b"Hello, World!", &key, None).unwrap();
        payload.ciphertext[0] ^= 0xFF;

        let result = cipher.decrypt(&payload.ciphertext, &payload.iv, &key);
        assert!(matches!(result, Err(Error::AuthenticationFailure)));
    }

    #[test]
    fn test_wrong_key_fails() {
        let cipher = cipher();
        let payload = cipher.encrypt(b"secret", &key(1), None).unwrap();
        let result = cipher.decrypt(&payload.ciphertext, &payload.iv, &key(2));
        assert!(matches!(result, Err(Error::AuthenticationFailure)));
    }

    #[test]
    fn test_wrong_iv_fails() {
        let cipher = cipher();
        let key = key(1);
        let payload = cipher.encrypt(b"secret", &key, None).unwrap();
        let mut iv = payload.iv.clone();
        iv[0] ^= 0x01;
        let result = cipher.decrypt(&payload.ciphertext, &iv, &key);
        assert!(matches!(result, Err(Error::AuthenticationFailure)));
    }

    #[test]
    fn test_unsupported_iv_length() {
        let cipher = cipher();
        let result = cipher.encrypt(b"x", &key(1), Some(&[0u8; 8][..]));
        assert!(matches!(result, Err(Error::InvalidIv(_))));
    }

    #[test]
    fn test_decrypt_only_key_cannot_encrypt() {
        let cipher = cipher();
        let key = SymmetricKey::from_bytes(&[9u8; 32], KeyUsages::decrypt_only(), false).unwrap();
        let result = cipher.encrypt(b"nope", &key, None);
        assert!(matches!(
            result,
            Err(Error::CapabilityViolation {
                required: KeyUsage::Encrypt
            })
        ));
    }

    #[test]
    fn test_encrypt_only_key_cannot_decrypt() {
        let cipher = cipher();
        let key = SymmetricKey::from_bytes(&[9u8; 32], [KeyUsage::Encrypt].into(), false).unwrap();
        let payload = cipher.encrypt(b"one way", &key, None).unwrap();
        let result = cipher.decrypt(&payload.ciphertext, &payload.iv, &key);
        assert!(matches!(
            result,
            Err(Error::CapabilityViolation {
                required: KeyUsage::Decrypt
            })
        ));
    }

    #[test]
    fn test_random_ivs_produce_different_ciphertext() {
        let cipher = cipher();
        let key = key(42);
        let p1 = cipher.encrypt(b"Hello, World!", &key, None).unwrap();
        let p2 = cipher.encrypt(b"Hello, World!", &key, None).unwrap();
        assert_ne!(p1.iv, p2.iv);
        assert_ne!(p1.ciphertext, p2.ciphertext);
    }

    #[test]
    fn test_sequence_provider_gives_reproducible_vectors() {
        let key = key(5);
        let c1 = SymmetricCipher::new(Arc::new(SequenceCryptoProvider::new(b"vector")));
        let c2 = SymmetricCipher::new(Arc::new(SequenceCryptoProvider::new(b"vector")));
        assert_eq!(
            c1.encrypt(b"same", &key, None).unwrap(),
            c2.encrypt(b"same", &key, None).unwrap()
        );
    }

    #[test]
    fn test_raw_and_jwk_export_import() {
        let original = key(11);
        let raw = original.export(KeyFormat::Raw).unwrap();
        let jwk = original.export(KeyFormat::Jwk).unwrap();

        let from_raw =
            SymmetricKey::import(KeyFormat::Raw, &raw, KeyUsages::encrypt_decrypt(), true).unwrap();
        let from_jwk =
            SymmetricKey::import(KeyFormat::Jwk, &jwk, KeyUsages::encrypt_decrypt(), true).unwrap();

        assert_eq!(from_raw.export(KeyFormat::Raw).unwrap(), raw);
        assert_eq!(from_jwk.export(KeyFormat::Jwk).unwrap(), jwk);
        assert_eq!(jwk.as_jwk().unwrap().alg.as_deref(), Some("A256GCM"));
    }

    #[test]
    fn test_non_extractable_export_fails() {
        let key = SymmetricKey::from_bytes(&[1u8; 32], KeyUsages::decrypt_only(), false).unwrap();
        assert!(matches!(key.export(KeyFormat::Raw), Err(Error::NotExtractable)));
    }

    #[test]
    fn test_pkcs8_not_valid_for_symmetric_keys() {
        let result = key(1).export(KeyFormat::Pkcs8);
        assert!(matches!(result, Err(Error::UnsupportedKeyFormat(_))));
    }

    #[test]
    fn test_import_respects_jwk_key_ops() {
        let decrypt_only =
            SymmetricKey::from_bytes(&[1u8; 32], KeyUsages::decrypt_only(), true).unwrap();
        let jwk = decrypt_only.export(KeyFormat::Jwk).unwrap();
        let result =
            SymmetricKey::import(KeyFormat::Jwk, &jwk, KeyUsages::encrypt_decrypt(), true);
        assert!(matches!(result, Err(Error::InvalidKey(_))));
    }

    #[test]
    fn test_invalid_key_length() {
        let result = SymmetricKey::from_bytes(&[0u8; 24], KeyUsages::encrypt_decrypt(), true);
        assert!(matches!(result, Err(Error::InvalidKey(_))));
    }
}
