//! # Key Derivation Functions
//!
//! Password-based derivation of symmetric keys and identity key pairs.
//!
//! ## Key Derivation Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    KEY DERIVATION HIERARCHY                             │
//! ├─────────────────────────────────────────────────────────────────────────┤
//! │                                                                         │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │                 USER SECRET + SALT                              │   │
//! │  │                                                                 │   │
//! │  │  secret = password, salt = username  (UTF-8 bytes)             │   │
//! │  └─────────────────────────────┬───────────────────────────────────┘   │
//! │                                │                                        │
//! │                                ▼                                        │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │                    PBKDF2 STRETCHING                            │   │
//! │  │                                                                 │   │
//! │  │  PBKDF2-HMAC-SHA512(                                           │   │
//! │  │    password = secret,                                          │   │
//! │  │    salt = salt,                                                │   │
//! │  │    iterations = 100,000,                                       │   │
//! │  │  )                                                             │   │
//! │  └─────────────────────────────┬───────────────────────────────────┘   │
//! │                                │                                        │
//! │              ┌─────────────────┴─────────────────┐                     │
//! │              ▼                                   ▼                     │
//! │  ┌───────────────────────────┐   ┌───────────────────────────┐       │
//! │  │     SYMMETRIC KEY         │   │    IDENTITY KEY PAIR      │       │
//! │  │                           │   │                           │       │
//! │  │  first 32 bytes           │   │  64-byte seed             │       │
//! │  │                           │   │  HKDF-SHA512(             │       │
//! │  │                           │   │    ikm = seed,            │       │
//! │  │                           │   │    info = "marketchat-    │       │
//! │  │                           │   │      ecdh-p521-v1" || n   │       │
//! │  │                           │   │  )                        │       │
//! │  │                           │   │                           │       │
//! │  │  → AES-GCM-256 key        │   │  → 66-byte P-521 scalar   │       │
//! │  └───────────────────────────┘   └───────────────────────────┘       │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Security Considerations
//!
//! A key pair derived from `(password, username)` can be regenerated on any
//! device, and anyone who learns the password can regenerate it too. A
//! password compromise therefore exposes every conversation ever keyed to
//! that identity.
//!
//! | Parameter | Value |
//! |-----------|-------|
//! | PRF | HMAC-SHA-512 |
//! | Iterations | 100,000 |
//! | Symmetric key | AES-GCM, 256 bits |

use hkdf::Hkdf;
use sha2::Sha512;
use zeroize::Zeroizing;

use super::agreement::{secret_from_candidate, KeyPair, SCALAR_SIZE};
use super::symmetric::{AesKeyLength, SymmetricKey};
use super::usage::KeyUsages;
use crate::error::{Error, Result};

/// Iteration count every client must use to stay interoperable
pub const DEFAULT_PBKDF2_ITERATIONS: u32 = 100_000;

/// PBKDF2 output used as the key pair seed
const KEY_PAIR_SEED_SIZE: usize = 64;

/// Candidates tried before key pair derivation gives up
const MAX_KEY_PAIR_CANDIDATES: u32 = 64;

/// Domain separation strings for HKDF
pub mod domain {
    /// Domain for P-521 identity key pair derivation
    pub const ECDH_P521_KEY_PAIR: &[u8] = b"marketchat-ecdh-p521-v1";
}

/// PBKDF2 parameters
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KdfParams {
    /// PBKDF2 iteration count
    pub iterations: u32,
}

impl Default for KdfParams {
    fn default() -> Self {
        Self {
            iterations: DEFAULT_PBKDF2_ITERATIONS,
        }
    }
}

/// Password-based key derivation
#[derive(Debug, Clone, Default)]
pub struct Kdf {
    params: KdfParams,
}

impl Kdf {
    /// Create a KDF with the given parameters
    ///
    /// Fails if `iterations` is zero.
    pub fn new(params: KdfParams) -> Result<Self> {
        if params.iterations == 0 {
            return Err(Error::InvalidConfig(
                "PBKDF2 iteration count must be non-zero".into(),
            ));
        }
        Ok(Self { params })
    }

    /// Parameters in use
    pub fn params(&self) -> KdfParams {
        self.params
    }

    /// Raw PBKDF2-HMAC-SHA512 output of `len` bytes
    pub fn derive_bits(&self, secret: &str, salt: &str, len: usize) -> Result<Zeroizing<Vec<u8>>> {
        if len == 0 {
            return Err(Error::KeyDerivationFailed(
                "requested zero bytes of key material".into(),
            ));
        }

        let mut out = Zeroizing::new(vec![0u8; len]);
        pbkdf2::pbkdf2_hmac::<Sha512>(
            secret.as_bytes(),
            salt.as_bytes(),
            self.params.iterations,
            &mut out,
        );
        Ok(out)
    }

    /// Derive an AES-GCM-256 key from `(secret, salt)`
    ///
    /// The key carries exactly `usages` and is extractable, so callers can
    /// compare exported bytes across derivations.
    pub fn generate_deterministic_symmetric_key(
        &self,
        secret: &str,
        salt: &str,
        usages: KeyUsages,
    ) -> Result<SymmetricKey> {
        let bits = self.derive_bits(secret, salt, AesKeyLength::Aes256.bytes())?;
        tracing::debug!(
            iterations = self.params.iterations,
            "Derived deterministic symmetric key"
        );
        SymmetricKey::from_bytes(&bits, usages, true)
    }

    /// [`generate_deterministic_symmetric_key`](Self::generate_deterministic_symmetric_key)
    /// with the default usage set `{decrypt}`
    pub fn generate_decrypt_key(&self, secret: &str, salt: &str) -> Result<SymmetricKey> {
        self.generate_deterministic_symmetric_key(secret, salt, KeyUsages::decrypt_only())
    }

    /// Derive a P-521 key pair from `(secret, salt)`
    ///
    /// ## Process
    ///
    /// ```text
    /// PBKDF2(secret, salt) ──► 64-byte seed
    ///       │
    ///       └──► HKDF(info = domain || 0) → candidate 0 ─┐
    ///            HKDF(info = domain || 1) → candidate 1  ├─► first valid scalar
    ///            ...                                     ─┘
    /// ```
    pub fn generate_deterministic_key_pair(&self, secret: &str, salt: &str) -> Result<KeyPair> {
        let seed = self.derive_bits(secret, salt, KEY_PAIR_SEED_SIZE)?;
        let hkdf = Hkdf::<Sha512>::new(None, &seed);

        let mut candidate = Zeroizing::new([0u8; SCALAR_SIZE]);
        for counter in 0..MAX_KEY_PAIR_CANDIDATES {
            hkdf.expand_multi_info(
                &[domain::ECDH_P521_KEY_PAIR, &counter.to_be_bytes()],
                candidate.as_mut_slice(),
            )
            .map_err(|_| Error::KeyDerivationFailed("Failed to expand key pair seed".into()))?;

            if let Some(secret) = secret_from_candidate(&mut candidate) {
                tracing::debug!(counter, "Derived deterministic P-521 key pair");
                return Ok(KeyPair::from_secret(secret));
            }
        }

        Err(Error::KeyDerivationFailed(
            "No valid P-521 scalar among derived candidates".into(),
        ))
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::format::KeyFormat;
    use crate::crypto::symmetric::SymmetricCipher;
    use crate::crypto::provider::OsCryptoProvider;
    use crate::crypto::usage::KeyUsage;

    fn fast_kdf() -> Kdf {
        Kdf::new(KdfParams { iterations: 1_000 }).unwrap()
    }

    fn raw(key: &SymmetricKey) -> Vec<u8> {
        key.export(KeyFormat::Raw).unwrap().into_bytes().unwrap()
    }

    #[test]
    fn test_symmetric_key_deterministic() {
        let kdf = fast_kdf();
        let k1 = kdf.generate_decrypt_key("hunter2", "alice").unwrap();
        let k2 = kdf.generate_decrypt_key("hunter2", "alice").unwrap();
        assert_eq!(raw(&k1), raw(&k2));
        assert_eq!(k1.length(), AesKeyLength::Aes256);
    }

    #[test]
    fn test_different_secret_or_salt_different_keys() {
        let kdf = fast_kdf();
        let base = raw(&kdf.generate_decrypt_key("hunter2", "alice").unwrap());
        let other_secret = raw(&kdf.generate_decrypt_key("hunter3", "alice").unwrap());
        let other_salt = raw(&kdf.generate_decrypt_key("hunter2", "bob").unwrap());

        assert_ne!(base, other_secret);
        assert_ne!(base, other_salt);
    }

    #[test]
    fn test_default_usage_is_decrypt_only() {
        let kdf = fast_kdf();
        let key = kdf.generate_decrypt_key("pw", "salt").unwrap();
        assert_eq!(key.usages(), KeyUsages::decrypt_only());

        let cipher = SymmetricCipher::new(OsCryptoProvider::shared());
        let result = cipher.encrypt(b"nope", &key, None);
        assert!(matches!(
            result,
            Err(Error::CapabilityViolation {
                required: KeyUsage::Encrypt
            })
        ));
    }

    #[test]
    fn test_pbkdf2_sha512_known_vector() {
        // RFC 6070-style inputs, SHA-512 PRF, 1 iteration
        let kdf = Kdf::new(KdfParams { iterations: 1 }).unwrap();
        let bits = kdf.derive_bits("password", "salt", 64).unwrap();
        assert_eq!(
            hex::encode(bits.as_slice()),
            "867f70cf1ade02cff3752599a3a53dc4af34c7a669815ae5d513554e1c8cf252\
             c02d470a285a0501bad999bfe943c08f050235d7d68b1da55e63f73b60a57fce"
        );
    }

    #[test]
    fn test_iterations_change_output() {
        let low = Kdf::new(KdfParams { iterations: 1 }).unwrap();
        let high = Kdf::new(KdfParams { iterations: 2 }).unwrap();
        assert_ne!(
            low.derive_bits("pw", "salt", 32).unwrap(),
            high.derive_bits("pw", "salt", 32).unwrap()
        );
    }

    #[test]
    fn test_zero_iterations_rejected() {
        assert!(matches!(
            Kdf::new(KdfParams { iterations: 0 }),
            Err(Error::InvalidConfig(_))
        ));
    }

    #[test]
    fn test_default_params_are_interoperable() {
        assert_eq!(Kdf::default().params().iterations, 100_000);
    }

    #[test]
    fn test_key_pair_deterministic() {
        let kdf = fast_kdf();
        let kp1 = kdf.generate_deterministic_key_pair("hunter2", "alice").unwrap();
        let kp2 = kdf.generate_deterministic_key_pair("hunter2", "alice").unwrap();

        assert_eq!(kp1.public_key, kp2.public_key);
        assert_eq!(
            kp1.private_key.export(KeyFormat::Pkcs8).unwrap(),
            kp2.private_key.export(KeyFormat::Pkcs8).unwrap()
        );
    }

    #[test]
    fn test_key_pair_salt_sensitive() {
        let kdf = fast_kdf();
        let alice = kdf.generate_deterministic_key_pair("hunter2", "alice").unwrap();
        let bob = kdf.generate_deterministic_key_pair("hunter2", "bob").unwrap();
        assert_ne!(alice.public_key, bob.public_key);
    }

    #[test]
    fn test_derived_key_pair_agrees_with_random_pair() {
        let kdf = fast_kdf();
        let agreement = crate::crypto::KeyAgreement::new(OsCryptoProvider::shared());
        let derived = kdf.generate_deterministic_key_pair("pw", "carol").unwrap();
        let random = agreement.generate_random_key_pair().unwrap();

        let a = agreement.derive_key(&random.public_key, &derived.private_key).unwrap();
        let b = agreement.derive_key(&derived.public_key, &random.private_key).unwrap();
        assert_eq!(raw(&a), raw(&b));
    }

    #[test]
    fn test_full_iteration_count_is_deterministic() {
        let kdf = Kdf::default();
        let k1 = kdf.generate_decrypt_key("correct horse", "battery").unwrap();
        let k2 = kdf.generate_decrypt_key("correct horse", "battery").unwrap();
        assert_eq!(raw(&k1), raw(&k2));
    }
}
