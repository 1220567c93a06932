//! # Key Agreement
//!
//! ECDH over NIST P-521 and the key handles that go with it.
//!
//! ## Key Types
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                          KEY TYPES                                      │
//! ├─────────────────────────────────────────────────────────────────────────┤
//! │                                                                         │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │  EcdhPrivateKey (P-521)                                         │   │
//! │  │  ──────────────────────                                          │   │
//! │  │  • Usages: {deriveKey}                                          │   │
//! │  │  • Export: pkcs8, jwk (with "d")                               │   │
//! │  │  • Never leaves the device unwrapped                            │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! │                                                                         │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │  EcdhPublicKey (P-521)                                          │   │
//! │  │  ─────────────────────                                           │   │
//! │  │  • Usages: {} (only ever an input to derive_key)               │   │
//! │  │  • Export: spki, raw (SEC1 uncompressed), jwk                  │   │
//! │  │  • Published to the identity service as a JWK                  │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Shared Key Derivation
//!
//! ```text
//!   Alice                                     Bob
//!     │                                        │
//!     │──────── Alice's public key (JWK) ─────►│
//!     │◄─────── Bob's public key (JWK) ────────│
//!     ▼                                        ▼
//!  ECDH(alice_priv, bob_pub)          ECDH(bob_priv, alice_pub)
//!     │                                        │
//!     └──────────► same 66-byte x ◄────────────┘
//!                       │
//!                       ▼
//!          first 32 bytes → AES-GCM-256 key
//!          (extractable, {encrypt, decrypt})
//! ```
//!
//! Taking the leading 256 bits of the shared x-coordinate is what WebCrypto
//! does for `deriveKey({name: "ECDH"}, .., {name: "AES-GCM", length: 256})`.

use std::fmt;
use std::sync::Arc;

use p521::elliptic_curve::{
    ecdh::diffie_hellman,
    pkcs8::{DecodePrivateKey, DecodePublicKey, EncodePrivateKey, EncodePublicKey},
    sec1::ToEncodedPoint,
};
use p521::{PublicKey, SecretKey};
use zeroize::Zeroizing;

use super::format::{ExportKey, ExportedKey, Jwk, KeyFormat};
use super::provider::CryptoProvider;
use super::symmetric::SymmetricKey;
use super::usage::{KeyUsage, KeyUsages};
use crate::error::{Error, Result};

/// Size of a P-521 scalar / field element in bytes
pub const SCALAR_SIZE: usize = 66;

/// Size of the derived shared key in bytes (AES-256)
pub const SHARED_KEY_SIZE: usize = 32;

/// JWK curve name
pub const CURVE_NAME: &str = "P-521";

/// Attempts before giving up on drawing a valid scalar
const MAX_SCALAR_ATTEMPTS: usize = 16;

/// Interpret `candidate` as a P-521 scalar, if it lies in `[1, n)`
///
/// Only the lowest bit of the top byte is kept, so the candidate is below
/// 2^521; the remaining rejection probability is negligible.
pub(crate) fn secret_from_candidate(candidate: &mut [u8; SCALAR_SIZE]) -> Option<SecretKey> {
    candidate[0] &= 0x01;
    SecretKey::from_slice(candidate).ok()
}

/// A P-521 private key with its usage set
#[derive(Clone)]
pub struct EcdhPrivateKey {
    secret: SecretKey,
    usages: KeyUsages,
    extractable: bool,
}

impl EcdhPrivateKey {
    pub(crate) fn from_secret(secret: SecretKey, usages: KeyUsages, extractable: bool) -> Self {
        Self {
            secret,
            usages,
            extractable,
        }
    }

    /// Permitted operations
    pub fn usages(&self) -> KeyUsages {
        self.usages
    }

    /// Whether the key may be exported
    pub fn is_extractable(&self) -> bool {
        self.extractable
    }

    /// The matching public key
    pub fn public_key(&self) -> EcdhPublicKey {
        EcdhPublicKey {
            public: self.secret.public_key(),
        }
    }

    /// Export as `pkcs8` DER or a JWK carrying `d`
    ///
    /// ## Security Warning
    ///
    /// Only use this for wrapping. Never log or transmit the result.
    pub fn export(&self, format: KeyFormat) -> Result<ExportedKey> {
        if !self.extractable {
            return Err(Error::NotExtractable);
        }

        match format {
            KeyFormat::Pkcs8 => {
                let der = self
                    .secret
                    .to_pkcs8_der()
                    .map_err(|e| Error::InvalidKey(format!("PKCS8 encoding failed: {}", e)))?;
                Ok(ExportedKey::Bytes(der.as_bytes().to_vec()))
            }
            KeyFormat::Jwk => {
                let json = self.secret.to_jwk_string();
                let mut jwk = Jwk::from_json(&json)?;
                jwk.key_ops = Some(self.usages.to_vec());
                jwk.ext = Some(self.extractable);
                Ok(ExportedKey::Jwk(jwk))
            }
            other => Err(Error::UnsupportedKeyFormat(format!(
                "ECDH private keys cannot be exported as {}",
                other
            ))),
        }
    }

    /// Import from `pkcs8` DER or a private JWK
    ///
    /// The imported key's usage set is exactly `usages`.
    pub fn import(
        format: KeyFormat,
        encoded: &ExportedKey,
        usages: KeyUsages,
        extractable: bool,
    ) -> Result<Self> {
        let secret = match (format, encoded) {
            (KeyFormat::Pkcs8, ExportedKey::Bytes(der)) => SecretKey::from_pkcs8_der(der)
                .map_err(|e| Error::InvalidKey(format!("Invalid PKCS8 private key: {}", e)))?,
            (KeyFormat::Jwk, ExportedKey::Jwk(jwk)) => {
                if !jwk.is_private() {
                    return Err(Error::InvalidKey("JWK has no private scalar 'd'".into()));
                }
                let core = Zeroizing::new(jwk.ec_core_json()?);
                SecretKey::from_jwk_str(&core)
                    .map_err(|e| Error::InvalidKey(format!("Invalid private JWK: {}", e)))?
            }
            (format, _) => {
                return Err(Error::UnsupportedKeyFormat(format!(
                    "cannot import an ECDH private key from {}",
                    format
                )))
            }
        };

        Ok(Self::from_secret(secret, usages, extractable))
    }
}

impl fmt::Debug for EcdhPrivateKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EcdhPrivateKey")
            .field("usages", &self.usages)
            .field("extractable", &self.extractable)
            .finish_non_exhaustive()
    }
}

/// A P-521 public key
///
/// Public keys carry no usages and are always extractable.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EcdhPublicKey {
    public: PublicKey,
}

impl EcdhPublicKey {
    /// Export as `spki` DER, `raw` SEC1 point or a public JWK
    pub fn export(&self, format: KeyFormat) -> Result<ExportedKey> {
        match format {
            KeyFormat::Spki => {
                let der = self
                    .public
                    .to_public_key_der()
                    .map_err(|e| Error::InvalidKey(format!("SPKI encoding failed: {}", e)))?;
                Ok(ExportedKey::Bytes(der.as_bytes().to_vec()))
            }
            KeyFormat::Raw => Ok(ExportedKey::Bytes(
                self.public.to_encoded_point(false).as_bytes().to_vec(),
            )),
            KeyFormat::Jwk => {
                let mut jwk = Jwk::from_json(&self.public.to_jwk_string())?;
                jwk.key_ops = Some(Vec::new());
                jwk.ext = Some(true);
                Ok(ExportedKey::Jwk(jwk))
            }
            KeyFormat::Pkcs8 => Err(Error::UnsupportedKeyFormat(
                "ECDH public keys cannot be exported as pkcs8".into(),
            )),
        }
    }

    /// Import from `spki` DER, `raw` SEC1 point or a JWK
    ///
    /// A private JWK is accepted; only its public members are read.
    pub fn import(format: KeyFormat, encoded: &ExportedKey) -> Result<Self> {
        let public = match (format, encoded) {
            (KeyFormat::Spki, ExportedKey::Bytes(der)) => PublicKey::from_public_key_der(der)
                .map_err(|e| Error::InvalidKey(format!("Invalid SPKI public key: {}", e)))?,
            (KeyFormat::Raw, ExportedKey::Bytes(point)) => PublicKey::from_sec1_bytes(point)
                .map_err(|e| Error::InvalidKey(format!("Invalid SEC1 point: {}", e)))?,
            (KeyFormat::Jwk, ExportedKey::Jwk(jwk)) => {
                let public_only = Jwk {
                    d: None,
                    ..jwk.clone()
                };
                PublicKey::from_jwk_str(&public_only.ec_core_json()?)
                    .map_err(|e| Error::InvalidKey(format!("Invalid public JWK: {}", e)))?
            }
            (format, _) => {
                return Err(Error::UnsupportedKeyFormat(format!(
                    "cannot import an ECDH public key from {}",
                    format
                )))
            }
        };

        Ok(Self { public })
    }

    /// Import a counterparty's published JWK
    pub fn from_jwk(jwk: &Jwk) -> Result<Self> {
        Self::import(KeyFormat::Jwk, &ExportedKey::Jwk(jwk.clone()))
    }

    /// Export as a JWK
    pub fn to_jwk(&self) -> Result<Jwk> {
        self.export(KeyFormat::Jwk)?.into_jwk()
    }
}

/// A P-521 key pair
#[derive(Debug, Clone)]
pub struct KeyPair {
    /// Private half, usages `{deriveKey}`
    pub private_key: EcdhPrivateKey,
    /// Public half
    pub public_key: EcdhPublicKey,
}

impl KeyPair {
    pub(crate) fn from_secret(secret: SecretKey) -> Self {
        let private_key = EcdhPrivateKey::from_secret(secret, KeyUsages::derive_key(), true);
        let public_key = private_key.public_key();
        Self {
            private_key,
            public_key,
        }
    }
}

/// Either half of an ECDH key pair, as returned by [`KeyAgreement::import_key`]
#[derive(Debug, Clone)]
pub enum AsymmetricKey {
    /// Imported from `pkcs8` or a private JWK
    Private(EcdhPrivateKey),
    /// Imported from `spki`, `raw` or a public JWK
    Public(EcdhPublicKey),
}

impl AsymmetricKey {
    /// Take the private key, failing for public keys
    pub fn into_private(self) -> Result<EcdhPrivateKey> {
        match self {
            AsymmetricKey::Private(key) => Ok(key),
            AsymmetricKey::Public(_) => Err(Error::InvalidKey("expected a private key".into())),
        }
    }

    /// Take the public key, failing for private keys
    pub fn into_public(self) -> Result<EcdhPublicKey> {
        match self {
            AsymmetricKey::Public(key) => Ok(key),
            AsymmetricKey::Private(_) => Err(Error::InvalidKey("expected a public key".into())),
        }
    }
}

impl ExportKey for EcdhPrivateKey {
    fn export_as(&self, format: KeyFormat) -> Result<ExportedKey> {
        self.export(format)
    }
}

impl ExportKey for EcdhPublicKey {
    fn export_as(&self, format: KeyFormat) -> Result<ExportedKey> {
        self.export(format)
    }
}

impl ExportKey for AsymmetricKey {
    fn export_as(&self, format: KeyFormat) -> Result<ExportedKey> {
        match self {
            AsymmetricKey::Private(key) => key.export(format),
            AsymmetricKey::Public(key) => key.export(format),
        }
    }
}

/// ECDH key generation, import/export and shared key derivation
#[derive(Debug, Clone)]
pub struct KeyAgreement {
    provider: Arc<dyn CryptoProvider>,
}

impl KeyAgreement {
    /// Create a key agreement component drawing randomness from `provider`
    pub fn new(provider: Arc<dyn CryptoProvider>) -> Self {
        Self { provider }
    }

    /// Generate a fresh random key pair (signup)
    ///
    /// The private half is extractable with usages `{deriveKey}`.
    pub fn generate_random_key_pair(&self) -> Result<KeyPair> {
        let mut candidate = Zeroizing::new([0u8; SCALAR_SIZE]);
        for _ in 0..MAX_SCALAR_ATTEMPTS {
            self.provider.fill_random(candidate.as_mut_slice())?;
            if let Some(secret) = secret_from_candidate(&mut candidate) {
                tracing::debug!("Generated random P-521 key pair");
                return Ok(KeyPair::from_secret(secret));
            }
        }
        Err(Error::RngFailed)
    }

    /// Export any key in the given format
    pub fn export_key<K: ExportKey + ?Sized>(&self, key: &K, format: KeyFormat) -> Result<ExportedKey> {
        key.export_as(format)
    }

    /// Import a key; `pkcs8` and private JWKs yield private keys,
    /// `spki`, `raw` and public JWKs yield public keys
    ///
    /// `usages` and `extractable` apply to private keys only.
    pub fn import_key(
        &self,
        format: KeyFormat,
        encoded: &ExportedKey,
        usages: KeyUsages,
        extractable: bool,
    ) -> Result<AsymmetricKey> {
        let is_private = match (format, encoded) {
            (KeyFormat::Pkcs8, _) => true,
            (KeyFormat::Jwk, ExportedKey::Jwk(jwk)) => jwk.is_private(),
            _ => false,
        };

        if is_private {
            EcdhPrivateKey::import(format, encoded, usages, extractable).map(AsymmetricKey::Private)
        } else {
            EcdhPublicKey::import(format, encoded).map(AsymmetricKey::Public)
        }
    }

    /// Derive the AES-GCM-256 shared key for a conversation
    ///
    /// `derive_key(B.pub, A.priv)` and `derive_key(A.pub, B.priv)` produce
    /// identical key material.
    ///
    /// ## Errors
    ///
    /// `CapabilityViolation` if `my_private` lacks `deriveKey`.
    pub fn derive_key(
        &self,
        their_public: &EcdhPublicKey,
        my_private: &EcdhPrivateKey,
    ) -> Result<SymmetricKey> {
        my_private.usages.require(KeyUsage::DeriveKey)?;

        let shared = diffie_hellman(
            my_private.secret.to_nonzero_scalar(),
            their_public.public.as_affine(),
        );
        let raw = shared.raw_secret_bytes();

        SymmetricKey::from_bytes(
            &raw[..SHARED_KEY_SIZE],
            KeyUsages::encrypt_decrypt(),
            true,
        )
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::provider::{OsCryptoProvider, SequenceCryptoProvider};

    fn agreement() -> KeyAgreement {
        KeyAgreement::new(OsCryptoProvider::shared())
    }

    fn raw(key: &SymmetricKey) -> Vec<u8> {
        key.export(KeyFormat::Raw).unwrap().into_bytes().unwrap()
    }

    #[test]
    fn test_keypair_generation() {
        let agreement = agreement();
        let kp1 = agreement.generate_random_key_pair().unwrap();
        let kp2 = agreement.generate_random_key_pair().unwrap();

        assert_ne!(kp1.public_key, kp2.public_key);
        assert_eq!(kp1.private_key.usages(), KeyUsages::derive_key());
        assert!(kp1.private_key.is_extractable());
    }

    #[test]
    fn test_shared_key_symmetry() {
        let agreement = agreement();
        let alice = agreement.generate_random_key_pair().unwrap();
        let bob = agreement.generate_random_key_pair().unwrap();

        let alice_shared = agreement.derive_key(&bob.public_key, &alice.private_key).unwrap();
        let bob_shared = agreement.derive_key(&alice.public_key, &bob.private_key).unwrap();

        assert_eq!(raw(&alice_shared), raw(&bob_shared));
        assert_eq!(alice_shared.usages(), KeyUsages::encrypt_decrypt());
    }

    #[test]
    fn test_different_partners_different_keys() {
        let agreement = agreement();
        let alice = agreement.generate_random_key_pair().unwrap();
        let bob = agreement.generate_random_key_pair().unwrap();
        let carol = agreement.generate_random_key_pair().unwrap();

        let with_bob = agreement.derive_key(&bob.public_key, &alice.private_key).unwrap();
        let with_carol = agreement.derive_key(&carol.public_key, &alice.private_key).unwrap();
        assert_ne!(raw(&with_bob), raw(&with_carol));
    }

    #[test]
    fn test_derive_requires_derive_key_usage() {
        let agreement = agreement();
        let alice = agreement.generate_random_key_pair().unwrap();
        let bob = agreement.generate_random_key_pair().unwrap();

        let pkcs8 = alice.private_key.export(KeyFormat::Pkcs8).unwrap();
        let restricted =
            EcdhPrivateKey::import(KeyFormat::Pkcs8, &pkcs8, KeyUsages::empty(), true).unwrap();

        let result = agreement.derive_key(&bob.public_key, &restricted);
        assert!(matches!(
            result,
            Err(Error::CapabilityViolation {
                required: KeyUsage::DeriveKey
            })
        ));
    }

    #[test]
    fn test_private_jwk_round_trip() {
        let agreement = agreement();
        let kp = agreement.generate_random_key_pair().unwrap();

        let exported = agreement.export_key(&kp.private_key, KeyFormat::Jwk).unwrap();
        let jwk = exported.as_jwk().unwrap();
        assert_eq!(jwk.kty, "EC");
        assert_eq!(jwk.crv.as_deref(), Some(CURVE_NAME));
        assert!(jwk.is_private());

        let imported = agreement
            .import_key(KeyFormat::Jwk, &exported, KeyUsages::derive_key(), true)
            .unwrap();
        assert!(matches!(imported, AsymmetricKey::Private(_)));
        assert_eq!(agreement.export_key(&imported, KeyFormat::Jwk).unwrap(), exported);
    }

    #[test]
    fn test_public_jwk_round_trip() {
        let agreement = agreement();
        let kp = agreement.generate_random_key_pair().unwrap();

        let exported = agreement.export_key(&kp.public_key, KeyFormat::Jwk).unwrap();
        assert!(!exported.as_jwk().unwrap().is_private());

        let imported = agreement
            .import_key(KeyFormat::Jwk, &exported, KeyUsages::empty(), true)
            .unwrap();
        assert_eq!(imported.clone().into_public().unwrap(), kp.public_key);
        assert_eq!(agreement.export_key(&imported, KeyFormat::Jwk).unwrap(), exported);
    }

    #[test]
    fn test_spki_and_raw_round_trip() {
        let agreement = agreement();
        let kp = agreement.generate_random_key_pair().unwrap();

        for format in [KeyFormat::Spki, KeyFormat::Raw] {
            let exported = kp.public_key.export(format).unwrap();
            let imported = EcdhPublicKey::import(format, &exported).unwrap();
            assert_eq!(imported, kp.public_key);
        }

        let raw_point = kp.public_key.export(KeyFormat::Raw).unwrap().into_bytes().unwrap();
        assert_eq!(raw_point.len(), 1 + 2 * SCALAR_SIZE);
        assert_eq!(raw_point[0], 0x04);
    }

    #[test]
    fn test_pkcs8_round_trip() {
        let agreement = agreement();
        let kp = agreement.generate_random_key_pair().unwrap();

        let der = kp.private_key.export(KeyFormat::Pkcs8).unwrap();
        let imported = agreement
            .import_key(KeyFormat::Pkcs8, &der, KeyUsages::derive_key(), true)
            .unwrap()
            .into_private()
            .unwrap();

        assert_eq!(imported.export(KeyFormat::Pkcs8).unwrap(), der);
        assert_eq!(imported.public_key(), kp.public_key);
    }

    #[test]
    fn test_non_extractable_private_export_fails() {
        let agreement = agreement();
        let kp = agreement.generate_random_key_pair().unwrap();
        let der = kp.private_key.export(KeyFormat::Pkcs8).unwrap();
        let locked =
            EcdhPrivateKey::import(KeyFormat::Pkcs8, &der, KeyUsages::derive_key(), false).unwrap();

        assert!(matches!(locked.export(KeyFormat::Jwk), Err(Error::NotExtractable)));
    }

    #[test]
    fn test_wrong_format_pairings_rejected() {
        let agreement = agreement();
        let kp = agreement.generate_random_key_pair().unwrap();

        assert!(matches!(
            kp.private_key.export(KeyFormat::Spki),
            Err(Error::UnsupportedKeyFormat(_))
        ));
        assert!(matches!(
            kp.public_key.export(KeyFormat::Pkcs8),
            Err(Error::UnsupportedKeyFormat(_))
        ));
    }

    #[test]
    fn test_garbage_public_key_rejected() {
        let result = EcdhPublicKey::import(KeyFormat::Raw, &ExportedKey::Bytes(vec![4u8; 133]));
        assert!(matches!(result, Err(Error::InvalidKey(_))));
    }

    #[test]
    fn test_sequence_provider_gives_reproducible_key_pairs() {
        let a = KeyAgreement::new(Arc::new(SequenceCryptoProvider::new(b"pair")));
        let b = KeyAgreement::new(Arc::new(SequenceCryptoProvider::new(b"pair")));
        assert_eq!(
            a.generate_random_key_pair().unwrap().public_key,
            b.generate_random_key_pair().unwrap().public_key
        );
    }
}
